use crate::state::{TradeAction, TradeStatus};
use crate::trade::{Asset, TimeStamp};
use chrono::Utc;

/// Raised while building a proposal. Nothing is persisted when one of these
/// is returned.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("{asset} is not on the roster of team {team_id}")]
    InvalidAsset { team_id: String, asset: Asset },
    #[error("team {team_id} would acquire {asset}, which it already holds")]
    DuplicateAcquisition { team_id: String, asset: Asset },
    #[error("the trade deadline passed at {deadline}")]
    DeadlinePassed { deadline: TimeStamp<Utc> },
    #[error("partner team {team_id} is not in league {league_id}")]
    PartnerNotFound { team_id: String, league_id: String },
    #[error("team {0} does not exist")]
    TeamNotFound(String),
    #[error("a team cannot trade with itself")]
    SelfTrade,
    #[error("a trade must move at least one asset")]
    EmptyTrade,
    #[error("expiration of {days} days is outside {min}..={max}")]
    InvalidExpiration { days: u32, min: u32, max: u32 },
    #[error("a non-empty reason is required")]
    MissingReason,
    #[error("league {league_id} has an unusable policy: {detail}")]
    InvalidPolicy { league_id: String, detail: String },
}

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum AuthorizationError {
    #[error("user {user_id} does not own the partner team of trade {trade_id}")]
    NotPartner { user_id: String, trade_id: String },
    #[error("user {user_id} did not initiate trade {trade_id}")]
    NotInitiator { user_id: String, trade_id: String },
    #[error("user {user_id} is not a party to trade {trade_id}")]
    NotParty { user_id: String, trade_id: String },
    #[error("user {user_id} is not commissioner of league {league_id}")]
    NotCommissioner { user_id: String, league_id: String },
    #[error("user {user_id} is not a member of league {league_id}")]
    NotMember { user_id: String, league_id: String },
    #[error("user {user_id} does not own team {team_id}")]
    NotTeamOwner { user_id: String, team_id: String },
    #[error("user {user_id} already voted on trade {trade_id}")]
    AlreadyVoted { user_id: String, trade_id: String },
    #[error("user {user_id} is a party to trade {trade_id} and cannot vote on it")]
    SelfVote { user_id: String, trade_id: String },
}

/// A guard failed against the trade's current status. Re-fetch and retry.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum StateConflictError {
    #[error("trade {trade_id} is {status:?}, cannot {action:?}")]
    WrongStatus {
        trade_id: String,
        status: TradeStatus,
        action: TradeAction,
    },
    #[error("trade {trade_id} already reached terminal status {status:?}")]
    AlreadyTerminal { trade_id: String, status: TradeStatus },
    #[error("trade {trade_id} expired before it was answered")]
    Expired { trade_id: String },
    #[error("trade {trade_id} is not under review")]
    NotUnderReview { trade_id: String },
    #[error("review window of trade {trade_id} has closed")]
    ReviewClosed { trade_id: String },
    #[error("trade {trade_id} is still under review")]
    ReviewOpen { trade_id: String },
}

/// Execution-time re-validation failed. Rosters are untouched and the trade
/// keeps its prior status.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum ExecutionIntegrityError {
    #[error("trade {trade_id}: team {team_id} no longer holds {asset}")]
    AssetNoLongerOwned {
        trade_id: String,
        team_id: String,
        asset: Asset,
    },
}

#[derive(thiserror::Error, Debug)]
pub enum TradeError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error(transparent)]
    Authorization(#[from] AuthorizationError),
    #[error(transparent)]
    StateConflict(#[from] StateConflictError),
    #[error(transparent)]
    ExecutionIntegrity(#[from] ExecutionIntegrityError),
    #[error("trade {0} not found")]
    NotFound(String),
    #[error("league {0} not found")]
    LeagueNotFound(String),
    #[error("storage failure: {0}")]
    Storage(#[from] sled::Error),
    #[error("codec failure: {0}")]
    Codec(String),
    #[error("failed to start the outbox dispatcher: {0}")]
    Dispatcher(std::io::Error),
}

impl TradeError {
    /// Conflicts are resolved by re-reading the trade and deciding again.
    pub fn is_retryable(&self) -> bool {
        matches!(self, TradeError::StateConflict(_))
    }
}
