//! Proposal drafts and the checks a draft must pass before it becomes a trade.
use super::config::TradeSection;
use super::error::{AuthorizationError, TradeError, ValidationError};
use super::history::WitnessType;
use super::league::{LeaguePolicy, Roster};
use super::state::TradeStatus;
use super::store::{Tx, TxResult, abort, guard};
use super::trade::{Asset, AssetSet, TimeStamp, Trade};
use chrono::Utc;

// Draft of a trade, assembled by the proposing owner.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TradeProposal {
    pub initiator_user_id: String,
    pub initiator_team_id: String,
    pub partner_team_id: String,
    pub give: AssetSet,
    pub receive: AssetSet,
    pub expiration_days: Option<u32>,
    pub note: Option<String>,
}

impl TradeProposal {
    pub fn new(initiator_user_id: &str, initiator_team_id: &str, partner_team_id: &str) -> Self {
        Self {
            initiator_user_id: initiator_user_id.to_string(),
            initiator_team_id: initiator_team_id.to_string(),
            partner_team_id: partner_team_id.to_string(),
            ..Self::default()
        }
    }
    pub fn give_asset(mut self, asset: Asset) -> Self {
        self.give.insert(asset);
        self
    }
    pub fn receive_asset(mut self, asset: Asset) -> Self {
        self.receive.insert(asset);
        self
    }
    pub fn set_expiration_days(mut self, days: u32) -> Self {
        self.expiration_days = Some(days);
        self
    }
    pub fn set_note(mut self, note: &str) -> Self {
        self.note = Some(note.to_string());
        self
    }
}

pub fn check_expiration(days: Option<u32>, limits: &TradeSection) -> Result<u32, ValidationError> {
    let days = days.unwrap_or(limits.default_expiration_days);
    if days < limits.min_expiration_days || days > limits.max_expiration_days {
        return Err(ValidationError::InvalidExpiration {
            days,
            min: limits.min_expiration_days,
            max: limits.max_expiration_days,
        });
    }
    Ok(days)
}

pub fn check_deadline(policy: &LeaguePolicy, now: &TimeStamp<Utc>) -> Result<(), ValidationError> {
    if *now > policy.trade_deadline {
        return Err(ValidationError::DeadlinePassed {
            deadline: policy.trade_deadline.clone(),
        });
    }
    Ok(())
}

/// Ownership checks, in order: every give asset is on the initiator's roster,
/// every receive asset is on the partner's, and the initiator does not end up
/// holding something twice.
pub fn check_assets(
    initiator_team_id: &str,
    initiator: &Roster,
    partner_team_id: &str,
    partner: &Roster,
    give: &AssetSet,
    receive: &AssetSet,
) -> Result<(), ValidationError> {
    if give.is_empty() && receive.is_empty() {
        return Err(ValidationError::EmptyTrade);
    }
    if let Some(asset) = give.iter().find(|a| !initiator.contains(a)) {
        return Err(ValidationError::InvalidAsset {
            team_id: initiator_team_id.to_string(),
            asset: asset.clone(),
        });
    }
    if let Some(asset) = receive.iter().find(|a| !partner.contains(a)) {
        return Err(ValidationError::InvalidAsset {
            team_id: partner_team_id.to_string(),
            asset: asset.clone(),
        });
    }
    // An asset on both sides would leave both rosters holding it.
    if let Some(asset) = receive.intersection(give).next() {
        return Err(ValidationError::DuplicateAcquisition {
            team_id: initiator_team_id.to_string(),
            asset: asset.clone(),
        });
    }
    if let Some(asset) = receive
        .iter()
        .find(|a| initiator.contains(a) && !give.contains(a))
    {
        return Err(ValidationError::DuplicateAcquisition {
            team_id: initiator_team_id.to_string(),
            asset: asset.clone(),
        });
    }
    Ok(())
}

/// `days` after `now`, or `InvalidPolicy` when that date cannot be stored.
pub(crate) fn days_after(
    now: &TimeStamp<Utc>,
    days: u32,
    league_id: &str,
    what: &str,
) -> Result<TimeStamp<Utc>, ValidationError> {
    now.add_days(days)
        .ok_or_else(|| ValidationError::InvalidPolicy {
            league_id: league_id.to_string(),
            detail: format!("{what} of {days} days runs past the representable range"),
        })
}

/// Validates `proposal` against the current league state and builds the
/// PROPOSED trade. Nothing is written here.
pub(crate) fn validate_in(
    tx: &Tx<'_>,
    trade_id: &str,
    proposal: &TradeProposal,
    expiration_days: u32,
    parent_trade_id: Option<&str>,
    now: &TimeStamp<Utc>,
) -> TxResult<Trade> {
    let Some(initiator) = tx.team(&proposal.initiator_team_id)? else {
        return abort(ValidationError::TeamNotFound(
            proposal.initiator_team_id.clone(),
        ));
    };
    if initiator.owner_user_id != proposal.initiator_user_id {
        return abort(AuthorizationError::NotTeamOwner {
            user_id: proposal.initiator_user_id.clone(),
            team_id: initiator.id.clone(),
        });
    }
    if proposal.partner_team_id == initiator.id {
        return abort(ValidationError::SelfTrade);
    }
    let partner = match tx.team(&proposal.partner_team_id)? {
        Some(team) if team.league_id == initiator.league_id => team,
        _ => {
            return abort(ValidationError::PartnerNotFound {
                team_id: proposal.partner_team_id.clone(),
                league_id: initiator.league_id.clone(),
            });
        }
    };

    let policy = tx.policy(&initiator.league_id)?;
    guard(check_deadline(&policy, now))?;

    let initiator_roster = tx.roster(&initiator.id, policy.season)?;
    let partner_roster = tx.roster(&partner.id, policy.season)?;
    guard(check_assets(
        &initiator.id,
        &initiator_roster,
        &partner.id,
        &partner_roster,
        &proposal.give,
        &proposal.receive,
    ))?;

    let expires_at = guard(days_after(
        now,
        expiration_days,
        &initiator.league_id,
        "expiration",
    ))?;
    // Provisional; restarted when the partner accepts.
    let review_ends_at = if policy.voting_enabled() {
        Some(guard(days_after(
            now,
            policy.trade_review_days,
            &initiator.league_id,
            "trade_review_days",
        ))?)
    } else {
        None
    };

    let mut trade = Trade {
        id: trade_id.to_string(),
        league_id: initiator.league_id.clone(),
        season: policy.season,
        initiator_team_id: initiator.id.clone(),
        partner_team_id: partner.id.clone(),
        initiator_user_id: proposal.initiator_user_id.clone(),
        give: proposal.give.clone(),
        receive: proposal.receive.clone(),
        status: TradeStatus::Proposed,
        proposed_at: now.clone(),
        expires_at,
        review_ends_at,
        veto_votes: 0,
        approve_votes: 0,
        commissioner_override: false,
        override_reason: None,
        parent_trade_id: parent_trade_id.map(str::to_string),
        counter_trade_id: None,
        note: proposal.note.clone(),
        responded_at: None,
        executed_at: None,
        last_execution_error: None,
        history: Vec::new(),
    };
    guard(trade.record(
        &proposal.initiator_user_id,
        now,
        WitnessType::Proposed {
            parent_trade_id: parent_trade_id.map(str::to_string),
        },
    ))?;
    Ok(trade)
}

pub(crate) fn new_trade_id() -> Result<String, TradeError> {
    super::utils::new_trade_id().map_err(|e| TradeError::Codec(e.to_string()))
}
