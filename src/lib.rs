//! Trade engine for fantasy leagues: proposals, counter-offers, league review
//! by vote, commissioner overrides and atomic roster exchange, persisted in
//! sled.

pub mod clock;
pub mod commissioner;
pub mod config;
pub mod counter;
pub mod error;
pub mod executor;
pub mod history;
pub mod league;
pub mod outbox;
pub mod service;
pub mod state;
mod store;
pub mod sweeper;
pub mod trade;
pub mod utils;
pub mod validator;
pub mod vote;

pub use clock::{Clock, ManualClock, SystemClock};
pub use commissioner::OverrideAction;
pub use config::{EngineConfig, load_config};
pub use counter::CounterOffer;
pub use error::{
    AuthorizationError, ExecutionIntegrityError, StateConflictError, TradeError, ValidationError,
};
pub use league::{LeagueDirectory, LeaguePolicy, Role, Roster, RosterSlot, Team};
pub use outbox::{
    DispatcherHandle, Notification, NotificationKind, NotificationSink, OutboxDispatcher,
    RecordingSink,
};
pub use service::TradeService;
pub use state::{TradeAction, TradeStatus};
pub use sweeper::{ExpirationSweeper, SweepReport, SweeperHandle};
pub use trade::{Asset, AssetSet, DraftPick, TimeStamp, Trade};
pub use validator::TradeProposal;
pub use vote::{Ballot, VoteTally, VoteType};
