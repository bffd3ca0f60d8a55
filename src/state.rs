//! Trade lifecycle as a closed set of statuses and the actions between them.
//!
//! Every `(status, action)` pair is handled by [`TradeStatus::apply`]; a pair
//! that is not a legal edge comes back as a [`StateConflictError`], never as a
//! silently ignored write.
use super::error::StateConflictError;

#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TradeStatus {
    #[n(0)]
    Proposed,
    #[n(1)]
    Accepted,
    #[n(2)]
    Rejected,
    #[n(3)]
    Countered,
    #[n(4)]
    Cancelled,
    #[n(5)]
    Expired,
    #[n(6)]
    Vetoed,
    #[n(7)]
    Executed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TradeAction {
    Accept,
    Reject,
    Counter,
    Cancel,
    /// `forced` is set by a commissioner and may skip acceptance.
    Execute { forced: bool },
    Veto { forced: bool },
    Expire,
}

impl TradeStatus {
    pub const ALL: [TradeStatus; 8] = [
        TradeStatus::Proposed,
        TradeStatus::Accepted,
        TradeStatus::Rejected,
        TradeStatus::Countered,
        TradeStatus::Cancelled,
        TradeStatus::Expired,
        TradeStatus::Vetoed,
        TradeStatus::Executed,
    ];

    pub fn is_terminal(self) -> bool {
        !matches!(self, TradeStatus::Proposed | TradeStatus::Accepted)
    }

    pub fn apply(
        self,
        trade_id: &str,
        action: TradeAction,
    ) -> Result<TradeStatus, StateConflictError> {
        use TradeAction as A;
        use TradeStatus as S;

        let next = match (self, action) {
            (
                S::Rejected | S::Countered | S::Cancelled | S::Expired | S::Vetoed | S::Executed,
                _,
            ) => {
                return Err(StateConflictError::AlreadyTerminal {
                    trade_id: trade_id.to_string(),
                    status: self,
                });
            }
            (S::Proposed, A::Accept) => S::Accepted,
            (S::Proposed, A::Reject) => S::Rejected,
            (S::Proposed, A::Counter) => S::Countered,
            (S::Proposed, A::Expire) => S::Expired,
            (S::Proposed | S::Accepted, A::Cancel) => S::Cancelled,
            (S::Accepted, A::Execute { .. }) => S::Executed,
            (S::Accepted, A::Veto { .. }) => S::Vetoed,
            (S::Proposed, A::Execute { forced: true }) => S::Executed,
            (S::Proposed, A::Veto { forced: true }) => S::Vetoed,
            (
                S::Proposed,
                A::Execute { forced: false } | A::Veto { forced: false },
            )
            | (S::Accepted, A::Accept | A::Reject | A::Counter | A::Expire) => {
                return Err(StateConflictError::WrongStatus {
                    trade_id: trade_id.to_string(),
                    status: self,
                    action,
                });
            }
        };

        tracing::debug!(trade_id, from = ?self, action = ?action, to = ?next, "transition allowed");
        Ok(next)
    }
}
