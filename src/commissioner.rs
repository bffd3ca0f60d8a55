//! Commissioner override: force a non-terminal trade to EXECUTED or VETOED,
//! bypassing acceptance and league review.
use super::error::{AuthorizationError, StateConflictError, TradeError, ValidationError};
use super::executor::{Execution, ExecutionCause, execute_in};
use super::history::WitnessType;
use super::league::Role;
use super::outbox::{Notification, NotificationKind};
use super::service::{Committed, TradeService};
use super::state::TradeAction;
use super::store::{abort, guard};
use super::trade::Trade;

#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, Copy, PartialEq, Eq)]
pub enum OverrideAction {
    /// Execute the trade now.
    #[n(0)]
    Approve,
    #[n(1)]
    Veto,
}

impl TradeService {
    pub fn commissioner_override(
        &self,
        trade_id: &str,
        user_id: &str,
        action: OverrideAction,
        reason: &str,
    ) -> Result<Trade, TradeError> {
        let reason = reason.trim();
        if reason.is_empty() {
            return Err(ValidationError::MissingReason.into());
        }
        let now = self.clock.now();

        let trade = self.commit(|tx| {
            let mut trade = tx.trade(trade_id)?;
            if tx.role(&trade.league_id, user_id)? != Some(Role::Commissioner) {
                return abort(AuthorizationError::NotCommissioner {
                    user_id: user_id.to_string(),
                    league_id: trade.league_id.clone(),
                });
            }
            if trade.is_terminal() {
                return abort(StateConflictError::AlreadyTerminal {
                    trade_id: trade.id.clone(),
                    status: trade.status,
                });
            }

            match action {
                OverrideAction::Approve => {
                    let cause = ExecutionCause::Commissioner {
                        actor: user_id.to_string(),
                        reason: reason.to_string(),
                    };
                    match execute_in(tx, &mut trade, cause, &now)? {
                        Execution::Completed => Ok(Committed::Done(trade)),
                        Execution::Refused(err) => Ok(Committed::Failed(err.into())),
                    }
                }
                OverrideAction::Veto => {
                    guard(trade.advance(
                        TradeAction::Veto { forced: true },
                        user_id,
                        &now,
                        WitnessType::Overridden {
                            action,
                            reason: reason.to_string(),
                        },
                    ))?;
                    trade.commissioner_override = true;
                    trade.override_reason = Some(reason.to_string());
                    trade.responded_at = Some(now.clone());
                    tx.put_trade(&trade)?;
                    tx.notify(Notification::to_parties(
                        NotificationKind::Overridden,
                        &trade,
                        format!("commissioner vetoed the trade: {reason}"),
                    ))?;
                    Ok(Committed::Done(trade))
                }
            }
        })?;

        tracing::info!(
            trade_id = %trade.id,
            commissioner = user_id,
            action = ?action,
            status = ?trade.status,
            "commissioner override applied"
        );
        Ok(trade)
    }
}
