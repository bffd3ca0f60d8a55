//! Roster exchange for trades leaving ACCEPTED (or forced by a commissioner).
//!
//! Re-validation, both roster rewrites, the status flip and the outbound
//! notification are written through the same [`Tx`], so they commit together
//! or not at all.
use super::commissioner::OverrideAction;
use super::error::ExecutionIntegrityError;
use super::history::WitnessType;
use super::league::{Roster, RosterSlot};
use super::outbox::{Notification, NotificationKind};
use super::state::TradeAction;
use super::store::{Tx, TxResult, guard};
use super::trade::{TimeStamp, Trade};
use chrono::Utc;

/// Why the executor was invoked.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum ExecutionCause {
    /// Partner accepted and the league does not review trades.
    Accepted { actor: String },
    /// Review window ran out without enough vetoes.
    ReviewLapsed,
    /// A party re-ran execution after an integrity failure.
    Retry { actor: String },
    Commissioner { actor: String, reason: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Execution {
    Completed,
    Refused(ExecutionIntegrityError),
}

impl ExecutionCause {
    fn actor(&self) -> &str {
        match self {
            ExecutionCause::Accepted { actor }
            | ExecutionCause::Retry { actor }
            | ExecutionCause::Commissioner { actor, .. } => actor,
            ExecutionCause::ReviewLapsed => "sweeper",
        }
    }
    fn forced(&self) -> bool {
        matches!(self, ExecutionCause::Commissioner { .. })
    }
}

/// Every give asset still on the initiator's roster and every receive asset
/// still on the partner's.
pub fn revalidate(
    trade: &Trade,
    initiator: &Roster,
    partner: &Roster,
) -> Result<(), ExecutionIntegrityError> {
    let missing = trade
        .give
        .iter()
        .find(|a| !initiator.contains(a))
        .map(|a| (&trade.initiator_team_id, a))
        .or_else(|| {
            trade
                .receive
                .iter()
                .find(|a| !partner.contains(a))
                .map(|a| (&trade.partner_team_id, a))
        });

    match missing {
        Some((team_id, asset)) => Err(ExecutionIntegrityError::AssetNoLongerOwned {
            trade_id: trade.id.clone(),
            team_id: team_id.clone(),
            asset: asset.clone(),
        }),
        None => Ok(()),
    }
}

/// Swap the assets and mark the trade EXECUTED. On a failed re-validation the
/// rosters and status are left alone; the failure is recorded on the trade and
/// reported to both parties. The trade is persisted in both cases.
pub(crate) fn execute_in(
    tx: &Tx<'_>,
    trade: &mut Trade,
    cause: ExecutionCause,
    now: &TimeStamp<Utc>,
) -> TxResult<Execution> {
    let next = guard(trade.status.apply(
        &trade.id,
        TradeAction::Execute {
            forced: cause.forced(),
        },
    ))?;

    let mut initiator = tx.roster(&trade.initiator_team_id, trade.season)?;
    let mut partner = tx.roster(&trade.partner_team_id, trade.season)?;

    if let Err(err) = revalidate(trade, &initiator, &partner) {
        tracing::warn!(trade_id = %trade.id, error = %err, "execution refused");
        trade.last_execution_error = Some(err.to_string());
        guard(trade.record(
            cause.actor(),
            now,
            WitnessType::ExecutionFailed {
                reason: err.to_string(),
            },
        ))?;
        tx.put_trade(trade)?;
        tx.notify(Notification::to_parties(
            NotificationKind::ExecutionFailed,
            trade,
            format!("trade could not be executed: {err}"),
        ))?;
        return Ok(Execution::Refused(err));
    }

    for asset in &trade.give {
        initiator.remove(asset);
    }
    for asset in &trade.receive {
        partner.remove(asset);
    }
    for asset in &trade.give {
        partner.insert(asset.clone(), RosterSlot::Bench);
    }
    for asset in &trade.receive {
        initiator.insert(asset.clone(), RosterSlot::Bench);
    }
    tx.put_roster(&trade.initiator_team_id, trade.season, &initiator)?;
    tx.put_roster(&trade.partner_team_id, trade.season, &partner)?;

    trade.status = next;
    trade.executed_at = Some(now.clone());
    trade.last_execution_error = None;

    let (kind, message) = match &cause {
        ExecutionCause::Commissioner { reason, .. } => {
            trade.commissioner_override = true;
            trade.override_reason = Some(reason.clone());
            trade.responded_at = Some(now.clone());
            (
                WitnessType::Overridden {
                    action: OverrideAction::Approve,
                    reason: reason.clone(),
                },
                format!("commissioner approved the trade: {reason}"),
            )
        }
        ExecutionCause::ReviewLapsed => (
            WitnessType::Executed,
            "review period ended, trade executed".to_string(),
        ),
        ExecutionCause::Accepted { .. } | ExecutionCause::Retry { .. } => {
            (WitnessType::Executed, "trade executed".to_string())
        }
    };
    guard(trade.record(cause.actor(), now, kind))?;
    tx.put_trade(trade)?;

    let notification_kind = if cause.forced() {
        NotificationKind::Overridden
    } else {
        NotificationKind::Executed
    };
    tx.notify(Notification::to_parties(notification_kind, trade, message))?;

    Ok(Execution::Completed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::TradeStatus;
    use crate::trade::Asset;

    fn trade() -> Trade {
        let now = TimeStamp::new_with(2026, 9, 1, 0, 0, 0).unwrap();
        Trade {
            id: "trade_x".into(),
            league_id: "l".into(),
            season: 2026,
            initiator_team_id: "t1".into(),
            partner_team_id: "t2".into(),
            initiator_user_id: "u1".into(),
            give: [Asset::player("p1")].into_iter().collect(),
            receive: [Asset::player("p3")].into_iter().collect(),
            status: TradeStatus::Accepted,
            proposed_at: now.clone(),
            expires_at: now.add_days(3).unwrap(),
            review_ends_at: None,
            veto_votes: 0,
            approve_votes: 0,
            commissioner_override: false,
            override_reason: None,
            parent_trade_id: None,
            counter_trade_id: None,
            note: None,
            responded_at: None,
            executed_at: None,
            last_execution_error: None,
            history: vec![],
        }
    }

    #[test]
    fn revalidate_passes_when_holdings_unchanged() {
        let initiator: Roster = [Asset::player("p1"), Asset::player("p2")].into_iter().collect();
        let partner: Roster = [Asset::player("p3")].into_iter().collect();

        assert!(revalidate(&trade(), &initiator, &partner).is_ok());
    }

    #[test]
    fn revalidate_names_the_missing_asset() {
        let initiator: Roster = [Asset::player("p1")].into_iter().collect();
        let partner: Roster = [Asset::player("p4")].into_iter().collect();

        let err = revalidate(&trade(), &initiator, &partner).unwrap_err();
        assert_eq!(
            err,
            ExecutionIntegrityError::AssetNoLongerOwned {
                trade_id: "trade_x".into(),
                team_id: "t2".into(),
                asset: Asset::player("p3"),
            }
        );
    }
}
