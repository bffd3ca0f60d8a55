//! Service layer API for trade workflow operations
use super::clock::{Clock, SystemClock};
use super::config::EngineConfig;
use super::error::{AuthorizationError, StateConflictError, TradeError};
use super::executor::{Execution, ExecutionCause, execute_in};
use super::history::WitnessType;
use super::outbox::{
    DispatcherHandle, DrainReport, Notification, NotificationKind, NotificationSink,
    OutboxDispatcher,
};
use super::state::TradeAction;
use super::store::{Stores, Tx, TxResult, abort, guard};
use super::trade::{TimeStamp, Trade};
use super::validator::{TradeProposal, check_expiration, days_after, new_trade_id, validate_in};
use chrono::Utc;
use std::collections::HashSet;
use std::sync::Arc;

/// Result of a transaction that committed. `Failed` carries an error that
/// must reach the caller even though some writes (an expiry, a recorded
/// execution failure) were kept.
pub(crate) enum Committed<T> {
    Done(T),
    Failed(TradeError),
}

#[derive(Clone)]
pub struct TradeService {
    pub(crate) stores: Stores,
    pub(crate) config: Arc<EngineConfig>,
    pub(crate) clock: Arc<dyn Clock>,
    dispatcher: Option<Arc<OutboxDispatcher>>,
    // Present when delivery runs on its own thread; the last clone stops it.
    background: Option<Arc<DispatcherHandle>>,
}

pub(crate) fn require_owner(
    tx: &Tx<'_>,
    team_id: &str,
    user_id: &str,
    denied: AuthorizationError,
) -> TxResult<()> {
    match tx.team(team_id)? {
        Some(team) if team.owner_user_id == user_id => Ok(()),
        _ => abort(denied),
    }
}

pub(crate) fn is_party(tx: &Tx<'_>, trade: &Trade, user_id: &str) -> TxResult<bool> {
    if trade.initiator_user_id == user_id {
        return Ok(true);
    }
    for team_id in trade.parties() {
        if tx
            .team(team_id)?
            .is_some_and(|team| team.owner_user_id == user_id)
        {
            return Ok(true);
        }
    }
    Ok(false)
}

pub(crate) fn expire_in(
    tx: &Tx<'_>,
    trade: &mut Trade,
    actor: &str,
    now: &TimeStamp<Utc>,
) -> TxResult<()> {
    guard(trade.advance(TradeAction::Expire, actor, now, WitnessType::Expired))?;
    tx.put_trade(trade)?;
    tx.notify(Notification::to_parties(
        NotificationKind::Expired,
        trade,
        "trade proposal expired without an answer",
    ))
}

impl TradeService {
    pub fn new(instance: Arc<sled::Db>) -> Result<Self, TradeError> {
        Self::with_config(instance, EngineConfig::default(), Arc::new(SystemClock))
    }

    pub fn with_config(
        instance: Arc<sled::Db>,
        config: EngineConfig,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, TradeError> {
        Ok(Self {
            stores: Stores::open(instance)?,
            config: Arc::new(config),
            clock,
            dispatcher: None,
            background: None,
        })
    }

    /// Deliver queued notifications to `sink`. With `outbox.background` a
    /// dispatcher thread does the delivery; otherwise each operation drains
    /// the outbox after its commit.
    pub fn with_notifier(mut self, sink: Arc<dyn NotificationSink>) -> Result<Self, TradeError> {
        let dispatcher = Arc::new(OutboxDispatcher::new(
            &self.stores.instance,
            sink,
            self.config.outbox.clone(),
        )?);
        if self.config.outbox.background {
            let handle = Arc::clone(&dispatcher)
                .spawn()
                .map_err(TradeError::Dispatcher)?;
            self.background = Some(Arc::new(handle));
        }
        self.dispatcher = Some(dispatcher);
        Ok(self)
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn now(&self) -> TimeStamp<Utc> {
        self.clock.now()
    }

    /// Drain the outbox on the caller's thread. A no-op without a notifier.
    pub fn dispatch_notifications(&self) -> Result<DrainReport, TradeError> {
        match &self.dispatcher {
            Some(dispatcher) => dispatcher.drain(),
            None => Ok(DrainReport::default()),
        }
    }

    pub(crate) fn commit<T, F>(&self, f: F) -> Result<T, TradeError>
    where
        F: Fn(&Tx<'_>) -> TxResult<Committed<T>>,
    {
        let outcome = self.stores.atomically(f);
        // Outside the transaction; delivery problems never reach the caller.
        match (&self.dispatcher, &self.background) {
            (Some(dispatcher), Some(_)) => dispatcher.wake(),
            (Some(dispatcher), None) => {
                if let Err(err) = dispatcher.drain() {
                    tracing::warn!(error = %err, "outbox drain failed");
                }
            }
            (None, _) => {}
        }
        match outcome? {
            Committed::Done(value) => Ok(value),
            Committed::Failed(err) => Err(err),
        }
    }

    /// Validate and persist a new proposal in PROPOSED.
    pub fn propose_trade(&self, proposal: TradeProposal) -> Result<Trade, TradeError> {
        let days = check_expiration(proposal.expiration_days, &self.config.trade)?;
        let trade_id = new_trade_id()?;
        let now = self.clock.now();

        let trade = self.commit(|tx| {
            let trade = validate_in(tx, &trade_id, &proposal, days, None, &now)?;
            tx.put_trade(&trade)?;
            tx.notify(Notification::to_team(
                NotificationKind::Proposed,
                &trade,
                &trade.partner_team_id,
                format!("team {} proposed a trade", trade.initiator_team_id),
            ))?;
            Ok(Committed::Done(trade))
        })?;

        tracing::info!(
            trade_id = %trade.id,
            initiator = %trade.initiator_team_id,
            partner = %trade.partner_team_id,
            expires_at = %trade.expires_at,
            "trade proposed"
        );
        Ok(trade)
    }

    /// Partner accepts. Without league review the rosters are swapped in the
    /// same transaction; otherwise the review window starts now.
    pub fn accept_trade(&self, trade_id: &str, user_id: &str) -> Result<Trade, TradeError> {
        let now = self.clock.now();

        let trade = self.commit(|tx| {
            let mut trade = tx.trade(trade_id)?;
            require_owner(
                tx,
                &trade.partner_team_id,
                user_id,
                AuthorizationError::NotPartner {
                    user_id: user_id.to_string(),
                    trade_id: trade.id.clone(),
                },
            )?;

            if trade.is_overdue_at(&now) {
                expire_in(tx, &mut trade, user_id, &now)?;
                return Ok(Committed::Failed(
                    StateConflictError::Expired {
                        trade_id: trade.id.clone(),
                    }
                    .into(),
                ));
            }

            guard(trade.advance(TradeAction::Accept, user_id, &now, WitnessType::Accepted))?;
            trade.responded_at = Some(now.clone());

            let policy = tx.policy(&trade.league_id)?;
            if policy.voting_enabled() {
                let ends = guard(days_after(
                    &now,
                    policy.trade_review_days,
                    &trade.league_id,
                    "trade_review_days",
                ))?;
                trade.review_ends_at = Some(ends.clone());
                tx.put_trade(&trade)?;
                tx.notify(Notification::to_parties(
                    NotificationKind::Accepted,
                    &trade,
                    format!("trade accepted, league review open until {ends}"),
                ))?;
                return Ok(Committed::Done(trade));
            }

            trade.review_ends_at = None;
            let cause = ExecutionCause::Accepted {
                actor: user_id.to_string(),
            };
            match execute_in(tx, &mut trade, cause, &now)? {
                Execution::Completed => Ok(Committed::Done(trade)),
                Execution::Refused(err) => Ok(Committed::Failed(err.into())),
            }
        })?;

        tracing::info!(trade_id = %trade.id, status = ?trade.status, "trade accepted");
        Ok(trade)
    }

    pub fn reject_trade(
        &self,
        trade_id: &str,
        user_id: &str,
        reason: Option<&str>,
    ) -> Result<Trade, TradeError> {
        let now = self.clock.now();

        let trade = self.commit(|tx| {
            let mut trade = tx.trade(trade_id)?;
            require_owner(
                tx,
                &trade.partner_team_id,
                user_id,
                AuthorizationError::NotPartner {
                    user_id: user_id.to_string(),
                    trade_id: trade.id.clone(),
                },
            )?;
            guard(trade.advance(
                TradeAction::Reject,
                user_id,
                &now,
                WitnessType::Rejected {
                    reason: reason.map(str::to_string),
                },
            ))?;
            trade.responded_at = Some(now.clone());
            tx.put_trade(&trade)?;
            tx.notify(Notification::to_team(
                NotificationKind::Rejected,
                &trade,
                &trade.initiator_team_id,
                match reason {
                    Some(reason) => format!("trade rejected: {reason}"),
                    None => "trade rejected".to_string(),
                },
            ))?;
            Ok(Committed::Done(trade))
        })?;

        tracing::info!(trade_id = %trade.id, "trade rejected");
        Ok(trade)
    }

    /// Initiator withdraws a trade that has not been executed yet.
    pub fn cancel_trade(&self, trade_id: &str, user_id: &str) -> Result<Trade, TradeError> {
        let now = self.clock.now();

        let trade = self.commit(|tx| {
            let mut trade = tx.trade(trade_id)?;
            if trade.initiator_user_id != user_id {
                return abort(AuthorizationError::NotInitiator {
                    user_id: user_id.to_string(),
                    trade_id: trade.id.clone(),
                });
            }
            guard(trade.advance(TradeAction::Cancel, user_id, &now, WitnessType::Cancelled))?;
            tx.put_trade(&trade)?;
            tx.notify(Notification::to_team(
                NotificationKind::Cancelled,
                &trade,
                &trade.partner_team_id,
                "trade cancelled by the proposing team",
            ))?;
            Ok(Committed::Done(trade))
        })?;

        tracing::info!(trade_id = %trade.id, "trade cancelled");
        Ok(trade)
    }

    /// Re-run the executor on an ACCEPTED trade outside its review window,
    /// typically after an execution integrity failure was resolved.
    pub fn retry_execution(&self, trade_id: &str, user_id: &str) -> Result<Trade, TradeError> {
        let now = self.clock.now();

        let trade = self.commit(|tx| {
            let mut trade = tx.trade(trade_id)?;
            if !is_party(tx, &trade, user_id)? {
                return abort(AuthorizationError::NotParty {
                    user_id: user_id.to_string(),
                    trade_id: trade.id.clone(),
                });
            }
            if trade.review_open_at(&now) {
                return abort(StateConflictError::ReviewOpen {
                    trade_id: trade.id.clone(),
                });
            }
            let cause = ExecutionCause::Retry {
                actor: user_id.to_string(),
            };
            match execute_in(tx, &mut trade, cause, &now)? {
                Execution::Completed => Ok(Committed::Done(trade)),
                Execution::Refused(err) => Ok(Committed::Failed(err.into())),
            }
        })?;

        tracing::info!(trade_id = %trade.id, "trade executed on retry");
        Ok(trade)
    }

    pub fn get_trade(&self, trade_id: &str) -> Result<Trade, TradeError> {
        self.stores.get_trade(trade_id)
    }

    /// Every trade the team is party to, oldest first.
    pub fn trades_for_team(&self, team_id: &str) -> Result<Vec<Trade>, TradeError> {
        let mut trades = self
            .stores
            .scan_trades()
            .filter(|res| res.as_ref().map_or(true, |t| t.involves_team(team_id)))
            .collect::<Result<Vec<_>, _>>()?;
        trades.sort_by(|a, b| a.proposed_at.cmp(&b.proposed_at));
        Ok(trades)
    }

    pub fn open_trades_for_team(&self, team_id: &str) -> Result<Vec<Trade>, TradeError> {
        let mut trades = self.trades_for_team(team_id)?;
        trades.retain(|t| !t.is_terminal());
        Ok(trades)
    }

    /// The negotiation `trade_id` belongs to, from the first proposal to the
    /// latest counter-offer.
    pub fn counter_chain(&self, trade_id: &str) -> Result<Vec<Trade>, TradeError> {
        let mut seen = HashSet::new();
        let mut root = self.get_trade(trade_id)?;
        seen.insert(root.id.clone());
        while let Some(parent_id) = root.parent_trade_id.clone() {
            if !seen.insert(parent_id.clone()) {
                break;
            }
            root = self.get_trade(&parent_id)?;
        }

        let mut seen = HashSet::new();
        seen.insert(root.id.clone());
        let mut chain = vec![root];
        while let Some(next_id) = chain.last().and_then(|t| t.counter_trade_id.clone()) {
            if !seen.insert(next_id.clone()) {
                break;
            }
            chain.push(self.get_trade(&next_id)?);
        }
        Ok(chain)
    }
}
