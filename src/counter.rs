use super::error::{AuthorizationError, StateConflictError, TradeError};
use super::history::WitnessType;
use super::outbox::{Notification, NotificationKind};
use super::service::{Committed, TradeService, expire_in, require_owner};
use super::state::TradeAction;
use super::store::guard;
use super::trade::{Asset, AssetSet, Trade};
use super::validator::{TradeProposal, check_expiration, new_trade_id, validate_in};

/// The partner's answer to a proposal, from the partner's point of view:
/// `give` leaves the partner, `receive` comes from the original initiator.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CounterOffer {
    pub give: AssetSet,
    pub receive: AssetSet,
    pub expiration_days: Option<u32>,
    pub note: Option<String>,
}

impl CounterOffer {
    pub fn new() -> Self {
        Self::default()
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

impl TradeService {
    /// Close `trade_id` as COUNTERED and open a linked proposal in the other
    /// direction. The new trade gets no exemption from proposal checks; if it
    /// fails them the original stays PROPOSED.
    ///
    /// Returns `(original, counter)`.
    pub fn counter_trade(
        &self,
        trade_id: &str,
        user_id: &str,
        offer: CounterOffer,
    ) -> Result<(Trade, Trade), TradeError> {
        let days = check_expiration(offer.expiration_days, &self.config.trade)?;
        let counter_id = new_trade_id()?;
        let now = self.clock.now();

        let (original, counter) = self.commit(|tx| {
            let mut original = tx.trade(trade_id)?;
            require_owner(
                tx,
                &original.partner_team_id,
                user_id,
                AuthorizationError::NotPartner {
                    user_id: user_id.to_string(),
                    trade_id: original.id.clone(),
                },
            )?;

            if original.is_overdue_at(&now) {
                expire_in(tx, &mut original, user_id, &now)?;
                return Ok(Committed::Failed(
                    StateConflictError::Expired {
                        trade_id: original.id.clone(),
                    }
                    .into(),
                ));
            }

            // Guard the parent first so a stale parent reports a conflict,
            // not a validation error on the child.
            guard(original.status.apply(&original.id, TradeAction::Counter))?;

            let proposal = TradeProposal {
                initiator_user_id: user_id.to_string(),
                initiator_team_id: original.partner_team_id.clone(),
                partner_team_id: original.initiator_team_id.clone(),
                give: offer.give.clone(),
                receive: offer.receive.clone(),
                expiration_days: Some(days),
                note: offer.note.clone(),
            };
            let counter = validate_in(tx, &counter_id, &proposal, days, Some(&original.id), &now)?;

            guard(original.advance(
                TradeAction::Counter,
                user_id,
                &now,
                WitnessType::Countered {
                    counter_trade_id: counter.id.clone(),
                },
            ))?;
            original.counter_trade_id = Some(counter.id.clone());
            original.responded_at = Some(now.clone());

            tx.put_trade(&original)?;
            tx.put_trade(&counter)?;
            tx.notify(Notification::to_team(
                NotificationKind::Countered,
                &original,
                &original.initiator_team_id,
                format!("team {} countered with trade {}", counter.initiator_team_id, counter.id),
            ))?;
            Ok(Committed::Done((original, counter)))
        })?;

        tracing::info!(
            trade_id = %original.id,
            counter_trade_id = %counter.id,
            "trade countered"
        );
        Ok((original, counter))
    }
}
