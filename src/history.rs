use super::commissioner::OverrideAction;
use super::error::TradeError;
use super::trade::{TimeStamp, Trade};
use chrono::Utc;

// One entry in a trade's audit trail. Entries are chained by hashing the
// CBOR of the previous witness.
#[derive(Debug, PartialEq, Eq, minicbor::Encode, minicbor::Decode, Clone)]
pub struct Witness {
    #[n(0)]
    pub actor: String, // user id, or "sweeper"
    #[n(1)]
    pub at: TimeStamp<Utc>,
    #[n(2)]
    pub kind: WitnessType,
    #[n(3)]
    pub prev_hash: Option<String>,
}

#[derive(Debug, PartialEq, Eq, minicbor::Encode, minicbor::Decode, Clone)]
pub enum WitnessType {
    #[n(0)]
    Proposed {
        #[n(0)]
        parent_trade_id: Option<String>,
    },
    #[n(1)]
    Accepted,
    #[n(2)]
    Rejected {
        #[n(0)]
        reason: Option<String>,
    },
    #[n(3)]
    Countered {
        #[n(0)]
        counter_trade_id: String,
    },
    #[n(4)]
    Cancelled,
    #[n(5)]
    Expired,
    #[n(6)]
    Vetoed {
        #[n(0)]
        veto_votes: u32,
    },
    #[n(7)]
    Executed,
    #[n(8)]
    ExecutionFailed {
        #[n(0)]
        reason: String,
    },
    #[n(9)]
    Overridden {
        #[n(0)]
        action: OverrideAction,
        #[n(1)]
        reason: String,
    },
}

impl Witness {
    pub fn new(
        actor: String,
        at: TimeStamp<Utc>,
        kind: WitnessType,
        prev_hash: Option<String>,
    ) -> Self {
        Self {
            actor,
            at,
            kind,
            prev_hash,
        }
    }

    pub fn digest(&self) -> Result<String, TradeError> {
        let cbor = minicbor::to_vec(self).map_err(|e| TradeError::Codec(e.to_string()))?;
        Ok(sha256::digest(&cbor))
    }
}

impl Trade {
    /// Recomputes the witness chain. False if any entry was altered or dropped.
    pub fn verify_history(&self) -> Result<bool, TradeError> {
        let mut expected: Option<String> = None;
        for witness in &self.history {
            if witness.prev_hash != expected {
                return Ok(false);
            }
            expected = Some(witness.digest()?);
        }
        Ok(true)
    }

    pub fn view_history(&self) {
        for (step, witness) in self.history.iter().enumerate() {
            tracing::info!(
                trade_id = %self.id,
                step,
                actor = %witness.actor,
                at = %witness.at,
                kind = ?witness.kind,
                "trade history"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_trade() -> Trade {
        let now = TimeStamp::new_with(2026, 9, 1, 0, 0, 0).unwrap();
        let mut trade = Trade {
            id: "trade_test".into(),
            league_id: "league".into(),
            season: 2026,
            initiator_team_id: "t1".into(),
            partner_team_id: "t2".into(),
            initiator_user_id: "u1".into(),
            give: Default::default(),
            receive: Default::default(),
            status: crate::state::TradeStatus::Proposed,
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
        };
        trade
            .record("u1", &now, WitnessType::Proposed { parent_trade_id: None })
            .unwrap();
        trade.record("u2", &now.add_days(1).unwrap(), WitnessType::Accepted).unwrap();
        trade.record("sweeper", &now.add_days(3).unwrap(), WitnessType::Executed).unwrap();
        trade
    }

    #[test]
    fn chain_links_to_previous_entry() {
        let trade = sample_trade();

        assert_eq!(trade.history[0].prev_hash, None);
        assert_eq!(
            trade.history[1].prev_hash,
            Some(trade.history[0].digest().unwrap())
        );
        assert!(trade.verify_history().unwrap());
    }

    #[test]
    fn tampering_breaks_chain() {
        let mut trade = sample_trade();
        trade.history[1].actor = "someone_else".into();

        assert!(!trade.verify_history().unwrap());
    }

    #[test]
    fn dropped_entry_breaks_chain() {
        let mut trade = sample_trade();
        trade.history.remove(1);

        assert!(!trade.verify_history().unwrap());
    }
}
