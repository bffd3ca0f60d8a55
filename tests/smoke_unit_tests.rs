//! Smoke unit tests for the engine's building blocks
//!
//! Happy-path checks that span the public API without going through a full
//! trade workflow.

use chrono::{Datelike, Timelike, Utc};
use league_trades::{
    Asset, Clock, EngineConfig, ManualClock, Notification, NotificationKind, Roster, RosterSlot,
    TimeStamp,
    config::ConfigError,
    load_config,
    utils::{TRADE_ID_PREFIX, id_prefix, new_trade_id, new_uuid_to_bech32},
};

// UTILS MODULE TESTS
#[cfg(test)]
mod utils_tests {
    use super::*;

    /// Trade ids are bech32m strings under the trade prefix
    #[test]
    fn trade_ids_carry_the_prefix() {
        let id = new_trade_id().unwrap();
        assert!(id.starts_with("trade_1"));
        assert_eq!(id_prefix(&id).unwrap(), TRADE_ID_PREFIX);
    }

    #[test]
    fn handles_empty_hrp() {
        assert!(new_uuid_to_bech32("").is_err());
    }

    #[test]
    fn generates_unique_ids() {
        let id1 = new_trade_id().unwrap();
        let id2 = new_trade_id().unwrap();
        let id3 = new_trade_id().unwrap();

        assert_ne!(id1, id2);
        assert_ne!(id2, id3);
        assert_ne!(id1, id3);
    }

    /// A corrupted character fails the checksum
    #[test]
    fn rejects_tampered_ids() {
        let id = new_trade_id().unwrap();
        let mut chars: Vec<char> = id.chars().collect();
        let last = chars.len() - 1;
        chars[last] = if chars[last] == 'q' { 'p' } else { 'q' };
        let tampered: String = chars.into_iter().collect();

        assert!(id_prefix(&tampered).is_err());
    }
}

// TRADE MODULE TESTS
#[cfg(test)]
mod trade_tests {
    use super::*;

    #[test]
    fn timestamp_new_creates_current_time() {
        let ts = TimeStamp::new();
        let diff = (Utc::now() - ts.to_datetime_utc()).num_seconds().abs();
        assert!(diff < 1);
    }

    #[test]
    fn timestamp_new_with_creates_specific_time() {
        let dt = TimeStamp::new_with(2026, 11, 20, 18, 30, 0)
            .unwrap()
            .to_datetime_utc();

        assert_eq!(dt.year(), 2026);
        assert_eq!(dt.month(), 11);
        assert_eq!(dt.day(), 20);
        assert_eq!(dt.hour(), 18);
        assert_eq!(dt.minute(), 30);
    }

    #[test]
    fn timestamp_new_with_rejects_impossible_dates() {
        assert!(TimeStamp::new_with(2026, 2, 30, 0, 0, 0).is_none());
    }

    #[test]
    fn asset_display() {
        assert_eq!(Asset::player("P1").to_string(), "player P1");
        assert_eq!(
            Asset::pick(2, 2027, "T4").to_string(),
            "2027 round 2 pick (via T4)"
        );
    }
}

// LEAGUE MODULE TESTS
#[cfg(test)]
mod roster_tests {
    use super::*;

    #[test]
    fn collected_rosters_start_active() {
        let roster: Roster = [Asset::player("P1"), Asset::pick(1, 2027, "T1")]
            .into_iter()
            .collect();

        assert_eq!(roster.len(), 2);
        assert_eq!(
            roster.assignments.get(&Asset::player("P1")),
            Some(&RosterSlot::Active)
        );
    }

    #[test]
    fn remove_reports_previous_slot() {
        let mut roster = Roster::default();
        roster.insert(Asset::player("P1"), RosterSlot::InjuredReserve);

        assert_eq!(
            roster.remove(&Asset::player("P1")),
            Some(RosterSlot::InjuredReserve)
        );
        assert!(roster.is_empty());
    }
}

// CONFIG MODULE TESTS
#[cfg(test)]
mod config_tests {
    use super::*;

    #[test]
    fn loads_config_from_disk() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("engine.toml");
        std::fs::write(
            &path,
            "[sweeper]\ninterval_secs = 5\n\n[logging]\nlevel = \"debug\"\n",
        )?;

        let config = load_config(&path)?;
        assert_eq!(config.sweeper.interval_secs, 5);
        assert_eq!(config.logging.level, "debug");
        assert_eq!(config.trade.max_expiration_days, 7);
        Ok(())
    }

    #[test]
    fn zero_attempts_are_rejected() {
        let err = EngineConfig::from_toml_str("[outbox]\nmax_attempts = 0").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }
}

#[cfg(test)]
mod clock_tests {
    use super::*;

    #[test]
    fn manual_clock_is_shareable() {
        let clock: std::sync::Arc<dyn Clock> = std::sync::Arc::new(ManualClock::new(
            TimeStamp::new_with(2026, 9, 1, 0, 0, 0).unwrap(),
        ));
        let other = clock.clone();
        assert_eq!(clock.now(), other.now());
    }
}

#[cfg(test)]
mod notification_tests {
    use super::*;

    #[test]
    fn notifications_encode_as_cbor() {
        let notification = Notification {
            kind: NotificationKind::Vetoed,
            trade_id: "trade_x".into(),
            league_id: "L".into(),
            recipients: vec!["T1".into(), "T2".into()],
            message: "league vetoed the trade".into(),
        };
        let bytes = minicbor::to_vec(&notification).unwrap();
        let decoded: Notification = minicbor::decode(&bytes).unwrap();
        assert_eq!(decoded, notification);
    }
}
