//! Engine configuration, loaded from TOML. Every section has defaults so an
//! empty file is a valid configuration.
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("invalid config: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub trade: TradeSection,
    pub sweeper: SweeperSection,
    pub outbox: OutboxSection,
    pub storage: StorageSection,
    pub logging: LoggingSection,
}

/// Upper bound for `trade.max_expiration_days`.
pub const MAX_EXPIRATION_DAYS: u32 = 365;

/// Proposal limits
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TradeSection {
    pub min_expiration_days: u32,
    pub max_expiration_days: u32,
    /// Used when a proposal does not name an expiration
    pub default_expiration_days: u32,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SweeperSection {
    /// Trades handled before checking for a stop request
    pub batch_size: usize,
    pub interval_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct OutboxSection {
    /// Notifications delivered per drain
    pub batch_size: usize,
    /// Delivery attempts before a notification is dropped
    pub max_attempts: u32,
    /// Deliver from a dedicated thread instead of after each commit
    pub background: bool,
    /// How often the dispatcher thread retries without being woken
    pub poll_interval_ms: u64,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StorageSection {
    pub path: PathBuf,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingSection {
    /// "trace", "debug", "info", "warn" or "error"; RUST_LOG wins when set
    pub level: String,
}

impl Default for TradeSection {
    fn default() -> Self {
        Self {
            min_expiration_days: 1,
            max_expiration_days: 7,
            default_expiration_days: 7,
        }
    }
}

impl Default for SweeperSection {
    fn default() -> Self {
        Self {
            batch_size: 100,
            interval_secs: 60,
        }
    }
}

impl Default for OutboxSection {
    fn default() -> Self {
        Self {
            batch_size: 256,
            max_attempts: 5,
            background: true,
            poll_interval_ms: 500,
        }
    }
}

impl Default for StorageSection {
    fn default() -> Self {
        Self {
            path: PathBuf::from("league-trades.db"),
        }
    }
}

impl Default for LoggingSection {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

impl EngineConfig {
    pub fn from_toml_str(contents: &str) -> Result<Self, ConfigError> {
        let config: EngineConfig = toml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let trade = &self.trade;
        if trade.min_expiration_days == 0 {
            return Err(ConfigError::Invalid(
                "trade.min_expiration_days must be at least 1".into(),
            ));
        }
        if trade.min_expiration_days > trade.max_expiration_days {
            return Err(ConfigError::Invalid(format!(
                "trade.min_expiration_days ({}) exceeds trade.max_expiration_days ({})",
                trade.min_expiration_days, trade.max_expiration_days
            )));
        }
        if trade.max_expiration_days > MAX_EXPIRATION_DAYS {
            return Err(ConfigError::Invalid(format!(
                "trade.max_expiration_days ({}) exceeds {MAX_EXPIRATION_DAYS}",
                trade.max_expiration_days
            )));
        }
        if !(trade.min_expiration_days..=trade.max_expiration_days)
            .contains(&trade.default_expiration_days)
        {
            return Err(ConfigError::Invalid(format!(
                "trade.default_expiration_days ({}) is outside {}..={}",
                trade.default_expiration_days, trade.min_expiration_days, trade.max_expiration_days
            )));
        }
        if self.sweeper.batch_size == 0 || self.outbox.batch_size == 0 {
            return Err(ConfigError::Invalid("batch sizes must be non-zero".into()));
        }
        if self.outbox.max_attempts == 0 {
            return Err(ConfigError::Invalid(
                "outbox.max_attempts must be at least 1".into(),
            ));
        }
        Ok(())
    }

    pub fn open_db(&self) -> anyhow::Result<Arc<sled::Db>> {
        let db = sled::open(&self.storage.path)?;
        Ok(Arc::new(db))
    }
}

pub fn load_config(path: impl AsRef<Path>) -> Result<EngineConfig, ConfigError> {
    let path = path.as_ref();
    let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    EngineConfig::from_toml_str(&contents)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_file_uses_defaults() {
        let config = EngineConfig::from_toml_str("").unwrap();

        assert_eq!(config.trade.min_expiration_days, 1);
        assert_eq!(config.trade.max_expiration_days, 7);
        assert_eq!(config.sweeper.batch_size, 100);
        assert_eq!(config.outbox.max_attempts, 5);
        assert!(config.outbox.background);
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn sections_override_defaults() {
        let config = EngineConfig::from_toml_str(
            r#"
            [trade]
            max_expiration_days = 5
            default_expiration_days = 3

            [sweeper]
            batch_size = 10

            [storage]
            path = "/var/lib/trades"
            "#,
        )
        .unwrap();

        assert_eq!(config.trade.max_expiration_days, 5);
        assert_eq!(config.trade.default_expiration_days, 3);
        assert_eq!(config.sweeper.batch_size, 10);
        assert_eq!(config.sweeper.interval_secs, 60);
        assert_eq!(config.storage.path, PathBuf::from("/var/lib/trades"));
    }

    #[test]
    fn inverted_expiration_bounds_are_rejected() {
        let err = EngineConfig::from_toml_str(
            r#"
            [trade]
            min_expiration_days = 5
            max_expiration_days = 2
            default_expiration_days = 2
            "#,
        )
        .unwrap_err();

        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn expiration_ceiling_is_enforced() {
        let err = EngineConfig::from_toml_str(
            r#"
            [trade]
            max_expiration_days = 4294967295
            "#,
        )
        .unwrap_err();

        assert!(matches!(err, ConfigError::Invalid(msg) if msg.contains("max_expiration_days")));
    }

    #[test]
    fn malformed_toml_is_a_parse_error() {
        let err = EngineConfig::from_toml_str("[trade\nmin = ").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn missing_file_is_io_error() {
        let err = load_config("/definitely/not/here.toml").unwrap_err();
        assert!(matches!(err, ConfigError::Io { .. }));
    }
}
