use std::{path::Path, str::FromStr, time::Duration};

use serde::{Deserialize, Serialize};

use crate::tournaments::config::{
    CourtroomPolicy, PairingPolicy, PublishPolicy,
};

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    pub database_url: String,
    pub pool_size: u32,
    /// How long to wait for a pooled connection, and for SQLite to release
    /// a lock, before reporting the store as unavailable.
    pub store_timeout_ms: u64,
    pub log_level: String,
    pub pairing: PairingPolicy,
    pub publishing: PublishPolicy,
    pub courtrooms: CourtroomPolicy,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database_url: ":memory:".to_string(),
            pool_size: 10,
            store_timeout_ms: 5_000,
            log_level: "info".to_string(),
            pairing: PairingPolicy::default(),
            publishing: PublishPolicy::default(),
            courtrooms: CourtroomPolicy::default(),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("could not read {path}: {source}")]
    Read {
        path: String,
        source: std::io::Error,
    },
    #[error("invalid configuration file: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("invalid configuration for {key}: {reason}")]
    Invalid { key: String, reason: String },
}

impl Config {
    /// Loads the configuration from the given TOML file (or the defaults),
    /// then applies `DATABASE_URL` from the environment.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let config = match path {
            Some(path) => {
                let text = std::fs::read_to_string(path).map_err(|source| {
                    ConfigError::Read {
                        path: path.display().to_string(),
                        source,
                    }
                })?;
                Self::from_toml_str(&text)?
            }
            None => Self::default(),
        };

        config.with_env_overrides().validated()
    }

    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(text)?)
    }

    fn with_env_overrides(mut self) -> Self {
        if let Ok(url) = std::env::var("DATABASE_URL") {
            self.database_url = url;
        }
        self
    }

    fn validated(self) -> Result<Self, ConfigError> {
        if self.pool_size == 0 {
            return Err(ConfigError::Invalid {
                key: "pool_size".to_string(),
                reason: "must be at least 1".to_string(),
            });
        }
        if self.store_timeout_ms == 0 {
            return Err(ConfigError::Invalid {
                key: "store_timeout_ms".to_string(),
                reason: "must be at least 1".to_string(),
            });
        }
        self.log_level()?;
        Ok(self)
    }

    pub fn store_timeout(&self) -> Duration {
        Duration::from_millis(self.store_timeout_ms)
    }

    pub fn log_level(&self) -> Result<tracing::Level, ConfigError> {
        tracing::Level::from_str(&self.log_level).map_err(|_| {
            ConfigError::Invalid {
                key: "log_level".to_string(),
                reason: format!("unknown level `{}`", self.log_level),
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tournaments::config::{ByePolicy, Locality};

    #[test]
    fn defaults_apply_to_missing_keys() {
        let config = Config::from_toml_str(
            r#"
            pool_size = 4

            [pairing]
            bye = "lowest_ranked"

            [courtrooms]
            locality = "school_district"
            "#,
        )
        .unwrap();

        assert_eq!(config.pool_size, 4);
        assert_eq!(config.database_url, ":memory:");
        assert_eq!(config.pairing.bye, ByePolicy::LowestRanked);
        assert_eq!(config.courtrooms.locality, Locality::SchoolDistrict);
        assert!(!config.publishing.require_courtrooms);
    }

    #[test]
    fn unknown_keys_are_rejected() {
        assert!(Config::from_toml_str("pool_sise = 4").is_err());
    }

    #[test]
    fn invalid_values_are_rejected() {
        let config = Config {
            log_level: "loud".to_string(),
            ..Config::default()
        };
        assert!(matches!(
            config.validated(),
            Err(ConfigError::Invalid { key, .. }) if key == "log_level"
        ));

        let config = Config {
            pool_size: 0,
            ..Config::default()
        };
        assert!(config.validated().is_err());
    }
}
