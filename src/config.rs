use std::time::Duration;

use thiserror::Error;

use crate::blockchain::MiningLimits;

/// Errors raised while reading configuration
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Invalid value for {key}: {value:?}")]
    InvalidValue { key: &'static str, value: String },
}

/// Runtime configuration read from the environment
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppConfig {
    pub host: String,
    pub port: u16,
    /// Leading zero hex characters required of mined blocks
    pub difficulty: u32,
    pub mining: MiningLimits,
}

impl Default for AppConfig {
    fn default() -> Self {
        AppConfig {
            host: "127.0.0.1".to_string(),
            port: 8080,
            difficulty: 4,
            mining: MiningLimits::default(),
        }
    }
}

impl AppConfig {
    /// Loads `.env` if present, then reads the process environment
    pub fn from_env() -> Result<Self, ConfigError> {
        let _ = dotenvy::dotenv();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds a config from any key lookup; unset keys keep their defaults
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = AppConfig::default();

        let host = lookup("HOST").unwrap_or(defaults.host);
        let port = parse(&lookup, "PORT")?.unwrap_or(defaults.port);
        let difficulty = parse(&lookup, "DIFFICULTY")?.unwrap_or(defaults.difficulty);
        let max_attempts = parse(&lookup, "MINE_MAX_ATTEMPTS")?;
        let timeout = parse::<u64, _>(&lookup, "MINE_TIMEOUT_SECS")?.map(Duration::from_secs);

        Ok(AppConfig {
            host,
            port,
            difficulty,
            mining: MiningLimits {
                max_attempts,
                timeout,
            },
        })
    }
}

fn parse<T, F>(lookup: &F, key: &'static str) -> Result<Option<T>, ConfigError>
where
    T: std::str::FromStr,
    F: Fn(&str) -> Option<String>,
{
    match lookup(key) {
        None => Ok(None),
        Some(value) => value
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| ConfigError::InvalidValue { key, value }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = AppConfig::from_lookup(lookup_from(&[])).unwrap();
        assert_eq!(config, AppConfig::default());
        assert_eq!(config.difficulty, 4);
        assert_eq!(config.mining.max_attempts, None);
    }

    #[test]
    fn test_overrides() {
        let config = AppConfig::from_lookup(lookup_from(&[
            ("HOST", "0.0.0.0"),
            ("PORT", "5000"),
            ("DIFFICULTY", "2"),
            ("MINE_MAX_ATTEMPTS", "1000"),
            ("MINE_TIMEOUT_SECS", " 30 "),
        ]))
        .unwrap();

        assert_eq!(config.host, "0.0.0.0");
        assert_eq!(config.port, 5000);
        assert_eq!(config.difficulty, 2);
        assert_eq!(config.mining.max_attempts, Some(1000));
        assert_eq!(config.mining.timeout, Some(Duration::from_secs(30)));
    }

    #[test]
    fn test_invalid_value() {
        let err = AppConfig::from_lookup(lookup_from(&[("PORT", "eighty")])).unwrap_err();
        assert_eq!(
            err,
            ConfigError::InvalidValue {
                key: "PORT",
                value: "eighty".to_string(),
            }
        );
    }
}
