// Service configuration, read from the environment (and `.env` if present)

use rust_decimal::Decimal;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

use crate::market_resolve::{MarketPolicy, DEFAULT_MAX_COMBINATIONS};

pub const DEFAULT_BIND_ADDR: &str = "0.0.0.0:1234";
pub const DEFAULT_DATA_DIR: &str = "data/markets";
pub const DEFAULT_FAUCET_AMOUNT: u64 = 100;
pub const DEFAULT_CONFIRMATION_TIMEOUT_MS: u64 = 10_000;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("{name} has an invalid value {value:?}: {reason}")]
    Invalid {
        name: &'static str,
        value: String,
        reason: String,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct MarketConfig {
    /// HTTP listen address
    pub bind_addr: SocketAddr,
    /// sled directory; `None` keeps everything in memory
    pub data_dir: Option<PathBuf>,
    pub policy: MarketPolicy,
    /// Credited once to every newly connected wallet
    pub faucet_amount: Decimal,
    /// Upper bound for confirmation waits
    pub confirmation_timeout: Duration,
}

impl Default for MarketConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([0, 0, 0, 0], 1234)),
            data_dir: Some(PathBuf::from(DEFAULT_DATA_DIR)),
            policy: MarketPolicy::default(),
            faucet_amount: Decimal::from(DEFAULT_FAUCET_AMOUNT),
            confirmation_timeout: Duration::from_millis(DEFAULT_CONFIRMATION_TIMEOUT_MS),
        }
    }
}

impl MarketConfig {
    /// In-memory configuration for tests and embedding
    pub fn in_memory(policy: MarketPolicy) -> Self {
        Self {
            data_dir: None,
            policy,
            ..Self::default()
        }
    }

    pub fn from_env() -> Result<Self, ConfigError> {
        dotenv::dotenv().ok();
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Build from any variable source. Unset variables take their defaults.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let bind_addr = parse_var(&lookup, "PM_BIND_ADDR", DEFAULT_BIND_ADDR)?;

        let data_dir = match lookup("PM_DATA_DIR") {
            Some(dir) if dir.eq_ignore_ascii_case("none") => None,
            Some(dir) if !dir.trim().is_empty() => Some(PathBuf::from(dir)),
            _ => Some(PathBuf::from(DEFAULT_DATA_DIR)),
        };

        let max_combinations: usize = parse_var(
            &lookup,
            "PM_MAX_COMBINATIONS",
            &DEFAULT_MAX_COMBINATIONS.to_string(),
        )?;
        if max_combinations == 0 {
            return Err(invalid("PM_MAX_COMBINATIONS", "0", "must be at least 1"));
        }

        let faucet_amount: Decimal =
            parse_var(&lookup, "PM_FAUCET_AMOUNT", &DEFAULT_FAUCET_AMOUNT.to_string())?;
        if faucet_amount < Decimal::ZERO {
            return Err(invalid(
                "PM_FAUCET_AMOUNT",
                &faucet_amount.to_string(),
                "must not be negative",
            ));
        }

        let timeout_ms: u64 = parse_var(
            &lookup,
            "PM_CONFIRMATION_TIMEOUT_MS",
            &DEFAULT_CONFIRMATION_TIMEOUT_MS.to_string(),
        )?;

        Ok(Self {
            bind_addr,
            data_dir,
            policy: MarketPolicy { max_combinations },
            faucet_amount,
            confirmation_timeout: Duration::from_millis(timeout_ms),
        })
    }
}

fn parse_var<F, T>(lookup: &F, name: &'static str, default: &str) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
    T::Err: std::fmt::Display,
{
    let raw = lookup(name).unwrap_or_else(|| default.to_string());
    raw.trim()
        .parse()
        .map_err(|e: T::Err| invalid(name, &raw, &e.to_string()))
}

fn invalid(name: &'static str, value: &str, reason: &str) -> ConfigError {
    ConfigError::Invalid {
        name,
        value: value.to_string(),
        reason: reason.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| vars.get(name).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = MarketConfig::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config, MarketConfig::default());
        assert_eq!(config.policy.max_combinations, 16);
    }

    #[test]
    fn test_overrides() {
        let config = MarketConfig::from_lookup(lookup(&[
            ("PM_BIND_ADDR", "127.0.0.1:8080"),
            ("PM_DATA_DIR", "none"),
            ("PM_MAX_COMBINATIONS", "32"),
            ("PM_FAUCET_AMOUNT", "2.5"),
            ("PM_CONFIRMATION_TIMEOUT_MS", "250"),
        ]))
        .unwrap();
        assert_eq!(config.bind_addr.port(), 8080);
        assert_eq!(config.data_dir, None);
        assert_eq!(config.policy.max_combinations, 32);
        assert_eq!(config.faucet_amount, Decimal::new(25, 1));
        assert_eq!(config.confirmation_timeout, Duration::from_millis(250));
    }

    #[test]
    fn test_rejects_bad_values() {
        let err = MarketConfig::from_lookup(lookup(&[("PM_MAX_COMBINATIONS", "lots")])).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { name: "PM_MAX_COMBINATIONS", .. }));
        assert!(MarketConfig::from_lookup(lookup(&[("PM_MAX_COMBINATIONS", "0")])).is_err());
        assert!(MarketConfig::from_lookup(lookup(&[("PM_FAUCET_AMOUNT", "-1")])).is_err());
        assert!(MarketConfig::from_lookup(lookup(&[("PM_BIND_ADDR", "nowhere")])).is_err());
    }
}
