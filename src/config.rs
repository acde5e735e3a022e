//! Service configuration, read from the environment (after `.env` is loaded).

use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

use crate::domain::value_objects::CurrencyCode;
use crate::services::CheckoutSettings;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{0} must be set")]
    Missing(&'static str),
    #[error("{key} has invalid value {value:?}: {reason}")]
    Invalid { key: &'static str, value: String, reason: String },
}

#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub port: u16,
    pub db_max_connections: u32,
    pub checkout_timeout: Duration,
    pub lock_timeout: Duration,
    pub default_currency: CurrencyCode,
    pub nats_url: Option<String>,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> { Self::from_lookup(|key| std::env::var(key).ok()) }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let database_url = lookup("DATABASE_URL").filter(|v| !v.is_empty()).ok_or(ConfigError::Missing("DATABASE_URL"))?;
        let checkout_ms: u64 = parse_or(&lookup, "CHECKOUT_TIMEOUT_MS", 5_000)?;
        let lock_ms: u64 = parse_or(&lookup, "LOCK_TIMEOUT_MS", 2_000)?;
        if lock_ms == 0 || checkout_ms == 0 {
            return Err(ConfigError::Invalid {
                key: if lock_ms == 0 { "LOCK_TIMEOUT_MS" } else { "CHECKOUT_TIMEOUT_MS" },
                value: "0".into(),
                reason: "timeouts must be positive".into(),
            });
        }
        let default_currency = match lookup("DEFAULT_CURRENCY") {
            Some(raw) => CurrencyCode::new(&raw).map_err(|e| ConfigError::Invalid { key: "DEFAULT_CURRENCY", value: raw, reason: e.to_string() })?,
            None => CurrencyCode::usd(),
        };

        Ok(Self {
            database_url,
            port: parse_or(&lookup, "PORT", 8083)?,
            db_max_connections: parse_or(&lookup, "DB_MAX_CONNECTIONS", 10)?,
            checkout_timeout: Duration::from_millis(checkout_ms),
            lock_timeout: Duration::from_millis(lock_ms),
            default_currency,
            nats_url: lookup("NATS_URL").filter(|v| !v.is_empty()),
        })
    }

    pub fn checkout_settings(&self) -> CheckoutSettings {
        CheckoutSettings { checkout_timeout: self.checkout_timeout, lock_timeout: self.lock_timeout, default_currency: self.default_currency.clone() }
    }
}

fn parse_or<T>(lookup: &impl Fn(&str) -> Option<String>, key: &'static str, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match lookup(key) {
        Some(raw) => raw.trim().parse().map_err(|e: T::Err| ConfigError::Invalid { key, value: raw.clone(), reason: e.to_string() }),
        None => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config(vars: &[(&str, &str)]) -> Result<Config, ConfigError> {
        let vars: HashMap<String, String> = vars.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        Config::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn test_defaults() {
        let cfg = config(&[("DATABASE_URL", "postgres://localhost/shop")]).unwrap();
        assert_eq!(cfg.port, 8083);
        assert_eq!(cfg.db_max_connections, 10);
        assert_eq!(cfg.checkout_timeout, Duration::from_millis(5_000));
        assert_eq!(cfg.lock_timeout, Duration::from_millis(2_000));
        assert_eq!(cfg.default_currency.as_str(), "USD");
        assert!(cfg.nats_url.is_none());
    }

    #[test]
    fn test_database_url_required() {
        assert!(matches!(config(&[]), Err(ConfigError::Missing("DATABASE_URL"))));
    }

    #[test]
    fn test_invalid_values_rejected() {
        let err = config(&[("DATABASE_URL", "postgres://x"), ("PORT", "eighty")]).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { key: "PORT", .. }));
        let err = config(&[("DATABASE_URL", "postgres://x"), ("DEFAULT_CURRENCY", "EURO")]).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { key: "DEFAULT_CURRENCY", .. }));
        let err = config(&[("DATABASE_URL", "postgres://x"), ("LOCK_TIMEOUT_MS", "0")]).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { key: "LOCK_TIMEOUT_MS", .. }));
    }
}
