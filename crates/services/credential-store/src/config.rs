//! Credential store configuration.

use std::env;
use std::str::FromStr;
use std::time::Duration;

use common::{ConfigError, DatabaseConfig, PoolConfig, StartupPolicy};

/// Credential store configuration.
#[derive(Debug, Clone)]
pub struct CredentialStoreConfig {
    /// Where the `users` table lives
    pub database: DatabaseConfig,
    /// Pool sizing, timeouts and startup retry
    pub pool: PoolConfig,
}

impl CredentialStoreConfig {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Load configuration from an arbitrary key lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let required = |key: &'static str| lookup(key).ok_or(ConfigError::Missing(key));

        let port = required("DATABASE_PORT")?;
        let database = DatabaseConfig {
            host: required("POSTGRES_HOST")?,
            port: parse("DATABASE_PORT", &port)?,
            database: required("POSTGRES_DB")?,
            user: required("POSTGRES_USER")?,
            password: required("POSTGRES_PASSWORD")?,
        };

        let defaults = PoolConfig::default();
        let pool = PoolConfig {
            max_connections: positive(
                "DATABASE_MAX_CONNECTIONS",
                optional(&lookup, "DATABASE_MAX_CONNECTIONS")?,
            )?
            .unwrap_or(defaults.max_connections),
            acquire_timeout: optional(&lookup, "DATABASE_ACQUIRE_TIMEOUT_SECS")?
                .map(Duration::from_secs)
                .unwrap_or(defaults.acquire_timeout),
            connect_timeout: optional(&lookup, "DATABASE_CONNECT_TIMEOUT_SECS")?
                .map(Duration::from_secs)
                .unwrap_or(defaults.connect_timeout),
            connect_attempts: positive(
                "DATABASE_CONNECT_ATTEMPTS",
                optional(&lookup, "DATABASE_CONNECT_ATTEMPTS")?,
            )?
            .unwrap_or(defaults.connect_attempts),
            retry_interval: optional(&lookup, "DATABASE_RETRY_INTERVAL_SECS")?
                .map(Duration::from_secs)
                .unwrap_or(defaults.retry_interval),
            startup_policy: match optional::<bool>(&lookup, "DATABASE_STARTUP_FATAL")? {
                Some(true) => StartupPolicy::Abort,
                _ => StartupPolicy::Proceed,
            },
        };

        Ok(Self { database, pool })
    }
}

fn parse<T>(key: &'static str, raw: &str) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    raw.trim()
        .parse()
        .map_err(|e: T::Err| ConfigError::invalid(key, raw, e.to_string()))
}

fn optional<T>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &'static str,
) -> Result<Option<T>, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    lookup(key).map(|raw| parse(key, &raw)).transpose()
}

fn positive<T>(key: &'static str, value: Option<T>) -> Result<Option<T>, ConfigError>
where
    T: Default + PartialEq + std::fmt::Display,
{
    match value {
        Some(v) if v == T::default() => Err(ConfigError::invalid(key, v.to_string(), "must be greater than zero")),
        other => Ok(other),
    }
}
