//! Shared configuration structures.

use std::time::Duration;

use serde::{Deserialize, Serialize};

// =============================================================================
// Defaults
// =============================================================================

/// Default maximum number of pooled connections
pub const DEFAULT_MAX_CONNECTIONS: usize = 10;

/// Default time to wait for a free connection before giving up
pub const DEFAULT_ACQUIRE_TIMEOUT_SECS: u64 = 5;

/// Default time allowed to open one new session
pub const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 5;

/// Default number of connectivity attempts at startup
pub const DEFAULT_CONNECT_ATTEMPTS: u32 = 5;

/// Default pause between failed startup attempts
pub const DEFAULT_RETRY_INTERVAL_SECS: u64 = 5;

/// Database connection settings.
#[derive(Clone, Deserialize, Serialize)]
pub struct DatabaseConfig {
    pub host: String,
    pub port: u16,
    pub database: String,
    pub user: String,
    #[serde(skip_serializing)]
    pub password: String,
}

impl std::fmt::Debug for DatabaseConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DatabaseConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("database", &self.database)
            .field("user", &self.user)
            .field("password", &"[REDACTED]")
            .finish()
    }
}

impl DatabaseConfig {
    /// Postgres connection URL with user, password and database percent-encoded.
    pub fn connection_url(&self) -> String {
        format!(
            "postgres://{}:{}@{}:{}/{}",
            urlencoding::encode(&self.user),
            urlencoding::encode(&self.password),
            self.host,
            self.port,
            urlencoding::encode(&self.database),
        )
    }

    /// `host:port/database` for log output.
    pub fn target(&self) -> String {
        format!("{}:{}/{}", self.host, self.port, self.database)
    }
}

/// What startup does once every connectivity attempt has failed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum StartupPolicy {
    /// Log and keep serving; operations report database errors until the
    /// store becomes reachable.
    #[default]
    Proceed,
    /// Treat exhausted retries as a fatal startup error.
    Abort,
}

/// Connection pool configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PoolConfig {
    /// Maximum connections checked out at once
    pub max_connections: usize,
    /// Maximum wait for a free connection
    pub acquire_timeout: Duration,
    /// Maximum time to open one session
    pub connect_timeout: Duration,
    /// Connectivity attempts made by `initialize`
    pub connect_attempts: u32,
    /// Pause between failed startup attempts
    pub retry_interval: Duration,
    pub startup_policy: StartupPolicy,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_connections: DEFAULT_MAX_CONNECTIONS,
            acquire_timeout: Duration::from_secs(DEFAULT_ACQUIRE_TIMEOUT_SECS),
            connect_timeout: Duration::from_secs(DEFAULT_CONNECT_TIMEOUT_SECS),
            connect_attempts: DEFAULT_CONNECT_ATTEMPTS,
            retry_interval: Duration::from_secs(DEFAULT_RETRY_INTERVAL_SECS),
            startup_policy: StartupPolicy::default(),
        }
    }
}
