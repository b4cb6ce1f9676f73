//! Unified error handling for the credential store.
//!
//! `StoreError` is the storage-level taxonomy that operations map onto their
//! closed outcomes. `ConfigError` covers startup configuration.

use thiserror::Error;

/// Storage error types.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// Pool exhausted, closed, or transport down
    #[error("Connection unavailable: {0}")]
    ConnectionUnavailable(String),

    /// Unique constraint rejected the write
    #[error("{0} already exists")]
    Conflict(String),

    /// Statement failed for any other reason
    #[error("Query failed: {0}")]
    QueryFailed(String),

    /// No matching row
    #[error("Resource not found")]
    NotFound,
}

impl StoreError {
    /// Get error code for log output
    pub fn code(&self) -> &'static str {
        match self {
            StoreError::ConnectionUnavailable(_) => "CONNECTION_UNAVAILABLE",
            StoreError::Conflict(_) => "CONFLICT",
            StoreError::QueryFailed(_) => "QUERY_FAILED",
            StoreError::NotFound => "NOT_FOUND",
        }
    }

    /// True when the session that produced this error should not be reused.
    pub fn is_connection_error(&self) -> bool {
        matches!(self, StoreError::ConnectionUnavailable(_))
    }

    pub fn connection_unavailable(msg: impl Into<String>) -> Self {
        StoreError::ConnectionUnavailable(msg.into())
    }

    pub fn conflict(entity: impl Into<String>) -> Self {
        StoreError::Conflict(entity.into())
    }

    pub fn query_failed(msg: impl Into<String>) -> Self {
        StoreError::QueryFailed(msg.into())
    }
}

// =============================================================================
// Database Error Conversion
// =============================================================================

/// Postgres SQLSTATE for unique_violation
#[cfg(feature = "database")]
const UNIQUE_VIOLATION: &str = "23505";

#[cfg(feature = "database")]
impl From<sea_orm::DbErr> for StoreError {
    fn from(err: sea_orm::DbErr) -> Self {
        use sea_orm::{DbErr, RuntimeErr, SqlErr};

        if let Some(SqlErr::UniqueConstraintViolation(detail)) = err.sql_err() {
            return StoreError::Conflict(detail);
        }

        match &err {
            DbErr::Conn(_) | DbErr::ConnectionAcquire(_) => {
                StoreError::ConnectionUnavailable(err.to_string())
            }
            DbErr::Exec(RuntimeErr::SqlxError(source))
            | DbErr::Query(RuntimeErr::SqlxError(source)) => classify_sqlx(source, &err),
            DbErr::RecordNotFound(_) => StoreError::NotFound,
            other => StoreError::QueryFailed(other.to_string()),
        }
    }
}

/// Statement failures still carry transport errors from the driver.
#[cfg(feature = "database")]
fn classify_sqlx(source: &sea_orm::sqlx::Error, err: &sea_orm::DbErr) -> StoreError {
    use sea_orm::sqlx::Error as SqlxError;

    match source {
        SqlxError::Database(db) if db.code().as_deref() == Some(UNIQUE_VIOLATION) => {
            StoreError::Conflict(db.message().to_string())
        }
        SqlxError::Io(_)
        | SqlxError::Tls(_)
        | SqlxError::PoolTimedOut
        | SqlxError::PoolClosed
        | SqlxError::WorkerCrashed => StoreError::ConnectionUnavailable(err.to_string()),
        _ => StoreError::QueryFailed(err.to_string()),
    }
}

/// Result type alias
pub type StoreResult<T> = Result<T, StoreError>;

/// Configuration loading errors.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{0} must be set")]
    Missing(&'static str),

    #[error("{key} has invalid value {value:?}: {reason}")]
    Invalid {
        key: &'static str,
        value: String,
        reason: String,
    },
}

impl ConfigError {
    pub fn invalid(key: &'static str, value: impl Into<String>, reason: impl Into<String>) -> Self {
        ConfigError::Invalid {
            key,
            value: value.into(),
            reason: reason.into(),
        }
    }
}
