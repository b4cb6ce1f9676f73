//! User credential entities and operation outcomes.

use serde::{Deserialize, Serialize};

use crate::constants::DEFAULT_IMAGE_INDEX;

/// Persisted user credential record.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserRecord {
    /// Unique login name
    pub username: String,
    /// Opaque hash produced by the credential hasher
    #[serde(skip_serializing)]
    pub password_hash: String,
    /// Avatar index
    pub image_index: i32,
}

impl UserRecord {
    /// Create a record for a new registration with the default image index.
    pub fn new(username: impl Into<String>, password_hash: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password_hash: password_hash.into(),
            image_index: DEFAULT_IMAGE_INDEX,
        }
    }
}

impl std::fmt::Debug for UserRecord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UserRecord")
            .field("username", &self.username)
            .field("password_hash", &"[REDACTED]")
            .field("image_index", &self.image_index)
            .finish()
    }
}

/// Credentials supplied by a caller for registration or login.
#[derive(Clone, Deserialize)]
pub struct CreateUserInput {
    /// Login name
    pub username: String,
    /// Plaintext password; never stored or logged
    pub password: String,
}

impl CreateUserInput {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }
}

// Plaintext must never reach log output
impl std::fmt::Debug for CreateUserInput {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CreateUserInput")
            .field("username", &self.username)
            .field("password", &"[REDACTED]")
            .finish()
    }
}

/// Result of a registration attempt.
///
/// A closed set rather than a boolean: callers must tell an unreachable
/// store apart from a duplicate username.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RegistrationOutcome {
    Success,
    AlreadyRegistered,
    ErrorDatabase,
}

impl RegistrationOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, RegistrationOutcome::Success)
    }
}

impl std::fmt::Display for RegistrationOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RegistrationOutcome::Success => write!(f, "success"),
            RegistrationOutcome::AlreadyRegistered => write!(f, "already registered"),
            RegistrationOutcome::ErrorDatabase => write!(f, "database error"),
        }
    }
}
