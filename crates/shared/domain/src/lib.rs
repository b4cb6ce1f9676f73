//! Domain layer - Core credential entities and the password hasher.
//!
//! This crate contains pure domain logic with no infrastructure dependencies.

pub mod constants;
pub mod error;
pub mod password;
pub mod user;

pub use constants::*;
pub use error::{DomainError, DomainResult};
pub use password::{Argon2Hasher, CredentialHasher, Password};
pub use user::{CreateUserInput, RegistrationOutcome, UserRecord};
