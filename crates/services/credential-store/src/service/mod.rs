//! Service layer - credential use cases on top of the connection pool.

mod credential_service;

pub use credential_service::{CredentialService, CredentialStore};
