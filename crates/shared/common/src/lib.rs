//! Common utilities shared across the credential store crates.
//!
//! This crate provides:
//! - Storage and configuration error types
//! - Database and pool configuration structures

pub mod config;
pub mod error;

pub use config::*;
pub use error::{ConfigError, StoreError, StoreResult};
