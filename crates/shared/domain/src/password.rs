//! Password hashing - one-way hash and verify for stored credentials.
//!
//! `CredentialHasher` is the seam the store depends on; `Argon2Hasher` is the
//! production implementation. The `Password` value object keeps the hash out
//! of debug output.

use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2, Params,
};

use crate::error::{DomainError, DomainResult};

/// One-way password hashing collaborator.
///
/// Implementations must be slow and salted. `verify` never fails loudly:
/// a malformed hash simply does not verify.
pub trait CredentialHasher: Send + Sync {
    /// Hash a plaintext password into an opaque string for storage.
    fn hash(&self, plain_text: &str) -> DomainResult<String>;

    /// Check a plaintext password against a stored hash.
    fn verify(&self, hash: &str, plain_text: &str) -> bool;

    /// A well-formed hash that no caller-supplied password matches.
    ///
    /// Verifying against it costs the same as verifying a real hash, so a
    /// login for an unknown user takes as long as a wrong-password login.
    fn decoy_hash(&self) -> &str;
}

/// Argon2id hasher producing PHC-format strings.
#[derive(Clone)]
pub struct Argon2Hasher {
    argon2: Argon2<'static>,
    decoy: Password,
}

impl std::fmt::Debug for Argon2Hasher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Argon2Hasher")
            .field("params", self.argon2.params())
            .finish_non_exhaustive()
    }
}

impl Argon2Hasher {
    /// Hasher with the argon2 crate's recommended parameters.
    pub fn new() -> DomainResult<Self> {
        Self::from_argon2(Argon2::default())
    }

    /// Hasher with explicit cost parameters.
    ///
    /// Lower costs are only meant for tests; verification always reads the
    /// parameters embedded in the stored hash.
    pub fn with_params(params: Params) -> DomainResult<Self> {
        Self::from_argon2(Argon2::new(
            argon2::Algorithm::Argon2id,
            argon2::Version::V0x13,
            params,
        ))
    }

    fn from_argon2(argon2: Argon2<'static>) -> DomainResult<Self> {
        // Random plaintext, discarded immediately
        let secret = SaltString::generate(&mut OsRng);
        let decoy = Password::from_hash(hash_with(&argon2, secret.as_str())?);
        Ok(Self { argon2, decoy })
    }
}

impl CredentialHasher for Argon2Hasher {
    fn hash(&self, plain_text: &str) -> DomainResult<String> {
        hash_with(&self.argon2, plain_text)
    }

    fn verify(&self, hash: &str, plain_text: &str) -> bool {
        Password::from_hash(hash).verify_with(&self.argon2, plain_text)
    }

    fn decoy_hash(&self) -> &str {
        self.decoy.as_str()
    }
}

fn hash_with(argon2: &Argon2<'_>, plain_text: &str) -> DomainResult<String> {
    let salt = SaltString::generate(&mut OsRng);
    let hash = argon2
        .hash_password(plain_text.as_bytes(), &salt)
        .map_err(|e| DomainError::password(format!("Password hash failed: {}", e)))?;
    Ok(hash.to_string())
}

/// Stored password hash value object.
#[derive(Clone, PartialEq, Eq)]
pub struct Password {
    hash: String,
}

// Don't expose hash in debug output
impl std::fmt::Debug for Password {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Password")
            .field("hash", &"[REDACTED]")
            .finish()
    }
}

impl Password {
    /// Wrap an existing hash (from the database).
    pub fn from_hash(hash: impl Into<String>) -> Self {
        Self { hash: hash.into() }
    }

    /// Get the hash string for storage.
    pub fn as_str(&self) -> &str {
        &self.hash
    }

    fn verify_with(&self, argon2: &Argon2<'_>, plain_text: &str) -> bool {
        match PasswordHash::new(&self.hash) {
            Ok(parsed) => argon2.verify_password(plain_text.as_bytes(), &parsed).is_ok(),
            Err(_) => false,
        }
    }
}
