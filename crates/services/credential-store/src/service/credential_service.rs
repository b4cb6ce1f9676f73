//! Credential service - registration and login checks.
//!
//! Every failure is absorbed at this boundary: `register` answers with a
//! `RegistrationOutcome`, `authenticate` with a plain bool. Errors are logged
//! with the operation and username, never with the plaintext password.

use async_trait::async_trait;
use std::sync::Arc;

use common::StoreError;
use domain::{CreateUserInput, CredentialHasher, DomainError, DomainResult, RegistrationOutcome, UserRecord};

use crate::infra::{ConnectionPool, PooledConnection};

/// Credential service trait for dependency injection.
#[async_trait]
pub trait CredentialService: Send + Sync {
    /// Create a user with a hashed password
    async fn register(&self, input: &CreateUserInput) -> RegistrationOutcome;

    /// Check a username/password pair against the stored hash
    async fn authenticate(&self, input: &CreateUserInput) -> bool;
}

/// Concrete implementation of CredentialService over the connection pool.
pub struct CredentialStore {
    pool: ConnectionPool,
    hasher: Arc<dyn CredentialHasher>,
}

impl CredentialStore {
    pub fn new(pool: ConnectionPool, hasher: Arc<dyn CredentialHasher>) -> Self {
        Self { pool, hasher }
    }

    pub fn pool(&self) -> &ConnectionPool {
        &self.pool
    }

    /// Hash on the blocking pool; argon2 is deliberately slow.
    async fn hash_password(&self, plain_text: &str) -> DomainResult<String> {
        let hasher = Arc::clone(&self.hasher);
        let plain_text = plain_text.to_owned();
        tokio::task::spawn_blocking(move || hasher.hash(&plain_text))
            .await
            .map_err(|e| DomainError::internal(format!("hashing task failed: {}", e)))?
    }

    async fn verify_password(&self, hash: String, plain_text: &str) -> bool {
        let hasher = Arc::clone(&self.hasher);
        let plain_text = plain_text.to_owned();
        match tokio::task::spawn_blocking(move || hasher.verify(&hash, &plain_text)).await {
            Ok(valid) => valid,
            Err(e) => {
                tracing::error!(error = %e, "password verification task failed");
                false
            }
        }
    }

    /// Release a connection, discarding its session on connection-level errors.
    async fn finish(&self, mut conn: PooledConnection, error: Option<&StoreError>) {
        if error.is_some_and(StoreError::is_connection_error) {
            conn.mark_broken();
        }
        if let Err(e) = self.pool.release(conn).await {
            tracing::warn!(error = %e, "failed to release connection");
        }
    }
}

#[async_trait]
impl CredentialService for CredentialStore {
    async fn register(&self, input: &CreateUserInput) -> RegistrationOutcome {
        let username = input.username.as_str();

        let mut conn = match self.pool.acquire().await {
            Ok(conn) => conn,
            Err(e) => {
                tracing::error!(operation = "register", username, error = %e, "no database connection");
                return RegistrationOutcome::ErrorDatabase;
            }
        };

        let password_hash = match self.hash_password(&input.password).await {
            Ok(hash) => hash,
            Err(e) => {
                tracing::error!(operation = "register", username, error = %e, "password hashing failed");
                self.finish(conn, None).await;
                return RegistrationOutcome::ErrorDatabase;
            }
        };
        tracing::debug!(operation = "register", username, password_hash = %password_hash, "inserting user");

        let record = UserRecord::new(username, password_hash);
        let result = conn.insert_user(&record).await;

        let outcome = match &result {
            Ok(()) => {
                tracing::info!(operation = "register", username, "user registered");
                RegistrationOutcome::Success
            }
            Err(StoreError::Conflict(_)) => {
                tracing::info!(operation = "register", username, "username already registered");
                RegistrationOutcome::AlreadyRegistered
            }
            Err(e) => {
                tracing::error!(operation = "register", username, error = %e, code = e.code(), "insert failed");
                RegistrationOutcome::ErrorDatabase
            }
        };

        self.finish(conn, result.as_ref().err()).await;
        outcome
    }

    async fn authenticate(&self, input: &CreateUserInput) -> bool {
        let username = input.username.as_str();

        let mut conn = match self.pool.acquire().await {
            Ok(conn) => conn,
            Err(e) => {
                tracing::error!(operation = "authenticate", username, error = %e, "no database connection");
                return false;
            }
        };

        let result = conn.find_password_hash(username).await;
        // Verification does not need the session
        self.finish(conn, result.as_ref().err()).await;

        match result {
            Ok(Some(hash)) => {
                let valid = self.verify_password(hash, &input.password).await;
                tracing::debug!(operation = "authenticate", username, valid, "password checked");
                valid
            }
            Ok(None) => {
                // Same cost as a wrong password, so unknown names are not revealed by timing
                let decoy = self.hasher.decoy_hash().to_owned();
                self.verify_password(decoy, &input.password).await;
                tracing::debug!(operation = "authenticate", username, "unknown username");
                false
            }
            Err(e) => {
                tracing::error!(operation = "authenticate", username, error = %e, code = e.code(), "password lookup failed");
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use common::PoolConfig;

    use crate::infra::{MockConnector, Session};
    use crate::repository::MockUserRepository;

    #[derive(Default)]
    struct FakeHasher {
        verifications: AtomicUsize,
        broken: bool,
    }

    impl CredentialHasher for FakeHasher {
        fn hash(&self, plain_text: &str) -> DomainResult<String> {
            if self.broken {
                return Err(DomainError::password("hasher unavailable"));
            }
            Ok(format!("hashed:{}", plain_text))
        }

        fn verify(&self, hash: &str, plain_text: &str) -> bool {
            self.verifications.fetch_add(1, Ordering::SeqCst);
            hash == format!("hashed:{}", plain_text)
        }

        fn decoy_hash(&self) -> &str {
            "decoy"
        }
    }

    fn pool_config() -> PoolConfig {
        PoolConfig {
            max_connections: 1,
            acquire_timeout: Duration::from_millis(50),
            connect_timeout: Duration::from_millis(50),
            ..PoolConfig::default()
        }
    }

    /// Pool whose connector hands out `session` once, then refuses.
    fn pool_with(session: MockUserRepository) -> ConnectionPool {
        let mut slot = Some(session);
        let mut connector = MockConnector::new();
        connector.expect_describe().return_const("mock".to_string());
        connector.expect_connect().returning(move || match slot.take() {
            Some(session) => Ok(Box::new(session) as Session),
            None => Err(StoreError::connection_unavailable("connection refused")),
        });
        ConnectionPool::new(pool_config(), Arc::new(connector))
    }

    fn unreachable_pool() -> ConnectionPool {
        let mut connector = MockConnector::new();
        connector.expect_describe().return_const("mock".to_string());
        connector
            .expect_connect()
            .returning(|| Err(StoreError::connection_unavailable("connection refused")));
        ConnectionPool::new(pool_config(), Arc::new(connector))
    }

    fn store(pool: ConnectionPool, hasher: &Arc<FakeHasher>) -> CredentialStore {
        let hasher: Arc<dyn CredentialHasher> = hasher.clone();
        CredentialStore::new(pool, hasher)
    }

    // ── register ────────────────────────────────────────────────────

    #[tokio::test]
    async fn test_register_stores_hash_not_plaintext() {
        let mut session = MockUserRepository::new();
        session
            .expect_insert_user()
            .withf(|record| {
                record.username == "alice"
                    && record.password_hash == "hashed:secret1"
                    && record.image_index == 0
            })
            .times(1)
            .returning(|_| Ok(()));
        let hasher = Arc::new(FakeHasher::default());
        let service = store(pool_with(session), &hasher);

        let outcome = service
            .register(&CreateUserInput::new("alice", "secret1"))
            .await;

        assert_eq!(outcome, RegistrationOutcome::Success);
        assert_eq!(service.pool().stats().in_use, 0);
    }

    #[tokio::test]
    async fn test_register_duplicate_is_already_registered() {
        let mut session = MockUserRepository::new();
        session
            .expect_insert_user()
            .returning(|_| Err(StoreError::conflict("user alice")));
        let hasher = Arc::new(FakeHasher::default());
        let service = store(pool_with(session), &hasher);

        let outcome = service
            .register(&CreateUserInput::new("alice", "secret2"))
            .await;

        assert_eq!(outcome, RegistrationOutcome::AlreadyRegistered);
        // A conflict leaves the session healthy
        assert_eq!(service.pool().stats().idle, 1);
    }

    #[tokio::test]
    async fn test_register_query_failure_is_database_error() {
        let mut session = MockUserRepository::new();
        session
            .expect_insert_user()
            .returning(|_| Err(StoreError::query_failed("relation \"users\" does not exist")));
        let hasher = Arc::new(FakeHasher::default());
        let service = store(pool_with(session), &hasher);

        let outcome = service
            .register(&CreateUserInput::new("alice", "secret1"))
            .await;

        assert_eq!(outcome, RegistrationOutcome::ErrorDatabase);
        assert_eq!(service.pool().stats().idle, 1);
    }

    #[tokio::test]
    async fn test_register_connection_error_discards_session() {
        let mut session = MockUserRepository::new();
        session
            .expect_insert_user()
            .returning(|_| Err(StoreError::connection_unavailable("connection reset")));
        session.expect_close().times(1).returning(|| ());
        let hasher = Arc::new(FakeHasher::default());
        let service = store(pool_with(session), &hasher);

        let outcome = service
            .register(&CreateUserInput::new("alice", "secret1"))
            .await;

        assert_eq!(outcome, RegistrationOutcome::ErrorDatabase);
        let stats = service.pool().stats();
        assert_eq!(stats.idle, 0);
        assert_eq!(stats.in_use, 0);
    }

    #[tokio::test]
    async fn test_register_without_connection_issues_no_query() {
        let hasher = Arc::new(FakeHasher::default());
        let service = store(unreachable_pool(), &hasher);

        let outcome = service
            .register(&CreateUserInput::new("alice", "secret1"))
            .await;

        assert_eq!(outcome, RegistrationOutcome::ErrorDatabase);
    }

    #[tokio::test]
    async fn test_register_hash_failure_skips_insert() {
        // No insert expectation: any query would panic the mock
        let session = MockUserRepository::new();
        let hasher = Arc::new(FakeHasher {
            broken: true,
            ..FakeHasher::default()
        });
        let service = store(pool_with(session), &hasher);

        let outcome = service
            .register(&CreateUserInput::new("alice", "secret1"))
            .await;

        assert_eq!(outcome, RegistrationOutcome::ErrorDatabase);
        assert_eq!(service.pool().stats().in_use, 0);
    }

    // ── authenticate ────────────────────────────────────────────────

    #[tokio::test]
    async fn test_authenticate_correct_password() {
        let mut session = MockUserRepository::new();
        session
            .expect_find_password_hash()
            .withf(|username| username == "alice")
            .returning(|_| Ok(Some("hashed:secret1".to_string())));
        let hasher = Arc::new(FakeHasher::default());
        let service = store(pool_with(session), &hasher);

        assert!(
            service
                .authenticate(&CreateUserInput::new("alice", "secret1"))
                .await
        );
    }

    #[tokio::test]
    async fn test_authenticate_wrong_password() {
        let mut session = MockUserRepository::new();
        session
            .expect_find_password_hash()
            .returning(|_| Ok(Some("hashed:secret1".to_string())));
        let hasher = Arc::new(FakeHasher::default());
        let service = store(pool_with(session), &hasher);

        assert!(
            !service
                .authenticate(&CreateUserInput::new("alice", "secret2"))
                .await
        );
        assert_eq!(hasher.verifications.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_authenticate_unknown_user_still_verifies() {
        let mut session = MockUserRepository::new();
        session.expect_find_password_hash().returning(|_| Ok(None));
        let hasher = Arc::new(FakeHasher::default());
        let service = store(pool_with(session), &hasher);

        assert!(
            !service
                .authenticate(&CreateUserInput::new("bob", "anything"))
                .await
        );
        assert_eq!(hasher.verifications.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_authenticate_lookup_failure_is_false() {
        let mut session = MockUserRepository::new();
        session
            .expect_find_password_hash()
            .returning(|_| Err(StoreError::query_failed("syntax error")));
        let hasher = Arc::new(FakeHasher::default());
        let service = store(pool_with(session), &hasher);

        assert!(
            !service
                .authenticate(&CreateUserInput::new("alice", "secret1"))
                .await
        );
        assert_eq!(hasher.verifications.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_authenticate_without_connection_is_false() {
        let hasher = Arc::new(FakeHasher::default());
        let service = store(unreachable_pool(), &hasher);

        assert!(
            !service
                .authenticate(&CreateUserInput::new("alice", "secret1"))
                .await
        );
    }
}
