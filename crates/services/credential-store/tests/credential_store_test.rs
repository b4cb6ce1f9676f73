//! Credential store integration tests over the in-memory backend.

use std::sync::Arc;
use std::time::Duration;

use argon2::Params;
use tokio_test::{assert_err, assert_ok};

use common::{DatabaseConfig, PoolConfig};
use credential_store_lib::config::CredentialStoreConfig;
use credential_store_lib::infra::{ConnectionPool, MemoryConnector};
use credential_store_lib::service::{CredentialService, CredentialStore};
use credential_store_lib::{run_with, Command, CommandOutput};
use domain::{Argon2Hasher, CreateUserInput, CredentialHasher, RegistrationOutcome};

fn cheap_hasher() -> Arc<dyn CredentialHasher> {
    let params = Params::new(8, 1, 1, None).unwrap();
    Arc::new(Argon2Hasher::with_params(params).unwrap())
}

fn pool_config() -> PoolConfig {
    PoolConfig {
        max_connections: 4,
        acquire_timeout: Duration::from_millis(200),
        connect_timeout: Duration::from_millis(200),
        connect_attempts: 1,
        retry_interval: Duration::from_millis(10),
        ..PoolConfig::default()
    }
}

fn create_test_store() -> (CredentialStore, MemoryConnector) {
    let connector = MemoryConnector::new();
    let pool = ConnectionPool::new(pool_config(), Arc::new(connector.clone()));
    (CredentialStore::new(pool, cheap_hasher()), connector)
}

fn input(username: &str, password: &str) -> CreateUserInput {
    CreateUserInput::new(username, password)
}

#[tokio::test]
async fn test_register_then_login_scenario() {
    let (store, connector) = create_test_store();

    assert_eq!(
        store.register(&input("alice", "secret1")).await,
        RegistrationOutcome::Success
    );
    assert!(store.authenticate(&input("alice", "secret1")).await);

    assert_eq!(
        store.register(&input("alice", "secret2")).await,
        RegistrationOutcome::AlreadyRegistered
    );
    assert!(!store.authenticate(&input("alice", "secret2")).await);

    // The first registration is untouched
    assert!(store.authenticate(&input("alice", "secret1")).await);
    assert_eq!(connector.user_count(), 1);
}

#[tokio::test]
async fn test_stored_record_holds_hash_and_default_image() {
    let (store, connector) = create_test_store();
    store.register(&input("alice", "secret1")).await;

    let record = connector.user("alice").unwrap();
    assert_ne!(record.password_hash, "secret1");
    assert!(record.password_hash.starts_with("$argon2id$"));
    assert_eq!(record.image_index, 0);
}

#[tokio::test]
async fn test_unknown_user_cannot_login() {
    let (store, _) = create_test_store();
    store.register(&input("alice", "secret1")).await;

    assert!(!store.authenticate(&input("bob", "secret1")).await);
}

#[tokio::test]
async fn test_unreachable_store_reports_database_error() {
    let (store, connector) = create_test_store();
    connector.set_reachable(false);

    assert_eq!(
        store.register(&input("alice", "secret1")).await,
        RegistrationOutcome::ErrorDatabase
    );
    assert!(!store.authenticate(&input("alice", "secret1")).await);
}

#[tokio::test]
async fn test_store_recovers_after_outage() {
    let (store, connector) = create_test_store();
    store.register(&input("alice", "secret1")).await;

    connector.set_reachable(false);
    assert!(!store.authenticate(&input("alice", "secret1")).await);

    connector.set_reachable(true);
    assert!(store.authenticate(&input("alice", "secret1")).await);
    // The session that saw the outage was discarded, not reused
    assert!(connector.sessions_closed() >= 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_registrations_of_same_name() {
    let (store, connector) = create_test_store();
    let store = Arc::new(store);

    let handles: Vec<_> = (0..8)
        .map(|i| {
            let store = Arc::clone(&store);
            tokio::spawn(async move {
                store
                    .register(&input("carol", &format!("password{}", i)))
                    .await
            })
        })
        .collect();

    let mut outcomes = Vec::new();
    for handle in handles {
        outcomes.push(handle.await.unwrap());
    }

    let successes = outcomes
        .iter()
        .filter(|o| **o == RegistrationOutcome::Success)
        .count();
    assert_eq!(successes, 1);
    assert!(outcomes
        .iter()
        .all(|o| *o != RegistrationOutcome::ErrorDatabase));
    assert_eq!(connector.user_count(), 1);
}

// =============================================================================
// Command runner
// =============================================================================

fn runner_config() -> CredentialStoreConfig {
    CredentialStoreConfig {
        database: DatabaseConfig {
            host: "localhost".to_string(),
            port: 5432,
            database: "users".to_string(),
            user: "app".to_string(),
            password: String::new(),
        },
        pool: pool_config(),
    }
}

#[tokio::test]
async fn test_run_commands_share_the_table() {
    let connector = MemoryConnector::new();

    let registered = run_with(
        Command::Register(input("dave", "hunter2")),
        runner_config(),
        Arc::new(connector.clone()),
        cheap_hasher(),
    )
    .await;
    let registered = assert_ok!(registered);
    assert_eq!(registered, CommandOutput::Registered(RegistrationOutcome::Success));
    assert!(registered.is_success());

    let login = assert_ok!(
        run_with(
            Command::Login(input("dave", "hunter2")),
            runner_config(),
            Arc::new(connector.clone()),
            cheap_hasher(),
        )
        .await
    );
    assert_eq!(login, CommandOutput::Authenticated(true));

    // Every run closes what it opened
    assert_eq!(connector.sessions_opened(), connector.sessions_closed());
}

#[tokio::test]
async fn test_run_check_reports_pool() {
    let connector = MemoryConnector::new();

    let output = assert_ok!(
        run_with(
            Command::Check,
            runner_config(),
            Arc::new(connector),
            cheap_hasher(),
        )
        .await
    );

    match output {
        CommandOutput::Checked {
            startup,
            reachable,
            stats,
        } => {
            assert!(startup.connected);
            assert!(reachable);
            assert_eq!(stats.capacity, 4);
            assert_eq!(stats.in_use, 0);
        }
        other => panic!("unexpected output: {:?}", other),
    }
}

#[tokio::test]
async fn test_run_failed_login_is_not_success() {
    let connector = MemoryConnector::new();

    let output = assert_ok!(
        run_with(
            Command::Login(input("nobody", "nothing")),
            runner_config(),
            Arc::new(connector),
            cheap_hasher(),
        )
        .await
    );
    assert!(!output.is_success());
}

#[tokio::test]
async fn test_run_unreachable_with_fatal_startup_fails() {
    let connector = MemoryConnector::new();
    connector.set_reachable(false);
    let mut config = runner_config();
    config.pool.startup_policy = common::StartupPolicy::Abort;

    let result = run_with(
        Command::Check,
        config,
        Arc::new(connector),
        cheap_hasher(),
    )
    .await;
    assert_err!(result);
}
