//! Credential Store Library
//!
//! Registers users with hashed passwords and checks logins against a
//! Postgres `users` table, through a bounded pool of database sessions.
//! The binary drives it one command at a time; tests drive it through
//! [`run_with`] and the in-memory connector (`test-utils` feature).

pub mod config;
pub mod infra;
pub mod repository;
pub mod service;

use std::sync::Arc;

use tracing::info;

use crate::config::CredentialStoreConfig;
use crate::infra::{ConnectionPool, Connector, PgConnector, PoolStats, StartupReport};
use crate::service::{CredentialService, CredentialStore};
use domain::{Argon2Hasher, CreateUserInput, CredentialHasher, RegistrationOutcome};

/// One unit of work for the store.
#[derive(Debug, Clone)]
pub enum Command {
    Register(CreateUserInput),
    Login(CreateUserInput),
    /// Verify connectivity and report pool statistics
    Check,
}

/// What a command produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandOutput {
    Registered(RegistrationOutcome),
    Authenticated(bool),
    Checked {
        startup: StartupReport,
        reachable: bool,
        stats: PoolStats,
    },
}

impl CommandOutput {
    /// Whether the process should exit successfully.
    pub fn is_success(&self) -> bool {
        match self {
            CommandOutput::Registered(outcome) => outcome.is_success(),
            CommandOutput::Authenticated(valid) => *valid,
            CommandOutput::Checked { reachable, .. } => *reachable,
        }
    }
}

impl std::fmt::Display for CommandOutput {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CommandOutput::Registered(outcome) => write!(f, "{}", outcome),
            CommandOutput::Authenticated(true) => write!(f, "authenticated"),
            CommandOutput::Authenticated(false) => write!(f, "invalid username or password"),
            CommandOutput::Checked {
                startup,
                reachable,
                stats,
            } => write!(
                f,
                "reachable: {} (startup attempts: {}), pool: {}/{} in use, {} idle",
                reachable, startup.attempts, stats.in_use, stats.capacity, stats.idle
            ),
        }
    }
}

/// Run one command against the Postgres database configured in the environment.
pub async fn run(command: Command) -> Result<CommandOutput, Box<dyn std::error::Error>> {
    let config = CredentialStoreConfig::from_env()?;
    info!(target_db = %config.database.target(), "loaded database configuration");

    let connector = Arc::new(PgConnector::new(
        config.database.clone(),
        config.pool.connect_timeout,
    ));
    let hasher = Arc::new(Argon2Hasher::new()?);

    run_with(command, config, connector, hasher).await
}

/// Run one command with explicit collaborators.
///
/// Builds the pool, initializes it (Ctrl-C aborts the startup retries),
/// executes the command and shuts the pool down on every path.
pub async fn run_with(
    command: Command,
    config: CredentialStoreConfig,
    connector: Arc<dyn Connector>,
    hasher: Arc<dyn CredentialHasher>,
) -> Result<CommandOutput, Box<dyn std::error::Error>> {
    let pool = ConnectionPool::new(config.pool, connector);

    let startup = tokio::select! {
        result = pool.initialize() => result,
        _ = tokio::signal::ctrl_c() => {
            info!("interrupted during startup");
            pool.shutdown().await;
            return Err("interrupted".into());
        }
    };
    let startup = match startup {
        Ok(report) => report,
        Err(e) => {
            pool.shutdown().await;
            return Err(e.into());
        }
    };

    let store = CredentialStore::new(pool.clone(), hasher);
    let output = execute(&store, command, startup).await;

    pool.shutdown().await;
    Ok(output)
}

async fn execute(store: &CredentialStore, command: Command, startup: StartupReport) -> CommandOutput {
    match command {
        Command::Register(input) => CommandOutput::Registered(store.register(&input).await),
        Command::Login(input) => CommandOutput::Authenticated(store.authenticate(&input).await),
        Command::Check => {
            let reachable = ping(store.pool()).await;
            CommandOutput::Checked {
                startup,
                reachable,
                stats: store.pool().stats(),
            }
        }
    }
}

async fn ping(pool: &ConnectionPool) -> bool {
    let mut conn = match pool.acquire().await {
        Ok(conn) => conn,
        Err(e) => {
            tracing::warn!(error = %e, "database check failed");
            return false;
        }
    };

    match conn.ping().await {
        Ok(()) => true,
        Err(e) => {
            tracing::warn!(error = %e, "database check failed");
            if e.is_connection_error() {
                conn.mark_broken();
            }
            false
        }
    }
}
