//! Connection pool manager.
//!
//! Owns a bounded set of live sessions and hands them out one caller at a
//! time. The pool is an explicit value: the process entry point creates it,
//! calls [`ConnectionPool::initialize`] once, passes clones to the services,
//! and calls [`ConnectionPool::shutdown`] once on the way out.
//!
//! # Checkout discipline
//!
//! ```text
//! acquire()
//!   → closed?                      → Err(Closed)
//!   → wait for a capacity permit   → timeout: Err(Exhausted)
//!   → idle session available       → hand it out
//!   → otherwise open a new one     → failure: Err(Unavailable)
//! drop / release(conn)
//!   → id not checked out           → Err(UnknownConnection), state untouched
//!   → broken or pool closed        → session discarded
//!   → otherwise                    → back to the idle set, permit returned
//! ```

use std::collections::HashSet;
use std::ops::{Deref, DerefMut};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use parking_lot::Mutex;
use thiserror::Error;
use tokio::sync::{Notify, OwnedSemaphorePermit, Semaphore};

use super::{Connector, Session};
use crate::repository::UserRepository;
use common::{PoolConfig, StartupPolicy, StoreError};

/// Pool failures. Distinguishable from raw transport errors so callers can
/// degrade gracefully.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PoolError {
    #[error("connection pool is closed")]
    Closed,

    #[error("connection pool exhausted (waited {0:?})")]
    Exhausted(Duration),

    #[error("database unavailable: {0}")]
    Unavailable(String),

    #[error("connection {0} is not checked out from this pool")]
    UnknownConnection(u64),

    #[error("connection {0} belongs to a different pool")]
    ForeignConnection(u64),

    #[error("could not connect to the database after {attempts} attempts")]
    StartupFailed { attempts: u32 },
}

impl From<PoolError> for StoreError {
    fn from(err: PoolError) -> Self {
        StoreError::ConnectionUnavailable(err.to_string())
    }
}

/// Result type alias for pool operations
pub type PoolResult<T> = Result<T, PoolError>;

/// Point-in-time pool statistics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolStats {
    /// Maximum connections checked out at once
    pub capacity: usize,
    /// Connections currently checked out
    pub in_use: usize,
    /// Open sessions waiting in the pool
    pub idle: usize,
    pub closed: bool,
}

/// Outcome of [`ConnectionPool::initialize`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StartupReport {
    /// Connectivity attempts made
    pub attempts: u32,
    /// Whether one of them succeeded
    pub connected: bool,
}

#[derive(Default)]
struct PoolState {
    idle: Vec<Session>,
    checked_out: HashSet<u64>,
}

struct PoolShared {
    connector: Arc<dyn Connector>,
    config: PoolConfig,
    /// Bounds checked-out connections to `config.max_connections`.
    semaphore: Arc<Semaphore>,
    /// Never held across an `.await`.
    state: Mutex<PoolState>,
    closed: AtomicBool,
    initialized: AtomicBool,
    next_id: AtomicU64,
    shutdown: Notify,
}

impl PoolShared {
    /// Take a session back from connection `id`.
    ///
    /// Returns the session when it has to be discarded instead of pooled.
    fn check_in(&self, id: u64, session: Session, broken: bool) -> PoolResult<Option<Session>> {
        let mut state = self.state.lock();
        if !state.checked_out.remove(&id) {
            drop(state);
            tracing::warn!(
                connection_id = id,
                "ignoring release of a connection that is not checked out"
            );
            return Err(PoolError::UnknownConnection(id));
        }

        if broken || self.closed.load(Ordering::SeqCst) {
            tracing::debug!(connection_id = id, broken, "discarding session on release");
            return Ok(Some(session));
        }

        state.idle.push(session);
        tracing::trace!(
            connection_id = id,
            idle = state.idle.len(),
            "returned connection to pool"
        );
        Ok(None)
    }
}

/// Bounded pool of database sessions.
///
/// Cloning is cheap; clones share the same sessions.
#[derive(Clone)]
pub struct ConnectionPool {
    shared: Arc<PoolShared>,
}

impl ConnectionPool {
    /// Create a pool. No session is opened until `initialize` or `acquire`.
    pub fn new(config: PoolConfig, connector: Arc<dyn Connector>) -> Self {
        let capacity = config.max_connections.max(1);
        Self {
            shared: Arc::new(PoolShared {
                connector,
                semaphore: Arc::new(Semaphore::new(capacity)),
                config: PoolConfig {
                    max_connections: capacity,
                    ..config
                },
                state: Mutex::new(PoolState::default()),
                closed: AtomicBool::new(false),
                initialized: AtomicBool::new(false),
                next_id: AtomicU64::new(1),
                shutdown: Notify::new(),
            }),
        }
    }

    pub fn is_closed(&self) -> bool {
        self.shared.closed.load(Ordering::SeqCst)
    }

    pub fn stats(&self) -> PoolStats {
        let state = self.shared.state.lock();
        PoolStats {
            capacity: self.shared.config.max_connections,
            in_use: state.checked_out.len(),
            idle: state.idle.len(),
            closed: self.is_closed(),
        }
    }

    /// Establish connectivity at startup, retrying a bounded number of times.
    ///
    /// Each failed attempt is logged and followed by `retry_interval` of
    /// sleep (skipped after the last attempt). The session opened is kept as
    /// an idle connection while the pool has room for it. `shutdown`
    /// interrupts the wait. Only the first call connects; later calls report
    /// the current state with zero attempts.
    pub async fn initialize(&self) -> PoolResult<StartupReport> {
        let config = &self.shared.config;
        let max_attempts = config.connect_attempts.max(1);
        let target = self.shared.connector.describe();

        if self.shared.initialized.swap(true, Ordering::SeqCst) {
            let stats = self.stats();
            tracing::warn!("connection pool already initialized");
            return Ok(StartupReport {
                attempts: 0,
                connected: stats.idle + stats.in_use > 0,
            });
        }

        for attempt in 1..=max_attempts {
            // Registered before the closed check so a concurrent shutdown is never missed
            let interrupted = self.shared.shutdown.notified();
            tokio::pin!(interrupted);

            if self.is_closed() {
                return Err(PoolError::Closed);
            }

            match self.open_session().await {
                Ok(session) => {
                    // Same lock as shutdown's drain, so a session is never stranded
                    let surplus = {
                        let mut state = self.shared.state.lock();
                        let full = state.idle.len() + state.checked_out.len() >= config.max_connections;
                        if self.is_closed() || full {
                            Some(session)
                        } else {
                            state.idle.push(session);
                            None
                        }
                    };
                    if let Some(mut session) = surplus {
                        session.close().await;
                        if self.is_closed() {
                            return Err(PoolError::Closed);
                        }
                    }
                    tracing::info!(attempt, target_db = %target, "connected to the database");
                    return Ok(StartupReport {
                        attempts: attempt,
                        connected: true,
                    });
                }
                Err(e) if attempt < max_attempts => {
                    tracing::error!(
                        attempt,
                        max_attempts,
                        target_db = %target,
                        error = %e,
                        "could not connect to the database, retrying in {:?}",
                        config.retry_interval
                    );
                }
                Err(e) => {
                    tracing::error!(
                        attempt,
                        max_attempts,
                        target_db = %target,
                        error = %e,
                        "could not connect to the database"
                    );
                }
            }

            if attempt < max_attempts {
                tokio::select! {
                    _ = tokio::time::sleep(config.retry_interval) => {}
                    _ = &mut interrupted => {
                        tracing::info!(attempt, "startup connection retries interrupted by shutdown");
                        return Err(PoolError::Closed);
                    }
                }
            }
        }

        match config.startup_policy {
            StartupPolicy::Proceed => {
                tracing::warn!(
                    attempts = max_attempts,
                    target_db = %target,
                    "giving up on startup connectivity; continuing without a database connection"
                );
                Ok(StartupReport {
                    attempts: max_attempts,
                    connected: false,
                })
            }
            StartupPolicy::Abort => Err(PoolError::StartupFailed {
                attempts: max_attempts,
            }),
        }
    }

    /// Check out a connection for exclusive use.
    ///
    /// Waits at most `acquire_timeout` for capacity and `connect_timeout` to
    /// open a new session. The returned guard gives the connection back when
    /// dropped.
    pub async fn acquire(&self) -> PoolResult<PooledConnection> {
        if self.is_closed() {
            return Err(PoolError::Closed);
        }

        let timeout = self.shared.config.acquire_timeout;
        let permit = match tokio::time::timeout(
            timeout,
            Arc::clone(&self.shared.semaphore).acquire_owned(),
        )
        .await
        {
            Ok(Ok(permit)) => permit,
            // Semaphore closed by shutdown
            Ok(Err(_)) => return Err(PoolError::Closed),
            Err(_) => {
                tracing::warn!(
                    timeout = ?timeout,
                    capacity = self.shared.config.max_connections,
                    "connection pool exhausted"
                );
                return Err(PoolError::Exhausted(timeout));
            }
        };

        let idle = self.shared.state.lock().idle.pop();
        let mut session = match idle {
            Some(session) => session,
            None => self.open_session().await?,
        };

        let id = self.shared.next_id.fetch_add(1, Ordering::SeqCst);
        {
            let mut state = self.shared.state.lock();
            // Re-checked under the lock: shutdown may have run while connecting
            if !self.is_closed() {
                state.checked_out.insert(id);
                drop(state);
                tracing::trace!(connection_id = id, "checked out connection");
                return Ok(PooledConnection {
                    id,
                    session: Some(session),
                    permit: Some(permit),
                    broken: false,
                    pool: Arc::clone(&self.shared),
                });
            }
        }

        session.close().await;
        Err(PoolError::Closed)
    }

    /// Give a connection back to the pool.
    ///
    /// Equivalent to dropping it, except that discarded sessions are closed
    /// gracefully and misuse is reported.
    pub async fn release(&self, conn: PooledConnection) -> PoolResult<()> {
        if !Arc::ptr_eq(&conn.pool, &self.shared) {
            let id = conn.id;
            tracing::warn!(connection_id = id, "refusing to release a connection from another pool");
            // Dropping it returns it to the pool it came from
            drop(conn);
            return Err(PoolError::ForeignConnection(id));
        }
        conn.release().await
    }

    /// Close the pool.
    ///
    /// Idle sessions are closed now; checked-out ones when they come back.
    /// Waiting and future `acquire` calls fail with `PoolError::Closed`.
    /// A second call is a logged no-op.
    pub async fn shutdown(&self) {
        if self.shared.closed.swap(true, Ordering::SeqCst) {
            tracing::warn!("connection pool already shut down");
            return;
        }

        self.shared.semaphore.close();
        self.shared.shutdown.notify_waiters();

        let (idle, in_use) = {
            let mut state = self.shared.state.lock();
            (std::mem::take(&mut state.idle), state.checked_out.len())
        };
        let closed = idle.len();
        join_all(idle.into_iter().map(|mut session| async move {
            session.close().await;
        }))
        .await;

        tracing::info!(closed, in_use, "connection pool closed");
    }

    async fn open_session(&self) -> PoolResult<Session> {
        let timeout = self.shared.config.connect_timeout;
        match tokio::time::timeout(timeout, self.shared.connector.connect()).await {
            Ok(Ok(session)) => Ok(session),
            Ok(Err(e)) => Err(PoolError::Unavailable(e.to_string())),
            Err(_) => Err(PoolError::Unavailable(format!(
                "timed out after {:?} opening a session",
                timeout
            ))),
        }
    }
}

impl std::fmt::Debug for ConnectionPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionPool")
            .field("config", &self.shared.config)
            .field("stats", &self.stats())
            .finish_non_exhaustive()
    }
}

/// A checked-out connection.
///
/// Dereferences to the session. Returned to the pool when dropped or
/// explicitly released, on every exit path of the holder.
pub struct PooledConnection {
    id: u64,
    session: Option<Session>,
    permit: Option<OwnedSemaphorePermit>,
    broken: bool,
    pool: Arc<PoolShared>,
}

impl PooledConnection {
    /// Checkout id, unique within the pool
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Discard the session instead of pooling it on release.
    pub fn mark_broken(&mut self) {
        self.broken = true;
    }

    /// Return the connection, closing the session if it is being discarded.
    pub async fn release(mut self) -> PoolResult<()> {
        let Some(session) = self.session.take() else {
            return Ok(());
        };
        let result = self.pool.check_in(self.id, session, self.broken);
        // Capacity is handed back only after the session is pooled
        self.permit.take();

        match result {
            Ok(Some(mut discarded)) => {
                discarded.close().await;
                Ok(())
            }
            Ok(None) => Ok(()),
            Err(e) => Err(e),
        }
    }
}

impl Deref for PooledConnection {
    type Target = dyn UserRepository;

    fn deref(&self) -> &Self::Target {
        self.session
            .as_deref()
            .expect("session is present until the connection is released")
    }
}

impl DerefMut for PooledConnection {
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.session
            .as_deref_mut()
            .expect("session is present until the connection is released")
    }
}

impl Drop for PooledConnection {
    fn drop(&mut self) {
        if let Some(session) = self.session.take() {
            // Discarded sessions are dropped without a graceful close here
            let _ = self.pool.check_in(self.id, session, self.broken);
        }
        self.permit.take();
    }
}

impl std::fmt::Debug for PooledConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PooledConnection")
            .field("id", &self.id)
            .field("broken", &self.broken)
            .finish_non_exhaustive()
    }
}
