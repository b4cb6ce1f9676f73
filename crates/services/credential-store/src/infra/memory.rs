//! In-process session backend.
//!
//! Behaves like the `users` table (unique usernames, hash column) without a
//! server. Only built for tests and the `test-utils` feature; it can
//! simulate outages, slow queries and failed connection attempts.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;

use super::{Connector, Session};
use crate::repository::UserRepository;
use common::{StoreError, StoreResult};
use domain::UserRecord;

#[derive(Default)]
struct MemoryShared {
    users: Mutex<HashMap<String, UserRecord>>,
    /// Session ids with a statement in flight
    in_flight: Mutex<HashSet<u64>>,
    max_in_flight: AtomicUsize,
    overlap_detected: AtomicBool,
    next_session: AtomicU64,
    opened: AtomicU64,
    closed: AtomicU64,
    unreachable: AtomicBool,
    failing_connects: AtomicU32,
    connect_attempts: AtomicU32,
    query_delay: Mutex<Duration>,
}

/// Connector producing `MemoryStore` sessions over one shared table.
#[derive(Clone, Default)]
pub struct MemoryConnector {
    shared: Arc<MemoryShared>,
}

impl MemoryConnector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Delay every statement, to hold sessions checked out for a while.
    pub fn with_query_delay(self, delay: Duration) -> Self {
        *self.shared.query_delay.lock() = delay;
        self
    }

    /// Simulate the server going away (or coming back).
    ///
    /// While unreachable, new connections and statements on open sessions
    /// fail with `StoreError::ConnectionUnavailable`.
    pub fn set_reachable(&self, reachable: bool) {
        self.shared.unreachable.store(!reachable, Ordering::SeqCst);
    }

    /// Make the next `count` connection attempts fail.
    pub fn fail_next_connects(&self, count: u32) {
        self.shared.failing_connects.store(count, Ordering::SeqCst);
    }

    pub fn connect_attempts(&self) -> u32 {
        self.shared.connect_attempts.load(Ordering::SeqCst)
    }

    pub fn sessions_opened(&self) -> u64 {
        self.shared.opened.load(Ordering::SeqCst)
    }

    pub fn sessions_closed(&self) -> u64 {
        self.shared.closed.load(Ordering::SeqCst)
    }

    /// Highest number of statements that ran at the same time.
    pub fn max_concurrent_queries(&self) -> usize {
        self.shared.max_in_flight.load(Ordering::SeqCst)
    }

    /// True if one session ever ran two statements at once.
    pub fn overlapping_use_detected(&self) -> bool {
        self.shared.overlap_detected.load(Ordering::SeqCst)
    }

    pub fn user(&self, username: &str) -> Option<UserRecord> {
        self.shared.users.lock().get(username).cloned()
    }

    pub fn user_count(&self) -> usize {
        self.shared.users.lock().len()
    }
}

#[async_trait]
impl Connector for MemoryConnector {
    async fn connect(&self) -> StoreResult<Session> {
        self.shared.connect_attempts.fetch_add(1, Ordering::SeqCst);

        let scripted_failure = self
            .shared
            .failing_connects
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if scripted_failure || self.shared.unreachable.load(Ordering::SeqCst) {
            return Err(StoreError::connection_unavailable("connection refused"));
        }

        let id = self.shared.next_session.fetch_add(1, Ordering::SeqCst) + 1;
        self.shared.opened.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(MemoryStore {
            id,
            shared: Arc::clone(&self.shared),
            closed: false,
        }))
    }

    fn describe(&self) -> String {
        "memory".to_string()
    }
}

/// One in-memory session.
pub struct MemoryStore {
    id: u64,
    shared: Arc<MemoryShared>,
    closed: bool,
}

impl MemoryStore {
    async fn statement<T>(&self, run: impl FnOnce(&MemoryShared) -> StoreResult<T>) -> StoreResult<T> {
        if self.closed {
            return Err(StoreError::connection_unavailable("session closed"));
        }
        if self.shared.unreachable.load(Ordering::SeqCst) {
            return Err(StoreError::connection_unavailable("connection reset by peer"));
        }

        {
            let mut in_flight = self.shared.in_flight.lock();
            if !in_flight.insert(self.id) {
                self.shared.overlap_detected.store(true, Ordering::SeqCst);
            }
            self.shared
                .max_in_flight
                .fetch_max(in_flight.len(), Ordering::SeqCst);
        }

        let delay = *self.shared.query_delay.lock();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        let result = run(self.shared.as_ref());
        self.shared.in_flight.lock().remove(&self.id);
        result
    }
}

#[async_trait]
impl UserRepository for MemoryStore {
    async fn insert_user(&mut self, record: &UserRecord) -> StoreResult<()> {
        self.statement(|shared| {
            let mut users = shared.users.lock();
            if users.contains_key(&record.username) {
                return Err(StoreError::conflict(format!("user {}", record.username)));
            }
            users.insert(record.username.clone(), record.clone());
            Ok(())
        })
        .await
    }

    async fn find_password_hash(&mut self, username: &str) -> StoreResult<Option<String>> {
        self.statement(|shared| {
            Ok(shared
                .users
                .lock()
                .get(username)
                .map(|user| user.password_hash.clone()))
        })
        .await
    }

    async fn ping(&mut self) -> StoreResult<()> {
        self.statement(|_| Ok(())).await
    }

    async fn close(&mut self) {
        if !self.closed {
            self.closed = true;
            self.shared.closed.fetch_add(1, Ordering::SeqCst);
        }
    }
}
