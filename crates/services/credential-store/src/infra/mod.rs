//! Infrastructure layer - database sessions and the connection pool.

mod db;
#[cfg(any(test, feature = "test-utils"))]
pub mod memory;
pub mod pool;

use async_trait::async_trait;

use crate::repository::UserRepository;
use common::StoreResult;

#[cfg(any(test, feature = "test-utils"))]
use mockall::automock;

pub use db::PgConnector;
#[cfg(any(test, feature = "test-utils"))]
pub use memory::{MemoryConnector, MemoryStore};
pub use pool::{ConnectionPool, PoolError, PoolResult, PoolStats, PooledConnection, StartupReport};

/// A boxed live session as handed out by the pool.
pub type Session = Box<dyn UserRepository>;

/// Opens new database sessions on demand.
#[cfg_attr(any(test, feature = "test-utils"), automock)]
#[async_trait]
pub trait Connector: Send + Sync {
    /// Establish one new session
    async fn connect(&self) -> StoreResult<Session>;

    /// Human-readable target for log output (never includes credentials)
    fn describe(&self) -> String;
}
