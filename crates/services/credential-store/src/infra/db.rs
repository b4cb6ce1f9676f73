//! Postgres session factory.

use async_trait::async_trait;
use sea_orm::{ConnectOptions, Database};

use super::{Connector, Session};
use crate::repository::UserStore;
use common::{DatabaseConfig, StoreError, StoreResult};

/// Opens Postgres sessions through SeaORM.
///
/// Each session is a SeaORM connection capped at one physical connection;
/// the pool above decides how many exist.
#[derive(Clone)]
pub struct PgConnector {
    config: DatabaseConfig,
    options: ConnectOptions,
}

impl PgConnector {
    pub fn new(config: DatabaseConfig, connect_timeout: std::time::Duration) -> Self {
        let mut options = ConnectOptions::new(config.connection_url());
        options
            .max_connections(1)
            .min_connections(1)
            .connect_timeout(connect_timeout)
            .acquire_timeout(connect_timeout)
            .sqlx_logging(false);

        Self { config, options }
    }
}

impl std::fmt::Debug for PgConnector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PgConnector")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl Connector for PgConnector {
    async fn connect(&self) -> StoreResult<Session> {
        let connection = Database::connect(self.options.clone())
            .await
            .map_err(|e| StoreError::connection_unavailable(e.to_string()))?;

        tracing::debug!(target_db = %self.config.target(), "opened database session");
        Ok(Box::new(UserStore::new(connection)))
    }

    fn describe(&self) -> String {
        self.config.target()
    }
}
