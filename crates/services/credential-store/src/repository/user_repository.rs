//! User credential repository backed by one live database session.

use async_trait::async_trait;
use sea_orm::{DatabaseConnection, EntityTrait, Set};

use super::entities::{UserActiveModel, UserEntity};
use common::{StoreError, StoreResult};
use domain::UserRecord;

#[cfg(any(test, feature = "test-utils"))]
use mockall::automock;

/// One live database session exposing the credential queries.
///
/// A value of this trait is what the pool hands out: it is owned by exactly
/// one operation at a time, hence `&mut self` throughout.
#[cfg_attr(any(test, feature = "test-utils"), automock)]
#[async_trait]
pub trait UserRepository: Send {
    /// Insert a new user row. A duplicate username yields `StoreError::Conflict`.
    async fn insert_user(&mut self, record: &UserRecord) -> StoreResult<()>;

    /// Stored password hash for `username`, if the user exists
    async fn find_password_hash(&mut self, username: &str) -> StoreResult<Option<String>>;

    /// Round-trip to the server
    async fn ping(&mut self) -> StoreResult<()>;

    /// Close the underlying session
    async fn close(&mut self);
}

/// SeaORM implementation of UserRepository.
///
/// Wraps a connection opened with a single physical connection, so each
/// `UserStore` is one database session. All statements go through the query
/// builder with bound parameters.
pub struct UserStore {
    db: DatabaseConnection,
}

impl UserStore {
    /// Create new repository instance over an open session
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }
}

#[async_trait]
impl UserRepository for UserStore {
    async fn insert_user(&mut self, record: &UserRecord) -> StoreResult<()> {
        let active_model = UserActiveModel {
            username: Set(record.username.clone()),
            password: Set(record.password_hash.clone()),
            image_index: Set(record.image_index),
        };

        UserEntity::insert(active_model)
            .exec_without_returning(&self.db)
            .await
            .map_err(StoreError::from)?;
        Ok(())
    }

    async fn find_password_hash(&mut self, username: &str) -> StoreResult<Option<String>> {
        let result = UserEntity::find_by_id(username.to_owned())
            .one(&self.db)
            .await
            .map_err(StoreError::from)?;

        Ok(result.map(|model| model.password))
    }

    async fn ping(&mut self) -> StoreResult<()> {
        self.db.ping().await.map_err(StoreError::from)
    }

    async fn close(&mut self) {
        if matches!(self.db, DatabaseConnection::Disconnected) {
            return;
        }
        let db = std::mem::replace(&mut self.db, DatabaseConnection::Disconnected);
        if let Err(e) = db.close().await {
            tracing::warn!(error = %e, "failed to close database session cleanly");
        }
    }
}
