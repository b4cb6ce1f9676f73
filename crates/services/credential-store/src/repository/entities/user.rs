//! User database entity for SeaORM.
//!
//! Mirrors `users(username TEXT UNIQUE, password TEXT, image_index INTEGER)`.

use sea_orm::entity::prelude::*;

use domain::UserRecord;

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "users")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub username: String,
    /// Password hash (the column keeps its historical name)
    pub password: String,
    pub image_index: i32,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}

/// Convert database model to domain record
impl From<Model> for UserRecord {
    fn from(model: Model) -> Self {
        UserRecord {
            username: model.username,
            password_hash: model.password,
            image_index: model.image_index,
        }
    }
}
