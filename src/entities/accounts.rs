use sea_orm::entity::prelude::*;

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "accounts")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,

    /// Stored lowercase; compared case-insensitively.
    #[sea_orm(unique)]
    pub username: String,

    #[sea_orm(unique)]
    pub email: String,

    /// Argon2id password hash
    pub password_hash: String,

    /// "admin" | "user"
    pub role: String,

    /// "active" | "temp_blocked" | "inactive"
    pub status: String,

    pub failed_attempts: i32,

    /// Unix seconds; non-null only while status is "temp_blocked".
    pub locked_until: Option<i64>,

    /// Optimistic concurrency token, bumped on every mutation.
    pub version: i32,

    pub created_at: String,

    pub updated_at: String,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
