use crate::entities::prelude::*;
use sea_orm_migration::prelude::*;
use sea_orm_migration::sea_orm::Schema;

#[derive(DeriveMigrationName)]
pub struct Migration;

/// Bootstrap credential for the protected superuser. Expected to be rotated
/// through the password-change endpoint after first login.
const DEFAULT_ADMIN_PASSWORD: &str = "Admin12345*";

fn hash_default_password() -> String {
    use argon2::{
        Argon2,
        password_hash::{PasswordHasher, SaltString, rand_core::OsRng},
    };

    let salt = SaltString::generate(&mut OsRng);
    let argon2 = Argon2::default();

    argon2
        .hash_password(DEFAULT_ADMIN_PASSWORD.as_bytes(), &salt)
        .expect("Failed to hash default admin password")
        .to_string()
}

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        let backend = manager.get_database_backend();
        let schema = Schema::new(backend);

        manager
            .create_table(
                schema
                    .create_table_from_entity(Accounts)
                    .if_not_exists()
                    .to_owned(),
            )
            .await?;

        // Seed the reserved superuser. It is always active and always admin;
        // the service layer rejects any mutation of its role, status, or
        // username.
        let now = chrono::Utc::now().to_rfc3339();
        let password_hash = hash_default_password();

        let insert = sea_orm_migration::sea_query::Query::insert()
            .into_table(Accounts)
            .columns([
                crate::entities::accounts::Column::Username,
                crate::entities::accounts::Column::Email,
                crate::entities::accounts::Column::PasswordHash,
                crate::entities::accounts::Column::Role,
                crate::entities::accounts::Column::Status,
                crate::entities::accounts::Column::FailedAttempts,
                crate::entities::accounts::Column::Version,
                crate::entities::accounts::Column::CreatedAt,
                crate::entities::accounts::Column::UpdatedAt,
            ])
            .values_panic([
                "admin".into(),
                "admin@localhost".into(),
                password_hash.into(),
                "admin".into(),
                "active".into(),
                0.into(),
                0.into(),
                now.clone().into(),
                now.into(),
            ])
            .to_owned();

        manager.exec_stmt(insert).await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(Accounts).to_owned())
            .await
    }
}
