use anyhow::Result;
use chrono::{DateTime, Utc};
use sea_orm::{ConnectOptions, ConnectionTrait, Database, DatabaseConnection, Statement};
use std::path::Path;
use std::time::Duration;
use tracing::info;

use crate::config::SecurityConfig;
use crate::models::Account;
use crate::services::lockout::LockoutPolicy;

pub mod migrator;
pub mod repositories;

pub use repositories::account::NewAccount;

#[derive(Clone)]
pub struct Store {
    pub conn: DatabaseConnection,
}

impl Store {
    pub async fn new(db_url: &str) -> Result<Self> {
        Self::with_pool_options(db_url, 5, 1).await
    }

    pub async fn with_pool_options(
        db_url: &str,
        max_connections: u32,
        min_connections: u32,
    ) -> Result<Self> {
        use sea_orm_migration::MigratorTrait;

        if !db_url.starts_with(":memory:") && !db_url.contains("::memory:") {
            let path_str = db_url.trim_start_matches("sqlite:");
            if let Some(parent) = Path::new(path_str).parent() {
                tokio::fs::create_dir_all(parent).await.ok();
            }
            if !Path::new(path_str).exists() {
                std::fs::File::create(path_str)?;
            }
        }

        let mut opt = ConnectOptions::new(db_url.to_string());
        opt.max_connections(max_connections)
            .min_connections(min_connections)
            .connect_timeout(Duration::from_secs(10))
            .acquire_timeout(Duration::from_secs(10))
            .idle_timeout(Duration::from_secs(300))
            .max_lifetime(Duration::from_secs(600))
            .sqlx_logging(false);

        let conn = Database::connect(opt).await?;

        migrator::Migrator::up(&conn, None).await?;

        info!(
            "Database connected & migrations applied (pool: {}-{})",
            min_connections, max_connections
        );

        Ok(Self { conn })
    }

    pub async fn ping(&self) -> Result<()> {
        let backend = self.conn.get_database_backend();
        self.conn
            .query_one(Statement::from_string(backend, "SELECT 1".to_string()))
            .await?;
        Ok(())
    }

    #[must_use]
    pub fn account_repo(&self) -> repositories::account::AccountRepository {
        repositories::account::AccountRepository::new(self.conn.clone())
    }

    pub async fn get_account_by_identifier(&self, identifier: &str) -> Result<Option<Account>> {
        self.account_repo().get_by_identifier(identifier).await
    }

    pub async fn get_account_by_identifier_with_hash(
        &self,
        identifier: &str,
    ) -> Result<Option<(Account, String)>> {
        self.account_repo()
            .get_by_identifier_with_hash(identifier)
            .await
    }

    pub async fn get_account_by_id(&self, id: i32) -> Result<Option<Account>> {
        self.account_repo().get_by_id(id).await
    }

    pub async fn get_account_hash(&self, id: i32) -> Result<Option<String>> {
        self.account_repo().get_hash_by_id(id).await
    }

    pub async fn create_account(
        &self,
        new: NewAccount,
        config: Option<&SecurityConfig>,
    ) -> Result<Account> {
        self.account_repo().create(new, config, Utc::now()).await
    }

    pub async fn record_failure(
        &self,
        account: &Account,
        policy: &LockoutPolicy,
        now: DateTime<Utc>,
    ) -> Result<Option<Account>> {
        self.account_repo().record_failure(account, policy, now).await
    }

    pub async fn reset_to_active(
        &self,
        account: &Account,
        now: DateTime<Utc>,
    ) -> Result<Option<Account>> {
        self.account_repo().reset_to_active(account, now).await
    }

    pub async fn set_account_inactive(
        &self,
        account: &Account,
        now: DateTime<Utc>,
    ) -> Result<Option<Account>> {
        self.account_repo().set_inactive(account, now).await
    }

    pub async fn sweep_expired_locks(&self, now: DateTime<Utc>) -> Result<u64> {
        self.account_repo().sweep_expired_locks(now).await
    }

    pub async fn unlock_all_accounts(&self, now: DateTime<Utc>) -> Result<u64> {
        self.account_repo().unlock_all(now).await
    }

    pub async fn update_account_password(
        &self,
        id: i32,
        new_password: &str,
        config: Option<&SecurityConfig>,
    ) -> Result<()> {
        self.account_repo()
            .update_password(id, new_password, config, Utc::now())
            .await
    }
}
