use anyhow::{Context, Result};
use argon2::{
    Algorithm, Argon2, Params, Version,
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString, rand_core::OsRng},
};
use chrono::{DateTime, Utc};
use sea_orm::sea_query::{Expr, Func};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, Condition, DatabaseConnection, EntityTrait, QueryFilter, Set,
};

use crate::config::SecurityConfig;
use crate::entities::accounts;
use crate::models::{Account, AccountStatus, Role, normalize_identifier};
use crate::services::lockout::LockoutPolicy;

/// Input for seeding/bootstrap account creation. The password is hashed
/// here; identifiers are normalized before storage.
#[derive(Debug, Clone)]
pub struct NewAccount {
    pub username: String,
    pub email: String,
    pub password: String,
    pub role: Role,
}

pub struct AccountRepository {
    conn: DatabaseConnection,
}

impl AccountRepository {
    #[must_use]
    pub const fn new(conn: DatabaseConnection) -> Self {
        Self { conn }
    }

    fn identifier_condition(identifier: &str) -> Condition {
        Condition::any()
            .add(Expr::expr(Func::lower(Expr::col(accounts::Column::Username))).eq(identifier))
            .add(Expr::expr(Func::lower(Expr::col(accounts::Column::Email))).eq(identifier))
    }

    /// Find by normalized username OR email (case-insensitive).
    pub async fn get_by_identifier(&self, identifier: &str) -> Result<Option<Account>> {
        let account = accounts::Entity::find()
            .filter(Self::identifier_condition(identifier))
            .one(&self.conn)
            .await
            .context("Failed to query account by identifier")?;

        Ok(account.map(Account::from))
    }

    /// Same lookup, but also hands back the stored credential hash for the
    /// verifier. The hash never leaves the authentication path.
    pub async fn get_by_identifier_with_hash(
        &self,
        identifier: &str,
    ) -> Result<Option<(Account, String)>> {
        let account = accounts::Entity::find()
            .filter(Self::identifier_condition(identifier))
            .one(&self.conn)
            .await
            .context("Failed to query account by identifier")?;

        Ok(account.map(|model| {
            let password_hash = model.password_hash.clone();
            (Account::from(model), password_hash)
        }))
    }

    pub async fn get_by_id(&self, id: i32) -> Result<Option<Account>> {
        let account = accounts::Entity::find_by_id(id)
            .one(&self.conn)
            .await
            .context("Failed to query account by ID")?;

        Ok(account.map(Account::from))
    }

    pub async fn get_hash_by_id(&self, id: i32) -> Result<Option<String>> {
        let account = accounts::Entity::find_by_id(id)
            .one(&self.conn)
            .await
            .context("Failed to query account for password verification")?;

        Ok(account.map(|model| model.password_hash))
    }

    pub async fn create(
        &self,
        new: NewAccount,
        config: Option<&SecurityConfig>,
        now: DateTime<Utc>,
    ) -> Result<Account> {
        let username = normalize_identifier(&new.username);
        let email = normalize_identifier(&new.email);

        let password = new.password;
        let config = config.cloned();
        let password_hash =
            tokio::task::spawn_blocking(move || hash_password(&password, config.as_ref()))
                .await
                .context("Password hashing task panicked")??;

        let model = accounts::ActiveModel {
            username: Set(username),
            email: Set(email),
            password_hash: Set(password_hash),
            role: Set(new.role.as_str().to_string()),
            status: Set(AccountStatus::ACTIVE_TAG.to_string()),
            failed_attempts: Set(0),
            locked_until: Set(None),
            version: Set(0),
            created_at: Set(now.to_rfc3339()),
            updated_at: Set(now.to_rfc3339()),
            ..Default::default()
        };

        let inserted = model
            .insert(&self.conn)
            .await
            .context("Failed to insert account")?;

        Ok(Account::from(inserted))
    }

    /// Records one failed attempt as a single conditional UPDATE guarded by
    /// the version token, so two concurrent failures cannot both observe the
    /// same pre-lock count. At the policy threshold the same statement flips
    /// the account to temp_blocked with its expiry.
    ///
    /// Returns `Ok(None)` when the guard missed (concurrent writer won); the
    /// caller re-reads and retries once before giving up.
    pub async fn record_failure(
        &self,
        account: &Account,
        policy: &LockoutPolicy,
        now: DateTime<Utc>,
    ) -> Result<Option<Account>> {
        let attempts_after = account.failed_attempts + 1;
        let lock_until = policy.lock_until_after(attempts_after, now);

        let mut update = accounts::Entity::update_many()
            .col_expr(
                accounts::Column::FailedAttempts,
                Expr::value(i32::try_from(attempts_after).unwrap_or(i32::MAX)),
            )
            .col_expr(accounts::Column::Version, Expr::value(account.version + 1))
            .col_expr(accounts::Column::UpdatedAt, Expr::value(now.to_rfc3339()));

        if let Some(until) = lock_until {
            update = update
                .col_expr(
                    accounts::Column::Status,
                    Expr::value(AccountStatus::TEMP_BLOCKED_TAG),
                )
                .col_expr(accounts::Column::LockedUntil, Expr::value(until.timestamp()));
        }

        let result = update
            .filter(accounts::Column::Id.eq(account.id))
            .filter(accounts::Column::Version.eq(account.version))
            .exec(&self.conn)
            .await
            .context("Failed to record failed attempt")?;

        if result.rows_affected == 0 {
            return Ok(None);
        }

        self.get_by_id(account.id).await
    }

    /// Resets an account to active with zero failed attempts and no lock,
    /// guarded by the version token. Shared by successful authentication,
    /// administrative unlock, and reactivation.
    pub async fn reset_to_active(
        &self,
        account: &Account,
        now: DateTime<Utc>,
    ) -> Result<Option<Account>> {
        let result = accounts::Entity::update_many()
            .col_expr(accounts::Column::FailedAttempts, Expr::value(0))
            .col_expr(
                accounts::Column::Status,
                Expr::value(AccountStatus::ACTIVE_TAG),
            )
            .col_expr(accounts::Column::LockedUntil, Expr::value(Option::<i64>::None))
            .col_expr(accounts::Column::Version, Expr::value(account.version + 1))
            .col_expr(accounts::Column::UpdatedAt, Expr::value(now.to_rfc3339()))
            .filter(accounts::Column::Id.eq(account.id))
            .filter(accounts::Column::Version.eq(account.version))
            .exec(&self.conn)
            .await
            .context("Failed to reset account to active")?;

        if result.rows_affected == 0 {
            return Ok(None);
        }

        self.get_by_id(account.id).await
    }

    /// Administrative hard-stop. The lock timestamp is cleared so the
    /// status/lock pairing invariant holds; failed attempts are preserved.
    pub async fn set_inactive(
        &self,
        account: &Account,
        now: DateTime<Utc>,
    ) -> Result<Option<Account>> {
        let result = accounts::Entity::update_many()
            .col_expr(
                accounts::Column::Status,
                Expr::value(AccountStatus::INACTIVE_TAG),
            )
            .col_expr(accounts::Column::LockedUntil, Expr::value(Option::<i64>::None))
            .col_expr(accounts::Column::Version, Expr::value(account.version + 1))
            .col_expr(accounts::Column::UpdatedAt, Expr::value(now.to_rfc3339()))
            .filter(accounts::Column::Id.eq(account.id))
            .filter(accounts::Column::Version.eq(account.version))
            .exec(&self.conn)
            .await
            .context("Failed to deactivate account")?;

        if result.rows_affected == 0 {
            return Ok(None);
        }

        self.get_by_id(account.id).await
    }

    /// Releases every lock whose expiry has passed, in one bulk conditional
    /// UPDATE. Idempotent; safe to run on every inbound login attempt.
    pub async fn sweep_expired_locks(&self, now: DateTime<Utc>) -> Result<u64> {
        let result = accounts::Entity::update_many()
            .col_expr(
                accounts::Column::Status,
                Expr::value(AccountStatus::ACTIVE_TAG),
            )
            .col_expr(accounts::Column::FailedAttempts, Expr::value(0))
            .col_expr(accounts::Column::LockedUntil, Expr::value(Option::<i64>::None))
            .col_expr(accounts::Column::Version, Expr::cust("version + 1"))
            .col_expr(accounts::Column::UpdatedAt, Expr::value(now.to_rfc3339()))
            .filter(accounts::Column::Status.eq(AccountStatus::TEMP_BLOCKED_TAG))
            .filter(accounts::Column::LockedUntil.lte(now.timestamp()))
            .exec(&self.conn)
            .await
            .context("Failed to sweep expired locks")?;

        Ok(result.rows_affected)
    }

    /// Administrative override: releases all temp-blocked accounts whether
    /// or not their locks have expired.
    pub async fn unlock_all(&self, now: DateTime<Utc>) -> Result<u64> {
        let result = accounts::Entity::update_many()
            .col_expr(
                accounts::Column::Status,
                Expr::value(AccountStatus::ACTIVE_TAG),
            )
            .col_expr(accounts::Column::FailedAttempts, Expr::value(0))
            .col_expr(accounts::Column::LockedUntil, Expr::value(Option::<i64>::None))
            .col_expr(accounts::Column::Version, Expr::cust("version + 1"))
            .col_expr(accounts::Column::UpdatedAt, Expr::value(now.to_rfc3339()))
            .filter(accounts::Column::Status.eq(AccountStatus::TEMP_BLOCKED_TAG))
            .exec(&self.conn)
            .await
            .context("Failed to unlock accounts")?;

        Ok(result.rows_affected)
    }

    pub async fn update_password(
        &self,
        id: i32,
        new_password: &str,
        config: Option<&SecurityConfig>,
        now: DateTime<Utc>,
    ) -> Result<()> {
        let password = new_password.to_string();
        let config = config.cloned();
        let new_hash =
            tokio::task::spawn_blocking(move || hash_password(&password, config.as_ref()))
                .await
                .context("Password hashing task panicked")??;

        let result = accounts::Entity::update_many()
            .col_expr(accounts::Column::PasswordHash, Expr::value(new_hash))
            .col_expr(accounts::Column::Version, Expr::cust("version + 1"))
            .col_expr(accounts::Column::UpdatedAt, Expr::value(now.to_rfc3339()))
            .filter(accounts::Column::Id.eq(id))
            .exec(&self.conn)
            .await
            .context("Failed to update password")?;

        anyhow::ensure!(result.rows_affected == 1, "Account not found: {id}");

        Ok(())
    }
}

/// Hash a password using Argon2id with optional custom params.
pub fn hash_password(password: &str, config: Option<&SecurityConfig>) -> Result<String> {
    let salt = SaltString::generate(&mut OsRng);

    let argon2 = if let Some(cfg) = config {
        let params = Params::new(
            cfg.argon2_memory_cost_kib,
            cfg.argon2_time_cost,
            cfg.argon2_parallelism,
            None,
        )
        .map_err(|e| anyhow::anyhow!("Invalid Argon2 params: {e}"))?;
        Argon2::new(Algorithm::Argon2id, Version::V0x13, params)
    } else {
        Argon2::default()
    };

    let hash = argon2
        .hash_password(password.as_bytes(), &salt)
        .map_err(|e| anyhow::anyhow!("Failed to hash password: {e}"))?;

    Ok(hash.to_string())
}

/// Constant-time-safe verification through the argon2 verifier. CPU-heavy;
/// callers run this inside `spawn_blocking`.
pub fn verify_password(hash: &str, password: &str) -> Result<bool> {
    let parsed_hash =
        PasswordHash::new(hash).map_err(|e| anyhow::anyhow!("Invalid password hash format: {e}"))?;

    Ok(Argon2::default()
        .verify_password(password.as_bytes(), &parsed_hash)
        .is_ok())
}
