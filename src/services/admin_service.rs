//! Administrative account management: manual unlocks and activation toggles.
//!
//! The reserved superuser is immutable through this service; every mutation
//! against it is rejected and audited.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::clock::Clock;
use crate::db::Store;
use crate::models::{Account, AccountStatus, Principal, normalize_identifier};
use crate::services::audit::{AuditEvent, AuditSink, RequestMeta};

#[derive(Debug, Error)]
pub enum AdminError {
    #[error("Usuario no encontrado")]
    NotFound,

    #[error("No se puede modificar el usuario administrador especial")]
    ProtectedAccount,

    #[error("Conflicto transitorio, intente nuevamente")]
    Conflict,

    #[error("Database error: {0}")]
    Database(String),
}

impl From<anyhow::Error> for AdminError {
    fn from(err: anyhow::Error) -> Self {
        Self::Database(err.to_string())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnlockOutcome {
    Unlocked,
    /// The account had neither an active lock nor accumulated failures.
    NotLocked,
}

pub struct AdminService {
    store: Store,
    audit: Arc<dyn AuditSink>,
    clock: Arc<dyn Clock>,
}

impl AdminService {
    #[must_use]
    pub fn new(store: Store, audit: Arc<dyn AuditSink>, clock: Arc<dyn Clock>) -> Self {
        Self { store, audit, clock }
    }

    async fn reset_with_retry(
        &self,
        account: &Account,
        now: DateTime<Utc>,
    ) -> Result<Account, AdminError> {
        if let Some(updated) = self.store.reset_to_active(account, now).await? {
            return Ok(updated);
        }

        let fresh = self
            .store
            .get_account_by_id(account.id)
            .await?
            .ok_or(AdminError::NotFound)?;

        match self.store.reset_to_active(&fresh, now).await? {
            Some(updated) => Ok(updated),
            None => Err(AdminError::Conflict),
        }
    }

    /// Clears the lock and failure counter of a single account.
    pub async fn unlock(
        &self,
        identifier: &str,
        by: &Principal,
        meta: &RequestMeta,
    ) -> Result<UnlockOutcome, AdminError> {
        let identifier = normalize_identifier(identifier);
        let account = self
            .store
            .get_account_by_identifier(&identifier)
            .await?
            .ok_or(AdminError::NotFound)?;

        let locked = matches!(account.status, AccountStatus::TempBlocked { .. });
        if !locked && account.failed_attempts == 0 {
            return Ok(UnlockOutcome::NotLocked);
        }

        // Deactivated accounts keep their status; unlocking only releases
        // the failure state, it never reactivates.
        if account.status == AccountStatus::Inactive {
            return Ok(UnlockOutcome::NotLocked);
        }

        let account = self.reset_with_retry(&account, self.clock.now()).await?;
        self.audit.record(
            &AuditEvent::AccountUnlocked {
                username: account.username.clone(),
                by: by.username.clone(),
            },
            meta,
        );

        Ok(UnlockOutcome::Unlocked)
    }

    /// Releases every temporary lock, expired or not.
    pub async fn unlock_all(
        &self,
        by: &Principal,
        meta: &RequestMeta,
    ) -> Result<u64, AdminError> {
        let released = self.store.unlock_all_accounts(self.clock.now()).await?;
        if released > 0 {
            self.audit.record(
                &AuditEvent::AccountUnlocked {
                    username: "*".to_string(),
                    by: by.username.clone(),
                },
                meta,
            );
        }
        Ok(released)
    }

    pub async fn deactivate(
        &self,
        account_id: i32,
        by: &Principal,
        meta: &RequestMeta,
    ) -> Result<Account, AdminError> {
        let account = self
            .store
            .get_account_by_id(account_id)
            .await?
            .ok_or(AdminError::NotFound)?;

        if account.is_protected() {
            self.audit.record(
                &AuditEvent::ProtectedAccountRejected {
                    operation: "deactivate",
                    by: by.username.clone(),
                },
                meta,
            );
            return Err(AdminError::ProtectedAccount);
        }

        let now = self.clock.now();
        let updated = if let Some(updated) = self.store.set_account_inactive(&account, now).await? {
            updated
        } else {
            let fresh = self
                .store
                .get_account_by_id(account.id)
                .await?
                .ok_or(AdminError::NotFound)?;
            self.store
                .set_account_inactive(&fresh, now)
                .await?
                .ok_or(AdminError::Conflict)?
        };

        self.audit.record(
            &AuditEvent::AccountDeactivated {
                account_id: updated.id,
                by: by.username.clone(),
            },
            meta,
        );

        Ok(updated)
    }

    pub async fn activate(
        &self,
        account_id: i32,
        by: &Principal,
        meta: &RequestMeta,
    ) -> Result<Account, AdminError> {
        let account = self
            .store
            .get_account_by_id(account_id)
            .await?
            .ok_or(AdminError::NotFound)?;

        if account.is_protected() {
            self.audit.record(
                &AuditEvent::ProtectedAccountRejected {
                    operation: "activate",
                    by: by.username.clone(),
                },
                meta,
            );
            return Err(AdminError::ProtectedAccount);
        }

        let updated = self.reset_with_retry(&account, self.clock.now()).await?;
        self.audit.record(
            &AuditEvent::AccountActivated {
                account_id: updated.id,
                by: by.username.clone(),
            },
            meta,
        );

        Ok(updated)
    }
}
