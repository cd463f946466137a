//! Domain service for credential verification and login gating.
//!
//! The user-facing failure messages deliberately collapse "unknown
//! identifier" and "wrong password" into one generic error; the audit trail
//! keeps the real cause.

use thiserror::Error;

use crate::models::{Account, Principal};
use crate::services::audit::RequestMeta;

/// Errors specific to authentication operations.
#[derive(Debug, Error)]
pub enum AuthError {
    /// Unknown identifier OR wrong password; deliberately merged so the
    /// error cannot be used to enumerate accounts.
    #[error("Credenciales inválidas")]
    InvalidCredentials,

    #[error("Cuenta desactivada. Contacte al administrador.")]
    AccountInactive,

    #[error("Cuenta bloqueada temporalmente. Intente más tarde.")]
    AccountLocked { remaining_seconds: u64 },

    #[error("Validation failed: {0}")]
    Validation(String),

    /// A concurrent update won twice in a row; the caller may retry.
    #[error("Conflicto transitorio, intente nuevamente")]
    Conflict,

    #[error("Database error: {0}")]
    Database(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<sea_orm::DbErr> for AuthError {
    fn from(err: sea_orm::DbErr) -> Self {
        Self::Database(err.to_string())
    }
}

impl From<anyhow::Error> for AuthError {
    fn from(err: anyhow::Error) -> Self {
        Self::Internal(err.to_string())
    }
}

/// Domain service trait for authentication.
#[async_trait::async_trait]
pub trait AuthService: Send + Sync {
    /// Verifies credentials against the account's security state.
    ///
    /// Runs the expired-lock sweep first, so every login attempt is an
    /// opportunity to self-heal stale locks. A wrong password always yields
    /// [`AuthError::InvalidCredentials`], whatever the account's status; a
    /// *correct* password against an inactive or locked account yields the
    /// specific failure.
    async fn authenticate(
        &self,
        identifier: &str,
        secret: &str,
        meta: &RequestMeta,
    ) -> Result<Account, AuthError>;

    /// Changes the principal's password after re-verifying the current one.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::Validation`] if the current password is wrong or
    /// the new password is unacceptable.
    async fn change_password(
        &self,
        principal: &Principal,
        current_password: &str,
        new_password: &str,
        meta: &RequestMeta,
    ) -> Result<(), AuthError>;
}
