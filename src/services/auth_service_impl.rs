//! `Store`-backed implementation of the `AuthService` trait.

use std::sync::{Arc, OnceLock};

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::clock::Clock;
use crate::config::SecurityConfig;
use crate::db::Store;
use crate::db::repositories::account::{hash_password, verify_password};
use crate::models::{Account, AccountStatus, Principal, normalize_identifier};
use crate::services::audit::{AuditEvent, AuditSink, FailureCause, RequestMeta};
use crate::services::auth_service::{AuthError, AuthService};
use crate::services::lockout::LockoutPolicy;

/// Hash verified for unknown identifiers so the miss path costs the same as
/// a mismatch, keeping timing from leaking account existence.
static DUMMY_HASH: OnceLock<String> = OnceLock::new();

pub struct StoreAuthService {
    store: Store,
    policy: LockoutPolicy,
    security: SecurityConfig,
    audit: Arc<dyn AuditSink>,
    clock: Arc<dyn Clock>,
}

impl StoreAuthService {
    #[must_use]
    pub fn new(
        store: Store,
        security: SecurityConfig,
        audit: Arc<dyn AuditSink>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            store,
            policy: LockoutPolicy::from_config(&security.lockout),
            security,
            audit,
            clock,
        }
    }

    /// Argon2 is CPU-intensive; run it off the async runtime.
    async fn verify_blocking(hash: String, secret: &str) -> Result<bool, AuthError> {
        let secret = secret.to_string();
        tokio::task::spawn_blocking(move || verify_password(&hash, &secret))
            .await
            .map_err(|e| AuthError::Internal(format!("Password verification task panicked: {e}")))?
            .map_err(AuthError::from)
    }

    async fn burn_verification(secret: &str) {
        let secret = secret.to_string();
        let _ = tokio::task::spawn_blocking(move || {
            let hash = DUMMY_HASH.get_or_init(|| {
                hash_password("guardia.dummy.credential", None).unwrap_or_default()
            });
            verify_password(hash, &secret)
        })
        .await;
    }

    /// One CAS attempt plus one retry against a fresh read, per the store
    /// conflict policy. Returns `None` when the re-read shows the account is
    /// no longer active (a concurrent request already locked or released it).
    async fn record_failure_with_retry(
        &self,
        account: &Account,
        now: DateTime<Utc>,
    ) -> Result<Option<Account>, AuthError> {
        if let Some(updated) = self.store.record_failure(account, &self.policy, now).await? {
            return Ok(Some(updated));
        }

        let fresh = self
            .store
            .get_account_by_id(account.id)
            .await?
            .ok_or(AuthError::InvalidCredentials)?;

        if fresh.status != AccountStatus::Active {
            return Ok(None);
        }

        match self.store.record_failure(&fresh, &self.policy, now).await? {
            Some(updated) => Ok(Some(updated)),
            None => Err(AuthError::Conflict),
        }
    }

    async fn reset_with_retry(
        &self,
        account: &Account,
        now: DateTime<Utc>,
    ) -> Result<Account, AuthError> {
        if let Some(updated) = self.store.reset_to_active(account, now).await? {
            return Ok(updated);
        }

        let fresh = self
            .store
            .get_account_by_id(account.id)
            .await?
            .ok_or_else(|| AuthError::Internal("Account vanished during login".to_string()))?;

        match self.store.reset_to_active(&fresh, now).await? {
            Some(updated) => Ok(updated),
            None => Err(AuthError::Conflict),
        }
    }
}

#[async_trait]
impl AuthService for StoreAuthService {
    async fn authenticate(
        &self,
        identifier: &str,
        secret: &str,
        meta: &RequestMeta,
    ) -> Result<Account, AuthError> {
        let identifier = normalize_identifier(identifier);
        let now = self.clock.now();

        // Opportunistic self-heal: no background job releases locks, every
        // inbound attempt does.
        let released = self.store.sweep_expired_locks(now).await?;
        if released > 0 {
            self.audit.record(&AuditEvent::LocksSwept { released }, meta);
        }

        let Some((account, hash)) = self
            .store
            .get_account_by_identifier_with_hash(&identifier)
            .await?
        else {
            Self::burn_verification(secret).await;
            self.audit.record(
                &AuditEvent::LoginFailed {
                    identifier,
                    cause: FailureCause::UnknownIdentifier,
                    account_id: None,
                    failed_attempts: None,
                },
                meta,
            );
            return Err(AuthError::InvalidCredentials);
        };

        // Credential correctness is settled before any status gating, so a
        // wrong password looks the same against every kind of account.
        let is_valid = Self::verify_blocking(hash, secret).await?;

        if !is_valid {
            if account.status == AccountStatus::Active {
                if let Some(updated) = self.record_failure_with_retry(&account, now).await? {
                    self.audit.record(
                        &AuditEvent::LoginFailed {
                            identifier,
                            cause: FailureCause::WrongPassword,
                            account_id: Some(updated.id),
                            failed_attempts: Some(updated.failed_attempts),
                        },
                        meta,
                    );
                    if let AccountStatus::TempBlocked { until } = updated.status {
                        self.audit.record(
                            &AuditEvent::AccountLocked {
                                account_id: updated.id,
                                username: updated.username.clone(),
                                until,
                            },
                            meta,
                        );
                    }
                }
            } else {
                self.audit.record(
                    &AuditEvent::LoginFailed {
                        identifier,
                        cause: FailureCause::WrongPassword,
                        account_id: Some(account.id),
                        failed_attempts: Some(account.failed_attempts),
                    },
                    meta,
                );
            }
            return Err(AuthError::InvalidCredentials);
        }

        match account.status {
            AccountStatus::Inactive => {
                self.audit.record(
                    &AuditEvent::LoginFailed {
                        identifier,
                        cause: FailureCause::Inactive,
                        account_id: Some(account.id),
                        failed_attempts: Some(account.failed_attempts),
                    },
                    meta,
                );
                Err(AuthError::AccountInactive)
            }
            // An expired lock the sweep has not caught yet counts as open;
            // the success reset below clears the stale row.
            AccountStatus::TempBlocked { .. } if account.is_locked(now) => {
                self.audit.record(
                    &AuditEvent::LoginFailed {
                        identifier,
                        cause: FailureCause::Locked,
                        account_id: Some(account.id),
                        failed_attempts: Some(account.failed_attempts),
                    },
                    meta,
                );
                Err(AuthError::AccountLocked {
                    remaining_seconds: account.remaining_lock_seconds(now),
                })
            }
            _ => {
                let account = self.reset_with_retry(&account, now).await?;
                self.audit.record(
                    &AuditEvent::LoginSucceeded {
                        account_id: account.id,
                        username: account.username.clone(),
                    },
                    meta,
                );
                Ok(account)
            }
        }
    }

    async fn change_password(
        &self,
        principal: &Principal,
        current_password: &str,
        new_password: &str,
        meta: &RequestMeta,
    ) -> Result<(), AuthError> {
        if new_password.len() < 8 {
            return Err(AuthError::Validation(
                "La nueva contraseña debe tener al menos 8 caracteres".to_string(),
            ));
        }

        if let Some(message) = password_complexity_error(new_password) {
            return Err(AuthError::Validation(message.to_string()));
        }

        if current_password == new_password {
            return Err(AuthError::Validation(
                "La nueva contraseña debe ser diferente a la actual".to_string(),
            ));
        }

        let hash = self
            .store
            .get_account_hash(principal.account_id)
            .await?
            .ok_or_else(|| AuthError::Internal("Account not found".to_string()))?;

        let is_valid = Self::verify_blocking(hash, current_password).await?;
        if !is_valid {
            return Err(AuthError::Validation(
                "Contraseña actual incorrecta".to_string(),
            ));
        }

        self.store
            .update_account_password(principal.account_id, new_password, Some(&self.security))
            .await?;

        self.audit.record(
            &AuditEvent::PasswordChanged {
                account_id: principal.account_id,
            },
            meta,
        );

        Ok(())
    }
}

/// New passwords need at least one lowercase letter, one uppercase letter,
/// one digit and one symbol.
fn password_complexity_error(password: &str) -> Option<&'static str> {
    if !password.chars().any(char::is_lowercase) {
        return Some("La nueva contraseña debe incluir al menos una letra minúscula");
    }
    if !password.chars().any(char::is_uppercase) {
        return Some("La nueva contraseña debe incluir al menos una letra mayúscula");
    }
    if !password.chars().any(|c| c.is_ascii_digit()) {
        return Some("La nueva contraseña debe incluir al menos un número");
    }
    if !password.chars().any(|c| !c.is_alphanumeric()) {
        return Some("La nueva contraseña debe incluir al menos un símbolo");
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::NewAccount;
    use crate::models::Role;
    use crate::services::audit::MemoryAuditSink;
    use chrono::Duration;

    struct FixedClock(DateTime<Utc>);

    impl Clock for FixedClock {
        fn now(&self) -> DateTime<Utc> {
            self.0
        }
    }

    async fn service_with_user(clock_now: DateTime<Utc>) -> (StoreAuthService, Store, Account) {
        let store = Store::new("sqlite::memory:").await.expect("store");
        let account = store
            .create_account(
                NewAccount {
                    username: "carla".to_string(),
                    email: "carla@example.com".to_string(),
                    password: "Secret123!".to_string(),
                    role: Role::User,
                },
                None,
            )
            .await
            .expect("create account");

        let service = StoreAuthService::new(
            store.clone(),
            SecurityConfig::default(),
            Arc::new(MemoryAuditSink::default()),
            Arc::new(FixedClock(clock_now)),
        );

        (service, store, account)
    }

    #[tokio::test]
    async fn unknown_identifier_and_wrong_password_are_indistinguishable() {
        let (service, _store, _account) = service_with_user(Utc::now()).await;
        let meta = RequestMeta::default();

        let unknown = service
            .authenticate("nobody", "whatever", &meta)
            .await
            .unwrap_err();
        let mismatch = service
            .authenticate("carla", "wrong-password", &meta)
            .await
            .unwrap_err();

        assert!(matches!(unknown, AuthError::InvalidCredentials));
        assert!(matches!(mismatch, AuthError::InvalidCredentials));
        assert_eq!(unknown.to_string(), mismatch.to_string());
    }

    #[tokio::test]
    async fn fifth_wrong_password_locks_and_correct_password_reports_lock() {
        let now = Utc::now();
        let (service, store, account) = service_with_user(now).await;
        let meta = RequestMeta::default();

        for _ in 0..5 {
            let err = service
                .authenticate("carla", "wrong-password", &meta)
                .await
                .unwrap_err();
            assert!(matches!(err, AuthError::InvalidCredentials));
        }

        let locked = store.get_account_by_id(account.id).await.unwrap().unwrap();
        assert_eq!(locked.failed_attempts, 5);
        assert!(locked.is_locked(now));

        // The correct password now earns the specific, more informative
        // failure instead of the generic one.
        match service.authenticate("carla", "Secret123!", &meta).await {
            Err(AuthError::AccountLocked { remaining_seconds }) => {
                assert!(remaining_seconds > 0 && remaining_seconds <= 3600);
            }
            other => panic!("expected AccountLocked, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn wrong_password_on_locked_account_stays_generic_and_does_not_count() {
        let now = Utc::now();
        let (service, store, account) = service_with_user(now).await;
        let meta = RequestMeta::default();

        for _ in 0..5 {
            let _ = service.authenticate("carla", "wrong-password", &meta).await;
        }

        let err = service
            .authenticate("carla", "still-wrong", &meta)
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::InvalidCredentials));

        let account = store.get_account_by_id(account.id).await.unwrap().unwrap();
        assert_eq!(account.failed_attempts, 5);
    }

    #[tokio::test]
    async fn expired_lock_self_heals_before_the_credential_check() {
        let past = Utc::now() - chrono::Duration::hours(2);
        let store = Store::new("sqlite::memory:").await.expect("store");
        let mut account = store
            .create_account(
                NewAccount {
                    username: "carla".to_string(),
                    email: "carla@example.com".to_string(),
                    password: "Secret123!".to_string(),
                    role: Role::User,
                },
                None,
            )
            .await
            .unwrap();

        // Lock the account two hours ago; the hour-long lock has expired.
        let policy = LockoutPolicy::default();
        for _ in 0..5 {
            account = store
                .record_failure(&account, &policy, past)
                .await
                .unwrap()
                .unwrap();
        }

        let service = StoreAuthService::new(
            store.clone(),
            SecurityConfig::default(),
            Arc::new(MemoryAuditSink::default()),
            Arc::new(FixedClock(Utc::now())),
        );

        let authenticated = service
            .authenticate("carla", "Secret123!", &RequestMeta::default())
            .await
            .expect("sweep releases the lock, then credentials match");

        assert_eq!(authenticated.status, AccountStatus::Active);
        assert_eq!(authenticated.failed_attempts, 0);
    }

    #[tokio::test]
    async fn inactive_account_gates_only_after_correct_password() {
        let now = Utc::now();
        let (service, store, account) = service_with_user(now).await;
        let meta = RequestMeta::default();

        store
            .set_account_inactive(&account, now)
            .await
            .unwrap()
            .expect("no concurrent writers");

        let specific = service
            .authenticate("carla", "Secret123!", &meta)
            .await
            .unwrap_err();
        assert!(matches!(specific, AuthError::AccountInactive));

        let generic = service
            .authenticate("carla", "wrong-password", &meta)
            .await
            .unwrap_err();
        assert!(matches!(generic, AuthError::InvalidCredentials));

        // Failures against a non-active account never move the counter.
        let account = store.get_account_by_id(account.id).await.unwrap().unwrap();
        assert_eq!(account.failed_attempts, 0);
    }

    #[tokio::test]
    async fn success_resets_accumulated_failures() {
        let now = Utc::now();
        let (service, store, account) = service_with_user(now).await;
        let meta = RequestMeta::default();

        for _ in 0..3 {
            let _ = service.authenticate("carla", "wrong-password", &meta).await;
        }
        assert_eq!(
            store
                .get_account_by_id(account.id)
                .await
                .unwrap()
                .unwrap()
                .failed_attempts,
            3
        );

        let authenticated = service
            .authenticate("carla", "Secret123!", &meta)
            .await
            .unwrap();
        assert_eq!(authenticated.failed_attempts, 0);
        assert_eq!(authenticated.status, AccountStatus::Active);
    }

    #[tokio::test]
    async fn email_logs_in_like_username() {
        let (service, _store, _account) = service_with_user(Utc::now()).await;

        let authenticated = service
            .authenticate("  Carla@Example.COM ", "Secret123!", &RequestMeta::default())
            .await
            .unwrap();
        assert_eq!(authenticated.username, "carla");
    }

    #[tokio::test]
    async fn change_password_requires_current_secret() {
        let (service, _store, account) = service_with_user(Utc::now()).await;
        let principal = account.principal();
        let meta = RequestMeta::default();

        let err = service
            .change_password(&principal, "wrong", "NewSecret456!", &meta)
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::Validation(_)));

        let err = service
            .change_password(&principal, "Secret123!", "short", &meta)
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::Validation(_)));

        service
            .change_password(&principal, "Secret123!", "NewSecret456!", &meta)
            .await
            .expect("valid change");

        // Old password no longer works, new one does.
        assert!(matches!(
            service
                .authenticate("carla", "Secret123!", &meta)
                .await
                .unwrap_err(),
            AuthError::InvalidCredentials
        ));
        service
            .authenticate("carla", "NewSecret456!", &meta)
            .await
            .expect("new password authenticates");
    }

    #[tokio::test]
    async fn new_password_must_mix_character_classes() {
        let (service, _store, account) = service_with_user(Utc::now()).await;
        let principal = account.principal();
        let meta = RequestMeta::default();

        for weak in [
            "sololetras1!", // no uppercase
            "SOLOLETRAS1!", // no lowercase
            "SinNumeros!!", // no digit
            "SinSimbolos1", // no symbol
        ] {
            let err = service
                .change_password(&principal, "Secret123!", weak, &meta)
                .await
                .unwrap_err();
            assert!(
                matches!(err, AuthError::Validation(_)),
                "{weak} should be rejected"
            );
        }

        // A weak password is rejected before the current one is checked, so
        // the stored credential is untouched.
        service
            .authenticate("carla", "Secret123!", &meta)
            .await
            .expect("password unchanged");
    }

    #[tokio::test]
    async fn lock_remaining_seconds_shrinks_with_the_clock() {
        let now = Utc::now();
        let (service, store, mut account) = service_with_user(now).await;

        let policy = LockoutPolicy::default();
        for _ in 0..5 {
            account = store
                .record_failure(&account, &policy, now)
                .await
                .unwrap()
                .unwrap();
        }

        // Re-check half an hour later through a service with an advanced clock.
        let later = now + Duration::seconds(1800);
        let service_later = StoreAuthService::new(
            store.clone(),
            SecurityConfig::default(),
            Arc::new(MemoryAuditSink::default()),
            Arc::new(FixedClock(later)),
        );
        drop(service);

        match service_later
            .authenticate("carla", "Secret123!", &RequestMeta::default())
            .await
        {
            Err(AuthError::AccountLocked { remaining_seconds }) => {
                assert!(remaining_seconds <= 1800);
                assert!(remaining_seconds > 1700);
            }
            other => panic!("expected AccountLocked, got {other:?}"),
        }
    }
}
