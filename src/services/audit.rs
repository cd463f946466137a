//! Audit trail for authentication and authorization decisions.
//!
//! The sink is fire-and-forget: recording never blocks or fails the primary
//! operation. The production sink writes structured `tracing` events; tests
//! swap in an in-memory sink.

use chrono::{DateTime, Utc};
use tracing::{info, warn};

use crate::models::Role;

/// Request metadata attached to every audit record.
#[derive(Debug, Clone, Default)]
pub struct RequestMeta {
    pub ip: Option<String>,
    pub user_agent: Option<String>,
}

/// Internal cause of a rejected login. Never surfaced to callers; the
/// user-visible error stays generic for every credential failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureCause {
    UnknownIdentifier,
    WrongPassword,
    Inactive,
    Locked,
}

impl FailureCause {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::UnknownIdentifier => "unknown_identifier",
            Self::WrongPassword => "wrong_password",
            Self::Inactive => "inactive",
            Self::Locked => "locked",
        }
    }
}

#[derive(Debug, Clone)]
pub enum AuditEvent {
    LoginFailed {
        identifier: String,
        cause: FailureCause,
        account_id: Option<i32>,
        failed_attempts: Option<u32>,
    },
    AccountLocked {
        account_id: i32,
        username: String,
        until: DateTime<Utc>,
    },
    LoginSucceeded {
        account_id: i32,
        username: String,
    },
    LoggedOut {
        account_id: i32,
    },
    LocksSwept {
        released: u64,
    },
    SessionExpired {
        account_id: i32,
        idle_seconds: i64,
    },
    AccessDenied {
        account_id: i32,
        username: String,
        required: Role,
        actual: Role,
        resource: String,
    },
    PasswordChanged {
        account_id: i32,
    },
    AccountUnlocked {
        username: String,
        by: String,
    },
    AccountDeactivated {
        account_id: i32,
        by: String,
    },
    AccountActivated {
        account_id: i32,
        by: String,
    },
    ProtectedAccountRejected {
        operation: &'static str,
        by: String,
    },
}

pub trait AuditSink: Send + Sync {
    fn record(&self, event: &AuditEvent, meta: &RequestMeta);
}

/// Writes audit records as structured tracing events.
#[derive(Debug, Default)]
pub struct TracingAuditSink;

impl AuditSink for TracingAuditSink {
    fn record(&self, event: &AuditEvent, meta: &RequestMeta) {
        let ip = meta.ip.as_deref().unwrap_or("unknown");
        let user_agent = meta.user_agent.as_deref().unwrap_or("unknown");

        match event {
            AuditEvent::LoginFailed {
                identifier,
                cause,
                account_id,
                failed_attempts,
            } => warn!(
                event = "login_failed",
                identifier = %identifier,
                cause = cause.as_str(),
                account_id = account_id,
                failed_attempts = failed_attempts,
                ip = %ip,
                user_agent = %user_agent,
            ),
            AuditEvent::AccountLocked {
                account_id,
                username,
                until,
            } => warn!(
                event = "account_locked",
                account_id = account_id,
                username = %username,
                locked_until = %until.to_rfc3339(),
                ip = %ip,
            ),
            AuditEvent::LoginSucceeded { account_id, username } => info!(
                event = "login_succeeded",
                account_id = account_id,
                username = %username,
                ip = %ip,
            ),
            AuditEvent::LoggedOut { account_id } => info!(
                event = "logged_out",
                account_id = account_id,
                ip = %ip,
            ),
            AuditEvent::LocksSwept { released } => info!(
                event = "expired_locks_released",
                released = released,
            ),
            AuditEvent::SessionExpired {
                account_id,
                idle_seconds,
            } => info!(
                event = "session_expired",
                account_id = account_id,
                idle_seconds = idle_seconds,
                ip = %ip,
            ),
            AuditEvent::AccessDenied {
                account_id,
                username,
                required,
                actual,
                resource,
            } => warn!(
                event = "access_denied",
                account_id = account_id,
                username = %username,
                required_role = required.as_str(),
                actual_role = actual.as_str(),
                resource = %resource,
                ip = %ip,
                user_agent = %user_agent,
            ),
            AuditEvent::PasswordChanged { account_id } => info!(
                event = "password_changed",
                account_id = account_id,
                ip = %ip,
            ),
            AuditEvent::AccountUnlocked { username, by } => info!(
                event = "account_unlocked",
                username = %username,
                by = %by,
            ),
            AuditEvent::AccountDeactivated { account_id, by } => info!(
                event = "account_deactivated",
                account_id = account_id,
                by = %by,
            ),
            AuditEvent::AccountActivated { account_id, by } => info!(
                event = "account_activated",
                account_id = account_id,
                by = %by,
            ),
            AuditEvent::ProtectedAccountRejected { operation, by } => warn!(
                event = "protected_account_rejected",
                operation = operation,
                by = %by,
            ),
        }
    }
}

/// Captures events for assertions in tests.
#[cfg(test)]
#[derive(Debug, Default)]
pub struct MemoryAuditSink {
    pub events: std::sync::Mutex<Vec<AuditEvent>>,
}

#[cfg(test)]
impl AuditSink for MemoryAuditSink {
    fn record(&self, event: &AuditEvent, _meta: &RequestMeta) {
        self.events.lock().unwrap().push(event.clone());
    }
}
