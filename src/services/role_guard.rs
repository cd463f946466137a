//! Role-based authorization for already-authenticated principals.
//!
//! The "is there a session at all" gate runs upstream in the session
//! middleware; by the time this guard sees a principal, identity is settled.

use std::sync::Arc;

use thiserror::Error;

use crate::models::{Principal, Role};
use crate::services::audit::{AuditEvent, AuditSink, RequestMeta};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("Acceso denegado")]
pub struct Denied {
    pub required: Role,
    pub actual: Role,
}

pub struct RoleGuard {
    audit: Arc<dyn AuditSink>,
}

impl RoleGuard {
    #[must_use]
    pub fn new(audit: Arc<dyn AuditSink>) -> Self {
        Self { audit }
    }

    /// Exact-match role check: admin and user are disjoint scopes, not a
    /// hierarchy, so an admin is denied on user-only resources too. Every
    /// denial is audited before it is returned.
    pub fn authorize(
        &self,
        principal: &Principal,
        required: Role,
        resource: &str,
        meta: &RequestMeta,
    ) -> Result<(), Denied> {
        if principal.role == required {
            return Ok(());
        }

        self.audit.record(
            &AuditEvent::AccessDenied {
                account_id: principal.account_id,
                username: principal.username.clone(),
                required,
                actual: principal.role,
                resource: resource.to_string(),
            },
            meta,
        );

        Err(Denied {
            required,
            actual: principal.role,
        })
    }
}
