//! Security-relevant projection of a stored account.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::entities::accounts;

/// Reserved superuser. Its role and status are immutable through every
/// administrative path.
pub const PROTECTED_USERNAME: &str = "admin";

/// Closed role set. Admin and User are disjoint views, not a hierarchy:
/// an admin is denied on user-scoped routes and vice versa.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Admin,
    User,
}

impl Role {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Admin => "admin",
            Self::User => "user",
        }
    }

    #[must_use]
    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "admin" => Some(Self::Admin),
            "user" => Some(Self::User),
            _ => None,
        }
    }
}

/// Account security status. A lock always carries its expiry; a
/// `temp_blocked` row without `locked_until` cannot be expressed here.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccountStatus {
    Active,
    TempBlocked { until: DateTime<Utc> },
    Inactive,
}

impl AccountStatus {
    pub const ACTIVE_TAG: &'static str = "active";
    pub const TEMP_BLOCKED_TAG: &'static str = "temp_blocked";
    pub const INACTIVE_TAG: &'static str = "inactive";

    #[must_use]
    pub const fn storage_tag(self) -> &'static str {
        match self {
            Self::Active => Self::ACTIVE_TAG,
            Self::TempBlocked { .. } => Self::TEMP_BLOCKED_TAG,
            Self::Inactive => Self::INACTIVE_TAG,
        }
    }
}

/// Account data used by the security core (without the password hash).
#[derive(Debug, Clone)]
pub struct Account {
    pub id: i32,
    pub username: String,
    pub email: String,
    pub role: Role,
    pub status: AccountStatus,
    pub failed_attempts: u32,
    /// Optimistic concurrency token; every mutation is conditioned on it.
    pub version: i32,
    pub created_at: String,
    pub updated_at: String,
}

impl From<accounts::Model> for Account {
    fn from(model: accounts::Model) -> Self {
        // The repository keeps status and locked_until paired; a lock row
        // whose timestamp cannot be decoded degrades to Active, matching the
        // logically-expired treatment below.
        let status = match (model.status.as_str(), model.locked_until) {
            (AccountStatus::INACTIVE_TAG, _) => AccountStatus::Inactive,
            (AccountStatus::TEMP_BLOCKED_TAG, Some(ts)) => DateTime::<Utc>::from_timestamp(ts, 0)
                .map_or(AccountStatus::Active, |until| AccountStatus::TempBlocked { until }),
            _ => AccountStatus::Active,
        };

        Self {
            id: model.id,
            username: model.username,
            email: model.email,
            role: Role::parse(&model.role).unwrap_or(Role::User),
            status,
            failed_attempts: u32::try_from(model.failed_attempts).unwrap_or(0),
            version: model.version,
            created_at: model.created_at,
            updated_at: model.updated_at,
        }
    }
}

impl Account {
    /// An expired lock counts as not locked even before a sweep has reset
    /// the stored status.
    #[must_use]
    pub fn is_locked(&self, now: DateTime<Utc>) -> bool {
        matches!(self.status, AccountStatus::TempBlocked { until } if until > now)
    }

    /// Seconds until the lock releases; 0 for anything not currently locked.
    #[must_use]
    pub fn remaining_lock_seconds(&self, now: DateTime<Utc>) -> u64 {
        match self.status {
            AccountStatus::TempBlocked { until } if until > now => {
                u64::try_from((until - now).num_seconds()).unwrap_or(0)
            }
            _ => 0,
        }
    }

    #[must_use]
    pub fn is_protected(&self) -> bool {
        self.username == PROTECTED_USERNAME
    }

    #[must_use]
    pub fn principal(&self) -> Principal {
        Principal {
            account_id: self.id,
            username: self.username.clone(),
            role: self.role,
        }
    }
}

/// Resolved, authenticated identity passed explicitly through the call
/// chain; never looked up ambiently inside the core components.
#[derive(Debug, Clone)]
pub struct Principal {
    pub account_id: i32,
    pub username: String,
    pub role: Role,
}

/// Single normalization point for login identifiers and uniqueness checks.
/// Usernames and emails compare case-insensitively everywhere.
#[must_use]
pub fn normalize_identifier(raw: &str) -> String {
    raw.trim().to_lowercase()
}
