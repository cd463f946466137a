//! Pure lockout decisions: when repeated failures turn into a temporary
//! block, and for how long. The atomic state transitions themselves live in
//! the account repository; this policy only decides.

use chrono::{DateTime, Duration, Utc};

use crate::config::LockoutConfig;

#[derive(Debug, Clone, Copy)]
pub struct LockoutPolicy {
    pub max_attempts: u32,
    pub lock_duration: Duration,
}

impl LockoutPolicy {
    #[must_use]
    pub fn from_config(config: &LockoutConfig) -> Self {
        Self {
            max_attempts: config.max_attempts,
            lock_duration: Duration::seconds(i64::try_from(config.lock_duration_seconds).unwrap_or(3600)),
        }
    }

    /// Lock expiry for an account that just reached `attempts_after` failed
    /// attempts, or `None` while the account stays below the threshold.
    #[must_use]
    pub fn lock_until_after(&self, attempts_after: u32, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        (attempts_after >= self.max_attempts).then(|| now + self.lock_duration)
    }
}

impl Default for LockoutPolicy {
    fn default() -> Self {
        Self::from_config(&LockoutConfig::default())
    }
}
