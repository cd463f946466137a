//! Idle-session expiry, evaluated lazily on each request.
//!
//! Expiry is a pure function of the stored last-activity timestamp and the
//! current clock; nothing wakes up on a timer. Session expiry is orthogonal
//! to account lockout: it never touches `failed_attempts`, and a locked
//! account does not tear down a session from an earlier valid login.

use chrono::{DateTime, Utc};
use tower_sessions::Session;

/// Session key for the authenticated account id.
pub const ACCOUNT_ID_KEY: &str = "account_id";

/// Session key for the last-activity unix timestamp.
pub const LAST_ACTIVITY_KEY: &str = "last_activity_time";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// No activity marker yet (first request after login).
    Unset,
    Active,
    /// Terminal for this session instance; a fresh login starts a new one.
    Expired,
}

#[derive(Debug, Clone, Copy)]
pub struct SessionMonitor {
    idle_timeout_seconds: i64,
}

impl SessionMonitor {
    #[must_use]
    pub fn new(idle_timeout_seconds: u64) -> Self {
        Self {
            idle_timeout_seconds: i64::try_from(idle_timeout_seconds).unwrap_or(7200),
        }
    }

    /// Pure transition check. Exactly `idle_timeout` elapsed still counts as
    /// Active; only strictly greater expires, in the account's favor.
    #[must_use]
    pub const fn evaluate(&self, last_activity: Option<i64>, now: i64) -> SessionState {
        match last_activity {
            None => SessionState::Unset,
            Some(last) => {
                if now - last > self.idle_timeout_seconds {
                    SessionState::Expired
                } else {
                    SessionState::Active
                }
            }
        }
    }

    /// Checks the session's activity marker and refreshes it when the
    /// session is still live. On expiry the session state is destroyed and
    /// the caller must force re-authentication. Returns the state observed
    /// together with the idle seconds at evaluation time.
    pub async fn check_and_touch(
        &self,
        session: &Session,
        now: DateTime<Utc>,
    ) -> Result<(SessionState, i64), tower_sessions::session::Error> {
        let now_ts = now.timestamp();
        let last_activity = session.get::<i64>(LAST_ACTIVITY_KEY).await?;
        let idle_seconds = last_activity.map_or(0, |last| now_ts - last);

        match self.evaluate(last_activity, now_ts) {
            SessionState::Expired => {
                session.flush().await?;
                Ok((SessionState::Expired, idle_seconds))
            }
            state => {
                session.insert(LAST_ACTIVITY_KEY, now_ts).await?;
                Ok((state, idle_seconds))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use std::sync::Arc;
    use tower_sessions::{MemoryStore, Session};

    fn session() -> Session {
        Session::new(None, Arc::new(MemoryStore::default()), None)
    }

    #[test]
    fn no_marker_is_unset() {
        let monitor = SessionMonitor::new(7200);
        assert_eq!(monitor.evaluate(None, 1_000_000), SessionState::Unset);
    }

    #[test]
    fn exactly_at_timeout_is_still_active() {
        let monitor = SessionMonitor::new(7200);
        let last = 1_000_000;

        assert_eq!(monitor.evaluate(Some(last), last + 7200), SessionState::Active);
    }

    #[test]
    fn one_second_past_timeout_expires() {
        let monitor = SessionMonitor::new(7200);
        let last = 1_000_000;

        assert_eq!(monitor.evaluate(Some(last), last + 7201), SessionState::Expired);
    }

    #[test]
    fn recent_activity_stays_active() {
        let monitor = SessionMonitor::new(7200);
        let last = 1_000_000;

        assert_eq!(monitor.evaluate(Some(last), last + 1), SessionState::Active);
        assert_eq!(monitor.evaluate(Some(last), last), SessionState::Active);
    }

    #[test]
    fn expiry_is_deterministic_from_the_two_timestamps() {
        let monitor = SessionMonitor::new(60);

        for (delta, expected) in [
            (0, SessionState::Active),
            (59, SessionState::Active),
            (60, SessionState::Active),
            (61, SessionState::Expired),
            (3600, SessionState::Expired),
        ] {
            assert_eq!(monitor.evaluate(Some(500), 500 + delta), expected, "delta={delta}");
        }
    }

    #[tokio::test]
    async fn stale_marker_expires_and_destroys_the_session_state() {
        let monitor = SessionMonitor::new(7200);
        let session = session();
        let now = Utc::now();

        session.insert(ACCOUNT_ID_KEY, 42_i32).await.unwrap();
        session
            .insert(LAST_ACTIVITY_KEY, (now - Duration::seconds(7201)).timestamp())
            .await
            .unwrap();

        let (state, idle_seconds) = monitor.check_and_touch(&session, now).await.unwrap();
        assert_eq!(state, SessionState::Expired);
        assert_eq!(idle_seconds, 7201);

        // The flush wipes every key, account id included.
        assert_eq!(session.get::<i32>(ACCOUNT_ID_KEY).await.unwrap(), None);
        assert_eq!(session.get::<i64>(LAST_ACTIVITY_KEY).await.unwrap(), None);
    }

    #[tokio::test]
    async fn live_marker_is_refreshed_to_the_current_instant() {
        let monitor = SessionMonitor::new(7200);
        let session = session();
        let now = Utc::now();

        session.insert(ACCOUNT_ID_KEY, 42_i32).await.unwrap();
        session
            .insert(LAST_ACTIVITY_KEY, (now - Duration::seconds(100)).timestamp())
            .await
            .unwrap();

        let (state, idle_seconds) = monitor.check_and_touch(&session, now).await.unwrap();
        assert_eq!(state, SessionState::Active);
        assert_eq!(idle_seconds, 100);

        assert_eq!(
            session.get::<i64>(LAST_ACTIVITY_KEY).await.unwrap(),
            Some(now.timestamp())
        );
        assert_eq!(session.get::<i32>(ACCOUNT_ID_KEY).await.unwrap(), Some(42));
    }
}
