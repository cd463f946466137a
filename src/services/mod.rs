pub mod admin_service;
pub mod audit;
pub mod auth_service;
pub mod auth_service_impl;
pub mod lockout;
pub mod role_guard;
pub mod session_monitor;

pub use admin_service::{AdminError, AdminService, UnlockOutcome};
pub use audit::{AuditEvent, AuditSink, RequestMeta, TracingAuditSink};
pub use auth_service::{AuthError, AuthService};
pub use auth_service_impl::StoreAuthService;
pub use lockout::LockoutPolicy;
pub use role_guard::RoleGuard;
pub use session_monitor::{SessionMonitor, SessionState};
