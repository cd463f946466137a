use std::sync::Arc;
use tokio::sync::RwLock;

use crate::clock::{Clock, SystemClock};
use crate::config::Config;
use crate::db::Store;
use crate::services::{
    AdminService, AuditSink, AuthService, RoleGuard, SessionMonitor, StoreAuthService,
    TracingAuditSink,
};

#[derive(Clone)]
pub struct SharedState {
    pub config: Arc<RwLock<Config>>,

    pub store: Store,

    pub clock: Arc<dyn Clock>,

    pub audit: Arc<dyn AuditSink>,

    pub auth_service: Arc<dyn AuthService>,

    pub admin_service: Arc<AdminService>,

    pub session_monitor: Arc<SessionMonitor>,

    pub role_guard: Arc<RoleGuard>,
}

impl SharedState {
    pub async fn new(config: Config) -> anyhow::Result<Self> {
        let store = Store::new(&config.general.database_path).await?;
        Self::with_store(config, store)
    }

    /// Wires the service graph onto an existing store. Tests use this with an
    /// in-memory database.
    pub fn with_store(config: Config, store: Store) -> anyhow::Result<Self> {
        let clock: Arc<dyn Clock> = Arc::new(SystemClock);
        let audit: Arc<dyn AuditSink> = Arc::new(TracingAuditSink);

        let auth_service: Arc<dyn AuthService> = Arc::new(StoreAuthService::new(
            store.clone(),
            config.security.clone(),
            audit.clone(),
            clock.clone(),
        ));

        let admin_service = Arc::new(AdminService::new(
            store.clone(),
            audit.clone(),
            clock.clone(),
        ));

        let session_monitor = Arc::new(SessionMonitor::new(
            config.security.session_idle_timeout_seconds,
        ));

        let role_guard = Arc::new(RoleGuard::new(audit.clone()));

        Ok(Self {
            config: Arc::new(RwLock::new(config)),
            store,
            clock,
            audit,
            auth_service,
            admin_service,
            session_monitor,
            role_guard,
        })
    }

    pub async fn config(&self) -> Config {
        self.config.read().await.clone()
    }
}
