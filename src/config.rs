use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::info;

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    pub general: GeneralConfig,

    #[serde(default)]
    pub server: ServerConfig,

    #[serde(default)]
    pub security: SecurityConfig,

    #[serde(default)]
    pub observability: ObservabilityConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    pub log_level: String,

    pub database_path: String,

    /// Tokio worker threads; 0 = runtime default.
    pub worker_threads: usize,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            database_path: "sqlite:guardia.db".to_string(),
            worker_threads: 0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub bind_address: String,

    pub port: u16,

    pub cors_allowed_origins: Vec<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0".to_string(),
            port: 7171,
            cors_allowed_origins: vec!["*".to_string()],
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SecurityConfig {
    /// Argon2 memory cost in KiB (default: 8192 = 8MB)
    pub argon2_memory_cost_kib: u32,

    /// Argon2 time cost (iterations)
    pub argon2_time_cost: u32,

    /// Argon2 parallelism (default: 1)
    pub argon2_parallelism: u32,

    /// Failed-attempt lockout policy.
    pub lockout: LockoutConfig,

    /// Idle-session expiry. A request arriving exactly at the boundary is
    /// still accepted; only strictly later requests expire the session.
    pub session_idle_timeout_seconds: u64,
}

impl Default for SecurityConfig {
    fn default() -> Self {
        Self {
            argon2_memory_cost_kib: 8192,
            argon2_time_cost: 3,
            argon2_parallelism: 1,
            lockout: LockoutConfig::default(),
            session_idle_timeout_seconds: 7200,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LockoutConfig {
    /// Failed attempts that trigger a temporary block.
    pub max_attempts: u32,

    /// How long a triggered block lasts. Expired blocks are released by the
    /// sweep that runs on every authentication attempt; no scheduler needed.
    pub lock_duration_seconds: u64,
}

impl Default for LockoutConfig {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            lock_duration_seconds: 3600,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct ObservabilityConfig {
    pub metrics_enabled: bool,

    pub loki_enabled: bool,

    pub loki_url: String,
}

impl Config {
    pub fn load() -> Result<Self> {
        let paths = Self::config_paths();

        for path in &paths {
            if path.exists() {
                info!("Loading config from: {}", path.display());
                return Self::load_from_path(path);
            }
        }

        info!("No config file found, using defaults");
        Ok(Self::default())
    }

    pub fn load_from_path(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Self = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        anyhow::ensure!(
            self.security.lockout.max_attempts >= 1,
            "security.lockout.max_attempts must be at least 1"
        );
        anyhow::ensure!(
            self.security.lockout.lock_duration_seconds >= 1,
            "security.lockout.lock_duration_seconds must be at least 1"
        );
        anyhow::ensure!(
            self.security.session_idle_timeout_seconds >= 1,
            "security.session_idle_timeout_seconds must be at least 1"
        );
        anyhow::ensure!(
            self.security.argon2_memory_cost_kib >= 1024,
            "security.argon2_memory_cost_kib must be at least 1024"
        );
        anyhow::ensure!(
            self.security.argon2_time_cost >= 1,
            "security.argon2_time_cost must be at least 1"
        );
        anyhow::ensure!(
            self.security.argon2_parallelism >= 1,
            "security.argon2_parallelism must be at least 1"
        );
        anyhow::ensure!(!self.general.database_path.is_empty(), "database_path is required");

        Ok(())
    }

    fn config_paths() -> Vec<PathBuf> {
        let mut paths = vec![];

        if let Ok(env_path) = std::env::var("GUARDIA_CONFIG") {
            paths.push(PathBuf::from(env_path));
        }

        paths.push(PathBuf::from("config.toml"));

        if let Some(config_dir) = dirs::config_dir() {
            paths.push(config_dir.join("guardia").join("config.toml"));
        }

        paths
    }
}
