pub mod api;
pub mod cli;
pub mod clock;
pub mod config;
pub mod db;
pub mod entities;
pub mod models;
pub mod services;
pub mod state;

use std::sync::Arc;
use tokio::signal;

use anyhow::Context;
use clap::Parser;
pub use config::Config;
use db::Store;
use state::SharedState;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

pub async fn run() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let config = Config::load()?;
    config.validate()?;

    let prometheus_handle = if config.observability.metrics_enabled {
        use metrics_exporter_prometheus::PrometheusBuilder;
        let builder = PrometheusBuilder::new();
        let handle = builder
            .install_recorder()
            .context("Failed to install Prometheus recorder")?;
        info!("Prometheus metrics recorder initialized");
        Some(handle)
    } else {
        None
    };

    use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.general.log_level));

    let fmt_layer = tracing_subscriber::fmt::layer();

    let registry = tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer);

    if config.observability.loki_enabled {
        let url = url::Url::parse(&config.observability.loki_url).context("Invalid Loki URL")?;

        let (layer, task) = tracing_loki::builder()
            .label("app", "guardia")?
            .extra_field("env", "production")?
            .build_url(url)?;

        tokio::spawn(task);

        registry.with(layer).init();
        info!(
            "Loki logging initialized at {}",
            config.observability.loki_url
        );
    } else {
        registry.init();
    }

    let cli = cli::Cli::parse();

    match cli.command {
        None | Some(cli::Commands::Serve) => run_server(config, prometheus_handle).await,
        Some(cli::Commands::Unlock { identifier, all }) => {
            cmd_unlock(&config, identifier.as_deref(), all).await
        }
    }
}

async fn run_server(
    config: Config,
    prometheus_handle: Option<metrics_exporter_prometheus::PrometheusHandle>,
) -> anyhow::Result<()> {
    info!("Guardia v{} starting...", env!("CARGO_PKG_VERSION"));

    let bind_address = config.server.bind_address.clone();
    let port = config.server.port;

    let shared = Arc::new(SharedState::new(config).await?);
    let state = api::create_app_state(shared, prometheus_handle);

    let app = api::router(state).await;
    let addr = format!("{bind_address}:{port}");
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {addr}"))?;

    info!("Listening on http://{addr}");

    let server = tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app).await {
            error!("Server error: {}", e);
        }
    });

    match signal::ctrl_c().await {
        Ok(()) => info!("Shutdown signal received"),
        Err(e) => error!("Error listening for shutdown: {}", e),
    }

    server.abort();
    info!("Server stopped");

    Ok(())
}

async fn cmd_unlock(config: &Config, identifier: Option<&str>, all: bool) -> anyhow::Result<()> {
    use clock::SystemClock;
    use models::{Principal, Role};
    use services::{AdminError, AdminService, RequestMeta, TracingAuditSink, UnlockOutcome};

    let store = Store::new(&config.general.database_path).await?;
    let admin = AdminService::new(
        store.clone(),
        Arc::new(TracingAuditSink),
        Arc::new(SystemClock),
    );

    // Operator identity for the audit trail; the CLI runs with admin scope.
    let operator = Principal {
        account_id: 0,
        username: "cli".to_string(),
        role: Role::Admin,
    };
    let meta = RequestMeta::default();

    if all {
        let released = admin.unlock_all(&operator, &meta).await?;
        println!("Released {released} locked accounts.");
        return Ok(());
    }

    let Some(identifier) = identifier else {
        println!("Usage: guardia unlock <username-or-email>");
        println!("       guardia unlock --all");
        return Ok(());
    };

    match admin.unlock(identifier, &operator, &meta).await {
        Ok(UnlockOutcome::Unlocked) => println!("Unlocked account '{identifier}'."),
        Ok(UnlockOutcome::NotLocked) => {
            println!("Account '{identifier}' has no lock to release.");
        }
        Err(AdminError::NotFound) => println!("Account '{identifier}' not found."),
        Err(e) => return Err(e.into()),
    }

    Ok(())
}
