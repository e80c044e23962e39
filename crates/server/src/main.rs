//! Depot server binary.

use anyhow::{Context, Result};
use clap::Parser;
use depot_core::config::AppConfig;
use depot_server::{AppState, create_router, spawn_session_sweeper};
use figment::Figment;
use figment::providers::{Env, Format, Toml};
use std::net::SocketAddr;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Depot - a chunked upload coordinator
#[derive(Parser, Debug)]
#[command(name = "depotd")]
#[command(version, about, long_about = None)]
struct Args {
    /// Path to configuration file
    #[arg(
        short,
        long,
        env = "DEPOT_CONFIG",
        default_value = "config/server.toml"
    )]
    config: String,

    /// Override the bind address from configuration
    #[arg(long)]
    bind: Option<String>,
}

/// Merge the optional TOML file with `DEPOT_`-prefixed environment variables.
///
/// Every setting has a default, so running with neither is allowed.
fn load_config(path: &str) -> Result<AppConfig> {
    let mut figment = Figment::new();
    if std::path::Path::new(path).exists() {
        tracing::info!(config_path = %path, "Loading configuration from file");
        figment = figment.merge(Toml::file(path));
    } else {
        tracing::debug!("No config file found at {}", path);
    }

    let config: AppConfig = figment
        .merge(Env::prefixed("DEPOT_").split("__"))
        .extract()
        .context("failed to load configuration")?;
    config
        .validate()
        .map_err(|e| anyhow::anyhow!(e))
        .context("invalid configuration")?;
    Ok(config)
}

#[tokio::main]
async fn main() -> Result<()> {
    // Parse CLI arguments
    let args = Args::parse();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Startup banner
    tracing::info!("Depot v{}", env!("CARGO_PKG_VERSION"));

    let mut config = load_config(&args.config)?;
    if let Some(bind) = args.bind {
        config.server.bind = bind;
    }

    // Initialize storage backend
    let storage = depot_storage::from_config(&config.storage)
        .await
        .context("failed to initialize storage")?;

    // Verify storage connectivity before accepting requests.
    storage
        .health_check()
        .await
        .context("storage health check failed")?;
    tracing::info!(backend = storage.backend_name(), "Storage backend ready");

    let state = AppState::new(config.clone(), storage);

    let sweep_interval = config.uploads.sweep_interval();
    let _sweeper = spawn_session_sweeper(state.uploads.clone(), sweep_interval);
    tracing::info!(
        interval_secs = sweep_interval.as_secs(),
        "Session sweeper spawned"
    );

    // Create router
    let app = create_router(state);

    // Parse bind address
    let addr: SocketAddr = config.server.bind.parse().context("invalid bind address")?;

    tracing::info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind to {}", addr))?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Server stopped");
    Ok(())
}

/// Resolve when the process receives Ctrl-C.
async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}
