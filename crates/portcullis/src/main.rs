//! Portcullis binary: load configuration, build the guard, serve HTTP.

use anyhow::{Context, Result};
use clap::Parser;
use std::net::SocketAddr;
use tracing::{error, info};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

use portcullis::config::{AppConfig, Overrides};
use portcullis::routes;
use portcullis::state::AppState;

/// Portcullis - login-abuse challenge guard
#[derive(Parser, Debug)]
#[command(name = "portcullis")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Configuration file path
    #[arg(short, long, default_value = "config/portcullis.toml", env = "PORTCULLIS_CONFIG")]
    config: String,

    /// Redis URL (switches the failure ledger to Redis)
    #[arg(long, env = "REDIS_URL")]
    redis_url: Option<String>,

    /// Listen address (overrides config)
    #[arg(short, long, env = "LISTEN_ADDR")]
    listen: Option<String>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info", env = "LOG_LEVEL")]
    log_level: String,

    /// Enable JSON logging output
    #[arg(long, default_value = "false")]
    json_logs: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    // .env is optional
    let _ = dotenvy::dotenv();

    // Parse CLI arguments
    let args = Args::parse();

    // Initialize logging
    init_logging(&args.log_level, args.json_logs)?;

    info!(version = env!("CARGO_PKG_VERSION"), "Starting Portcullis");

    // Load configuration
    let overrides = Overrides {
        listen_addr: args.listen.clone(),
        redis_url: args.redis_url.clone(),
    };
    let config = AppConfig::load(&args.config, &overrides)?;
    info!(
        path = %args.config,
        threshold = config.guard.failure_threshold,
        protected = ?config.guard.protected_grant_types,
        ledger = ?config.ledger.backend,
        "Configuration loaded"
    );

    let listen_addr = config.listen_addr.clone();

    // Initialize application state
    let state = AppState::new(config).await?;

    // Build router
    let app = routes::create_router(state);

    // Start server
    let listener = tokio::net::TcpListener::bind(&listen_addr)
        .await
        .with_context(|| format!("Failed to bind {}", listen_addr))?;
    info!(addr = %listen_addr, "Portcullis listening");

    axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>())
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    info!("Portcullis shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!(error = %e, "Failed to install Ctrl+C handler");
        return std::future::pending().await;
    }
    info!("Shutdown signal received");
}

/// Initialize structured logging with tracing
fn init_logging(level: &str, json: bool) -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    if json {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json())
            .try_init()
            .context("Failed to initialize logging")?;
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_target(true).with_thread_ids(true))
            .try_init()
            .context("Failed to initialize logging")?;
    }

    Ok(())
}
