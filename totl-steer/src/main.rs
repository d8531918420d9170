//! totl-steer - Referral steerage service
//!
//! Accepts feed batches and carrier webhooks over HTTP, keeps the consent
//! ledger, and texts members about lower-cost facilities.

use std::net::SocketAddr;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::signal;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use totl_steer::services::transport::transport_from_config;
use totl_steer::AppState;

/// Command-line arguments for totl-steer
#[derive(Parser, Debug)]
#[command(name = "totl-steer")]
#[command(about = "Referral intake, consent and steerage service")]
#[command(version)]
struct Args {
    /// TOML configuration file
    #[arg(short, long, env = "TOTL_CONFIG")]
    config: Option<PathBuf>,

    /// SQLite database file (overrides the config file)
    #[arg(short, long, env = "TOTL_DATABASE")]
    database: Option<PathBuf>,

    /// Port to listen on (overrides the config file)
    #[arg(short, long, env = "TOTL_PORT")]
    port: Option<u16>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let mut config = totl_common::config::load_config(args.config.as_deref())
        .context("Failed to load configuration")?;
    if let Some(database) = args.database {
        config.database_path = Some(database);
    }
    if let Some(port) = args.port {
        config.port = port;
    }

    // RUST_LOG wins over the configured level
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                format!("totl_steer={0},totl_common={0},tower_http=info", config.logging.level).into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting totl-steer (Referral Steerage) service");
    info!("Version: {}", env!("CARGO_PKG_VERSION"));

    let db_path = config.resolved_database_path();
    info!("Database: {}", db_path.display());
    let pool = totl_common::db::init_database(&db_path)
        .await
        .context("Failed to initialize database")?;

    let transport = transport_from_config(&config.messaging)
        .context("Failed to configure messaging transport")?;

    let addr: SocketAddr = format!("{}:{}", config.host, config.port)
        .parse()
        .context("Invalid bind address")?;

    let state = AppState::new(pool, config, transport).context("Failed to build services")?;
    let app = totl_steer::build_router(state);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .context("Failed to bind to address")?;
    info!("Listening on http://{}", addr);
    info!("Health check: http://{}/health", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    info!("Server shutdown complete");
    Ok(())
}

/// Resolves on Ctrl+C or SIGTERM
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, shutting down");
        },
        _ = terminate => {
            info!("Received terminate signal, shutting down");
        },
    }
}
