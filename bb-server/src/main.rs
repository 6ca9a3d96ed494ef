//! bb-server - lab data catalog service
//!
//! Loads the bootstrap TOML, opens the catalog database and serves the
//! HTTP API until interrupted.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use bb_common::config::{self, TomlConfig};
use bb_common::events::EventBus;
use clap::Parser;
use tokio::signal;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use bb_server::notify::{BusNotifier, FanoutNotifier, Notifier, WebhookNotifier};
use bb_server::{build_router, AppState, EVENT_BUS_CAPACITY};

/// Command-line arguments for bb-server
#[derive(Parser, Debug)]
#[command(name = "bb-server")]
#[command(about = "Lab data catalog for runs and images")]
#[command(version)]
struct Args {
    /// Bootstrap configuration file
    #[arg(short, long, env = config::CONFIG_FILE_ENV)]
    config: Option<PathBuf>,

    /// Root folder holding the catalog database
    #[arg(short, long, env = config::ROOT_FOLDER_ENV)]
    root_folder: Option<PathBuf>,

    /// Listen address, overrides the configured one
    #[arg(short, long)]
    bind: Option<String>,
}

fn init_tracing(config: &TomlConfig) -> Result<()> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| {
            format!("bb_server={0},bb_common={0},tower_http={0}", config.logging.level).into()
        });

    let file_layer = match &config.logging.file {
        Some(path) => {
            let file = std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("Failed to open log file {}", path.display()))?;
            Some(
                tracing_subscriber::fmt::layer()
                    .with_ansi(false)
                    .with_writer(Arc::new(file)),
            )
        }
        None => None,
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .with(file_layer)
        .init();
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let config = TomlConfig::load_or_default(args.config.as_deref());
    init_tracing(&config)?;

    // Build identity first, before any database work
    info!(
        "Starting bb-server v{} [{}] built {} ({})",
        env!("CARGO_PKG_VERSION"),
        env!("GIT_HASH"),
        env!("BUILD_TIMESTAMP"),
        env!("BUILD_PROFILE")
    );

    let root_folder = config::resolve_root_folder(args.root_folder.as_deref(), &config);
    let db_path = config.database_path(&root_folder);
    info!("Root folder: {}", root_folder.display());
    info!("Database path: {}", db_path.display());

    let pool = bb_common::db::init_database(&db_path)
        .await
        .context("Failed to initialize database")?;
    info!("✓ Database ready");

    let event_bus = EventBus::new(EVENT_BUS_CAPACITY);
    let mut notifiers: Vec<Arc<dyn Notifier>> =
        vec![Arc::new(BusNotifier::new(event_bus.clone()))];
    if let Some(url) = &config.notify_url {
        match WebhookNotifier::new(url.clone()) {
            Ok(webhook) => {
                info!("New-image webhook: {}", url);
                notifiers.push(Arc::new(webhook));
            }
            Err(e) => warn!("Webhook disabled: {}", e),
        }
    }

    let state = AppState::new(
        pool,
        event_bus,
        Arc::new(FanoutNotifier::new(notifiers)),
        config.match_tolerance(),
        config.list_cache_ttl(),
    )
    .context("Failed to build application state")?;
    info!(
        "Run match tolerance: ±{}s, list cache TTL: {}s",
        config.match_tolerance_secs, config.list_cache_ttl_secs
    );

    let app = build_router(state);

    let bind = args.bind.unwrap_or_else(|| config.bind.clone());
    let listener = tokio::net::TcpListener::bind(&bind)
        .await
        .with_context(|| format!("Failed to bind to {}", bind))?;
    info!("bb-server listening on http://{}", bind);
    info!("Health check: http://{}/health", bind);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    info!("Server shutdown complete");
    Ok(())
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                warn!("Failed to install SIGTERM handler: {}", e);
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
