//! tpm-server - therapy practice manager HTTP service
//!
//! Resolves the data folder, opens the database and blob store, and serves
//! the practice, portal and admin APIs until interrupted.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::signal;
use tpm_common::config::{load_server_config, resolve_root_folder, RootFolder};
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use tpm_server::services::{LocalBlobStore, OpenAiCompatibleDrafter};
use tpm_server::AppState;

/// Command-line arguments for tpm-server
#[derive(Parser, Debug)]
#[command(name = "tpm-server")]
#[command(about = "Therapy practice manager API server")]
#[command(version)]
struct Args {
    /// Data folder holding the database and document blobs
    #[arg(short, long)]
    root_folder: Option<PathBuf>,

    /// TOML configuration file
    #[arg(short, long, env = "TPM_CONFIG")]
    config: Option<PathBuf>,

    /// Address to bind (overrides the config file)
    #[arg(long)]
    bind: Option<String>,

    /// Port to listen on (overrides the config file)
    #[arg(short, long)]
    port: Option<u16>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!(
        "Starting tpm-server v{} [{}] built {} ({})",
        env!("CARGO_PKG_VERSION"),
        env!("TPM_GIT_HASH"),
        env!("TPM_BUILD_TIMESTAMP"),
        env!("TPM_BUILD_PROFILE")
    );

    let args = Args::parse();
    let config = load_server_config(args.config.as_deref())
        .context("Failed to load configuration")?;

    let root = RootFolder::new(resolve_root_folder(
        args.root_folder.as_deref(),
        "TPM_ROOT",
        &config,
    ));
    root.ensure_directory_exists()
        .context("Failed to create root folder")?;
    info!("Root folder: {}", root.path().display());

    let db_path = root.database_path();
    let pool = tpm_common::db::init_database(&db_path)
        .await
        .with_context(|| format!("Failed to open database {}", db_path.display()))?;
    info!("Database: {}", db_path.display());

    let blobs = LocalBlobStore::new(root.blob_path());
    info!("Blob store: {}", blobs.root().display());

    let mut state = AppState::new(pool, Arc::new(blobs));

    match &config.llm {
        Some(llm) => {
            let drafter = OpenAiCompatibleDrafter::from_config(llm)
                .context("Failed to configure note drafting")?;
            info!("Note drafting via {} ({})", llm.api_base_url, drafter.model());
            state = state.with_drafter(Arc::new(drafter));
        }
        None => info!("No [llm] section configured; note drafting disabled"),
    }

    match &config.admin_token {
        Some(token) if !token.trim().is_empty() => {
            state = state.with_admin_token(token.trim());
        }
        _ => warn!("No admin_token configured; admin routes are disabled"),
    }

    let app = tpm_server::build_router(state);

    let bind = args.bind.unwrap_or(config.bind);
    let port = args.port.unwrap_or(config.port);
    let listener = tokio::net::TcpListener::bind((bind.as_str(), port))
        .await
        .with_context(|| format!("Failed to bind to {}:{}", bind, port))?;
    info!("Listening on http://{}", listener.local_addr()?);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    info!("Server shutdown complete");
    Ok(())
}

/// Resolve when Ctrl+C or SIGTERM arrives
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
        _ = ctrl_c => info!("Received Ctrl+C, shutting down"),
        _ = terminate => info!("Received terminate signal, shutting down"),
    }
}
