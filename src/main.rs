//! Chore sync - single-document JSON sync server

use clap::Parser;
use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use chore_sync::config::Args;
use chore_sync::server::{shutdown_signal, AppState, Server};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables from .env file if present
    let _ = dotenvy::dotenv();

    let args = Args::parse();

    // Initialize tracing/logging
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| format!("chore_sync={},info", args.log_level).into());
    let registry = tracing_subscriber::registry().with(filter);
    if args.log_json {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }

    if let Err(e) = args.validate() {
        error!("Configuration error: {}", e);
        std::process::exit(1);
    }

    info!("======================================");
    info!("  Chore Sync");
    info!("======================================");
    info!("Data file: {}", args.data_file.display());
    info!(
        "Static root: {}",
        args.static_root()
            .map(|p| p.display().to_string())
            .unwrap_or_else(|| "disabled".to_string())
    );
    info!("Outbox capacity: {}", args.outbox_capacity);
    info!("Max payload: {} bytes", args.max_body_bytes);
    info!("======================================");

    let state = Arc::new(AppState::new(args).await);
    let server = Server::bind(state).await?;

    info!("REST listening on http://{}", server.rest_addr()?);
    match server.socket_addr() {
        Some(addr) => info!("WebSocket listening on ws://{}", addr),
        None => info!("WebSocket listener disabled, use /ws on the REST port"),
    }

    server.run_until(shutdown_signal()).await?;

    Ok(())
}
