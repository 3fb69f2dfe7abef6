//! Dialog Server - standalone headless server hosting the audio dialog proxy.
//!
//! Proxies a bidirectional real-time audio conversation between a
//! browser-style client and an upstream generative "Live" model over a single
//! WebSocket endpoint.

mod config;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use dialog_core::{start_server, AppState, BroadcastEventBridge, NetworkContext, ServerLifecycle};
use parking_lot::RwLock;
use tokio::signal;

/// Dialog Server - headless real-time audio dialog proxy.
#[derive(Parser, Debug)]
#[command(name = "dialog-server")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to the configuration file (YAML).
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Log level (error, warn, info, debug, trace).
    #[arg(short, long, default_value = "info", env = "DIALOG_LOG_LEVEL")]
    log_level: log::LevelFilter,

    /// Bind port (overrides config file).
    #[arg(short = 'p', long, env = "DIALOG_BIND_PORT")]
    port: Option<u16>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    env_logger::Builder::new()
        .filter_level(args.log_level)
        .format_timestamp_millis()
        .init();

    log::info!("Dialog Server v{}", env!("CARGO_PKG_VERSION"));

    let mut core_config =
        config::load(args.config.as_deref()).context("Failed to load configuration")?;

    if let Some(port) = args.port {
        core_config.preferred_port = port;
    }

    log::info!(
        "Configuration: bind_port={}, upstream_model={}",
        core_config.preferred_port,
        core_config.upstream.model
    );

    let event_bridge = Arc::new(BroadcastEventBridge::new(core_config.event_channel_capacity));
    let network = NetworkContext::new(core_config.preferred_port);
    let config = Arc::new(RwLock::new(core_config));

    let app_state = AppState::builder()
        .config(config)
        .event_bridge(event_bridge)
        .network(network)
        .lifecycle(Arc::new(ServerLifecycle))
        .build();

    let server_handle = tokio::spawn(async move {
        if let Err(e) = start_server(app_state).await {
            log::error!("Server error: {}", e);
        }
    });

    log::info!("HTTP server task spawned");

    shutdown_signal().await;

    log::info!("Shutdown signal received, cleaning up...");

    server_handle.abort();

    log::info!("Shutdown complete");
    Ok(())
}

/// Waits for a shutdown signal (Ctrl+C or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
