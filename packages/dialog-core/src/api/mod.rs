//! HTTP/WebSocket API layer.
//!
//! This module contains thin handlers that delegate to the segmentation,
//! upstream, and caption components. It provides the router construction and
//! server startup functionality.

use std::sync::Arc;

use parking_lot::RwLock;
use thiserror::Error;

use crate::config::Config;
use crate::context::NetworkContext;
use crate::events::BroadcastEventBridge;
use crate::lifecycle::Lifecycle;

pub mod http;
pub mod ws;

/// Errors that can occur when starting or running the server.
#[derive(Debug, Error)]
pub enum ServerError {
    /// Failed to bind to a TCP port.
    #[error("Failed to bind to port: {0}")]
    Bind(#[from] std::io::Error),
}

/// Shared application state for the API layer.
#[derive(Clone)]
pub struct AppState {
    /// Application configuration.
    pub config: Arc<RwLock<Config>>,
    /// Event bridge for fanning domain events out to the connected client.
    pub event_bridge: Arc<BroadcastEventBridge>,
    /// Network configuration (bind port).
    pub network: NetworkContext,
    /// Process lifecycle control (shutdown).
    pub lifecycle: Arc<dyn Lifecycle>,
}

/// Builder for constructing an `AppState`.
#[derive(Default)]
pub struct AppStateBuilder {
    config: Option<Arc<RwLock<Config>>>,
    event_bridge: Option<Arc<BroadcastEventBridge>>,
    network: Option<NetworkContext>,
    lifecycle: Option<Arc<dyn Lifecycle>>,
}

impl AppStateBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn config(mut self, config: Arc<RwLock<Config>>) -> Self {
        self.config = Some(config);
        self
    }

    pub fn event_bridge(mut self, bridge: Arc<BroadcastEventBridge>) -> Self {
        self.event_bridge = Some(bridge);
        self
    }

    pub fn network(mut self, network: NetworkContext) -> Self {
        self.network = Some(network);
        self
    }

    pub fn lifecycle(mut self, lifecycle: Arc<dyn Lifecycle>) -> Self {
        self.lifecycle = Some(lifecycle);
        self
    }

    /// Builds the `AppState`, panicking if required fields are missing.
    pub fn build(self) -> AppState {
        AppState {
            config: self.config.expect("config is required"),
            event_bridge: self.event_bridge.expect("event_bridge is required"),
            network: self.network.expect("network is required"),
            lifecycle: self.lifecycle.expect("lifecycle is required"),
        }
    }
}

impl AppState {
    pub fn builder() -> AppStateBuilder {
        AppStateBuilder::new()
    }
}

/// Starts the HTTP server on the configured (or OS-assigned) port.
pub async fn start_server(state: AppState) -> Result<(), ServerError> {
    let preferred_port = state.config.read().preferred_port;
    let addr = std::net::SocketAddr::from(([0, 0, 0, 0], preferred_port));
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    let port = listener.local_addr()?.port();

    state.network.set_port(port);
    log::info!("[Server] listening on http://0.0.0.0:{}", port);

    let cors = tower_http::cors::CorsLayer::new()
        .allow_origin(tower_http::cors::Any)
        .allow_methods(tower_http::cors::Any)
        .allow_headers(tower_http::cors::Any);

    let app = http::create_router(state)
        .layer(cors)
        .layer(tower_http::trace::TraceLayer::new_for_http());

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<std::net::SocketAddr>(),
    )
    .await?;
    Ok(())
}
