//! Network configuration context for the proxy server.
//!
//! This module provides [`NetworkContext`], which bundles the bind port the
//! HTTP/WebSocket server ends up listening on so other components (logging,
//! the `/health` endpoint) can read it once the listener is bound.

use std::sync::Arc;

use parking_lot::RwLock;
use tokio::sync::Notify;

/// Network configuration shared across components.
#[derive(Clone)]
pub struct NetworkContext {
    /// Server port (0 until the server binds and assigns the real value).
    pub port: Arc<RwLock<u16>>,
    /// Notifier signaled when the port is assigned.
    pub port_notify: Arc<Notify>,
}

impl NetworkContext {
    /// Creates a `NetworkContext` with an explicit preferred port (0 for
    /// auto-assign).
    #[must_use]
    pub fn new(preferred_port: u16) -> Self {
        Self {
            port: Arc::new(RwLock::new(preferred_port)),
            port_notify: Arc::new(Notify::new()),
        }
    }

    /// Returns the current port value.
    #[must_use]
    pub fn get_port(&self) -> u16 {
        *self.port.read()
    }

    /// Sets the port and notifies waiters.
    pub fn set_port(&self, port: u16) {
        *self.port.write() = port;
        self.port_notify.notify_waiters();
    }

    /// Returns a `UrlBuilder` for the current network configuration, bound to
    /// `host`.
    #[must_use]
    pub fn url_builder(&self, host: impl Into<String>) -> UrlBuilder {
        UrlBuilder::new(host.into(), self.get_port())
    }
}

/// Builder for constructing URLs for the proxy server.
pub struct UrlBuilder {
    host: String,
    port: u16,
}

impl UrlBuilder {
    /// Creates a new `UrlBuilder` for the given server address.
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }

    /// Returns the base URL for the server (e.g., `http://127.0.0.1:8080`).
    #[must_use]
    pub fn base_url(&self) -> String {
        format!("http://{}:{}", self.host, self.port)
    }

    /// Returns the WebSocket URL for the dialog endpoint.
    #[must_use]
    pub fn websocket_url(&self) -> String {
        format!("ws://{}:{}/ws", self.host, self.port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn context_tracks_assigned_port() {
        let ctx = NetworkContext::new(0);
        assert_eq!(ctx.get_port(), 0);
        ctx.set_port(8080);
        assert_eq!(ctx.get_port(), 8080);
    }

    #[test]
    fn url_builder_generates_correct_urls() {
        let builder = UrlBuilder::new("127.0.0.1", 8080);
        assert_eq!(builder.base_url(), "http://127.0.0.1:8080");
        assert_eq!(builder.websocket_url(), "ws://127.0.0.1:8080/ws");
    }
}
