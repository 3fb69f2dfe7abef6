//! Application lifecycle abstraction.
//!
//! This module provides a [`Lifecycle`] trait for controlling process-level
//! lifecycle operations like shutdown, decoupling the server binary's signal
//! handling from the core library.
pub trait Lifecycle: Send + Sync {
    /// Requests a graceful shutdown.
    ///
    /// The application should clean up resources and exit cleanly.
    fn request_shutdown(&self);
}

/// Server lifecycle implementation for standalone deployment.
pub struct ServerLifecycle;

impl Lifecycle for ServerLifecycle {
    fn request_shutdown(&self) {
        log::info!("[Lifecycle] Shutdown requested");
        std::process::exit(0);
    }
}

/// No-op lifecycle for testing or embedded use.
pub struct NoopLifecycle;

impl Lifecycle for NoopLifecycle {
    fn request_shutdown(&self) {
        log::debug!("[Lifecycle] Shutdown requested (no-op)");
    }
}
