//! HTTP route handlers.
//!
//! All handlers are thin - they delegate to the domain components wired up
//! per-connection in [`crate::api::ws`].

use axum::{routing::get, Json, Router};
use serde_json::json;

use crate::api::ws::ws_handler;
use crate::api::AppState;

/// Liveness/readiness probe. Returns 200 with a small status body as long as
/// the process is up; does not attempt to reach the upstream model.
async fn health(axum::extract::State(state): axum::extract::State<AppState>) -> Json<serde_json::Value> {
    Json(json!({
        "status": "ok",
        "port": state.network.get_port(),
    }))
}

/// Builds the application router.
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/ws", get(ws_handler))
        .with_state(state)
}
