//! Axum router configuration.

use axum::{routing::get, Router};
use tower_http::trace::TraceLayer;

use crate::adapters::websocket::{ws_handler, WebSocketState};

use super::handlers::health;

/// Create the application router.
///
/// # Routes
/// - `GET {ws_path}` - WebSocket upgrade for chat clients
/// - `GET /health` - Liveness check
pub fn app_router(state: WebSocketState, ws_path: &str) -> Router {
    Router::new()
        .route(ws_path, get(ws_handler))
        .route("/health", get(health))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
