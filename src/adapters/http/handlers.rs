//! HTTP handlers.

use axum::extract::{Json, State};

use crate::adapters::websocket::WebSocketState;
use crate::domain::foundation::Timestamp;

use super::dto::HealthResponse;

/// Liveness check reporting the local connection count.
pub async fn health(State(state): State<WebSocketState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        connections: state.registry.len().await,
        topic: state.topic.to_string(),
        timestamp: Timestamp::now().to_rfc3339(),
    })
}
