//! HTTP response bodies.

use serde::Serialize;

/// Body of `GET /health`.
#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    /// Connections registered in this process.
    pub connections: usize,
    pub topic: String,
    /// RFC 3339 time the response was produced.
    pub timestamp: String,
}
