//! WebSocket upgrade handler for chat clients.
//!
//! Handles the HTTP → WebSocket upgrade and hands the socket to the ingress
//! loop:
//! 1. Apply buffer and message size limits
//! 2. Upgrade to WebSocket
//! 3. Split the socket; the write half becomes a registered `Connection`
//! 4. Read until disconnect, publishing every text frame
//! 5. Evict the connection

use std::sync::Arc;

use axum::{
    extract::{
        ws::{WebSocket, WebSocketUpgrade},
        State,
    },
    response::Response,
};
use futures::StreamExt;

use crate::config::ServerConfig;
use crate::domain::foundation::Topic;
use crate::ports::MessagePublisher;

use super::connection::Connection;
use super::frames::socket_frames;
use super::ingress::{serve_connection, IngressContext};
use super::registry::ConnectionRegistry;

/// Socket buffer and frame size limits applied at upgrade time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WebSocketLimits {
    pub write_buffer_size: usize,
    pub max_message_size: usize,
    pub max_frame_size: usize,
}

impl WebSocketLimits {
    pub fn from_config(config: &ServerConfig) -> Self {
        Self {
            write_buffer_size: config.write_buffer_size,
            max_message_size: config.max_message_size,
            max_frame_size: config.max_frame_size,
        }
    }
}

impl Default for WebSocketLimits {
    fn default() -> Self {
        Self::from_config(&ServerConfig::default())
    }
}

/// State required for WebSocket handling.
#[derive(Clone)]
pub struct WebSocketState {
    /// Every live connection in this process.
    pub registry: Arc<ConnectionRegistry>,
    /// Where inbound messages go.
    pub publisher: Arc<dyn MessagePublisher>,
    /// Topic inbound messages are published to.
    pub topic: Topic,
    pub limits: WebSocketLimits,
}

impl WebSocketState {
    pub fn new(
        registry: Arc<ConnectionRegistry>,
        publisher: Arc<dyn MessagePublisher>,
        topic: Topic,
        limits: WebSocketLimits,
    ) -> Self {
        Self {
            registry,
            publisher,
            topic,
            limits,
        }
    }

    fn ingress_context(&self) -> IngressContext {
        IngressContext {
            registry: self.registry.clone(),
            publisher: self.publisher.clone(),
            topic: self.topic.clone(),
        }
    }
}

/// Handle WebSocket upgrade requests.
///
/// Route: `GET {server.ws_path}` (default `/ws`). Any origin is accepted and
/// no sub-protocol is negotiated.
pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<WebSocketState>) -> Response {
    let limits = state.limits;

    ws.write_buffer_size(limits.write_buffer_size)
        .max_message_size(limits.max_message_size)
        .max_frame_size(limits.max_frame_size)
        .on_failed_upgrade(|e| {
            tracing::warn!(error = %e, "WebSocket upgrade failed");
        })
        .on_upgrade(move |socket| handle_socket(socket, state))
}

/// Run one upgraded socket until it disconnects.
async fn handle_socket(socket: WebSocket, state: WebSocketState) {
    let (sender, receiver) = socket.split();
    let connection = Arc::new(Connection::new(sender));

    serve_connection(connection, socket_frames(receiver), state.ingress_context()).await;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::events::InMemoryMessageBus;

    #[test]
    fn limits_follow_server_config() {
        let config = ServerConfig {
            write_buffer_size: 2048,
            max_message_size: 8192,
            max_frame_size: 1024,
            ..Default::default()
        };
        let limits = WebSocketLimits::from_config(&config);

        assert_eq!(limits.write_buffer_size, 2048);
        assert_eq!(limits.max_message_size, 8192);
        assert_eq!(limits.max_frame_size, 1024);
    }

    #[test]
    fn default_limits_match_server_defaults() {
        let limits = WebSocketLimits::default();
        assert_eq!(limits.write_buffer_size, 4096);
        assert_eq!(limits.max_message_size, 64 * 1024);
        assert_eq!(limits.max_frame_size, 64 * 1024);
    }

    #[test]
    fn ingress_context_shares_registry() {
        let registry = Arc::new(ConnectionRegistry::new());
        let state = WebSocketState::new(
            registry.clone(),
            Arc::new(InMemoryMessageBus::new()),
            Topic::default(),
            WebSocketLimits::default(),
        );

        let context = state.ingress_context();
        assert!(Arc::ptr_eq(&context.registry, &registry));
        assert_eq!(context.topic, Topic::default());
    }
}
