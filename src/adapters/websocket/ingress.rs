//! Per-connection read loop.
//!
//! Registers the connection, then publishes every text frame to the bus
//! before reading the next one. Reading races the connection's teardown
//! signal, so an eviction from elsewhere ends the loop even while the peer
//! is silent. Whatever ends the loop, teardown always runs in the same
//! order: stop reading, drop from the registry, close the socket.

use std::sync::Arc;

use futures::{Stream, StreamExt};

use crate::domain::foundation::{Timestamp, Topic};
use crate::ports::MessagePublisher;

use super::connection::{Connection, ConnectionError};
use super::frames::InboundFrame;
use super::registry::ConnectionRegistry;

/// Shared collaborators every ingress loop needs.
#[derive(Clone)]
pub struct IngressContext {
    pub registry: Arc<ConnectionRegistry>,
    pub publisher: Arc<dyn MessagePublisher>,
    pub topic: Topic,
}

/// Why an ingress loop stopped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IngressExit {
    /// The peer sent a close frame.
    PeerClosed,
    /// Reading from the socket failed.
    ReadError(ConnectionError),
    /// The frame stream ended without a close frame.
    StreamEnded,
    /// Someone else (the fan-out bridge, shutdown) tore the connection down.
    Evicted,
}

/// Run the read loop for one connection until it terminates.
pub async fn serve_connection<F>(
    connection: Arc<Connection>,
    mut frames: F,
    context: IngressContext,
) -> IngressExit
where
    F: Stream<Item = Result<InboundFrame, ConnectionError>> + Unpin,
{
    let id = connection.id();
    context.registry.add(id, connection.clone()).await;
    if !connection.mark_open() {
        context.registry.evict(&connection).await;
        return IngressExit::Evicted;
    }
    tracing::info!(connection_id = %id, "Client connected");

    let exit = loop {
        let frame = tokio::select! {
            biased;
            _ = connection.closing() => break IngressExit::Evicted,
            frame = frames.next() => frame,
        };
        let Some(frame) = frame else {
            break IngressExit::StreamEnded;
        };
        if !connection.state().accepts_writes() {
            break IngressExit::Evicted;
        }

        match frame {
            Ok(InboundFrame::Text(payload)) => {
                if let Err(e) = context.publisher.publish(&context.topic, &payload).await {
                    tracing::warn!(
                        connection_id = %id,
                        topic = %context.topic,
                        error = %e,
                        "Failed to publish message, dropping it"
                    );
                }
            }
            Ok(InboundFrame::Binary(bytes)) => {
                tracing::warn!(
                    connection_id = %id,
                    len = bytes.len(),
                    "Ignoring unsupported binary frame"
                );
            }
            Ok(InboundFrame::Control) => {}
            Ok(InboundFrame::Close) => break IngressExit::PeerClosed,
            Err(e) => break IngressExit::ReadError(e),
        }
    };

    drop(frames);
    context.registry.evict(&connection).await;

    let connected_secs = Timestamp::now()
        .duration_since(&connection.connected_at())
        .num_seconds();
    match &exit {
        IngressExit::ReadError(e) => tracing::debug!(
            connection_id = %id,
            connected_secs,
            error = %e,
            "Client disconnected after read error"
        ),
        other => tracing::info!(
            connection_id = %id,
            connected_secs,
            reason = ?other,
            "Client disconnected"
        ),
    }
    exit
}
