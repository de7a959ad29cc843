//! Inbound frame classification.

use axum::extract::ws::Message;
use futures::{Stream, StreamExt};

use super::connection::ConnectionError;

/// What a single read from a client socket produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InboundFrame {
    /// Application payload.
    Text(String),
    /// Unsupported; logged and ignored.
    Binary(Vec<u8>),
    /// Ping or pong; answered by the transport.
    Control,
    /// The peer is closing.
    Close,
}

impl From<Message> for InboundFrame {
    fn from(message: Message) -> Self {
        match message {
            Message::Text(text) => InboundFrame::Text(text),
            Message::Binary(bytes) => InboundFrame::Binary(bytes),
            Message::Ping(_) | Message::Pong(_) => InboundFrame::Control,
            Message::Close(_) => InboundFrame::Close,
        }
    }
}

/// Adapt the read half of an axum socket into a stream of inbound frames.
pub fn socket_frames<S>(socket: S) -> impl Stream<Item = Result<InboundFrame, ConnectionError>> + Unpin
where
    S: Stream<Item = Result<Message, axum::Error>> + Unpin,
{
    socket.map(|item| {
        item.map(InboundFrame::from)
            .map_err(|e| ConnectionError::Transport(e.to_string()))
    })
}
