//! One accepted client connection and its serialized write path.
//!
//! Every outbound frame, broadcast payload or close frame, goes through the
//! connection's own write lock, so at most one writer is ever mid-write on a
//! socket. The lifecycle state is kept in an atomic so readers never need
//! the lock to decide whether a connection is still usable. Leaving `Open`
//! also fires a teardown signal that the connection's read loop waits on.

use std::sync::atomic::{AtomicU8, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use axum::extract::ws::{Message, WebSocket};
use futures::stream::SplitSink;
use futures::SinkExt;
use tokio::sync::{watch, Mutex};
use tokio::time;

use crate::domain::foundation::{ConnectionId, ConnectionState, StateMachine, Timestamp};

/// Errors local to a single connection.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConnectionError {
    /// Teardown has started; no more writes are accepted.
    #[error("Connection is closed")]
    Closed,

    /// The underlying socket failed.
    #[error("Transport error: {0}")]
    Transport(String),

    /// A write did not complete within the configured bound.
    #[error("Write timed out")]
    WriteTimeout,
}

/// Write half of a client socket.
#[async_trait]
pub trait FrameWriter: Send {
    /// Send one text frame.
    async fn write_text(&mut self, payload: &str) -> Result<(), ConnectionError>;

    /// Send a close frame and shut the write half down.
    async fn close(&mut self) -> Result<(), ConnectionError>;
}

#[async_trait]
impl FrameWriter for SplitSink<WebSocket, Message> {
    async fn write_text(&mut self, payload: &str) -> Result<(), ConnectionError> {
        self.send(Message::Text(payload.to_owned()))
            .await
            .map_err(|e| ConnectionError::Transport(e.to_string()))
    }

    async fn close(&mut self) -> Result<(), ConnectionError> {
        SinkExt::close(self)
            .await
            .map_err(|e| ConnectionError::Transport(e.to_string()))
    }
}

/// A registered (or about to be registered) client.
pub struct Connection {
    id: ConnectionId,
    connected_at: Timestamp,
    state: AtomicU8,
    teardown: watch::Sender<bool>,
    writer: Mutex<Box<dyn FrameWriter>>,
}

impl Connection {
    /// Wrap a writer under a fresh random id.
    pub fn new<W: FrameWriter + 'static>(writer: W) -> Self {
        Self::with_id(ConnectionId::new(), writer)
    }

    /// Wrap a writer under a known id.
    pub fn with_id<W: FrameWriter + 'static>(id: ConnectionId, writer: W) -> Self {
        let (teardown, _) = watch::channel(false);
        Self {
            id,
            connected_at: Timestamp::now(),
            state: AtomicU8::new(ConnectionState::Connecting.as_u8()),
            teardown,
            writer: Mutex::new(Box::new(writer)),
        }
    }

    pub fn id(&self) -> ConnectionId {
        self.id
    }

    pub fn connected_at(&self) -> Timestamp {
        self.connected_at
    }

    pub fn state(&self) -> ConnectionState {
        ConnectionState::from_u8(self.state.load(Ordering::Acquire))
            .unwrap_or(ConnectionState::Closed)
    }

    /// Move from `Connecting` to `Open`. Returns false if teardown already began.
    pub fn mark_open(&self) -> bool {
        self.transition(ConnectionState::Open).is_ok()
    }

    /// Start teardown.
    ///
    /// Returns true only for the caller that performed the transition, so
    /// concurrent evictions agree on a single owner of the close.
    pub fn begin_close(&self) -> bool {
        if self.transition(ConnectionState::Closing).is_err() {
            return false;
        }
        self.teardown.send_replace(true);
        true
    }

    /// Resolves once teardown has begun, immediately if it already has.
    pub async fn closing(&self) {
        let mut teardown = self.teardown.subscribe();
        // The sender lives as long as `self`, so this cannot fail early.
        let _ = teardown.wait_for(|closing| *closing).await;
    }

    /// Write one text frame under the connection's write lock.
    pub async fn send(&self, payload: &str) -> Result<(), ConnectionError> {
        if !self.state().accepts_writes() {
            return Err(ConnectionError::Closed);
        }

        let mut writer = self.writer.lock().await;
        // Teardown may have started while we waited for the lock.
        if !self.state().accepts_writes() {
            return Err(ConnectionError::Closed);
        }
        writer.write_text(payload).await
    }

    /// Send a close frame and mark the connection `Closed`.
    ///
    /// Waiting for the write lock and the close frame together is bounded by
    /// `limit`. The connection ends `Closed` whether or not the frame made it
    /// out. Calling this on an already closed connection is a no-op.
    pub async fn close(&self, limit: Duration) -> Result<(), ConnectionError> {
        if self.state() == ConnectionState::Closed {
            return Ok(());
        }
        self.begin_close();

        let close_frame = async {
            let mut writer = self.writer.lock().await;
            writer.close().await
        };
        let result = match time::timeout(limit, close_frame).await {
            Ok(result) => result,
            Err(_) => Err(ConnectionError::WriteTimeout),
        };
        let _ = self.transition(ConnectionState::Closed);
        result
    }

    fn transition(&self, target: ConnectionState) -> Result<ConnectionState, ConnectionState> {
        let mut current = self.state();
        loop {
            if !current.can_transition_to(&target) {
                return Err(current);
            }
            match self.state.compare_exchange(
                current.as_u8(),
                target.as_u8(),
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => return Ok(target),
                Err(actual) => {
                    current = ConnectionState::from_u8(actual).unwrap_or(ConnectionState::Closed);
                }
            }
        }
    }
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("id", &self.id)
            .field("connected_at", &self.connected_at)
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
pub(crate) mod testing {
    //! In-memory writers for exercising connections without sockets.

    use std::sync::atomic::AtomicUsize;
    use std::sync::{Arc, Mutex as StdMutex};

    use super::*;

    /// Records every frame; shares its log with the test through an `Arc`.
    #[derive(Clone, Default)]
    pub struct RecordingWriter {
        pub frames: Arc<StdMutex<Vec<String>>>,
        pub closed: Arc<StdMutex<bool>>,
    }

    impl RecordingWriter {
        pub fn frames(&self) -> Vec<String> {
            self.frames.lock().unwrap().clone()
        }

        pub fn is_closed(&self) -> bool {
            *self.closed.lock().unwrap()
        }
    }

    #[async_trait]
    impl FrameWriter for RecordingWriter {
        async fn write_text(&mut self, payload: &str) -> Result<(), ConnectionError> {
            self.frames.lock().unwrap().push(payload.to_string());
            Ok(())
        }

        async fn close(&mut self) -> Result<(), ConnectionError> {
            *self.closed.lock().unwrap() = true;
            Ok(())
        }
    }

    /// Fails every write, as a dead peer would.
    pub struct BrokenWriter;

    #[async_trait]
    impl FrameWriter for BrokenWriter {
        async fn write_text(&mut self, _payload: &str) -> Result<(), ConnectionError> {
            Err(ConnectionError::Transport("broken pipe".to_string()))
        }

        async fn close(&mut self) -> Result<(), ConnectionError> {
            Err(ConnectionError::Transport("broken pipe".to_string()))
        }
    }

    /// Never completes a write or a close, like a peer that stopped reading.
    pub struct HungWriter;

    #[async_trait]
    impl FrameWriter for HungWriter {
        async fn write_text(&mut self, _payload: &str) -> Result<(), ConnectionError> {
            std::future::pending().await
        }

        async fn close(&mut self) -> Result<(), ConnectionError> {
            std::future::pending().await
        }
    }

    /// Tracks how many writes are in progress at once.
    #[derive(Clone, Default)]
    pub struct OverlapWriter {
        pub in_flight: Arc<AtomicUsize>,
        pub max_in_flight: Arc<AtomicUsize>,
        pub written: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl FrameWriter for OverlapWriter {
        async fn write_text(&mut self, _payload: &str) -> Result<(), ConnectionError> {
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_in_flight.fetch_max(now, Ordering::SeqCst);
            // Give other writers a chance to run mid-write.
            for _ in 0..4 {
                tokio::task::yield_now().await;
            }
            tokio::time::sleep(Duration::from_micros(200)).await;
            self.in_flight.fetch_sub(1, Ordering::SeqCst);
            self.written.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        async fn close(&mut self) -> Result<(), ConnectionError> {
            Ok(())
        }
    }

    /// Never completes a write; closes normally.
    pub struct StalledWriter;

    #[async_trait]
    impl FrameWriter for StalledWriter {
        async fn write_text(&mut self, _payload: &str) -> Result<(), ConnectionError> {
            tokio::time::sleep(Duration::from_secs(3600)).await;
            Ok(())
        }

        async fn close(&mut self) -> Result<(), ConnectionError> {
            Ok(())
        }
    }
}
