//! Process-wide registry of live client connections.
//!
//! The registry is the only state touched by both the per-connection ingress
//! tasks and the fan-out bridge. Its lock guards the map alone and is never
//! held across socket I/O:
//!
//! ```text
//! ingress task ──add/evict──┐
//!                           ▼
//!                  ┌──────────────────┐
//!                  │ ConnectionRegistry│──snapshot──► fanout bridge
//!                  └──────────────────┘
//! ```

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use tokio::sync::Mutex;

use crate::domain::foundation::ConnectionId;

use super::connection::{Connection, ConnectionError};

/// Default bound on delivering a close frame during eviction.
pub const DEFAULT_CLOSE_TIMEOUT: Duration = Duration::from_secs(5);

/// Map of connection id to live connection handle.
#[derive(Debug)]
pub struct ConnectionRegistry {
    connections: Mutex<HashMap<ConnectionId, Arc<Connection>>>,
    close_timeout: Duration,
}

impl Default for ConnectionRegistry {
    fn default() -> Self {
        Self::with_close_timeout(DEFAULT_CLOSE_TIMEOUT)
    }
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry whose evictions give up on the close frame after `close_timeout`.
    pub fn with_close_timeout(close_timeout: Duration) -> Self {
        Self {
            connections: Mutex::new(HashMap::new()),
            close_timeout,
        }
    }

    /// Register a connection under `id`.
    ///
    /// An existing entry under the same id is replaced and returned; the
    /// replacement is treated as a reconnection.
    pub async fn add(&self, id: ConnectionId, connection: Arc<Connection>) -> Option<Arc<Connection>> {
        let replaced = self.connections.lock().await.insert(id, connection);
        if replaced.is_some() {
            tracing::warn!(connection_id = %id, "Replaced existing connection with same id");
        }
        replaced
    }

    /// Remove the entry for `id`, if any. Removing twice is harmless.
    pub async fn remove(&self, id: &ConnectionId) -> Option<Arc<Connection>> {
        self.connections.lock().await.remove(id)
    }

    /// Point-in-time copy of every registered handle.
    pub async fn snapshot(&self) -> Vec<Arc<Connection>> {
        self.connections.lock().await.values().cloned().collect()
    }

    /// Tear a connection down: mark it closing, drop it from the map, then
    /// close its socket.
    ///
    /// Only the first caller for a given connection does the work; later
    /// callers get `false` back. A different connection registered under
    /// the same id is left in place. The close frame is bounded by the
    /// registry's close timeout and the connection always ends `Closed`.
    pub async fn evict(&self, connection: &Arc<Connection>) -> bool {
        if !connection.begin_close() {
            return false;
        }

        let id = connection.id();
        {
            let mut connections = self.connections.lock().await;
            if connections
                .get(&id)
                .is_some_and(|current| Arc::ptr_eq(current, connection))
            {
                connections.remove(&id);
            }
        }

        match connection.close(self.close_timeout).await {
            Ok(()) => {}
            Err(ConnectionError::WriteTimeout) => {
                tracing::warn!(
                    connection_id = %id,
                    timeout_ms = self.close_timeout.as_millis() as u64,
                    "Close frame timed out"
                );
            }
            Err(e) => {
                tracing::debug!(connection_id = %id, error = %e, "Close frame not delivered");
            }
        }
        tracing::debug!(connection_id = %id, "Connection evicted");
        true
    }

    /// Evict every registered connection. Used at shutdown.
    ///
    /// Evictions run concurrently, so the whole call takes about one close
    /// timeout even when many peers have stopped reading.
    pub async fn close_all(&self) -> usize {
        let connections = self.snapshot().await;
        let results = join_all(connections.iter().map(|c| self.evict(c))).await;
        results.into_iter().filter(|evicted| *evicted).count()
    }

    pub async fn len(&self) -> usize {
        self.connections.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.connections.lock().await.is_empty()
    }

    pub async fn contains(&self, id: &ConnectionId) -> bool {
        self.connections.lock().await.contains_key(id)
    }
}
