//! MessageBus ports - Interfaces for the shared publish/subscribe backend.
//!
//! Server processes never talk to each other directly. Every inbound chat
//! message is published to a topic on the bus, and every process holds one
//! subscription to that topic whose payloads are fanned out to its local
//! connections.
//!
//! ```text
//! ingress ──publish──► [ backend ] ──subscription stream──► fanout bridge
//! ```
//!
//! Payloads are opaque UTF-8 text. Publishing is best-effort and carries no
//! acknowledgement.

use std::pin::Pin;
use std::task::{Context, Poll};

use async_trait::async_trait;
use futures::stream::{BoxStream, Stream, StreamExt};
use tokio::sync::oneshot;

use crate::domain::foundation::Topic;

/// Errors reported by message bus adapters.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BusError {
    /// Backend unreachable or unhealthy.
    #[error("Message bus unavailable: {0}")]
    Unavailable(String),

    /// Backend did not answer in time.
    #[error("Message bus operation timed out")]
    Timeout,

    /// An established subscription was severed by the backend.
    #[error("Subscription lost: {0}")]
    SubscriptionLost(String),

    /// A received payload could not be decoded as UTF-8 text.
    #[error("Invalid payload: {0}")]
    InvalidPayload(String),
}

/// A live subscription to one topic.
///
/// Yields payloads in arrival order. The stream ends when the subscription
/// is cancelled or when the backend connection is lost; a lost connection is
/// reported as one final `Err` item before the end of the stream.
///
/// Dropping the subscription (or calling [`Subscription::cancel`]) releases
/// backend-side resources on every exit path.
pub struct Subscription {
    topic: Topic,
    payloads: BoxStream<'static, Result<String, BusError>>,
    teardown: Option<oneshot::Sender<()>>,
}

impl Subscription {
    /// Wrap a payload stream for `topic`.
    pub fn new(topic: Topic, payloads: BoxStream<'static, Result<String, BusError>>) -> Self {
        Self {
            topic,
            payloads,
            teardown: None,
        }
    }

    /// Attach a teardown signal.
    ///
    /// The receiving side resolves when the subscription is cancelled or
    /// dropped, whichever happens first.
    pub fn with_teardown(mut self, teardown: oneshot::Sender<()>) -> Self {
        self.teardown = Some(teardown);
        self
    }

    /// The topic this subscription listens on.
    pub fn topic(&self) -> &Topic {
        &self.topic
    }

    /// Explicitly end the subscription.
    pub fn cancel(mut self) {
        if let Some(teardown) = self.teardown.take() {
            let _ = teardown.send(());
        }
    }
}

impl Stream for Subscription {
    type Item = Result<String, BusError>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.get_mut().payloads.poll_next_unpin(cx)
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("topic", &self.topic)
            .finish_non_exhaustive()
    }
}

/// Port for publishing payloads to a topic.
#[async_trait]
pub trait MessagePublisher: Send + Sync {
    /// Publish one payload.
    ///
    /// Failure means the backend is unreachable or unhealthy; the payload is
    /// dropped and the caller decides whether to log and continue.
    async fn publish(&self, topic: &Topic, payload: &str) -> Result<(), BusError>;
}

/// Port for subscribing to a topic.
#[async_trait]
pub trait MessageSubscriber: Send + Sync {
    /// Open a new subscription.
    ///
    /// A subscription is restartable only by calling `subscribe` again.
    async fn subscribe(&self, topic: &Topic) -> Result<Subscription, BusError>;

    /// Backend name for logging.
    fn backend_name(&self) -> &'static str;
}

/// Combined trait for bus implementations.
pub trait MessageBus: MessagePublisher + MessageSubscriber {}

// Blanket implementation - any type that implements both traits is a MessageBus
impl<T: MessagePublisher + MessageSubscriber> MessageBus for T {}
