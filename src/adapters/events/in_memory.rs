//! In-memory message bus.
//!
//! Each topic is backed by a `tokio::sync::broadcast` channel, so every
//! open subscription receives every payload published after it was opened.
//! Suitable for single-process deployments and for tests; several bridges
//! sharing one `InMemoryMessageBus` behave like several server processes
//! sharing one Redis.
//!
//! # Test Hooks
//!
//! The bus can simulate backend outages (`set_publish_failure`,
//! `set_subscribe_failure`) and severed subscriptions
//! (`sever_subscriptions`), and records everything published.

use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{PoisonError, RwLock};
use tokio::sync::broadcast::{self, error::RecvError};

use crate::domain::foundation::Topic;
use crate::ports::{BusError, MessagePublisher, MessageSubscriber, Subscription};

/// Default per-topic buffer; slow subscribers skip payloads beyond this.
const DEFAULT_CAPACITY: usize = 256;

/// In-process publish/subscribe bus.
///
/// # Example
///
/// ```ignore
/// let bus = Arc::new(InMemoryMessageBus::new());
/// let mut subscription = bus.subscribe(&topic).await?;
///
/// bus.publish(&topic, "hello").await?;
/// assert_eq!(subscription.next().await, Some(Ok("hello".to_string())));
/// ```
pub struct InMemoryMessageBus {
    topics: RwLock<HashMap<Topic, broadcast::Sender<String>>>,
    published: RwLock<Vec<(Topic, String)>>,
    capacity: usize,
    fail_publish: AtomicBool,
    fail_subscribe: AtomicBool,
    subscribe_calls: AtomicUsize,
}

impl InMemoryMessageBus {
    /// Creates a new bus with the default per-topic capacity.
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    /// Creates a new bus with a custom per-topic capacity.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            topics: RwLock::new(HashMap::new()),
            published: RwLock::new(Vec::new()),
            capacity: capacity.max(1),
            fail_publish: AtomicBool::new(false),
            fail_subscribe: AtomicBool::new(false),
            subscribe_calls: AtomicUsize::new(0),
        }
    }

    fn sender_for(&self, topic: &Topic) -> broadcast::Sender<String> {
        if let Some(sender) = self
            .topics
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(topic)
        {
            return sender.clone();
        }

        self.topics
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(topic.clone())
            .or_insert_with(|| broadcast::channel(self.capacity).0)
            .clone()
    }

    // === Test Helpers ===

    /// Make every subsequent publish fail as if the backend were down.
    pub fn set_publish_failure(&self, failing: bool) {
        self.fail_publish.store(failing, Ordering::SeqCst);
    }

    /// Make every subsequent subscribe fail as if the backend were down.
    pub fn set_subscribe_failure(&self, failing: bool) {
        self.fail_subscribe.store(failing, Ordering::SeqCst);
    }

    /// Sever every open subscription, as a lost backend connection would.
    ///
    /// Open subscriptions drain what they already buffered, yield one
    /// `SubscriptionLost` error and end.
    pub fn sever_subscriptions(&self) {
        self.topics
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }

    /// Number of subscriptions currently open on `topic`.
    pub fn subscriber_count(&self, topic: &Topic) -> usize {
        self.topics
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(topic)
            .map(|sender| sender.receiver_count())
            .unwrap_or(0)
    }

    /// Number of times `subscribe` has been called, failed calls included.
    pub fn subscribe_calls(&self) -> usize {
        self.subscribe_calls.load(Ordering::SeqCst)
    }

    /// Payloads successfully published to `topic`, in order.
    pub fn published_to(&self, topic: &Topic) -> Vec<String> {
        self.published
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter(|(t, _)| t == topic)
            .map(|(_, payload)| payload.clone())
            .collect()
    }

    /// Count of successful publishes across all topics.
    pub fn publish_count(&self) -> usize {
        self.published
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

impl Default for InMemoryMessageBus {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl MessagePublisher for InMemoryMessageBus {
    async fn publish(&self, topic: &Topic, payload: &str) -> Result<(), BusError> {
        if self.fail_publish.load(Ordering::SeqCst) {
            return Err(BusError::Unavailable("in-memory bus is offline".to_string()));
        }

        self.published
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push((topic.clone(), payload.to_string()));

        // No subscribers is fine; the payload is simply not delivered.
        let _ = self.sender_for(topic).send(payload.to_string());
        Ok(())
    }
}

#[async_trait]
impl MessageSubscriber for InMemoryMessageBus {
    async fn subscribe(&self, topic: &Topic) -> Result<Subscription, BusError> {
        self.subscribe_calls.fetch_add(1, Ordering::SeqCst);

        if self.fail_subscribe.load(Ordering::SeqCst) {
            return Err(BusError::Unavailable("in-memory bus is offline".to_string()));
        }

        let receiver = self.sender_for(topic).subscribe();
        let topic_name = topic.clone();

        let payloads = stream::unfold(Some(receiver), move |state| {
            let topic_name = topic_name.clone();
            async move {
                let mut receiver = state?;
                loop {
                    match receiver.recv().await {
                        Ok(payload) => return Some((Ok(payload), Some(receiver))),
                        Err(RecvError::Lagged(skipped)) => {
                            tracing::warn!(
                                topic = %topic_name,
                                skipped,
                                "Subscriber lagged behind, payloads dropped"
                            );
                        }
                        Err(RecvError::Closed) => {
                            let lost = BusError::SubscriptionLost(format!(
                                "in-memory topic '{}' was severed",
                                topic_name
                            ));
                            return Some((Err(lost), None));
                        }
                    }
                }
            }
        })
        .boxed();

        Ok(Subscription::new(topic.clone(), payloads))
    }

    fn backend_name(&self) -> &'static str {
        "memory"
    }
}
