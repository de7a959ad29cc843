//! Redis pub/sub message bus for multi-process deployments.
//!
//! Publishing goes through one shared multiplexed connection. Every
//! subscription gets its own dedicated pub/sub connection, owned by a
//! forwarding task that pushes payloads into a bounded channel read by the
//! subscriber:
//!
//! ```text
//! Redis ──► PubSub connection ──► forwarding task ──► mpsc ──► Subscription
//!                                       ▲
//!                     teardown (cancel / drop) ─┘ ──► UNSUBSCRIBE
//! ```
//!
//! When the subscription is cancelled or dropped the task unsubscribes and
//! closes the pub/sub connection. When Redis drops the connection the task
//! reports `SubscriptionLost` and ends the stream.

use std::time::Duration;

use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use redis::aio::{MultiplexedConnection, PubSub};
use redis::{AsyncCommands, Msg, RedisError};
use tokio::sync::{mpsc, oneshot};
use tokio::time::timeout;

use crate::config::RedisConfig;
use crate::domain::foundation::Topic;
use crate::ports::{BusError, MessagePublisher, MessageSubscriber, Subscription};

/// Redis-backed implementation of the bus ports.
#[derive(Clone)]
pub struct RedisMessageBus {
    client: redis::Client,
    publisher: MultiplexedConnection,
    timeout: Duration,
    channel_capacity: usize,
}

impl RedisMessageBus {
    /// Open the client and the shared publishing connection.
    pub async fn connect(config: &RedisConfig) -> Result<Self, BusError> {
        let client = redis::Client::open(config.url.as_str()).map_err(map_redis_error)?;
        let publisher = with_timeout(config.timeout(), client.get_multiplexed_tokio_connection())
            .await?;

        Ok(Self {
            client,
            publisher,
            timeout: config.timeout(),
            channel_capacity: config.channel_capacity.max(1),
        })
    }

    /// Open a dedicated connection and switch it into pub/sub mode.
    async fn open_pubsub(&self) -> Result<PubSub, BusError> {
        let conn = with_timeout(self.timeout, self.client.get_async_connection()).await?;
        Ok(conn.into_pubsub())
    }

    /// Round-trip a `PING` to verify the backend is reachable.
    pub async fn ping(&self) -> Result<(), BusError> {
        let mut conn = self.publisher.clone();
        let reply: String =
            with_timeout(self.timeout, redis::cmd("PING").query_async(&mut conn)).await?;

        if reply == "PONG" {
            Ok(())
        } else {
            Err(BusError::Unavailable(format!("unexpected PING reply: {}", reply)))
        }
    }
}

#[async_trait]
impl MessagePublisher for RedisMessageBus {
    async fn publish(&self, topic: &Topic, payload: &str) -> Result<(), BusError> {
        let mut conn = self.publisher.clone();

        // The receiver count is not needed: delivery is fire-and-forget.
        let _receivers: i64 =
            with_timeout(self.timeout, conn.publish(topic.as_str(), payload)).await?;
        Ok(())
    }
}

#[async_trait]
impl MessageSubscriber for RedisMessageBus {
    async fn subscribe(&self, topic: &Topic) -> Result<Subscription, BusError> {
        let mut pubsub = self.open_pubsub().await?;
        with_timeout(self.timeout, pubsub.subscribe(topic.as_str())).await?;

        let (payload_tx, payload_rx) = mpsc::channel(self.channel_capacity);
        let (teardown_tx, teardown_rx) = oneshot::channel();

        tokio::spawn(forward_messages(
            pubsub,
            topic.clone(),
            payload_tx,
            teardown_rx,
        ));

        let payloads = stream::unfold(payload_rx, |mut rx| async move {
            rx.recv().await.map(|item| (item, rx))
        })
        .boxed();

        tracing::debug!(topic = %topic, "Redis subscription opened");
        Ok(Subscription::new(topic.clone(), payloads).with_teardown(teardown_tx))
    }

    fn backend_name(&self) -> &'static str {
        "redis"
    }
}

impl std::fmt::Debug for RedisMessageBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisMessageBus")
            .field("timeout", &self.timeout)
            .field("channel_capacity", &self.channel_capacity)
            .finish_non_exhaustive()
    }
}

/// Pump messages from the pub/sub connection into the subscription channel
/// until teardown, then unsubscribe.
async fn forward_messages(
    mut pubsub: PubSub,
    topic: Topic,
    payloads: mpsc::Sender<Result<String, BusError>>,
    mut teardown: oneshot::Receiver<()>,
) {
    {
        let messages = pubsub.on_message();
        futures::pin_mut!(messages);

        loop {
            tokio::select! {
                _ = &mut teardown => break,
                message = messages.next() => {
                    let Some(message) = message else {
                        tracing::warn!(topic = %topic, "Redis pub/sub connection closed");
                        let lost = BusError::SubscriptionLost(
                            "redis pub/sub connection closed".to_string(),
                        );
                        let _ = payloads.send(Err(lost)).await;
                        return;
                    };

                    match decode_payload(&message) {
                        Ok(payload) => {
                            if payloads.send(Ok(payload)).await.is_err() {
                                // Subscriber is gone; fall through to unsubscribe.
                                break;
                            }
                        }
                        Err(e) => {
                            tracing::warn!(topic = %topic, error = %e, "Dropping undecodable payload");
                        }
                    }
                }
            }
        }
    }

    match pubsub.unsubscribe(topic.as_str()).await {
        Ok(()) => tracing::debug!(topic = %topic, "Redis subscription closed"),
        Err(e) => tracing::debug!(topic = %topic, error = %e, "Unsubscribe failed"),
    }
}

fn decode_payload(message: &Msg) -> Result<String, BusError> {
    message
        .get_payload::<String>()
        .map_err(|e| BusError::InvalidPayload(e.to_string()))
}

async fn with_timeout<T, F>(limit: Duration, operation: F) -> Result<T, BusError>
where
    F: std::future::Future<Output = Result<T, RedisError>>,
{
    match timeout(limit, operation).await {
        Ok(result) => result.map_err(map_redis_error),
        Err(_) => Err(BusError::Timeout),
    }
}

fn map_redis_error(e: RedisError) -> BusError {
    if e.is_timeout() {
        BusError::Timeout
    } else {
        BusError::Unavailable(e.to_string())
    }
}
