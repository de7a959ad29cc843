//! Bridge between the bus subscription and local connections.
//!
//! Exactly one bridge runs per process. It holds a single subscription to
//! the configured topic and writes every payload it receives to every
//! connection registered at that moment.
//!
//! # Failure handling
//!
//! | Failure | Effect |
//! |---------|--------|
//! | Write error or timeout on one connection | That connection is evicted; the broadcast carries on |
//! | Subscription lost | Resubscribe after exponential backoff |
//! | Subscribe call fails | Back off further, retry |
//! | Subscription TTL elapses | Open a replacement, then drop the old one |
//!
//! The backoff only starts over once a subscription has forwarded a payload
//! or stayed up for [`FanoutConfig::stable_after`]. A backend that accepts
//! subscriptions and drops them straight away keeps backing off.
//!
//! On TTL expiry the current subscription keeps being pumped while the
//! replacement is opened, so payloads published during the handover are not
//! lost. If opening the replacement fails, the current subscription is kept
//! until the next expiry.
//!
//! The loop stops when the shutdown watch flips to `true` or its sender is
//! dropped. The active subscription is cancelled on the way out, which
//! unsubscribes.

use std::ops::ControlFlow;
use std::sync::Arc;

use futures::future::join_all;
use futures::StreamExt;
use tokio::sync::watch;
use tokio::time::{self, Instant};

use crate::config::FanoutConfig;
use crate::ports::{BusError, MessageSubscriber, Subscription};

use super::connection::{Connection, ConnectionError};
use super::registry::ConnectionRegistry;

/// Outcome of one broadcast.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BroadcastReport {
    /// Connections that accepted the payload.
    pub delivered: usize,
    /// Connections whose write failed or timed out and were torn down.
    pub evicted: usize,
}

/// Why a subscription stopped being pumped.
#[derive(Debug)]
enum PumpOutcome {
    Shutdown,
    Lost {
        error: Option<BusError>,
        forwarded: u64,
    },
}

/// Subscribes to the topic and fans payloads out to the registry.
pub struct FanoutBridge {
    subscriber: Arc<dyn MessageSubscriber>,
    registry: Arc<ConnectionRegistry>,
    config: FanoutConfig,
}

impl FanoutBridge {
    pub fn new(
        subscriber: Arc<dyn MessageSubscriber>,
        registry: Arc<ConnectionRegistry>,
        config: FanoutConfig,
    ) -> Self {
        Self {
            subscriber,
            registry,
            config,
        }
    }

    /// Run until shutdown is signalled.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        let topic = &self.config.topic;
        let mut attempt: u32 = 0;

        tracing::info!(
            topic = %topic,
            backend = self.subscriber.backend_name(),
            "Fanout bridge started"
        );

        loop {
            let subscribed = tokio::select! {
                _ = wait_for_shutdown(&mut shutdown) => break,
                result = self.subscriber.subscribe(topic) => result,
            };

            match subscribed {
                Ok(subscription) => {
                    tracing::debug!(topic = %subscription.topic(), attempt, "Subscribed");
                    let started = Instant::now();

                    match self.pump(subscription, &mut shutdown).await {
                        PumpOutcome::Shutdown => break,
                        PumpOutcome::Lost { error, forwarded } => {
                            match error {
                                Some(e) => tracing::warn!(topic = %topic, error = %e, forwarded, "Subscription lost"),
                                None => tracing::warn!(topic = %topic, forwarded, "Subscription ended"),
                            }
                            if forwarded > 0 || started.elapsed() >= self.config.stable_after() {
                                attempt = 0;
                            }
                        }
                    }
                }
                Err(e) => {
                    tracing::warn!(topic = %topic, error = %e, attempt, "Subscribe failed");
                }
            }

            let delay = self.config.resubscribe_delay(attempt);
            attempt = attempt.saturating_add(1);
            tracing::debug!(topic = %topic, delay_ms = delay.as_millis() as u64, "Resubscribing after delay");

            tokio::select! {
                _ = wait_for_shutdown(&mut shutdown) => break,
                _ = time::sleep(delay) => {}
            }
        }

        tracing::info!(topic = %topic, "Fanout bridge stopped");
    }

    /// Write `payload` to every registered connection.
    ///
    /// Writes run concurrently, each under its connection's write lock and
    /// bounded by the configured write timeout. Connections that fail are
    /// evicted before this returns.
    pub async fn broadcast(&self, payload: &str) -> BroadcastReport {
        let connections = self.registry.snapshot().await;
        if connections.is_empty() {
            return BroadcastReport::default();
        }

        let write_timeout = self.config.write_timeout();
        let writes = connections.iter().map(|connection| async move {
            let result = match time::timeout(write_timeout, connection.send(payload)).await {
                Ok(result) => result,
                Err(_) => Err(ConnectionError::WriteTimeout),
            };
            (connection, result)
        });

        let mut report = BroadcastReport::default();
        let mut failed: Vec<&Arc<Connection>> = Vec::new();
        for (connection, result) in join_all(writes).await {
            match result {
                Ok(()) => report.delivered += 1,
                Err(ConnectionError::Closed) => {
                    // Already being torn down by its own ingress loop.
                }
                Err(e) => {
                    tracing::debug!(connection_id = %connection.id(), error = %e, "Broadcast write failed");
                    failed.push(connection);
                }
            }
        }

        let evictions = failed.iter().map(|connection| self.registry.evict(connection));
        report.evicted = join_all(evictions).await.into_iter().filter(|e| *e).count();

        if report.evicted > 0 {
            tracing::info!(
                delivered = report.delivered,
                evicted = report.evicted,
                "Evicted unresponsive connections during broadcast"
            );
        }
        report
    }

    /// Forward payloads from `subscription` until it is lost or shutdown.
    ///
    /// Each TTL expiry swaps in a fresh subscription without a gap.
    async fn pump(
        &self,
        mut subscription: Subscription,
        shutdown: &mut watch::Receiver<bool>,
    ) -> PumpOutcome {
        let mut forwarded: u64 = 0;

        loop {
            let deadline = self.config.subscription_ttl().map(|ttl| Instant::now() + ttl);
            let expired = async move {
                match deadline {
                    Some(deadline) => time::sleep_until(deadline).await,
                    None => std::future::pending::<()>().await,
                }
            };
            tokio::pin!(expired);

            loop {
                tokio::select! {
                    _ = wait_for_shutdown(shutdown) => {
                        subscription.cancel();
                        return PumpOutcome::Shutdown;
                    }
                    _ = &mut expired => break,
                    item = subscription.next() => {
                        if let ControlFlow::Break(error) = self.forward(item, &mut forwarded).await {
                            return PumpOutcome::Lost { error, forwarded };
                        }
                    }
                }
            }

            tracing::info!(topic = %subscription.topic(), "Subscription lifetime elapsed, renewing");
            let replacement = self.subscriber.subscribe(&self.config.topic);
            tokio::pin!(replacement);

            // Keep draining the current subscription until the new one is live.
            loop {
                tokio::select! {
                    _ = wait_for_shutdown(shutdown) => {
                        subscription.cancel();
                        return PumpOutcome::Shutdown;
                    }
                    renewed = &mut replacement => {
                        match renewed {
                            Ok(next) => {
                                std::mem::replace(&mut subscription, next).cancel();
                                tracing::debug!(topic = %subscription.topic(), "Subscription renewed");
                            }
                            Err(e) => {
                                tracing::warn!(
                                    topic = %subscription.topic(),
                                    error = %e,
                                    "Renewal failed, keeping current subscription"
                                );
                            }
                        }
                        break;
                    }
                    item = subscription.next() => {
                        if let ControlFlow::Break(error) = self.forward(item, &mut forwarded).await {
                            return PumpOutcome::Lost { error, forwarded };
                        }
                    }
                }
            }
        }
    }

    /// Broadcast one subscription item, or break if it ends the subscription.
    async fn forward(
        &self,
        item: Option<Result<String, BusError>>,
        forwarded: &mut u64,
    ) -> ControlFlow<Option<BusError>> {
        match item {
            Some(Ok(payload)) => {
                self.broadcast(&payload).await;
                *forwarded += 1;
                ControlFlow::Continue(())
            }
            Some(Err(e)) => ControlFlow::Break(Some(e)),
            None => ControlFlow::Break(None),
        }
    }
}

/// Resolves once the flag is `true` or the sender is gone.
async fn wait_for_shutdown(shutdown: &mut watch::Receiver<bool>) {
    loop {
        if *shutdown.borrow_and_update() {
            return;
        }
        if shutdown.changed().await.is_err() {
            return;
        }
    }
}
