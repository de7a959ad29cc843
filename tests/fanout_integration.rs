//! Integration tests for chat fan-out.
//!
//! These tests verify the end-to-end flow:
//! 1. A client's text frame is read by its ingress loop and published
//! 2. The bus delivers it to the fan-out bridge of every process
//! 3. Each bridge writes it to every connection registered locally
//! 4. Failed connections are evicted without stalling the others
//!
//! Uses the in-memory bus and fake socket writers; no network or Redis.

use async_trait::async_trait;
use futures::channel::mpsc;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use chat_fanout::adapters::events::InMemoryMessageBus;
use chat_fanout::adapters::websocket::{
    serve_connection, Connection, ConnectionError, ConnectionRegistry, FanoutBridge, FrameWriter,
    InboundFrame, IngressContext, IngressExit,
};
use chat_fanout::config::FanoutConfig;
use chat_fanout::domain::foundation::{ConnectionState, Topic};
use chat_fanout::ports::MessagePublisher;

// =============================================================================
// Test Infrastructure
// =============================================================================

/// Socket write half that records frames.
#[derive(Clone, Default)]
struct TestWriter {
    frames: Arc<Mutex<Vec<String>>>,
    closed: Arc<Mutex<bool>>,
}

impl TestWriter {
    fn frames(&self) -> Vec<String> {
        self.frames.lock().unwrap().clone()
    }

    fn is_closed(&self) -> bool {
        *self.closed.lock().unwrap()
    }
}

#[async_trait]
impl FrameWriter for TestWriter {
    async fn write_text(&mut self, payload: &str) -> Result<(), ConnectionError> {
        self.frames.lock().unwrap().push(payload.to_string());
        Ok(())
    }

    async fn close(&mut self) -> Result<(), ConnectionError> {
        *self.closed.lock().unwrap() = true;
        Ok(())
    }
}

/// Socket whose peer has vanished.
struct DeadWriter;

#[async_trait]
impl FrameWriter for DeadWriter {
    async fn write_text(&mut self, _payload: &str) -> Result<(), ConnectionError> {
        Err(ConnectionError::Transport("connection reset by peer".to_string()))
    }

    async fn close(&mut self) -> Result<(), ConnectionError> {
        Err(ConnectionError::Transport("connection reset by peer".to_string()))
    }
}

/// Socket whose peer stopped reading: nothing ever completes.
struct StuckWriter;

#[async_trait]
impl FrameWriter for StuckWriter {
    async fn write_text(&mut self, _payload: &str) -> Result<(), ConnectionError> {
        std::future::pending().await
    }

    async fn close(&mut self) -> Result<(), ConnectionError> {
        std::future::pending().await
    }
}

/// One simulated server process: a registry and a running bridge.
struct TestProcess {
    registry: Arc<ConnectionRegistry>,
    bus: Arc<InMemoryMessageBus>,
    shutdown: watch::Sender<bool>,
    bridge: JoinHandle<()>,
}

impl TestProcess {
    async fn start(bus: Arc<InMemoryMessageBus>) -> Self {
        let registry = Arc::new(ConnectionRegistry::new());
        let config = FanoutConfig {
            write_timeout_ms: 100,
            backoff_initial_ms: 5,
            backoff_max_ms: 50,
            ..Default::default()
        };
        let bridge = FanoutBridge::new(bus.clone(), registry.clone(), config);
        let (shutdown, shutdown_rx) = watch::channel(false);

        let before = bus.subscriber_count(&Topic::default());
        let bridge = tokio::spawn(async move { bridge.run(shutdown_rx).await });
        eventually(|| bus.subscriber_count(&Topic::default()) > before).await;

        Self {
            registry,
            bus,
            shutdown,
            bridge,
        }
    }

    fn context(&self) -> IngressContext {
        IngressContext {
            registry: self.registry.clone(),
            publisher: self.bus.clone(),
            topic: Topic::default(),
        }
    }

    /// Connect a client and wait until it is registered.
    async fn connect(&self) -> TestClient {
        let writer = TestWriter::default();
        let connection = Arc::new(Connection::new(writer.clone()));
        let (frames, rx) = mpsc::unbounded();
        let ingress = tokio::spawn(serve_connection(connection.clone(), rx, self.context()));

        while !self.registry.contains(&connection.id()).await {
            tokio::task::yield_now().await;
        }

        TestClient {
            connection,
            writer,
            frames,
            ingress,
        }
    }

    async fn stop(self) {
        self.shutdown.send(true).unwrap();
        tokio::time::timeout(Duration::from_secs(1), self.bridge)
            .await
            .expect("bridge did not stop")
            .unwrap();
    }
}

struct TestClient {
    connection: Arc<Connection>,
    writer: TestWriter,
    frames: mpsc::UnboundedSender<Result<InboundFrame, ConnectionError>>,
    ingress: JoinHandle<IngressExit>,
}

impl TestClient {
    fn send(&self, text: &str) {
        self.frames
            .unbounded_send(Ok(InboundFrame::Text(text.to_string())))
            .unwrap();
    }

    async fn disconnect(self) -> IngressExit {
        self.frames.unbounded_send(Ok(InboundFrame::Close)).unwrap();
        self.ingress.await.unwrap()
    }
}

async fn eventually(mut check: impl FnMut() -> bool) {
    for _ in 0..400 {
        if check() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("condition not met in time");
}

// =============================================================================
// Scenarios
// =============================================================================

#[tokio::test]
async fn sender_receives_its_own_message() {
    let bus = Arc::new(InMemoryMessageBus::new());
    let process = TestProcess::start(bus.clone()).await;
    let client = process.connect().await;

    client.send("hello");

    eventually(|| client.writer.frames() == vec!["hello"]).await;
    assert_eq!(bus.published_to(&Topic::default()), vec!["hello"]);

    assert_eq!(client.disconnect().await, IngressExit::PeerClosed);
    process.stop().await;
}

#[tokio::test]
async fn every_local_client_receives_every_message() {
    let bus = Arc::new(InMemoryMessageBus::new());
    let process = TestProcess::start(bus).await;
    let alice = process.connect().await;
    let bob = process.connect().await;

    alice.send("from alice");
    eventually(|| bob.writer.frames() == vec!["from alice"]).await;
    bob.send("from bob");

    let expected = vec!["from alice", "from bob"];
    eventually(|| alice.writer.frames() == expected && bob.writer.frames() == expected).await;

    process.stop().await;
}

#[tokio::test]
async fn dead_connection_does_not_stall_broadcast() {
    let bus = Arc::new(InMemoryMessageBus::new());
    let process = TestProcess::start(bus.clone()).await;
    let healthy = process.connect().await;

    let dead = Arc::new(Connection::new(DeadWriter));
    dead.mark_open();
    process.registry.add(dead.id(), dead.clone()).await;

    bus.publish(&Topic::default(), "still flowing").await.unwrap();

    eventually(|| healthy.writer.frames() == vec!["still flowing"]).await;
    eventually(|| dead.state() == ConnectionState::Closed).await;
    let snapshot = process.registry.snapshot().await;
    assert!(snapshot.iter().all(|c| c.id() != dead.id()));

    bus.publish(&Topic::default(), "next").await.unwrap();
    eventually(|| healthy.writer.frames().len() == 2).await;

    process.stop().await;
}

#[tokio::test]
async fn publish_failure_keeps_connection_open() {
    let bus = Arc::new(InMemoryMessageBus::new());
    let process = TestProcess::start(bus.clone()).await;
    let client = process.connect().await;

    bus.set_publish_failure(true);
    client.send("dropped");
    tokio::time::sleep(Duration::from_millis(20)).await;
    bus.set_publish_failure(false);

    assert!(process.registry.contains(&client.connection.id()).await);
    assert_eq!(client.connection.state(), ConnectionState::Open);

    bus.publish(&Topic::default(), "later").await.unwrap();
    eventually(|| client.writer.frames() == vec!["later"]).await;

    process.stop().await;
}

#[tokio::test]
async fn message_crosses_processes_through_shared_bus() {
    let bus = Arc::new(InMemoryMessageBus::new());
    let first = TestProcess::start(bus.clone()).await;
    let second = TestProcess::start(bus.clone()).await;

    let sender = first.connect().await;
    let receiver = second.connect().await;

    sender.send("across the cluster");

    eventually(|| receiver.writer.frames() == vec!["across the cluster"]).await;
    eventually(|| sender.writer.frames() == vec!["across the cluster"]).await;

    first.stop().await;
    second.stop().await;
}

#[tokio::test]
async fn disconnect_removes_client_from_broadcasts() {
    let bus = Arc::new(InMemoryMessageBus::new());
    let process = TestProcess::start(bus.clone()).await;
    let leaving = process.connect().await;
    let staying = process.connect().await;
    let leaving_writer = leaving.writer.clone();
    let leaving_id = leaving.connection.id();

    assert_eq!(leaving.disconnect().await, IngressExit::PeerClosed);
    assert!(!process.registry.contains(&leaving_id).await);
    assert!(leaving_writer.is_closed());

    bus.publish(&Topic::default(), "after leave").await.unwrap();
    eventually(|| staying.writer.frames() == vec!["after leave"]).await;
    assert!(leaving_writer.frames().is_empty());

    process.stop().await;
}

#[tokio::test]
async fn bridge_recovers_after_bus_drops_subscription() {
    let bus = Arc::new(InMemoryMessageBus::new());
    let process = TestProcess::start(bus.clone()).await;
    let client = process.connect().await;

    bus.sever_subscriptions();
    eventually(|| bus.subscribe_calls() >= 2 && bus.subscriber_count(&Topic::default()) == 1)
        .await;

    client.send("after outage");
    eventually(|| client.writer.frames() == vec!["after outage"]).await;

    process.stop().await;
}

#[tokio::test]
async fn shutdown_closes_every_connection() {
    let bus = Arc::new(InMemoryMessageBus::new());
    let process = TestProcess::start(bus.clone()).await;
    let clients = vec![process.connect().await, process.connect().await];
    let registry = process.registry.clone();

    process.stop().await;
    assert_eq!(bus.subscriber_count(&Topic::default()), 0);

    assert_eq!(registry.close_all().await, 2);
    assert!(registry.is_empty().await);

    for client in clients {
        assert!(client.writer.is_closed());
        assert_eq!(client.connection.state(), ConnectionState::Closed);

        // The peers never send another frame; eviction alone ends each loop.
        let exit = tokio::time::timeout(Duration::from_secs(1), client.ingress)
            .await
            .expect("ingress loop outlived shutdown")
            .unwrap();
        assert_eq!(exit, IngressExit::Evicted);
        assert!(client.frames.is_closed());
    }
    assert!(bus.published_to(&Topic::default()).is_empty());
}

#[tokio::test]
async fn shutdown_is_bounded_when_a_peer_stops_reading() {
    let bus = Arc::new(InMemoryMessageBus::new());
    let registry = Arc::new(ConnectionRegistry::with_close_timeout(Duration::from_millis(50)));
    let healthy = TestWriter::default();
    let connections = vec![
        Arc::new(Connection::new(healthy.clone())),
        Arc::new(Connection::new(StuckWriter)),
    ];
    let mut ingress = Vec::new();
    let mut senders = Vec::new();
    for connection in &connections {
        let (frames, rx) = mpsc::unbounded();
        let context = IngressContext {
            registry: registry.clone(),
            publisher: bus.clone(),
            topic: Topic::default(),
        };
        ingress.push(tokio::spawn(serve_connection(connection.clone(), rx, context)));
        senders.push(frames);
    }
    eventually(|| connections.iter().all(|c| c.state() == ConnectionState::Open)).await;

    let closed = tokio::time::timeout(Duration::from_secs(1), registry.close_all())
        .await
        .expect("close_all waited on a stuck peer");

    assert_eq!(closed, 2);
    assert!(healthy.is_closed());
    assert!(connections.iter().all(|c| c.state() == ConnectionState::Closed));
    for task in ingress {
        assert_eq!(task.await.unwrap(), IngressExit::Evicted);
    }
    drop(senders);
}
