//! chat-fanout server entry point.
//!
//! Accepts WebSocket clients, publishes every text frame to the shared bus
//! topic and fans every bus payload out to the clients of this process.

use std::error::Error;
use std::sync::Arc;

use tokio::net::TcpListener;
use tokio::signal;
use tokio::sync::watch;
use tracing_subscriber::EnvFilter;

use chat_fanout::adapters::events::InMemoryMessageBus;
use chat_fanout::adapters::http::app_router;
use chat_fanout::adapters::redis::RedisMessageBus;
use chat_fanout::adapters::websocket::{
    ConnectionRegistry, FanoutBridge, WebSocketLimits, WebSocketState,
};
use chat_fanout::config::{AppConfig, BusBackend};
use chat_fanout::ports::{MessagePublisher, MessageSubscriber};

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    let config = AppConfig::load()?;
    config.validate()?;
    init_tracing(&config);

    tracing::info!(
        environment = ?config.server.environment,
        backend = ?config.bus.backend,
        topic = %config.fanout.topic,
        "Starting chat-fanout"
    );

    let (publisher, subscriber) = build_bus(&config).await?;
    // Close frames get the same bound as broadcast writes.
    let registry = Arc::new(ConnectionRegistry::with_close_timeout(
        config.fanout.write_timeout(),
    ));

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let bridge = FanoutBridge::new(subscriber, registry.clone(), config.fanout.clone());
    let bridge_handle = tokio::spawn(async move { bridge.run(shutdown_rx).await });

    let state = WebSocketState::new(
        registry.clone(),
        publisher,
        config.fanout.topic.clone(),
        WebSocketLimits::from_config(&config.server),
    );
    let app = app_router(state, &config.server.ws_path);

    let listener = TcpListener::bind(config.server.socket_addr()?).await?;
    tracing::info!(
        address = %listener.local_addr()?,
        ws_path = %config.server.ws_path,
        "Listening"
    );

    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            shutdown_signal().await;
            let _ = shutdown_tx.send(true);
            let closed = registry.close_all().await;
            tracing::info!(closed, "Closed client connections");
        })
        .await?;

    if let Err(e) = bridge_handle.await {
        tracing::error!(error = %e, "Fanout bridge task failed");
    }

    tracing::info!("chat-fanout stopped");
    Ok(())
}

/// Human-readable logs in development, JSON in production.
///
/// `RUST_LOG` wins over `server.log_level` when set.
fn init_tracing(config: &AppConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.server.log_level));

    if config.is_production() {
        tracing_subscriber::fmt().json().with_env_filter(filter).init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}

/// Connect the configured bus backend.
///
/// Redis is pinged before anything else starts so a bad URL fails fast.
async fn build_bus(
    config: &AppConfig,
) -> Result<(Arc<dyn MessagePublisher>, Arc<dyn MessageSubscriber>), Box<dyn Error>> {
    match config.bus.backend {
        BusBackend::Redis => {
            tracing::info!(url = %config.redis.redacted_url(), "Connecting to Redis");
            let bus = Arc::new(RedisMessageBus::connect(&config.redis).await?);
            bus.ping().await?;
            tracing::info!("Connected to Redis");

            let publisher: Arc<dyn MessagePublisher> = bus.clone();
            let subscriber: Arc<dyn MessageSubscriber> = bus;
            Ok((publisher, subscriber))
        }
        BusBackend::Memory => {
            tracing::warn!("Using in-memory bus; clients of other processes will not see messages");
            let bus = Arc::new(InMemoryMessageBus::new());

            let publisher: Arc<dyn MessagePublisher> = bus.clone();
            let subscriber: Arc<dyn MessageSubscriber> = bus;
            Ok((publisher, subscriber))
        }
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => tracing::info!("Received Ctrl+C"),
        _ = terminate => tracing::info!("Received terminate signal"),
    }
}
