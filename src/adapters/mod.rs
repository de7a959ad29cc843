//! Adapters - Implementations of port interfaces.
//!
//! Adapters connect the fan-out core to external systems:
//! - `events` - In-process message bus
//! - `redis` - Redis pub/sub message bus
//! - `websocket` - Client connections, registry, ingress loop, fan-out bridge
//! - `http` - Axum router with the upgrade endpoint and health check

pub mod events;
pub mod http;
pub mod redis;
pub mod websocket;

pub use events::InMemoryMessageBus;
pub use redis::RedisMessageBus;
