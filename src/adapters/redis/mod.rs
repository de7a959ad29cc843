//! Redis adapters.
//!
//! - `RedisMessageBus` - pub/sub bus shared by every server process

mod message_bus;

pub use message_bus::RedisMessageBus;
