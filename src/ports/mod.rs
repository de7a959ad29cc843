//! Ports - Interfaces for external dependencies.
//!
//! Following hexagonal architecture, ports define the contracts between
//! the fan-out core and the outside world. Adapters implement these ports.
//!
//! ## Bus Ports
//!
//! - `MessagePublisher` - Publish a payload to a topic
//! - `MessageSubscriber` - Open a subscription stream on a topic
//! - `MessageBus` - Combined publish + subscribe capability

mod message_bus;

pub use message_bus::{BusError, MessageBus, MessagePublisher, MessageSubscriber, Subscription};
