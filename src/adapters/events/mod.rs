//! Message bus adapters that live entirely in-process.
//!
//! - `InMemoryMessageBus` - broadcast-channel bus for single-process
//!   deployments and tests

mod in_memory;

pub use in_memory::InMemoryMessageBus;
