//! chat-fanout - Real-time chat fan-out over WebSockets
//!
//! Every server process accepts WebSocket clients, publishes each text frame
//! they send to one shared pub/sub topic, and writes every payload received
//! on that topic to all of its own clients. Processes never talk to each
//! other directly; the bus (Redis in production) is the only shared state.

pub mod adapters;
pub mod config;
pub mod domain;
pub mod ports;
