//! WebSocket adapters for real-time chat fan-out.
//!
//! # Architecture
//!
//! ```text
//!   client ──text frame──► Ingress loop ──publish──► Message bus
//!                              │                         │
//!                          add / evict              subscription
//!                              ▼                         ▼
//!                     ConnectionRegistry ◄──snapshot── FanoutBridge
//!                              │                         │
//!                              └──── Connection ◄──write─┘
//! ```
//!
//! # Components
//!
//! - [`connection`] - One client socket with a serialized write path
//! - [`registry`] - Process-wide map of live connections
//! - [`frames`] - Classification of inbound socket frames
//! - [`ingress`] - Per-connection read-and-publish loop
//! - [`bridge`] - Bus subscription fanned out to every connection
//! - [`handler`] - Axum WebSocket upgrade handler

pub mod bridge;
pub mod connection;
pub mod frames;
pub mod handler;
pub mod ingress;
pub mod registry;

pub use bridge::{BroadcastReport, FanoutBridge};
pub use connection::{Connection, ConnectionError, FrameWriter};
pub use frames::{socket_frames, InboundFrame};
pub use handler::{ws_handler, WebSocketLimits, WebSocketState};
pub use ingress::{serve_connection, IngressContext, IngressExit};
pub use registry::ConnectionRegistry;
