//! Foundation module - Shared domain primitives.
//!
//! Contains value objects, identifiers, lifecycle enums, and error types
//! that form the vocabulary of the chat fan-out domain.

mod connection_state;
mod errors;
mod ids;
mod state_machine;
mod timestamp;
mod topic;

pub use connection_state::ConnectionState;
pub use errors::ValidationError;
pub use ids::ConnectionId;
pub use state_machine::StateMachine;
pub use timestamp::Timestamp;
pub use topic::{Topic, DEFAULT_TOPIC};
