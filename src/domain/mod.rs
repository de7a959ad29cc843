//! Domain layer containing the fan-out vocabulary.
//!
//! # Module Organization
//!
//! - `foundation` - Shared domain primitives (ids, topics, connection lifecycle, errors)

pub mod foundation;
