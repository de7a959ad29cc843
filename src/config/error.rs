//! Configuration error types

use thiserror::Error;

/// Errors that can occur during configuration loading
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Configuration loading failed: {0}")]
    LoadError(#[from] config::ConfigError),

    #[error("Validation failed: {0}")]
    ValidationFailed(#[from] ValidationError),
}

/// Errors that can occur during configuration validation
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Required configuration missing: {0}")]
    MissingRequired(&'static str),

    #[error("Invalid port number")]
    InvalidPort,

    #[error("Invalid bind address: {0}")]
    InvalidBindAddress(String),

    #[error("WebSocket path must start with '/' and must not be /health")]
    InvalidWsPath,

    #[error("WebSocket buffer and message sizes must be non-zero")]
    InvalidBufferSize,

    #[error("Invalid Redis URL format")]
    InvalidRedisUrl,

    #[error("Invalid Redis timeout")]
    InvalidTimeout,

    #[error("Subscription channel capacity must be non-zero")]
    InvalidChannelCapacity,

    #[error("Broadcast write timeout must be non-zero")]
    InvalidWriteTimeout,

    #[error("Invalid resubscribe backoff: {0}")]
    InvalidBackoff(&'static str),

    #[error("Subscription TTL must be non-zero when set")]
    InvalidSubscriptionTtl,
}
