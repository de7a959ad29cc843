//! Application configuration module
//!
//! This module provides type-safe configuration loading from environment variables
//! using the `config` and `dotenvy` crates. Configuration is loaded with the
//! `CHAT_FANOUT` prefix and nested values use double underscores as separators.
//!
//! # Example
//!
//! ```no_run
//! use chat_fanout::config::AppConfig;
//!
//! let config = AppConfig::load().expect("Failed to load configuration");
//! config.validate().expect("Invalid configuration");
//!
//! println!("Fanning out on topic {}", config.fanout.topic);
//! ```

mod bus;
mod error;
mod fanout;
mod redis;
mod server;

pub use bus::{BusBackend, BusConfig};
pub use error::{ConfigError, ValidationError};
pub use fanout::FanoutConfig;
pub use redis::RedisConfig;
pub use server::{Environment, ServerConfig};

use serde::Deserialize;

/// Root application configuration
///
/// Every section has defaults, so an empty environment yields a server on
/// port 8000 talking to a local Redis on the `chat_channel` topic.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AppConfig {
    /// Server configuration (bind address, WebSocket endpoint, logging)
    #[serde(default)]
    pub server: ServerConfig,

    /// Redis configuration (pub/sub backend)
    #[serde(default)]
    pub redis: RedisConfig,

    /// Message bus backend selection
    #[serde(default)]
    pub bus: BusConfig,

    /// Fan-out bridge configuration (topic, write timeout, resubscribe backoff)
    #[serde(default)]
    pub fanout: FanoutConfig,
}

impl AppConfig {
    /// Load configuration from environment variables
    ///
    /// This function:
    /// 1. Loads `.env` file if present (for development)
    /// 2. Reads environment variables with `CHAT_FANOUT` prefix
    /// 3. Uses `__` (double underscore) to separate nested values
    /// 4. Deserializes into typed configuration structs
    ///
    /// # Environment Variable Format
    ///
    /// - `CHAT_FANOUT__SERVER__PORT=8080` -> `server.port = 8080`
    /// - `CHAT_FANOUT__REDIS__URL=...` -> `redis.url = ...`
    /// - `CHAT_FANOUT__FANOUT__TOPIC=chat_room` -> `fanout.topic = chat_room`
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if values cannot be parsed into expected types.
    pub fn load() -> Result<Self, ConfigError> {
        // Load .env file if present (development)
        dotenvy::dotenv().ok();

        let config = config::Config::builder()
            .add_source(
                config::Environment::default()
                    .prefix("CHAT_FANOUT")
                    .prefix_separator("__")
                    .separator("__"),
            )
            .build()?
            .try_deserialize()?;

        Ok(config)
    }

    /// Validate all configuration values
    ///
    /// Redis settings are only checked when Redis is the selected backend.
    ///
    /// # Errors
    ///
    /// Returns `ValidationError` if any configuration value is invalid.
    pub fn validate(&self) -> Result<(), ValidationError> {
        self.server.validate()?;
        if self.bus.uses_redis() {
            self.redis.validate()?;
        }
        self.fanout.validate()?;
        Ok(())
    }

    /// Check if running in production environment
    pub fn is_production(&self) -> bool {
        self.server.is_production()
    }
}
