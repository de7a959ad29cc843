//! Server configuration

use serde::Deserialize;
use std::net::{AddrParseError, SocketAddr};

use super::error::ValidationError;

/// Server configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// IP address to bind to
    #[serde(default = "default_host")]
    pub host: String,

    /// Port to listen on
    #[serde(default = "default_port")]
    pub port: u16,

    /// Environment name
    #[serde(default = "default_environment")]
    pub environment: Environment,

    /// Rust log filter directive
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// HTTP path that upgrades to a WebSocket connection
    #[serde(default = "default_ws_path")]
    pub ws_path: String,

    /// Per-connection write buffer in bytes
    #[serde(default = "default_buffer_size")]
    pub write_buffer_size: usize,

    /// Largest inbound message accepted, in bytes
    #[serde(default = "default_max_message_size")]
    pub max_message_size: usize,

    /// Largest single inbound frame accepted, in bytes
    #[serde(default = "default_max_message_size")]
    pub max_frame_size: usize,
}

/// Application environment
#[derive(Debug, Clone, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    #[default]
    Development,
    Staging,
    Production,
}

impl ServerConfig {
    /// Get the socket address to bind to
    pub fn socket_addr(&self) -> Result<SocketAddr, AddrParseError> {
        format!("{}:{}", self.host, self.port).parse()
    }

    /// Check if running in production
    pub fn is_production(&self) -> bool {
        self.environment == Environment::Production
    }

    /// Validate server configuration
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.port == 0 {
            return Err(ValidationError::InvalidPort);
        }
        if let Err(e) = self.socket_addr() {
            return Err(ValidationError::InvalidBindAddress(e.to_string()));
        }
        // `/health` is served by the router itself.
        if !self.ws_path.starts_with('/') || self.ws_path == "/health" {
            return Err(ValidationError::InvalidWsPath);
        }
        if self.write_buffer_size == 0 || self.max_message_size == 0 || self.max_frame_size == 0 {
            return Err(ValidationError::InvalidBufferSize);
        }
        // A frame larger than a whole message could never be accepted.
        if self.max_frame_size > self.max_message_size {
            return Err(ValidationError::InvalidBufferSize);
        }
        Ok(())
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            environment: default_environment(),
            log_level: default_log_level(),
            ws_path: default_ws_path(),
            write_buffer_size: default_buffer_size(),
            max_message_size: default_max_message_size(),
            max_frame_size: default_max_message_size(),
        }
    }
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8000
}

fn default_environment() -> Environment {
    Environment::Development
}

fn default_log_level() -> String {
    "info,chat_fanout=debug,tower_http=info".to_string()
}

fn default_ws_path() -> String {
    "/ws".to_string()
}

fn default_buffer_size() -> usize {
    4096
}

fn default_max_message_size() -> usize {
    64 * 1024
}
