//! Message bus backend selection

use serde::Deserialize;

/// Which publish/subscribe backend connects the server processes.
#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum BusBackend {
    /// Redis pub/sub, shared by every process in the deployment.
    #[default]
    Redis,
    /// In-process broadcast; only clients of this process see each other.
    Memory,
}

/// Message bus configuration
#[derive(Debug, Clone, Deserialize, Default)]
pub struct BusConfig {
    #[serde(default)]
    pub backend: BusBackend,
}

impl BusConfig {
    /// True when a Redis connection is needed.
    pub fn uses_redis(&self) -> bool {
        self.backend == BusBackend::Redis
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_backend_is_redis() {
        assert!(BusConfig::default().uses_redis());
    }

    #[test]
    fn test_memory_backend_deserialization() {
        let config: BusConfig = serde_json::from_str(r#"{ "backend": "memory" }"#).unwrap();
        assert_eq!(config.backend, BusBackend::Memory);
        assert!(!config.uses_redis());
    }
}
