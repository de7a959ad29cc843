//! Fan-out bridge configuration

use serde::Deserialize;
use std::time::Duration;

use crate::domain::foundation::Topic;

use super::error::ValidationError;

/// Settings for the bus subscription and the broadcast loop.
#[derive(Debug, Clone, Deserialize)]
pub struct FanoutConfig {
    /// Channel every process publishes to and subscribes on
    #[serde(default)]
    pub topic: Topic,

    /// Upper bound on a single connection write during broadcast
    #[serde(default = "default_write_timeout_ms")]
    pub write_timeout_ms: u64,

    /// First delay before resubscribing after a lost subscription
    #[serde(default = "default_backoff_initial_ms")]
    pub backoff_initial_ms: u64,

    /// Ceiling for the resubscribe delay
    #[serde(default = "default_backoff_max_ms")]
    pub backoff_max_ms: u64,

    /// Growth factor applied per consecutive failed attempt
    #[serde(default = "default_backoff_multiplier")]
    pub backoff_multiplier: f64,

    /// Recreate the subscription after this many seconds (unset: never)
    #[serde(default)]
    pub subscription_ttl_secs: Option<u64>,
}

impl FanoutConfig {
    /// Write timeout as Duration
    pub fn write_timeout(&self) -> Duration {
        Duration::from_millis(self.write_timeout_ms)
    }

    /// Subscription lifetime, if one is configured
    pub fn subscription_ttl(&self) -> Option<Duration> {
        self.subscription_ttl_secs.map(Duration::from_secs)
    }

    /// Uptime after which a lost subscription no longer counts as a failed
    /// attempt, so the next resubscribe starts from the initial delay.
    pub fn stable_after(&self) -> Duration {
        Duration::from_millis(self.backoff_max_ms)
    }

    /// Delay before resubscribe attempt number `attempt` (zero-based).
    ///
    /// Grows exponentially from `backoff_initial_ms` and is capped at
    /// `backoff_max_ms`.
    pub fn resubscribe_delay(&self, attempt: u32) -> Duration {
        let exponent = attempt.min(i32::MAX as u32) as i32;
        let delay = self.backoff_initial_ms as f64 * self.backoff_multiplier.powi(exponent);
        let capped = delay.min(self.backoff_max_ms as f64) as u64;
        Duration::from_millis(capped)
    }

    /// Validate fan-out configuration
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.write_timeout_ms == 0 {
            return Err(ValidationError::InvalidWriteTimeout);
        }
        if self.backoff_initial_ms == 0 {
            return Err(ValidationError::InvalidBackoff("initial delay must be non-zero"));
        }
        if self.backoff_max_ms < self.backoff_initial_ms {
            return Err(ValidationError::InvalidBackoff(
                "max delay must not be below the initial delay",
            ));
        }
        if !self.backoff_multiplier.is_finite() || self.backoff_multiplier < 1.0 {
            return Err(ValidationError::InvalidBackoff("multiplier must be at least 1.0"));
        }
        if self.subscription_ttl_secs == Some(0) {
            return Err(ValidationError::InvalidSubscriptionTtl);
        }
        Ok(())
    }
}

impl Default for FanoutConfig {
    fn default() -> Self {
        Self {
            topic: Topic::default(),
            write_timeout_ms: default_write_timeout_ms(),
            backoff_initial_ms: default_backoff_initial_ms(),
            backoff_max_ms: default_backoff_max_ms(),
            backoff_multiplier: default_backoff_multiplier(),
            subscription_ttl_secs: None,
        }
    }
}

fn default_write_timeout_ms() -> u64 {
    5_000
}

fn default_backoff_initial_ms() -> u64 {
    100
}

fn default_backoff_max_ms() -> u64 {
    30_000
}

fn default_backoff_multiplier() -> f64 {
    2.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stable_after_matches_backoff_ceiling() {
        let config = FanoutConfig {
            backoff_max_ms: 750,
            ..Default::default()
        };
        assert_eq!(config.stable_after(), Duration::from_millis(750));
    }

    #[test]
    fn test_fanout_config_defaults() {
        let config = FanoutConfig::default();
        assert_eq!(config.topic.as_str(), "chat_channel");
        assert_eq!(config.write_timeout(), Duration::from_secs(5));
        assert_eq!(config.subscription_ttl(), None);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_resubscribe_delay_grows_exponentially() {
        let config = FanoutConfig::default();
        assert_eq!(config.resubscribe_delay(0), Duration::from_millis(100));
        assert_eq!(config.resubscribe_delay(1), Duration::from_millis(200));
        assert_eq!(config.resubscribe_delay(2), Duration::from_millis(400));
    }

    #[test]
    fn test_resubscribe_delay_is_capped() {
        let config = FanoutConfig::default();
        assert_eq!(config.resubscribe_delay(20), Duration::from_secs(30));
        assert_eq!(config.resubscribe_delay(u32::MAX), Duration::from_secs(30));
    }

    #[test]
    fn test_constant_backoff_with_unit_multiplier() {
        let config = FanoutConfig {
            backoff_multiplier: 1.0,
            ..Default::default()
        };
        assert_eq!(config.resubscribe_delay(7), Duration::from_millis(100));
    }

    #[test]
    fn test_validation_rejects_shrinking_backoff() {
        let config = FanoutConfig {
            backoff_multiplier: 0.5,
            ..Default::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ValidationError::InvalidBackoff(_))
        ));
    }

    #[test]
    fn test_validation_rejects_max_below_initial() {
        let config = FanoutConfig {
            backoff_initial_ms: 1_000,
            backoff_max_ms: 10,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validation_rejects_zero_ttl() {
        let config = FanoutConfig {
            subscription_ttl_secs: Some(0),
            ..Default::default()
        };
        assert_eq!(
            config.validate(),
            Err(ValidationError::InvalidSubscriptionTtl)
        );
    }

    #[test]
    fn test_deserialization_validates_topic() {
        let json = r#"{ "topic": "support_room", "subscription_ttl_secs": 300 }"#;
        let config: FanoutConfig = serde_json::from_str(json).unwrap();
        assert_eq!(config.topic.as_str(), "support_room");
        assert_eq!(config.subscription_ttl(), Some(Duration::from_secs(300)));

        let invalid = serde_json::from_str::<FanoutConfig>(r#"{ "topic": "" }"#);
        assert!(invalid.is_err());
    }
}
