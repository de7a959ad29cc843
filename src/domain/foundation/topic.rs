//! Topic value object: the address of a broadcast group on the bus.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use super::ValidationError;

/// Name of the shared channel used when none is configured.
pub const DEFAULT_TOPIC: &str = "chat_channel";

/// A named broadcast group.
///
/// Topics carry no state; they only address publishers and subscribers on
/// the message bus. Names must be non-empty and free of whitespace and
/// control characters.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Topic(String);

impl Topic {
    /// Creates a validated topic.
    pub fn new(name: impl Into<String>) -> Result<Self, ValidationError> {
        let name = name.into();
        if name.is_empty() {
            return Err(ValidationError::empty_field("topic"));
        }
        if name.chars().any(|c| c.is_whitespace() || c.is_control()) {
            return Err(ValidationError::invalid_format(
                "topic",
                "must not contain whitespace or control characters",
            ));
        }
        Ok(Self(name))
    }

    /// Returns the topic name.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for Topic {
    fn default() -> Self {
        Self(DEFAULT_TOPIC.to_string())
    }
}

impl fmt::Display for Topic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for Topic {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl TryFrom<String> for Topic {
    type Error = ValidationError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<Topic> for String {
    fn from(topic: Topic) -> Self {
        topic.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_topic_is_chat_channel() {
        assert_eq!(Topic::default().as_str(), "chat_channel");
    }

    #[test]
    fn accepts_plain_names() {
        let topic = Topic::new("chat_room").unwrap();
        assert_eq!(topic.to_string(), "chat_room");
    }

    #[test]
    fn rejects_empty_name() {
        assert_eq!(
            Topic::new(""),
            Err(ValidationError::empty_field("topic"))
        );
    }

    #[test]
    fn rejects_whitespace() {
        assert!(Topic::new("chat channel").is_err());
        assert!(Topic::new("chat\n").is_err());
    }

    #[test]
    fn deserializes_through_validation() {
        let topic: Topic = serde_json::from_str("\"news\"").unwrap();
        assert_eq!(topic.as_str(), "news");

        let invalid = serde_json::from_str::<Topic>("\"\"");
        assert!(invalid.is_err());
    }
}
