//! Timestamp value object for immutable points in time.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// Immutable point in time, always UTC.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Timestamp(DateTime<Utc>);

impl Timestamp {
    /// Creates a timestamp for the current moment.
    pub fn now() -> Self {
        Self(Utc::now())
    }

    /// Creates a timestamp from a DateTime<Utc>.
    pub fn from_datetime(dt: DateTime<Utc>) -> Self {
        Self(dt)
    }

    /// Returns the inner DateTime.
    pub fn as_datetime(&self) -> &DateTime<Utc> {
        &self.0
    }

    /// Returns the duration from another timestamp to this one.
    ///
    /// Returns negative duration if other is after self.
    pub fn duration_since(&self, other: &Timestamp) -> Duration {
        self.0.signed_duration_since(other.0)
    }

    /// RFC 3339 rendering used in JSON responses.
    pub fn to_rfc3339(&self) -> String {
        self.0.to_rfc3339()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn duration_since_is_signed() {
        let earlier = Timestamp::from_datetime(Utc::now());
        let later = Timestamp::from_datetime(*earlier.as_datetime() + Duration::seconds(5));

        assert_eq!(later.duration_since(&earlier), Duration::seconds(5));
        assert_eq!(earlier.duration_since(&later), Duration::seconds(-5));
    }

    #[test]
    fn rfc3339_output_parses_back() {
        let ts = Timestamp::now();
        let parsed = DateTime::parse_from_rfc3339(&ts.to_rfc3339()).unwrap();
        assert_eq!(parsed.with_timezone(&Utc), *ts.as_datetime());
    }
}
