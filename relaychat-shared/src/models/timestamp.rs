use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// UTC timestamp carried on all wire types, serialized as an ISO-8601 string.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, ToSchema)]
pub struct Timestamp(pub DateTime<Utc>);

impl Timestamp {
    /// The current wall-clock time.
    #[must_use]
    pub fn now() -> Self {
        Self(Utc::now())
    }
}

impl std::fmt::Display for Timestamp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0.to_rfc3339())
    }
}

impl From<DateTime<Utc>> for Timestamp {
    fn from(value: DateTime<Utc>) -> Self {
        Self(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn serializes_as_iso8601_string() {
        let dt = Utc.with_ymd_and_hms(2025, 3, 8, 14, 30, 0).unwrap();
        let json = serde_json::to_string(&Timestamp(dt)).unwrap();
        assert_eq!(json, "\"2025-03-08T14:30:00Z\"");

        let back: Timestamp = serde_json::from_str(&json).unwrap();
        assert_eq!(back.0, dt);
    }

    #[test]
    fn orders_chronologically() {
        let earlier = Timestamp(Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap());
        let later = Timestamp(Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 1).unwrap());
        assert!(earlier < later);
    }
}
