use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::CoreError;

/// All timestamps are UTC.
pub type Timestamp = chrono::DateTime<chrono::Utc>;

/// Server-assigned identifier of an analysis job.
///
/// Always non-empty; construct through [`JobId::new`] or deserialization.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct JobId(String);

impl JobId {
    pub fn new(id: impl Into<String>) -> Result<Self, CoreError> {
        let id = id.into();
        if id.trim().is_empty() {
            return Err(CoreError::InvalidPayload(
                "Job ID must not be empty".to_string(),
            ));
        }
        Ok(Self(id))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for JobId {
    type Error = CoreError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<JobId> for String {
    fn from(value: JobId) -> Self {
        value.0
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Parse a backend timestamp.
///
/// Accepts RFC 3339 and the zone-less ISO form the backend emits
/// (`2024-05-01T10:00:00.123456`), which is taken to be UTC.
pub fn parse_timestamp(raw: &str) -> Result<Timestamp, CoreError> {
    if let Ok(ts) = chrono::DateTime::parse_from_rfc3339(raw) {
        return Ok(ts.with_timezone(&chrono::Utc));
    }
    chrono::NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f")
        .map(|naive| naive.and_utc())
        .map_err(|e| CoreError::InvalidPayload(format!("Invalid timestamp '{raw}': {e}")))
}

#[cfg(test)]
mod tests {
    use chrono::{Datelike, Timelike};

    use super::*;

    #[test]
    fn parses_rfc3339_and_naive_timestamps() {
        let a = parse_timestamp("2024-05-01T10:00:00+02:00").unwrap();
        assert_eq!(a.hour(), 8);

        let b = parse_timestamp("2024-05-01T10:00:00.123456").unwrap();
        assert_eq!((b.month(), b.hour()), (5, 10));

        assert!(parse_timestamp("yesterday").is_err());
    }

    #[test]
    fn empty_job_id_rejected() {
        assert!(JobId::new("").is_err());
        assert!(JobId::new("   ").is_err());
    }

    #[test]
    fn job_id_deserializes_from_plain_string() {
        let id: JobId = serde_json::from_str(r#""a1b2""#).unwrap();
        assert_eq!(id.as_str(), "a1b2");
        assert!(serde_json::from_str::<JobId>(r#""""#).is_err());
    }
}
