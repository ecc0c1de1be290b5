//! Time period type and lenient timestamp parsing.

use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};

/// A closed time interval.
///
/// Invariant: `begin <= end`, enforced at construction by swapping
/// reversed endpoints.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimePeriod {
    pub begin: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl TimePeriod {
    pub fn new(begin: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        if begin <= end {
            Self { begin, end }
        } else {
            Self {
                begin: end,
                end: begin,
            }
        }
    }

    /// Parse both endpoints with [`parse_instant`].
    pub fn from_strings(begin: &str, end: &str) -> Result<Self, TimeParseError> {
        Ok(Self::new(parse_instant(begin)?, parse_instant(end)?))
    }

    /// Check if this period overlaps another (boundary inclusive), so a
    /// period always overlaps itself.
    pub fn overlaps(&self, other: &TimePeriod) -> bool {
        self.begin <= other.end && self.end >= other.begin
    }

    pub fn contains(&self, dt: &DateTime<Utc>) -> bool {
        dt >= &self.begin && dt <= &self.end
    }
}

/// Parse an ISO 8601 instant, accepting the formats catalogue services
/// actually emit: RFC 3339, naive datetime without zone, or a bare date.
pub fn parse_instant(s: &str) -> Result<DateTime<Utc>, TimeParseError> {
    // Try full datetime with timezone
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Ok(dt.with_timezone(&Utc));
    }

    // Try without timezone (assume UTC)
    if let Ok(ndt) = NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S") {
        return Ok(Utc.from_utc_datetime(&ndt));
    }

    // Try fractional seconds without timezone
    if let Ok(ndt) = NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S%.f") {
        return Ok(Utc.from_utc_datetime(&ndt));
    }

    // Try date only
    if let Ok(ndt) =
        NaiveDateTime::parse_from_str(&format!("{}T00:00:00", s), "%Y-%m-%dT%H:%M:%S")
    {
        return Ok(Utc.from_utc_datetime(&ndt));
    }

    Err(TimeParseError::InvalidFormat(s.to_string()))
}

#[derive(Debug, thiserror::Error)]
pub enum TimeParseError {
    #[error("Invalid time format: {0}")]
    InvalidFormat(String),
}
