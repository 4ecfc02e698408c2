//! Date and time helpers.

use chrono::{DateTime, NaiveDate, Utc};

use crate::error::{RateError, Result};

/// A timestamp (always UTC).
pub type Timestamp = DateTime<Utc>;

/// Date spellings accepted for snapshot dates, most specific first.
const DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%m/%d/%Y", "%d.%m.%Y"];

/// Get the current timestamp.
pub fn now() -> Timestamp {
    Utc::now()
}

/// Parse a snapshot date in any of the accepted spellings.
pub fn parse_snapshot_date(raw: &str) -> Result<NaiveDate> {
    let trimmed = raw.trim();
    DATE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(trimmed, fmt).ok())
        .ok_or_else(|| RateError::InvalidDate(raw.to_string()))
}
