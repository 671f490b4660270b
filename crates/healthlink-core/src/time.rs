//! Timestamp encoding shared by every SQLite-backed store.
//!
//! All instants are stored as fixed-width RFC 3339 UTC strings with
//! millisecond precision, so lexicographic order in SQL equals time order.

use chrono::{DateTime, NaiveDate, SecondsFormat, Utc};

pub fn to_db(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Millis, true)
}

pub fn from_db(s: &str) -> Result<DateTime<Utc>, chrono::ParseError> {
    DateTime::parse_from_rfc3339(s).map(|dt| dt.with_timezone(&Utc))
}

/// Calendar dates are stored as `YYYY-MM-DD`.
pub fn date_to_db(d: NaiveDate) -> String {
    d.format("%Y-%m-%d").to_string()
}

pub fn date_from_db(s: &str) -> Result<NaiveDate, chrono::ParseError> {
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
}

/// Half-open `[start, end)` bounds of a UTC calendar day, in storage form.
pub fn day_bounds(d: NaiveDate) -> (String, String) {
    let start = d.and_hms_opt(0, 0, 0).unwrap_or_default().and_utc();
    let end = start + chrono::Duration::days(1);
    (to_db(start), to_db(end))
}
