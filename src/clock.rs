//! Time source and timestamp encoding.
//!
//! Timestamps are persisted as UTC RFC 3339 text with fixed microsecond
//! precision so that SQLite's lexical `<`/`>`/`ORDER BY` on the column agree
//! with chronological order. Event dates are plain `YYYY-MM-DD`.

use chrono::{DateTime, NaiveDate, SecondsFormat, Utc};

/// Source of "now" for every write path.
///
/// Injected into [`crate::inbox::service::Inbox`] so read markers, message
/// timestamps and planning windows can be driven deterministically.
pub trait Clock: Send + Sync {
    /// Current instant in UTC.
    fn now(&self) -> DateTime<Utc>;

    /// Current calendar date in UTC.
    fn today(&self) -> NaiveDate {
        self.now().date_naive()
    }
}

/// Wall-clock [`Clock`] backed by [`Utc::now`].
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Encode an instant in the storage format (`2025-06-01T10:00:00.000000Z`).
pub fn format_ts(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// Decode a stored timestamp. Returns `None` for malformed values.
pub fn parse_ts(raw: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

/// Encode a calendar date in the storage format.
pub fn format_date(date: NaiveDate) -> String {
    date.format("%Y-%m-%d").to_string()
}

/// Decode a stored calendar date. Returns `None` for malformed values.
pub fn parse_date(raw: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(raw, "%Y-%m-%d").ok()
}
