//! Timestamp utilities
//!
//! All timestamps are persisted as UTC RFC 3339 strings with second precision
//! and a `Z` suffix, so string comparison in SQL orders them chronologically.

use chrono::{DateTime, SecondsFormat, Utc};

use crate::{Error, Result};

/// Get current UTC timestamp
pub fn now() -> DateTime<Utc> {
    Utc::now()
}

/// Current time as Unix epoch milliseconds
pub fn now_millis() -> i64 {
    Utc::now().timestamp_millis()
}

/// Format a timestamp in the persisted form (`2026-01-31T09:00:00Z`)
pub fn format_timestamp(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Secs, true)
}

/// Current time in the persisted form
pub fn now_timestamp() -> String {
    format_timestamp(&now())
}

/// Parse any RFC 3339 timestamp and normalize it to UTC
pub fn parse_timestamp(s: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| Error::InvalidInput(format!("Invalid timestamp '{}': {}", s, e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_now_returns_valid_timestamp() {
        let timestamp = now();
        // Should be a reasonable timestamp (after year 2000)
        assert!(timestamp.timestamp() > 946_684_800);
    }

    #[test]
    fn test_format_is_second_precision_utc() {
        let ts = Utc.with_ymd_and_hms(2026, 3, 4, 9, 30, 0).unwrap();
        assert_eq!(format_timestamp(&ts), "2026-03-04T09:30:00Z");
    }

    #[test]
    fn test_parse_normalizes_offset() {
        let ts = parse_timestamp("2026-03-04T10:30:00+01:00").unwrap();
        assert_eq!(format_timestamp(&ts), "2026-03-04T09:30:00Z");
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!(matches!(
            parse_timestamp("next tuesday"),
            Err(Error::InvalidInput(_))
        ));
    }

    #[test]
    fn test_formatted_timestamps_sort_chronologically() {
        let a = format_timestamp(&Utc.with_ymd_and_hms(2026, 1, 9, 23, 0, 0).unwrap());
        let b = format_timestamp(&Utc.with_ymd_and_hms(2026, 1, 10, 1, 0, 0).unwrap());
        assert!(a < b);
    }
}
