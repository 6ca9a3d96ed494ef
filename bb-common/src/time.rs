//! Timestamp utilities
//!
//! Timestamps are persisted as fixed-width UTC text
//! (`YYYY-MM-DDTHH:MM:SS.ffffffZ`), so SQL string comparison orders them
//! chronologically and `BETWEEN` works for tolerance windows.

use chrono::{DateTime, Datelike, NaiveDate, NaiveDateTime, SecondsFormat, TimeZone, Utc};

use crate::{Error, Result};

const NAIVE_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%d %H:%M",
];

/// Years the fixed-width storage format can hold
const STORABLE_YEARS: std::ops::RangeInclusive<i32> = 0..=9999;

/// Get current UTC timestamp
pub fn now() -> DateTime<Utc> {
    Utc::now()
}

/// Format a timestamp for storage
pub fn to_db(ts: &DateTime<Utc>) -> String {
    ts.format("%Y-%m-%dT%H:%M:%S%.6fZ").to_string()
}

/// Parse a timestamp previously written by [`to_db`]
///
/// Falls back to the lenient request parser so databases edited by hand
/// still load.
pub fn from_db(s: &str) -> Result<DateTime<Utc>> {
    parse_timestamp(s)
}

/// Reject timestamps whose year does not fit the four-digit storage format
pub fn check_storable(ts: &DateTime<Utc>) -> Result<()> {
    if STORABLE_YEARS.contains(&ts.year()) {
        Ok(())
    } else {
        Err(Error::InvalidInput(format!(
            "timestamp year {} outside 0000..=9999",
            ts.year()
        )))
    }
}

/// Format a timestamp for JSON responses
pub fn to_api(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::AutoSi, true)
}

/// Parse an ISO-8601 timestamp from a request
///
/// Accepts RFC 3339 (`Z` or numeric offset) and naive date-times, which are
/// taken as UTC.
pub fn parse_timestamp(s: &str) -> Result<DateTime<Utc>> {
    let s = s.trim();
    if s.is_empty() {
        return Err(Error::InvalidInput("empty timestamp".to_string()));
    }

    let parsed = DateTime::parse_from_rfc3339(s)
        .map(|ts| ts.with_timezone(&Utc))
        .ok()
        .or_else(|| {
            NAIVE_FORMATS
                .iter()
                .find_map(|fmt| NaiveDateTime::parse_from_str(s, fmt).ok())
                .map(|naive| Utc.from_utc_datetime(&naive))
        });

    if let Some(ts) = parsed {
        // Offsets can push a year-0000 local time into year -1 UTC
        check_storable(&ts)?;
        return Ok(ts);
    }

    Err(Error::InvalidInput(format!(
        "invalid ISO-8601 timestamp: '{}'",
        s
    )))
}

/// Parse a calendar date (`YYYY-MM-DD`)
pub fn parse_date(s: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(s.trim(), "%Y-%m-%d")
        .map_err(|_| Error::InvalidInput(format!("invalid date: '{}'", s)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn test_parse_zulu() {
        let ts = parse_timestamp("2019-03-04T15:10:06Z").unwrap();
        assert_eq!(ts, Utc.with_ymd_and_hms(2019, 3, 4, 15, 10, 6).unwrap());
    }

    #[test]
    fn test_parse_offset_normalizes_to_utc() {
        let ts = parse_timestamp("2019-03-04T10:10:06-05:00").unwrap();
        assert_eq!(ts, Utc.with_ymd_and_hms(2019, 3, 4, 15, 10, 6).unwrap());
    }

    #[test]
    fn test_parse_naive_is_utc() {
        let a = parse_timestamp("2019-03-04T15:10:06").unwrap();
        let b = parse_timestamp("2019-03-04 15:10:06").unwrap();
        assert_eq!(a, b);
        assert_eq!(a, Utc.with_ymd_and_hms(2019, 3, 4, 15, 10, 6).unwrap());
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!(parse_timestamp("yesterday").is_err());
        assert!(parse_timestamp("   ").is_err());
    }

    #[test]
    fn test_parse_rejects_years_outside_four_digits() {
        assert!(parse_timestamp("+262142-01-01T00:00:00").is_err());
        assert!(parse_timestamp("-0001-01-01T00:00:00").is_err());
        assert!(parse_timestamp("10000-01-01 00:00").is_err());
        assert!(parse_timestamp("0000-01-01T00:30:00+01:00").is_err());

        let last = parse_timestamp("9999-12-31T23:59:59Z").unwrap();
        assert_eq!(from_db(&to_db(&last)).unwrap(), last);
        assert!(parse_timestamp("0000-01-01T00:00:00").is_ok());
    }

    #[test]
    fn test_check_storable_bounds() {
        let far = Utc.from_utc_datetime(
            &NaiveDate::from_ymd_opt(262142, 1, 1)
                .unwrap()
                .and_hms_opt(0, 0, 0)
                .unwrap(),
        );
        assert!(matches!(check_storable(&far), Err(Error::InvalidInput(_))));
        assert!(check_storable(&Utc.with_ymd_and_hms(2019, 3, 4, 15, 10, 6).unwrap()).is_ok());
    }

    #[test]
    fn test_db_format_round_trips_fraction() {
        let ts = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap() + Duration::microseconds(1234);
        let stored = to_db(&ts);
        assert_eq!(stored, "2024-01-01T00:00:00.001234Z");
        assert_eq!(from_db(&stored).unwrap(), ts);
    }

    #[test]
    fn test_db_format_sorts_chronologically() {
        let early = Utc.with_ymd_and_hms(2024, 1, 1, 9, 59, 59).unwrap();
        let late = early + Duration::milliseconds(1500);
        assert!(to_db(&early) < to_db(&late));
    }

    #[test]
    fn test_parse_date() {
        assert_eq!(
            parse_date("2024-02-29").unwrap(),
            NaiveDate::from_ymd_opt(2024, 2, 29).unwrap()
        );
        assert!(parse_date("2023-02-29").is_err());
    }
}
