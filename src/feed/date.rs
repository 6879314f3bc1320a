use chrono::{DateTime, NaiveDateTime, Utc};
use thiserror::Error;

use crate::util::to_iso_utc;

/// Failure to turn a feed date string into an instant.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DateParseError {
    #[error("Could not parse RSS pubDate: it was empty")]
    Empty,
    #[error("Could not parse RSS pubDate: {0:?}")]
    Unparseable(String),
}

/// Zone-less layouts seen in podcast feeds, tried after RFC 2822 fails.
const NAIVE_FORMATS: &[&str] = &["%d %b %Y %H:%M:%S", "%d %b %Y %H:%M"];

/// Parses a feed publish date into UTC.
///
/// Accepts RFC 2822 (RSS `pubDate`) and RFC 3339 (Atom). A day-of-week
/// prefix that disagrees with the date is tolerated, and a date without a
/// zone is taken as UTC.
pub fn parse_pubdate(raw: &str) -> Result<DateTime<Utc>, DateParseError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(DateParseError::Empty);
    }

    DateTime::parse_from_rfc2822(trimmed)
        .or_else(|_| DateTime::parse_from_rfc3339(trimmed))
        .or_else(|e| match trimmed.split_once(',') {
            Some((_weekday, rest)) => DateTime::parse_from_rfc2822(rest.trim()),
            None => Err(e),
        })
        .map(|dt| dt.with_timezone(&Utc))
        .ok()
        .or_else(|| parse_naive_utc(trimmed))
        .ok_or_else(|| DateParseError::Unparseable(trimmed.to_string()))
}

fn parse_naive_utc(raw: &str) -> Option<DateTime<Utc>> {
    let body = raw.split_once(',').map_or(raw, |(_weekday, rest)| rest).trim();
    NAIVE_FORMATS
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(body, format).ok())
        .map(|naive| naive.and_utc())
}

/// Converts an RSS `pubDate` into ISO-8601 UTC, truncated to seconds, with a
/// trailing `Z`.
///
/// # Errors
///
/// [`DateParseError::Empty`] for blank input, [`DateParseError::Unparseable`]
/// for anything that is neither RFC 2822 nor RFC 3339.
///
/// # Examples
///
/// ```
/// use audioport::feed::rss_pubdate_to_iso;
///
/// assert_eq!(
///     rss_pubdate_to_iso("Tue, 10 Jun 2003 04:00:00 +0200").unwrap(),
///     "2003-06-10T02:00:00Z"
/// );
/// assert!(rss_pubdate_to_iso("").is_err());
/// ```
pub fn rss_pubdate_to_iso(raw: &str) -> Result<String, DateParseError> {
    parse_pubdate(raw).map(|dt| to_iso_utc(&dt))
}

/// Timestamp hook handed to the feed parser.
pub(crate) fn lenient_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    match parse_pubdate(raw) {
        Ok(dt) => Some(dt),
        Err(e) => {
            tracing::debug!(raw = %raw, error = %e, "Unparseable feed timestamp");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use proptest::prelude::*;

    #[test]
    fn test_gmt_zone() {
        assert_eq!(
            rss_pubdate_to_iso("Mon, 01 Jan 2024 10:30:00 GMT").unwrap(),
            "2024-01-01T10:30:00Z"
        );
    }

    #[test]
    fn test_negative_offset_converted_to_utc() {
        assert_eq!(
            rss_pubdate_to_iso("Sun, 31 Dec 2023 22:15:00 -0500").unwrap(),
            "2024-01-01T03:15:00Z"
        );
    }

    #[test]
    fn test_no_weekday() {
        assert_eq!(
            rss_pubdate_to_iso("5 Feb 2024 08:00:00 +0000").unwrap(),
            "2024-02-05T08:00:00Z"
        );
    }

    #[test]
    fn test_wrong_weekday_tolerated() {
        // 1 Jan 2024 was a Monday
        assert_eq!(
            rss_pubdate_to_iso("Fri, 01 Jan 2024 00:00:00 +0000").unwrap(),
            "2024-01-01T00:00:00Z"
        );
    }

    #[test]
    fn test_missing_zone_assumed_utc() {
        assert_eq!(
            rss_pubdate_to_iso("Mon, 01 Jan 2024 10:30:00").unwrap(),
            "2024-01-01T10:30:00Z"
        );
        assert_eq!(
            rss_pubdate_to_iso("01 Jan 2024 10:30").unwrap(),
            "2024-01-01T10:30:00Z"
        );
    }

    #[test]
    fn test_rfc3339_accepted() {
        assert_eq!(
            rss_pubdate_to_iso("2024-03-01T12:00:00.250+01:00").unwrap(),
            "2024-03-01T11:00:00Z"
        );
    }

    #[test]
    fn test_empty_and_blank_rejected() {
        assert_eq!(rss_pubdate_to_iso(""), Err(DateParseError::Empty));
        assert_eq!(rss_pubdate_to_iso("   "), Err(DateParseError::Empty));
    }

    #[test]
    fn test_garbage_rejected() {
        assert_eq!(
            rss_pubdate_to_iso("last tuesday"),
            Err(DateParseError::Unparseable("last tuesday".to_string()))
        );
        assert!(lenient_timestamp("last tuesday").is_none());
    }

    proptest! {
        #[test]
        fn prop_rfc2822_round_trips_to_same_instant(
            secs in 0i64..4_102_444_800,
            offset_minutes in -720i32..=840,
        ) {
            let offset = chrono::FixedOffset::east_opt(offset_minutes * 60).unwrap();
            let local = offset.timestamp_opt(secs, 0).unwrap();
            let iso = rss_pubdate_to_iso(&local.to_rfc2822()).unwrap();

            let back = DateTime::parse_from_rfc3339(&iso).unwrap().with_timezone(&Utc);
            prop_assert_eq!(back, Utc.timestamp_opt(secs, 0).unwrap());
            prop_assert!(iso.ends_with('Z'));
        }
    }
}
