use chrono::{DateTime, Utc};

/// Formats an instant as ISO-8601 UTC truncated to seconds with a literal `Z`
/// suffix, e.g. `2024-01-02T03:04:05Z`.
///
/// # Examples
///
/// ```
/// use audioport::util::to_iso_utc;
/// use chrono::{TimeZone, Utc};
///
/// let dt = Utc.with_ymd_and_hms(2024, 1, 2, 3, 4, 5).unwrap();
/// assert_eq!(to_iso_utc(&dt), "2024-01-02T03:04:05Z");
/// ```
pub fn to_iso_utc(dt: &DateTime<Utc>) -> String {
    dt.format("%Y-%m-%dT%H:%M:%SZ").to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_subseconds_truncated() {
        let dt = Utc.timestamp_opt(1_700_000_000, 999_999_999).unwrap();
        assert_eq!(to_iso_utc(&dt), "2023-11-14T22:13:20Z");
    }

    #[test]
    fn test_offset_input_rendered_in_utc() {
        let dt = chrono::DateTime::parse_from_rfc3339("2024-01-02T05:04:05+02:00")
            .unwrap()
            .with_timezone(&Utc);
        assert_eq!(to_iso_utc(&dt), "2024-01-02T03:04:05Z");
    }
}
