//! RFC 1123 timestamps (`Sun, 06 Nov 1994 08:49:37 GMT`).

use std::time::{Duration, SystemTime};

use chrono::{DateTime, NaiveDateTime, Utc};

const RFC1123_FORMAT: &str = "%a, %d %b %Y %H:%M:%S GMT";

/// Formats a timestamp at second granularity in GMT.
pub fn format_http_date(time: SystemTime) -> String {
    DateTime::<Utc>::from(time).format(RFC1123_FORMAT).to_string()
}

/// Parses an RFC 1123 timestamp, returning `None` if it is malformed.
pub fn parse_http_date(text: &str) -> Option<SystemTime> {
    NaiveDateTime::parse_from_str(text.trim(), RFC1123_FORMAT)
        .ok()
        .map(|naive| SystemTime::from(naive.and_utc()))
}

/// Whether `since` is equal to or later than `modified`, allowing one second
/// of slack for the sub-second part the wire format drops.
pub fn not_modified_since(since: SystemTime, modified: SystemTime) -> bool {
    match since.duration_since(modified) {
        Ok(_) => true,
        Err(behind) => behind.duration() < Duration::from_secs(1),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn formats_and_parses_rfc1123() {
        let time = SystemTime::UNIX_EPOCH + Duration::from_secs(784_111_777);

        let text = format_http_date(time);

        assert_eq!(text, "Sun, 06 Nov 1994 08:49:37 GMT");
        assert_eq!(parse_http_date(&text), Some(time));
    }

    #[test]
    fn rejects_other_formats() {
        assert_eq!(parse_http_date("1994-11-06T08:49:37Z"), None);
        assert_eq!(parse_http_date(""), None);
    }

    #[test]
    fn second_granularity_tolerance() {
        let modified = SystemTime::UNIX_EPOCH + Duration::from_millis(10_900);
        let truncated = SystemTime::UNIX_EPOCH + Duration::from_secs(10);
        let older = SystemTime::UNIX_EPOCH + Duration::from_secs(9);

        assert!(not_modified_since(modified, modified));
        assert!(not_modified_since(truncated, modified));
        assert!(!not_modified_since(older, modified));
    }
}
