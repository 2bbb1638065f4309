//! Timestamp extraction from ad-hoc log lines.
//!
//! A small closed set of patterns covers the formats that matter for seek
//! bounding: ISO-ish `YYYY-MM-DD[ T]HH:MM[:SS]` and classic syslog
//! `Mon DD HH:MM:SS` (year taken from a caller-supplied hint since syslog
//! lines carry none). Anything else is treated as unparsable, which the
//! seeker tolerates.

use std::sync::LazyLock;

use chrono::{NaiveDate, NaiveDateTime};
use regex::Regex;

static ISO_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(\d{4})-(\d{2})-(\d{2})[ T](\d{2}):(\d{2})(?::(\d{2}))?").unwrap()
});

static SYSLOG_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^([A-Z][a-z]{2}) {1,2}(\d{1,2}) (\d{2}):(\d{2}):(\d{2})").unwrap()
});

fn month_number(name: &str) -> Option<u32> {
    let n = match name {
        "Jan" => 1,
        "Feb" => 2,
        "Mar" => 3,
        "Apr" => 4,
        "May" => 5,
        "Jun" => 6,
        "Jul" => 7,
        "Aug" => 8,
        "Sep" => 9,
        "Oct" => 10,
        "Nov" => 11,
        "Dec" => 12,
        _ => return None,
    };
    Some(n)
}

/// Extract a timestamp from the start of a log line.
///
/// `year_hint` supplies the year for formats that omit one. Returns `None`
/// when no known pattern matches or the fields are out of range.
pub fn extract_timestamp(line: &str, year_hint: i32) -> Option<NaiveDateTime> {
    if let Some(caps) = ISO_RE.captures(line) {
        let year: i32 = caps[1].parse().ok()?;
        let month: u32 = caps[2].parse().ok()?;
        let day: u32 = caps[3].parse().ok()?;
        let hour: u32 = caps[4].parse().ok()?;
        let minute: u32 = caps[5].parse().ok()?;
        let second: u32 = caps.get(6).map_or(Some(0), |s| s.as_str().parse().ok())?;
        return NaiveDate::from_ymd_opt(year, month, day)?.and_hms_opt(hour, minute, second);
    }

    if let Some(caps) = SYSLOG_RE.captures(line) {
        let month = month_number(&caps[1])?;
        let day: u32 = caps[2].parse().ok()?;
        let hour: u32 = caps[3].parse().ok()?;
        let minute: u32 = caps[4].parse().ok()?;
        let second: u32 = caps[5].parse().ok()?;
        return NaiveDate::from_ymd_opt(year_hint, month, day)?.and_hms_opt(hour, minute, second);
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dt(s: &str) -> NaiveDateTime {
        NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S").unwrap()
    }

    #[test]
    fn test_iso_with_seconds() {
        let ts = extract_timestamp("2021-03-29 00:31:05 something happened", 2024).unwrap();
        assert_eq!(ts, dt("2021-03-29 00:31:05"));
    }

    #[test]
    fn test_iso_without_seconds() {
        let ts = extract_timestamp("2021-03-29 00:31 event", 2024).unwrap();
        assert_eq!(ts, dt("2021-03-29 00:31:00"));
    }

    #[test]
    fn test_iso_t_separator() {
        let ts = extract_timestamp("2023-11-02T10:04:07.456Z msg", 2024).unwrap();
        assert_eq!(ts, dt("2023-11-02 10:04:07"));
    }

    #[test]
    fn test_syslog_year_hint() {
        let ts = extract_timestamp("Mar  9 08:53:11 host kernel: oops", 2022).unwrap();
        assert_eq!(ts, dt("2022-03-09 08:53:11"));
    }

    #[test]
    fn test_unparsable() {
        assert!(extract_timestamp("no timestamp here", 2024).is_none());
        assert!(extract_timestamp("", 2024).is_none());
        assert!(extract_timestamp("2021-13-45 99:99 bogus", 2024).is_none());
    }
}
