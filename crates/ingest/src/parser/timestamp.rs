//! Timestamp grammar shared by all parsers.
//!
//! An ordered list of formats is tried until one succeeds. Results are always
//! UTC: explicit offsets are converted, naive values are taken as UTC, and a
//! trailing `UTC`/`GMT`/`Z` zone name is dropped before naive parsing.
//! Nothing here fails hard; callers that need a value use [`parse_or_now`].

use chrono::{DateTime, Datelike, NaiveDate, NaiveDateTime, Utc};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TimestampFormat {
    /// `07/Feb/2026:10:15:32 +0000`
    ApacheWithOffset,
    /// `07/Feb/2026:10:15:32`
    Apache,
    /// `2026-02-07T10:15:32.123Z`, `2026-02-07T10:15:32+02:00`
    Rfc3339,
    /// `2026-02-07T10:15:32+0200`
    IsoCompactOffset,
    /// `2026-02-07T10:15[:32[.fff]]`
    IsoNaive,
    /// `2026-02-07 10:15[:32[.fff]]`
    IsoSpace,
    /// `Sat Feb  7 10:15:32 2026`
    Ctime,
    /// `Feb  7 10:15:32` (year taken from the current UTC date)
    Syslog,
    /// `07-Feb-2026 10:15:32`
    DayMonthYear,
    /// `2026/02/07 10:15[:32]`
    SlashYmd,
    /// `02/07/2026 10:15[:32]`, `2/7/2026 10:15:32 AM`
    SlashMdy,
    /// `Feb 7, 2026 10:15[:32]`, `February 7 2026 10:15:32`
    MonthNameDate,
    /// `2026-02-07` (midnight)
    DateOnly,
    /// Unix seconds (10 digits) or milliseconds (13 digits)
    Epoch,
}

impl TimestampFormat {
    /// Every format in the order they are tried.
    pub const ALL: [TimestampFormat; 14] = [
        TimestampFormat::ApacheWithOffset,
        TimestampFormat::Apache,
        TimestampFormat::Rfc3339,
        TimestampFormat::IsoCompactOffset,
        TimestampFormat::IsoNaive,
        TimestampFormat::IsoSpace,
        TimestampFormat::Ctime,
        TimestampFormat::Syslog,
        TimestampFormat::DayMonthYear,
        TimestampFormat::SlashYmd,
        TimestampFormat::SlashMdy,
        TimestampFormat::MonthNameDate,
        TimestampFormat::DateOnly,
        TimestampFormat::Epoch,
    ];

    pub fn parse(&self, input: &str) -> Option<DateTime<Utc>> {
        let s = clean(input);
        if s.is_empty() {
            return None;
        }
        match self {
            TimestampFormat::ApacheWithOffset => {
                DateTime::parse_from_str(s, "%d/%b/%Y:%H:%M:%S %z")
                    .ok()
                    .map(|dt| dt.with_timezone(&Utc))
            }
            TimestampFormat::Apache => naive(s, &["%d/%b/%Y:%H:%M:%S"]),
            TimestampFormat::Rfc3339 => DateTime::parse_from_rfc3339(s)
                .ok()
                .map(|dt| dt.with_timezone(&Utc)),
            TimestampFormat::IsoCompactOffset => {
                DateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S%.f%z")
                    .or_else(|_| DateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S%.f%z"))
                    .ok()
                    .map(|dt| dt.with_timezone(&Utc))
            }
            TimestampFormat::IsoNaive => naive(s, &["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S", "%Y-%m-%dT%H:%M"]),
            TimestampFormat::IsoSpace => naive(s, &["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%d %H:%M:%S", "%Y-%m-%d %H:%M"]),
            TimestampFormat::Ctime => naive(s, &["%a %b %d %H:%M:%S %Y"]),
            TimestampFormat::Syslog => parse_syslog(s, Utc::now().year()),
            TimestampFormat::DayMonthYear => naive(s, &["%d-%b-%Y %H:%M:%S"]),
            TimestampFormat::SlashYmd => naive(s, &["%Y/%m/%d %H:%M:%S", "%Y/%m/%d %H:%M"]),
            TimestampFormat::SlashMdy => naive(
                s,
                &[
                    "%m/%d/%Y %H:%M:%S",
                    "%m/%d/%Y %H:%M",
                    "%m/%d/%Y %I:%M:%S %p",
                    "%m/%d/%Y %I:%M %p",
                ],
            ),
            TimestampFormat::MonthNameDate => naive(
                s,
                &[
                    "%b %d, %Y %H:%M:%S",
                    "%b %d, %Y %H:%M",
                    "%b %d %Y %H:%M:%S",
                    "%b %d, %Y %I:%M:%S %p",
                ],
            ),
            TimestampFormat::DateOnly => NaiveDate::parse_from_str(s, "%Y-%m-%d")
                .ok()
                .and_then(|d| d.and_hms_opt(0, 0, 0))
                .map(|dt| dt.and_utc()),
            TimestampFormat::Epoch => parse_epoch(s),
        }
    }
}

/// Strip surrounding whitespace, brackets and quotes.
fn clean(input: &str) -> &str {
    input
        .trim()
        .trim_matches(|c| matches!(c, '[' | ']' | '(' | ')' | '"' | '\''))
        .trim()
}

/// Drop a trailing zone name that only ever means UTC.
fn strip_utc_zone(s: &str) -> &str {
    ["UTC", "GMT", "Z"]
        .iter()
        .find_map(|zone| s.strip_suffix(zone))
        .map_or(s, str::trim_end)
}

fn naive(s: &str, patterns: &[&str]) -> Option<DateTime<Utc>> {
    let collapsed = strip_utc_zone(s).split_whitespace().collect::<Vec<_>>().join(" ");
    patterns
        .iter()
        .find_map(|p| NaiveDateTime::parse_from_str(&collapsed, p).ok())
        .map(|dt| dt.and_utc())
}

fn parse_epoch(s: &str) -> Option<DateTime<Utc>> {
    if !s.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let value: i64 = s.parse().ok()?;
    match s.len() {
        13 => DateTime::from_timestamp_millis(value),
        10 => DateTime::from_timestamp(value, 0),
        _ => None,
    }
}

/// Parse an RFC 3164 timestamp (`Mon DD HH:MM:SS`) in the given year.
pub fn parse_syslog(s: &str, year: i32) -> Option<DateTime<Utc>> {
    let collapsed = s.split_whitespace().collect::<Vec<_>>().join(" ");
    NaiveDateTime::parse_from_str(&format!("{} {}", collapsed, year), "%b %d %H:%M:%S %Y")
        .ok()
        .map(|dt| dt.and_utc())
}

/// Try every format in order.
pub fn parse_timestamp(input: &str) -> Option<DateTime<Utc>> {
    TimestampFormat::ALL.iter().find_map(|f| f.parse(input))
}

/// Like [`parse_timestamp`] but never reads bare integers as epoch values.
/// Used when scanning arbitrary columns, where IDs and counters abound.
pub fn parse_timestamp_strict(input: &str) -> Option<DateTime<Utc>> {
    TimestampFormat::ALL
        .iter()
        .filter(|f| **f != TimestampFormat::Epoch)
        .find_map(|f| f.parse(input))
}

/// Try the hinted format first, then fall through the full list.
pub fn parse_with_hint(input: &str, hint: Option<TimestampFormat>) -> Option<DateTime<Utc>> {
    hint.and_then(|f| f.parse(input))
        .or_else(|| parse_timestamp(input))
}

/// Always returns a timestamp: unparseable input degrades to the current time.
pub fn parse_or_now(input: &str, hint: Option<TimestampFormat>) -> DateTime<Utc> {
    parse_with_hint(input, hint).unwrap_or_else(Utc::now)
}

/// Identify which format a sample timestamp uses.
pub fn detect_format(sample: &str) -> Option<TimestampFormat> {
    TimestampFormat::ALL.iter().copied().find(|f| f.parse(sample).is_some())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Timelike};

    #[test]
    fn test_apache_with_offset_is_converted_to_utc() {
        let ts = parse_timestamp("12/Jan/2026:10:00:00 +0200").unwrap();
        assert_eq!(ts, Utc.with_ymd_and_hms(2026, 1, 12, 8, 0, 0).unwrap());
    }

    #[test]
    fn test_bracketed_apache() {
        let ts = parse_timestamp("[12/Jan/2026:10:00:00 +0000]").unwrap();
        assert_eq!(ts, Utc.with_ymd_and_hms(2026, 1, 12, 10, 0, 0).unwrap());
        assert_eq!(detect_format("[12/Jan/2026:10:00:00 +0000]"), Some(TimestampFormat::ApacheWithOffset));
        assert_eq!(detect_format("12/Jan/2026:10:00:00"), Some(TimestampFormat::Apache));
    }

    #[test]
    fn test_iso_variants() {
        let expected = Utc.with_ymd_and_hms(2026, 1, 12, 10, 0, 0).unwrap();
        assert_eq!(parse_timestamp("2026-01-12T10:00:00Z"), Some(expected));
        assert_eq!(parse_timestamp("2026-01-12T12:00:00+02:00"), Some(expected));
        assert_eq!(parse_timestamp("2026-01-12T12:00:00+0200"), Some(expected));
        assert_eq!(parse_timestamp("2026-01-12T10:00:00"), Some(expected));
        assert_eq!(parse_timestamp("2026-01-12 10:00:00"), Some(expected));
        let fractional = parse_timestamp("2026-01-12 10:00:00.250").unwrap();
        assert_eq!(fractional.nanosecond(), 250_000_000);
    }

    #[test]
    fn test_other_layouts() {
        let expected = Utc.with_ymd_and_hms(2026, 2, 7, 10, 15, 32).unwrap();
        assert_eq!(parse_timestamp("07-Feb-2026 10:15:32"), Some(expected));
        assert_eq!(parse_timestamp("2026/02/07 10:15:32"), Some(expected));
        assert_eq!(parse_timestamp("02/07/2026 10:15:32"), Some(expected));
        assert_eq!(
            parse_timestamp("2026-02-07"),
            Some(Utc.with_ymd_and_hms(2026, 2, 7, 0, 0, 0).unwrap())
        );
    }

    #[test]
    fn test_minute_precision_and_twelve_hour_clock() {
        let expected = Utc.with_ymd_and_hms(2026, 1, 12, 10, 0, 0).unwrap();
        assert_eq!(parse_timestamp("2026-01-12 10:00"), Some(expected));
        assert_eq!(parse_timestamp("2026-01-12T10:00"), Some(expected));
        assert_eq!(parse_timestamp("2026-01-12T10:00Z"), Some(expected));
        assert_eq!(parse_timestamp("2026/01/12 10:00"), Some(expected));
        assert_eq!(parse_timestamp("01/12/2026 10:00"), Some(expected));
        assert_eq!(parse_timestamp("1/12/2026 10:00:00 AM"), Some(expected));
        assert_eq!(
            parse_timestamp("1/12/2026 10:00 PM"),
            Some(Utc.with_ymd_and_hms(2026, 1, 12, 22, 0, 0).unwrap())
        );
    }

    #[test]
    fn test_textual_months_and_zone_names() {
        let expected = Utc.with_ymd_and_hms(2026, 1, 12, 10, 0, 0).unwrap();
        assert_eq!(parse_timestamp("2026-01-12 10:00:00 UTC"), Some(expected));
        assert_eq!(parse_timestamp("2026-01-12 10:00:00 GMT"), Some(expected));
        assert_eq!(parse_timestamp("Jan 12, 2026 10:00:00"), Some(expected));
        assert_eq!(parse_timestamp("January 12 2026 10:00:00"), Some(expected));
        assert_eq!(parse_timestamp("Mon Jan 12 10:00:00 2026"), Some(expected));
        assert_eq!(parse_timestamp("Mon Jan 12 10:00:00 2026 UTC"), Some(expected));
        assert_eq!(detect_format("Mon Jan 12 10:00:00 2026"), Some(TimestampFormat::Ctime));
    }

    #[test]
    fn test_syslog_uses_supplied_year_and_tolerates_padding() {
        let ts = parse_syslog("Jan  5 03:04:05", 2025).unwrap();
        assert_eq!(ts, Utc.with_ymd_and_hms(2025, 1, 5, 3, 4, 5).unwrap());
    }

    #[test]
    fn test_epoch_only_in_lenient_mode() {
        assert_eq!(
            parse_timestamp("1768212000"),
            Some(Utc.with_ymd_and_hms(2026, 1, 12, 10, 0, 0).unwrap())
        );
        assert_eq!(parse_timestamp_strict("1768212000"), None);
        assert_eq!(parse_timestamp("12345"), None);
    }

    #[test]
    fn test_hint_is_tried_first_and_garbage_degrades_to_now() {
        let hinted = parse_with_hint("12/Jan/2026:10:00:00", Some(TimestampFormat::Apache));
        assert!(hinted.is_some());

        let before = Utc::now();
        let fallback = parse_or_now("not a time", None);
        assert!(fallback >= before);
    }
}
