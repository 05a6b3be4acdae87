use std::path::Path;

use once_cell::sync::Lazy;
use regex::Regex;
use tracing::debug;

use super::model::FormatTag;
use super::reader::first_line;

/// IPv4-looking token, anything, a bracketed timestamp, then a quoted HTTP method.
static ACCESS_LOG_LINE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r#"^\d{1,3}\.\d{1,3}\.\d{1,3}\.\d{1,3}\s+.*\[.*\]\s+"(GET|POST|PUT|DELETE|HEAD|OPTIONS|PATCH)"#,
    )
    .expect("access log detection pattern")
});

const SYSLOG_INDICATORS: [&str; 5] = ["<", ">", "kernel:", "syslog", "daemon"];

/// Classify a log file from its name and first line.
///
/// Priority:
/// 1. Extension: `.csv`, `.evtx`, `.json`
/// 2. For `.log`/`.txt`: access-log heuristic, then syslog heuristic
/// 3. CSV heuristic (two or more commas), regardless of extension
/// 4. `Unknown`
///
/// Best-effort and infallible: an unreadable file simply fails the content
/// checks and degrades to `Unknown`.
pub fn detect_log_type(path: &Path, filename: &str) -> FormatTag {
    let extension = Path::new(filename)
        .extension()
        .map(|e| e.to_string_lossy().to_ascii_lowercase())
        .unwrap_or_default();

    // Extension-only formats never need the file opened
    match extension.as_str() {
        "csv" => return FormatTag::Csv,
        "evtx" => return FormatTag::Evtx,
        "json" => return FormatTag::Json,
        _ => {}
    }

    let line = first_line(path).unwrap_or_default();
    let format = detect_from_first_line(&extension, &line);
    debug!(filename, format = %format, "Detected log type");
    format
}

/// Content-based part of detection, split out so it can run on any sample.
pub fn detect_from_first_line(extension: &str, line: &str) -> FormatTag {
    if matches!(extension, "log" | "txt") {
        if is_access_log_line(line) {
            return FormatTag::AccessLog;
        }
        if is_syslog_line(line) {
            return FormatTag::Syslog;
        }
    }

    if is_csv_line(line) {
        return FormatTag::Csv;
    }

    FormatTag::Unknown
}

pub fn is_access_log_line(line: &str) -> bool {
    ACCESS_LOG_LINE.is_match(line)
}

pub fn is_syslog_line(line: &str) -> bool {
    let lower = line.to_lowercase();
    SYSLOG_INDICATORS.iter().any(|indicator| lower.contains(indicator))
}

pub fn is_csv_line(line: &str) -> bool {
    line.matches(',').count() >= 2
}
