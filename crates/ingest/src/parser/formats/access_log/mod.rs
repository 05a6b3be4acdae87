//! Web server access logs.
//!
//! Access logs have no single canonical layout, so each file is sampled to
//! pick the grammar most of its lines follow. That grammar is tried first on
//! every line, the others after it, and [`flexible`] extraction last.

pub mod classify;
pub mod flexible;
pub mod grammar;

use std::path::Path;
use std::sync::Arc;

use once_cell::sync::Lazy;
use regex::Regex;
use tracing::{debug, info};

use crate::parser::reader::{sample_lines, NumberedLines};
use crate::parser::timestamp::{detect_format, parse_or_now, TimestampFormat};
use crate::parser::traits::{EventStream, FormatTag, LogParser, NormalizedEvent, ParseError, ParseOutcome, RecordOutcome};
use crate::parser::{ExtraValue, DETECTION_SAMPLE_SIZE, GRAMMAR_MATCH_RATIO, PROGRESS_INTERVAL, STREAMING_THRESHOLD_BYTES};

pub use classify::{EventClassifier, Signature};
pub use flexible::flexible_parse;
pub use grammar::{Grammar, RequestFields};

static EXTRA_KV: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"(\w+)=("[^"]*"|\S+)"#).expect("extra key=value pattern"));
static EXTRA_QUOTED: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#""([^"]*)""#).expect("extra quoted pattern"));
static RESPONSE_TIME: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(\d+(?:\.\d+)?)\s*(?:ms|s)?$").expect("response time pattern"));

/// Longest user agent or referer copied into `raw_message`.
const RAW_FIELD_CHARS: usize = 50;

/// What sampling learned about one file.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Detection {
    pub grammar: Option<Grammar>,
    pub timestamp: Option<TimestampFormat>,
}

#[derive(Debug, Clone)]
pub struct AccessLogParser {
    classifier: Arc<EventClassifier>,
    sample_size: usize,
    large_file_bytes: u64,
}

impl AccessLogParser {
    pub fn new() -> Self {
        Self {
            classifier: EventClassifier::shared(),
            sample_size: DETECTION_SAMPLE_SIZE,
            large_file_bytes: STREAMING_THRESHOLD_BYTES,
        }
    }

    pub fn with_classifier(mut self, classifier: Arc<EventClassifier>) -> Self {
        self.classifier = classifier;
        self
    }

    pub fn with_sample_size(mut self, lines: usize) -> Self {
        self.sample_size = lines.max(1);
        self
    }

    pub fn with_large_file_threshold(mut self, bytes: u64) -> Self {
        self.large_file_bytes = bytes;
        self
    }

    pub fn classifier(&self) -> &EventClassifier {
        &self.classifier
    }

    /// Pick the first grammar matching at least half of `sample`, and the
    /// timestamp format of the first line it matches.
    pub fn detect(&self, sample: &[String]) -> Detection {
        if sample.is_empty() {
            return Detection::default();
        }
        let needed = sample.len() as f64 * GRAMMAR_MATCH_RATIO;
        let grammar = Grammar::ALL.iter().copied().find(|g| {
            let hits = sample.iter().filter(|line| g.matches(line)).count();
            hits as f64 >= needed
        });

        let timestamp = grammar.and_then(|g| {
            sample
                .iter()
                .find_map(|line| g.extract(line))
                .and_then(|fields| detect_format(&fields.timestamp))
        });

        Detection { grammar, timestamp }
    }

    /// Parse one trimmed, non-comment line.
    pub fn parse_line(&self, line: &str, line_number: u64, detection: &Detection) -> NormalizedEvent {
        let ordered = detection
            .grammar
            .into_iter()
            .chain(Grammar::ALL.into_iter().filter(|g| Some(*g) != detection.grammar));

        for grammar in ordered {
            if let Some(fields) = grammar.extract(line) {
                return self.build_event(fields, line_number, detection.timestamp);
            }
        }
        flexible_parse(line, line_number, &self.classifier, detection.timestamp)
    }

    fn build_event(&self, fields: RequestFields, line_number: u64, hint: Option<TimestampFormat>) -> NormalizedEvent {
        let timestamp = parse_or_now(&fields.timestamp, hint);
        let event_type = self
            .classifier
            .classify(&fields.method, &fields.path, fields.status, &fields.user_agent)
            .to_string();

        let mut raw_parts = vec![format!("{} {}", fields.method, fields.path)];
        if fields.status != 0 {
            raw_parts.push(format!("Status:{}", fields.status));
        }
        if fields.size != 0 {
            raw_parts.push(format!("Size:{}", fields.size));
        }
        if !fields.user_agent.is_empty() && fields.user_agent != "-" {
            raw_parts.push(format!("UA:{}", truncate_chars(&fields.user_agent, RAW_FIELD_CHARS)));
        }
        if !fields.referer.is_empty() && fields.referer != "-" {
            raw_parts.push(format!("Ref:{}", truncate_chars(&fields.referer, RAW_FIELD_CHARS)));
        }

        let mut event = NormalizedEvent::new(timestamp, event_type, raw_parts.join(" | "), line_number);
        event.set_extra("method", fields.method.as_str());
        event.set_extra("path", fields.path.as_str());
        event.set_extra("status_code", i64::from(fields.status));
        event.set_extra("response_size", i64::try_from(fields.size).unwrap_or(i64::MAX));
        event.set_extra("user_agent", fields.user_agent.as_str());
        event.set_extra("referer", fields.referer.as_str());
        event.set_extra("protocol", fields.protocol.as_str());
        if let Some(extra) = fields.extra.as_deref() {
            for (key, value) in parse_extra_fields(extra) {
                event.set_extra(key, value);
            }
        }

        event.user = fields.user;
        event.host = fields.ip;
        event
    }
}

impl Default for AccessLogParser {
    fn default() -> Self {
        Self::new()
    }
}

impl LogParser for AccessLogParser {
    fn format(&self) -> FormatTag {
        FormatTag::AccessLog
    }

    fn stream(&self, path: &Path) -> Result<EventStream, ParseError> {
        let lines = NumberedLines::open(path)?;
        let detection = self.detect(&sample_lines(path, self.sample_size));
        debug!(
            path = %path.display(),
            grammar = detection.grammar.map_or("none", |g| g.name()),
            timestamp = ?detection.timestamp,
            "Access log layout detected"
        );

        let parser = self.clone();
        let records = lines.map(move |(line_number, line)| {
            if line_number % PROGRESS_INTERVAL == 0 {
                info!(lines = line_number, "Access log progress");
            }
            match line {
                Ok(line) => {
                    let line = line.trim();
                    if line.is_empty() || line.starts_with('#') {
                        RecordOutcome::Skipped
                    } else {
                        RecordOutcome::Event(parser.parse_line(line, line_number, &detection))
                    }
                }
                Err(error) => RecordOutcome::Failed { line: line_number, error },
            }
        });

        Ok(EventStream::new(FormatTag::AccessLog, records))
    }

    fn parse(&self, path: &Path) -> Result<ParseOutcome, ParseError> {
        let size = std::fs::metadata(path).map_err(|e| ParseError::io(path, e))?.len();
        if size > self.large_file_bytes {
            // Callers that care about memory should use `stream` directly
            let size_mb = size as f64 / 1024.0 / 1024.0;
            info!(
                path = %path.display(),
                size_mb,
                "Large file detected, collecting from streaming parser"
            );
        }
        Ok(self.stream(path)?.into_outcome())
    }
}

/// Mine trailing custom fields: `key=value` pairs, quoted values as
/// `extra_field_N`, and a trailing number as `response_time`.
pub fn parse_extra_fields(extra: &str) -> Vec<(String, ExtraValue)> {
    let mut fields: Vec<(String, ExtraValue)> = Vec::new();
    let mut put = |key: String, value: ExtraValue| match fields.iter_mut().find(|(k, _)| *k == key) {
        Some(slot) => slot.1 = value,
        None => fields.push((key, value)),
    };

    for caps in EXTRA_KV.captures_iter(extra) {
        put(caps[1].to_string(), caps[2].trim_matches('"').into());
    }

    for (i, caps) in EXTRA_QUOTED.captures_iter(extra).enumerate() {
        let value = &caps[1];
        if !value.is_empty() && value != "-" {
            put(format!("extra_field_{}", i + 1), value.into());
        }
    }

    if let Some(time) = RESPONSE_TIME.captures(extra).and_then(|c| c[1].parse::<f64>().ok()) {
        put("response_time".to_string(), time.into());
    }

    fields
}

/// First `max` characters of `s`, never splitting a code point.
pub(crate) fn truncate_chars(s: &str, max: usize) -> &str {
    match s.char_indices().nth(max) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn write_log(contents: &str) -> (tempfile::TempDir, std::path::PathBuf) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("access.log");
        std::fs::write(&path, contents).unwrap();
        (dir, path)
    }

    #[test]
    fn test_path_traversal_line() {
        let parser = AccessLogParser::new();
        let line = r#"10.0.0.1 - - [12/Jan/2026:10:00:00 +0000] "GET /../etc/passwd HTTP/1.1" 403 512"#;
        let detection = parser.detect(&[line.to_string()]);
        assert_eq!(detection.grammar, Some(Grammar::Combined));
        assert_eq!(detection.timestamp, Some(TimestampFormat::ApacheWithOffset));

        let event = parser.parse_line(line, 1, &detection);
        assert_eq!(event.event_type, "PATH_TRAVERSAL_ATTEMPT");
        assert_eq!(event.host, "10.0.0.1");
        assert_eq!(event.user, "");
        assert_eq!(event.timestamp, Utc.with_ymd_and_hms(2026, 1, 12, 10, 0, 0).unwrap());
        assert_eq!(event.raw_message, "GET /../etc/passwd | Status:403 | Size:512");
        assert_eq!(event.extra("status_code"), Some(&ExtraValue::Integer(403)));
        assert_eq!(event.extra("protocol"), Some(&ExtraValue::Text("HTTP/1.1".into())));
    }

    #[test]
    fn test_raw_message_truncates_user_agent() {
        let parser = AccessLogParser::new();
        let ua = "A".repeat(80);
        let line = format!(
            r#"10.0.0.2 - bob [12/Jan/2026:10:00:00 +0000] "POST /login HTTP/1.1" 200 10 "https://example.com/" "{}""#,
            ua
        );
        let event = parser.parse_line(&line, 4, &Detection::default());
        assert_eq!(event.event_type, "LOGIN_SUCCESS");
        assert_eq!(event.user, "bob");
        assert_eq!(
            event.raw_message,
            format!("POST /login | Status:200 | Size:10 | UA:{} | Ref:https://example.com/", "A".repeat(50))
        );
        assert_eq!(event.extra("user_agent"), Some(&ExtraValue::Text(ua)));
    }

    #[test]
    fn test_trailing_extra_fields() {
        let fields = parse_extra_fields(r#"rt=0.120 "edge-3" "-" 120ms"#);
        assert_eq!(fields[0], ("rt".to_string(), ExtraValue::Text("0.120".into())));
        assert!(fields.contains(&("extra_field_1".to_string(), ExtraValue::Text("edge-3".into()))));
        assert!(!fields.iter().any(|(k, _)| k == "extra_field_2"));
        assert!(fields.contains(&("response_time".to_string(), ExtraValue::Float(120.0))));
    }

    #[test]
    fn test_detection_needs_half_the_sample() {
        let parser = AccessLogParser::new();
        let common = r#"10.0.0.1 - - [12/Jan/2026:10:00:00 +0000] "GET / HTTP/1.1" 200 5"#.to_string();
        let noise = "free text".to_string();

        let half = vec![common.clone(), noise.clone()];
        assert_eq!(parser.detect(&half).grammar, Some(Grammar::Combined));

        let minority = vec![common, noise.clone(), noise];
        assert_eq!(parser.detect(&minority).grammar, None);
        assert_eq!(parser.detect(&[]), Detection::default());
    }

    #[test]
    fn test_stream_skips_comments_and_falls_back_per_line() {
        let (_dir, path) = write_log(concat!(
            "#Software: Microsoft Internet Information Services\n",
            "10.0.0.1 - - [12/Jan/2026:10:00:00 +0000] \"GET /index.html HTTP/1.1\" 200 512\n",
            "\n",
            "completely unstructured line\n",
            "10.0.0.3 - - [12/Jan/2026:10:00:05 +0000] \"GET /search?q=<script> HTTP/1.1\" 404 0\n",
        ));

        let outcome = AccessLogParser::new().parse(&path).unwrap();
        assert_eq!(outcome.events.len(), 3);
        assert_eq!(outcome.skipped, 2);
        assert_eq!(outcome.events[0].event_type, "WEB_ACCESS");
        assert_eq!(outcome.events[0].line_number, 2);
        assert_eq!(outcome.events[1].event_type, "LOG_ENTRY");
        assert_eq!(outcome.events[1].raw_message, "completely unstructured line");
        assert_eq!(outcome.events[2].event_type, "XSS_ATTEMPT");
        assert_eq!(outcome.events[2].line_number, 5);
    }

    #[test]
    fn test_custom_classifier_is_used() {
        let classifier = EventClassifier::with_signatures(&[Signature {
            pattern: "/internal/".into(),
            label: "INTERNAL_PROBE".into(),
        }])
        .unwrap();
        let parser = AccessLogParser::new().with_classifier(Arc::new(classifier));
        let line = r#"10.0.0.1 - - [12/Jan/2026:10:00:00 +0000] "GET /internal/metrics HTTP/1.1" 200 5"#;
        let event = parser.parse_line(line, 1, &Detection::default());
        assert_eq!(event.event_type, "INTERNAL_PROBE");
    }

    #[test]
    fn test_truncate_chars_respects_code_points() {
        assert_eq!(truncate_chars("héllo", 2), "hé");
        assert_eq!(truncate_chars("abc", 10), "abc");
    }
}
