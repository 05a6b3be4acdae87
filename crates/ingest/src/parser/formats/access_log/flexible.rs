//! Last-resort extraction for lines no grammar recognises.
//!
//! Every signal is searched for independently and any subset may be present.
//! This path never fails: a line with nothing recognisable still becomes a
//! `LOG_ENTRY` event carrying the line itself.

use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use regex::Regex;

use super::classify::EventClassifier;
use super::truncate_chars;
use crate::parser::timestamp::{parse_with_hint, TimestampFormat};
use crate::parser::NormalizedEvent;

static IP_TOKEN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(\d{1,3}\.\d{1,3}\.\d{1,3}\.\d{1,3}|(?:[0-9a-fA-F]{1,4}:){7}[0-9a-fA-F]{1,4})")
        .expect("ip token pattern")
});
static ENCLOSED: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[\[\(]([^\]\)]+)[\]\)]").expect("enclosed text pattern"));
static TIMESTAMP_SHAPE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\d{1,4}[:/\-]\d{1,2}[:/\-]\d{1,4}|\d{2}:\d{2}:\d{2}").expect("timestamp shape pattern")
});
static ISO_TIMESTAMP: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\d{4}-\d{2}-\d{2}[T\s]\d{2}:\d{2}:\d{2}(?:\.\d+)?(?:Z|[+-]\d{2}:?\d{2})?")
        .expect("iso timestamp pattern")
});
static HTTP_REQUEST: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#""?\b(GET|POST|PUT|DELETE|HEAD|OPTIONS|PATCH|CONNECT|TRACE)\s+([^"\s]+)"#)
        .expect("http request pattern")
});
/// Any delimited status code; only consulted once a request was found.
static STATUS_NEAR_REQUEST: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"["\s]([1-5]\d{2})(?:[\s"]|$)"#).expect("status pattern"));
/// Status right after a quoted field, as in access logs.
static STATUS_AFTER_QUOTE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#""\s+([1-5]\d{2})(?:\s|$)"#).expect("quoted status pattern"));
static KV_EQUALS: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?:^|[\s,{;])(@?[A-Za-z][\w.]*)=("[^"]*"|\S+)"#).expect("key=value pattern")
});
static KV_COLON: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?:^|[\s,{;])(@?[A-Za-z][\w.]*):\s*("[^"]*"|[^,\s]+)"#).expect("key: value pattern")
});
static QUOTED: Lazy<Regex> = Lazy::new(|| Regex::new(r#""([^"]+)""#).expect("quoted string pattern"));

/// Schema slot a discovered key maps onto.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Alias {
    User,
    Host,
    Status,
    Method,
    Path,
    Time,
    Message,
    Severity,
    Source,
}

fn alias(key: &str) -> Option<Alias> {
    Some(match key {
        "user" | "username" | "user_id" | "userid" | "uid" => Alias::User,
        "ip" | "client_ip" | "remote_addr" | "src_ip" | "source_ip" | "clientip" => Alias::Host,
        "status" | "status_code" | "response_code" | "statuscode" => Alias::Status,
        "method" | "http_method" | "request_method" => Alias::Method,
        "path" | "uri" | "url" | "request_uri" | "endpoint" => Alias::Path,
        "time" | "timestamp" | "datetime" | "@timestamp" | "event_time" => Alias::Time,
        "message" | "msg" | "log_message" => Alias::Message,
        "level" | "severity" | "priority" => Alias::Severity,
        "source" | "logger" | "component" | "service" => Alias::Source,
        _ => return None,
    })
}

/// Map a free-form severity onto a coarse event type.
fn severity_event_type(severity: &str) -> &'static str {
    match severity.to_uppercase().as_str() {
        "ERROR" | "FATAL" | "CRITICAL" => "ERROR",
        "WARNING" | "WARN" => "WARNING",
        "INFO" | "INFORMATION" => "INFO",
        "DEBUG" | "TRACE" => "DEBUG",
        _ => "LOG_ENTRY",
    }
}

#[derive(Debug, Default)]
struct Extracted {
    timestamp: Option<DateTime<Utc>>,
    user: String,
    host: String,
    method: String,
    path: String,
    status: u16,
    user_agent: String,
    referer: String,
    message: Option<String>,
    severity: Option<String>,
    source: Option<String>,
    other: Vec<(String, String)>,
    is_web: bool,
}

impl Extracted {
    fn apply_pair(&mut self, key: &str, value: &str, hint: Option<TimestampFormat>) {
        let value = value.trim_matches(|c| c == '"' || c == '\'');
        match alias(&key.to_lowercase()) {
            Some(Alias::User) => self.user = value.to_string(),
            Some(Alias::Host) => self.host = value.to_string(),
            Some(Alias::Status) => {
                self.status = value.parse().unwrap_or(0);
                self.is_web = true;
            }
            Some(Alias::Method) => {
                self.method = value.to_uppercase();
                self.is_web = true;
            }
            Some(Alias::Path) => {
                self.path = value.to_string();
                self.is_web = true;
            }
            Some(Alias::Time) => {
                if let Some(ts) = parse_with_hint(value, hint) {
                    self.timestamp = Some(ts);
                }
            }
            Some(Alias::Message) => self.message = Some(value.to_string()).filter(|m| !m.is_empty()),
            Some(Alias::Severity) => self.severity = Some(value.to_string()),
            Some(Alias::Source) => self.source = Some(value.to_string()),
            // URLs look like `http: //host`
            None if value.starts_with("//") => {}
            None => self.other.push((key.to_string(), value.to_string())),
        }
    }
}

/// Extract whatever can be found in `line`.
pub fn flexible_parse(
    line: &str,
    line_number: u64,
    classifier: &EventClassifier,
    hint: Option<TimestampFormat>,
) -> NormalizedEvent {
    let mut x = Extracted::default();

    if let Some(m) = IP_TOKEN.find(line) {
        x.host = m.as_str().to_string();
    }

    x.timestamp = match ENCLOSED.captures(line).and_then(|c| c.get(1)) {
        Some(inner) if TIMESTAMP_SHAPE.is_match(inner.as_str()) => parse_with_hint(inner.as_str(), hint),
        _ => None,
    }
    .or_else(|| ISO_TIMESTAMP.find(line).and_then(|m| parse_with_hint(m.as_str(), hint)));

    if let Some(caps) = HTTP_REQUEST.captures(line) {
        x.method = caps[1].to_string();
        x.path = caps[2].to_string();
        x.is_web = true;
    }

    let status = if x.is_web {
        STATUS_NEAR_REQUEST.captures(line)
    } else {
        STATUS_AFTER_QUOTE.captures(line)
    };
    if let Some(code) = status.and_then(|c| c[1].parse().ok()) {
        x.status = code;
        x.is_web = true;
    }

    for pattern in [&*KV_EQUALS, &*KV_COLON] {
        for caps in pattern.captures_iter(line) {
            x.apply_pair(&caps[1], &caps[2], hint);
        }
    }

    // Request, referer, user agent: the last two quoted strings when a
    // request line precedes them
    let quoted: Vec<&str> = QUOTED
        .captures_iter(line)
        .filter_map(|c| c.get(1).map(|m| m.as_str()))
        .collect();
    if quoted.len() >= 2 {
        x.user_agent = dash_to_empty(quoted[quoted.len() - 1]).to_string();
    }
    if quoted.len() >= 3 {
        x.referer = dash_to_empty(quoted[quoted.len() - 2]).to_string();
    }

    build_event(x, line, line_number, classifier)
}

fn dash_to_empty(value: &str) -> &str {
    if value == "-" {
        ""
    } else {
        value
    }
}

fn build_event(x: Extracted, line: &str, line_number: u64, classifier: &EventClassifier) -> NormalizedEvent {
    let timestamp = x.timestamp.unwrap_or_else(Utc::now);

    let event_type = if x.is_web {
        classifier.classify(&x.method, &x.path, x.status, &x.user_agent).to_string()
    } else {
        severity_event_type(x.severity.as_deref().unwrap_or_default()).to_string()
    };

    let mut extra: Vec<(String, crate::parser::ExtraValue)> = Vec::new();
    let mut raw_parts: Vec<String> = Vec::new();

    if x.is_web {
        if !x.method.is_empty() && !x.path.is_empty() {
            raw_parts.push(format!("{} {}", x.method, x.path));
            extra.push(("method".into(), x.method.as_str().into()));
            extra.push(("path".into(), x.path.as_str().into()));
        }
        if x.status != 0 {
            raw_parts.push(format!("Status:{}", x.status));
            extra.push(("status_code".into(), i64::from(x.status).into()));
        }
        if !x.user_agent.is_empty() {
            raw_parts.push(format!("UA:{}", truncate_chars(&x.user_agent, 50)));
            extra.push(("user_agent".into(), x.user_agent.as_str().into()));
        }
        if !x.referer.is_empty() {
            raw_parts.push(format!("Ref:{}", truncate_chars(&x.referer, 50)));
            extra.push(("referer".into(), x.referer.as_str().into()));
        }
    }

    let raw_message = if !raw_parts.is_empty() {
        raw_parts.join(" | ")
    } else if !x.is_web {
        x.message.unwrap_or_else(|| line.to_string())
    } else {
        line.to_string()
    };

    let mut event = NormalizedEvent::new(timestamp, event_type, raw_message, line_number);
    event.user = x.user;
    event.host = x.host;
    for (key, value) in extra {
        event.set_extra(key, value);
    }
    if let Some(severity) = x.severity {
        event.set_extra("severity", severity);
    }
    if let Some(source) = x.source {
        event.set_extra("source", source);
    }
    for (key, value) in x.other {
        event.set_extra(key, value);
    }
    event
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::ExtraValue;
    use chrono::TimeZone;

    fn parse(line: &str) -> NormalizedEvent {
        flexible_parse(line, 1, &EventClassifier::shared(), None)
    }

    #[test]
    fn test_unrecognised_line_is_a_log_entry() {
        let before = Utc::now();
        let event = parse("hello world something happened");
        assert_eq!(event.event_type, "LOG_ENTRY");
        assert_eq!(event.raw_message, "hello world something happened");
        assert!(event.timestamp >= before);
        assert!(event.host.is_empty());
        assert!(event.extra_data.is_empty());
    }

    #[test]
    fn test_bare_numbers_are_not_status_codes() {
        let event = parse("disk usage at 100 percent on node 7");
        assert_eq!(event.event_type, "LOG_ENTRY");
        assert_eq!(event.raw_message, "disk usage at 100 percent on node 7");
    }

    #[test]
    fn test_key_value_application_log() {
        let event = parse(r#"2026-01-12T10:00:00Z level=error user=alice src_ip=10.0.0.9 msg="disk full on /var""#);
        assert_eq!(event.event_type, "ERROR");
        assert_eq!(event.user, "alice");
        assert_eq!(event.host, "10.0.0.9");
        assert_eq!(event.raw_message, "disk full on /var");
        assert_eq!(event.timestamp, Utc.with_ymd_and_hms(2026, 1, 12, 10, 0, 0).unwrap());
        assert_eq!(event.extra("severity"), Some(&ExtraValue::Text("error".into())));
    }

    #[test]
    fn test_unknown_web_layout_is_classified() {
        let event = parse(r#"[2026-01-12 10:00:00] 172.16.0.4 "GET /wp-admin/setup.php?step=1 HTTP/1.1" 404 "-" "nikto/2.5""#);
        assert_eq!(event.event_type, "PHP_INJECTION_ATTEMPT");
        assert_eq!(event.host, "172.16.0.4");
        assert_eq!(event.timestamp, Utc.with_ymd_and_hms(2026, 1, 12, 10, 0, 0).unwrap());
        assert_eq!(event.raw_message, "GET /wp-admin/setup.php?step=1 | Status:404 | UA:nikto/2.5");
        assert_eq!(event.extra("status_code"), Some(&ExtraValue::Integer(404)));
        assert_eq!(event.extra("referer"), None);
    }

    #[test]
    fn test_colon_pairs_and_unmapped_keys() {
        let event = parse("service: auth, level: WARN, user: bob, tenant: acme");
        assert_eq!(event.event_type, "WARNING");
        assert_eq!(event.user, "bob");
        assert_eq!(event.extra("source"), Some(&ExtraValue::Text("auth".into())));
        assert_eq!(event.extra("tenant"), Some(&ExtraValue::Text("acme".into())));
    }

    #[test]
    fn test_key_value_web_fields() {
        let event = parse("method=post path=/api/account status=200 client_ip=10.9.9.9");
        assert_eq!(event.event_type, "USER_MODIFICATION");
        assert_eq!(event.host, "10.9.9.9");
        assert_eq!(event.raw_message, "POST /api/account | Status:200");
    }

    #[test]
    fn test_ipv6_host() {
        let event = parse("connection from 2001:0db8:85a3:0000:0000:8a2e:0370:7334 closed");
        assert_eq!(event.host, "2001:0db8:85a3:0000:0000:8a2e:0370:7334");
    }
}
