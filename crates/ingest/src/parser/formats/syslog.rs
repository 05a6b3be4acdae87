use std::path::Path;

use chrono::{Datelike, Utc};
use once_cell::sync::Lazy;
use regex::Regex;

use crate::parser::reader::NumberedLines;
use crate::parser::timestamp::{parse_syslog, parse_timestamp};
use crate::parser::traits::{EventStream, FormatTag, LogParser, NormalizedEvent, ParseError, RecordOutcome};

/// `[<PRI>]Mon DD HH:MM:SS host process[pid]: message`
static RFC3164: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"^(?:<(?P<pri>\d{1,3})>)?(?P<timestamp>\w{3}\s+\d{1,2}\s+\d{2}:\d{2}:\d{2})\s+(?P<host>\S+)\s+(?P<process>\S+?):\s+(?P<message>.*)$",
    )
    .expect("rfc3164 pattern")
});

/// `<PRI>1 TIMESTAMP HOST APP PROCID MSGID [SD] MSG`
static RFC5424: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"^<(?P<pri>\d{1,3})>1\s+(?P<timestamp>\S+)\s+(?P<host>\S+)\s+(?P<app>\S+)\s+(?P<procid>\S+)\s+(?P<msgid>\S+)\s*(?P<rest>.*)$",
    )
    .expect("rfc5424 pattern")
});

/// Actor phrases common to sshd, su, sudo and PAM messages.
///
/// A bare "user <word>" is prose far more often than an actor, so the
/// whitespace form is only accepted inside the fixed sshd/PAM phrasings.
static USER_PATTERNS: Lazy<[Regex; 4]> = Lazy::new(|| {
    [
        Regex::new(r"(?i)\buser=(?P<user>[A-Za-z0-9._\\-]+)").expect("user= pattern"),
        Regex::new(r"(?i)\b(?:for (?:invalid |illegal )?user|invalid user|illegal user) (?P<user>[A-Za-z0-9._\\-]+)")
            .expect("for user <user> pattern"),
        Regex::new(r"\bfor (?P<user>[A-Za-z0-9._\\-]+) (?:from|on|port)\b").expect("for <user> from pattern"),
        Regex::new(r"\buser (?P<user>[A-Za-z0-9._\\-]+) by\b").expect("user <user> by pattern"),
    ]
});

/// Syslog severity levels (RFC 5424 §6.2.1)
const SYSLOG_SEVERITIES: [&str; 8] = [
    "emergency", "alert", "critical", "error",
    "warning", "notice", "info", "debug",
];

/// Syslog facility names (RFC 5424 §6.2.1)
const SYSLOG_FACILITIES: [&str; 24] = [
    "kern", "user", "mail", "daemon", "auth", "syslog", "lpr", "news",
    "uucp", "cron", "authpriv", "ftp", "ntp", "audit", "alert2", "clock",
    "local0", "local1", "local2", "local3", "local4", "local5", "local6", "local7",
];

/// Event type for lines that match neither grammar.
const FALLBACK_EVENT_TYPE: &str = "SYSLOG";

/// Parser for syslog files (RFC 3164 and RFC 5424).
///
/// Lines that match neither grammar still produce an event carrying the whole
/// line, so nothing in the file is dropped except blank lines.
#[derive(Debug, Default, Clone, Copy)]
pub struct SyslogParser;

impl SyslogParser {
    pub fn new() -> Self {
        Self
    }

    /// Parse one trimmed, non-empty line. `year` completes RFC 3164 timestamps.
    pub fn parse_line(&self, line: &str, line_number: u64, year: i32) -> NormalizedEvent {
        let mut event = if let Some(caps) = RFC5424.captures(line) {
            let timestamp = caps
                .name("timestamp")
                .map(|m| m.as_str())
                .filter(|s| *s != "-")
                .and_then(parse_timestamp)
                .unwrap_or_else(Utc::now);
            let app = nil_to_empty(caps.name("app").map_or("", |m| m.as_str()));
            let message = strip_structured_data(caps.name("rest").map_or("", |m| m.as_str()));

            let event_type = if app.is_empty() { FALLBACK_EVENT_TYPE } else { app };
            let raw_message = if message.is_empty() { line } else { message };
            let mut event = NormalizedEvent::new(timestamp, event_type, raw_message, line_number);
            event.host = nil_to_empty(caps.name("host").map_or("", |m| m.as_str())).to_string();

            if !app.is_empty() {
                event.set_extra("process", app);
            }
            if let Some(procid) = caps.name("procid").map(|m| nil_to_empty(m.as_str())).filter(|p| !p.is_empty()) {
                event.set_extra("pid", procid);
            }
            if let Some(msgid) = caps.name("msgid").map(|m| nil_to_empty(m.as_str())).filter(|m| !m.is_empty()) {
                event.set_extra("msgid", msgid);
            }
            apply_priority(&mut event, caps.name("pri").map(|m| m.as_str()));
            event
        } else if let Some(caps) = RFC3164.captures(line) {
            let timestamp = caps
                .name("timestamp")
                .and_then(|m| parse_syslog(m.as_str(), year))
                .unwrap_or_else(Utc::now);
            let (process, pid) = split_process(caps.name("process").map_or("", |m| m.as_str()));
            let message = caps.name("message").map_or("", |m| m.as_str()).trim();

            let raw_message = if message.is_empty() { line } else { message };
            let event_type = if process.is_empty() { FALLBACK_EVENT_TYPE } else { process };
            let mut event = NormalizedEvent::new(timestamp, event_type, raw_message, line_number);
            event.host = caps.name("host").map_or("", |m| m.as_str()).to_string();

            event.set_extra("process", process);
            if let Some(pid) = pid {
                event.set_extra("pid", pid);
            }
            apply_priority(&mut event, caps.name("pri").map(|m| m.as_str()));
            event
        } else {
            NormalizedEvent::new(Utc::now(), FALLBACK_EVENT_TYPE, line, line_number)
        };

        if let Some(user) = extract_user(line) {
            event.user = user.to_string();
        }
        event
    }
}

impl LogParser for SyslogParser {
    fn format(&self) -> FormatTag {
        FormatTag::Syslog
    }

    fn stream(&self, path: &Path) -> Result<EventStream, ParseError> {
        let lines = NumberedLines::open(path)?;
        let parser = *self;
        let year = Utc::now().year();

        let records = lines.map(move |(line_number, line)| match line {
            Ok(line) => {
                let line = line.trim();
                if line.is_empty() {
                    RecordOutcome::Skipped
                } else {
                    RecordOutcome::Event(parser.parse_line(line, line_number, year))
                }
            }
            Err(error) => RecordOutcome::Failed { line: line_number, error },
        });

        Ok(EventStream::new(FormatTag::Syslog, records))
    }
}

/// RFC 5424 uses `-` for absent header fields.
fn nil_to_empty(value: &str) -> &str {
    if value == "-" {
        ""
    } else {
        value
    }
}

/// `sshd[1234]` -> (`sshd`, Some(`1234`))
fn split_process(tag: &str) -> (&str, Option<&str>) {
    match tag.find('[') {
        Some(open) => {
            let pid = tag[open + 1..].trim_end_matches(']');
            (&tag[..open], Some(pid).filter(|p| !p.is_empty()))
        }
        None => (tag, None),
    }
}

fn apply_priority(event: &mut NormalizedEvent, pri: Option<&str>) {
    let Some(pri) = pri.and_then(|p| p.parse::<u32>().ok()) else {
        return;
    };

    let facility_num = (pri >> 3) as usize;
    let severity_num = (pri & 0x07) as usize;

    if let Some(facility) = SYSLOG_FACILITIES.get(facility_num) {
        event.set_extra("facility", *facility);
    }
    if let Some(severity) = SYSLOG_SEVERITIES.get(severity_num) {
        event.set_extra("severity", *severity);
    }
    event.set_extra("priority", i64::from(pri));
}

/// Skip RFC 5424 structured-data elements and return the free-text message.
fn strip_structured_data(rest: &str) -> &str {
    let rest = rest.trim_start();
    if let Some(msg) = rest.strip_prefix('-') {
        return msg.trim();
    }

    let mut remaining = rest;
    while remaining.starts_with('[') {
        match find_element_end(remaining) {
            Some(end) => remaining = &remaining[end + 1..],
            // Unterminated element: keep everything
            None => return rest.trim(),
        }
    }
    remaining.trim()
}

/// Index of the `]` closing the element at the start of `s`, honoring
/// backslash escapes and quoted param values.
fn find_element_end(s: &str) -> Option<usize> {
    let mut in_quotes = false;
    let mut escaped = false;
    for (i, c) in s.char_indices() {
        if escaped {
            escaped = false;
            continue;
        }
        match c {
            '\\' => escaped = true,
            '"' => in_quotes = !in_quotes,
            ']' if !in_quotes => return Some(i),
            _ => {}
        }
    }
    None
}

fn extract_user(line: &str) -> Option<&str> {
    USER_PATTERNS
        .iter()
        .find_map(|re| re.captures(line).and_then(|c| c.name("user")))
        .map(|m| m.as_str())
}
