use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::serde_utils::{deserialize_extra_from_map, serialize_extra_as_map};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FormatTag {
    /// Delimited text with a header row
    Csv,
    /// RFC 3164 / RFC 5424 syslog
    Syslog,
    /// Apache/Nginx access logs (and anything resembling them)
    AccessLog,
    /// JSON documents (no parser registered by default)
    Json,
    /// Windows event logs (no parser registered by default)
    Evtx,
    /// Unknown/undetected format
    Unknown,
}

impl FormatTag {
    pub fn as_str(&self) -> &'static str {
        match self {
            FormatTag::Csv => "CSV",
            FormatTag::Syslog => "SYSLOG",
            FormatTag::AccessLog => "ACCESS_LOG",
            FormatTag::Json => "JSON",
            FormatTag::Evtx => "EVTX",
            FormatTag::Unknown => "UNKNOWN",
        }
    }
}

impl fmt::Display for FormatTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FormatTag {
    type Err = std::convert::Infallible;

    /// Case-insensitive; anything unrecognised maps to `Unknown`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s.trim().to_ascii_uppercase().as_str() {
            "CSV" => FormatTag::Csv,
            "SYSLOG" => FormatTag::Syslog,
            "ACCESS_LOG" | "ACCESSLOG" => FormatTag::AccessLog,
            "JSON" => FormatTag::Json,
            "EVTX" => FormatTag::Evtx,
            _ => FormatTag::Unknown,
        })
    }
}

/// Scalar value stored in an event's `extra_data` bag.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ExtraValue {
    Bool(bool),
    Integer(i64),
    Float(f64),
    Text(String),
}

impl ExtraValue {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            ExtraValue::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            ExtraValue::Integer(n) => Some(*n),
            ExtraValue::Text(s) => s.trim().parse().ok(),
            _ => None,
        }
    }
}

impl fmt::Display for ExtraValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExtraValue::Bool(b) => write!(f, "{}", b),
            ExtraValue::Integer(n) => write!(f, "{}", n),
            ExtraValue::Float(x) => write!(f, "{}", x),
            ExtraValue::Text(s) => f.write_str(s),
        }
    }
}

impl From<String> for ExtraValue {
    fn from(value: String) -> Self {
        ExtraValue::Text(value)
    }
}

impl From<&str> for ExtraValue {
    fn from(value: &str) -> Self {
        ExtraValue::Text(value.to_string())
    }
}

impl From<i64> for ExtraValue {
    fn from(value: i64) -> Self {
        ExtraValue::Integer(value)
    }
}

impl From<f64> for ExtraValue {
    fn from(value: f64) -> Self {
        ExtraValue::Float(value)
    }
}

impl From<bool> for ExtraValue {
    fn from(value: bool) -> Self {
        ExtraValue::Bool(value)
    }
}

#[derive(Debug, Error)]
pub enum ParseError {
    #[error("Failed to read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("Line too large: {0} bytes (max: {1} bytes)")]
    LineTooLarge(usize, usize),

    #[error("Invalid format: {0}")]
    InvalidFormat(String),

    #[error("Invalid event: {0}")]
    InvalidEvent(String),
}

impl ParseError {
    pub fn io(path: &std::path::Path, source: std::io::Error) -> Self {
        ParseError::Io {
            path: path.display().to_string(),
            source,
        }
    }
}

/// The universal output of every parser.
///
/// Created once per matched line, never mutated afterwards. Scores live on a
/// separate [`crate::scoring::ScoredEvent`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NormalizedEvent {
    /// Always UTC. Unparseable source timestamps become the parse time.
    pub timestamp: DateTime<Utc>,

    /// Actor identifier, empty when absent
    pub user: String,

    /// Hostname or IP, empty when absent
    pub host: String,

    /// Short categorical label (LOGIN_FAILURE, SQL_INJECTION_ATTEMPT, ...)
    pub event_type: String,

    /// Deliberate re-assembly of the line's salient fields
    pub raw_message: String,

    /// 1-based position in the source file
    pub line_number: u64,

    /// Format-specific fields kept for analyst inspection, in discovery order
    #[serde(
        default,
        serialize_with = "serialize_extra_as_map",
        deserialize_with = "deserialize_extra_from_map"
    )]
    pub extra_data: Vec<(String, ExtraValue)>,
}

impl NormalizedEvent {
    pub fn new(
        timestamp: DateTime<Utc>,
        event_type: impl Into<String>,
        raw_message: impl Into<String>,
        line_number: u64,
    ) -> Self {
        Self {
            timestamp,
            user: String::new(),
            host: String::new(),
            event_type: event_type.into(),
            raw_message: raw_message.into(),
            line_number,
            extra_data: Vec::new(),
        }
    }

    /// Minimal contract checked before an event is accepted downstream.
    pub fn validate(&self) -> Result<(), ParseError> {
        if self.event_type.trim().is_empty() {
            return Err(ParseError::InvalidEvent(format!(
                "line {}: empty event_type", self.line_number
            )));
        }
        if self.raw_message.is_empty() {
            return Err(ParseError::InvalidEvent(format!(
                "line {}: empty raw_message", self.line_number
            )));
        }
        if self.line_number == 0 {
            return Err(ParseError::InvalidEvent("line_number must be 1-based".into()));
        }
        Ok(())
    }

    pub fn extra(&self, key: &str) -> Option<&ExtraValue> {
        self.extra_data.iter().find(|(k, _)| k == key).map(|(_, v)| v)
    }

    /// Insert or replace an extra field, keeping first-seen order.
    pub fn set_extra(&mut self, key: impl Into<String>, value: impl Into<ExtraValue>) {
        let key = key.into();
        let value = value.into();
        match self.extra_data.iter_mut().find(|(k, _)| *k == key) {
            Some(slot) => slot.1 = value,
            None => self.extra_data.push((key, value)),
        }
    }
}

/// Collected result of parsing one file.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ParseOutcome {
    pub events: Vec<NormalizedEvent>,
    /// Lines that produced a valid event
    pub parsed: u64,
    /// Lines that raised an error or failed validation
    pub failed: u64,
    /// Blank lines, comments and empty rows
    pub skipped: u64,
}
