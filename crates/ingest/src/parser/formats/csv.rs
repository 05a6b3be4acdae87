use std::fs::File;
use std::io::{BufReader, Read, Seek, SeekFrom};
use std::path::Path;

use chrono::Utc;
use csv::{ByteRecord, ByteRecordsIntoIter, ReaderBuilder};
use once_cell::sync::Lazy;
use regex::Regex;
use tracing::debug;

use crate::parser::reader::decode_lossy;
use crate::parser::timestamp::{detect_format, parse_timestamp_strict, parse_with_hint, TimestampFormat};
use crate::parser::traits::{EventStream, FormatTag, LogParser, NormalizedEvent, ParseError, RecordOutcome};

/// Bytes read up front to sniff the delimiter.
const SNIFF_BYTES: u64 = 8192;
const CANDIDATE_DELIMITERS: [u8; 3] = [b',', b';', b'\t'];

const TIMESTAMP_KEYWORDS: &[&str] = &["time", "timestamp", "date", "datetime", "created", "logged"];
const USER_KEYWORDS: &[&str] = &["user", "username", "account", "actor", "uid"];
const HOST_KEYWORDS: &[&str] = &["host", "hostname", "computer", "source", "ip", "src", "client"];
const ACTION_KEYWORDS: &[&str] = &["event", "event_type", "action", "activity", "type", "category"];
const REQUEST_KEYWORDS: &[&str] = &["url", "request", "uri", "path", "method"];
const ID_KEYWORDS: &[&str] = &["event_id", "id", "code"];

static IPV4_VALUE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(?P<ip>(?:\d{1,3}\.){3}\d{1,3})(?::\d+)?$").expect("ipv4 value pattern")
});

/// Parser for delimited files with a header row.
///
/// Columns are assigned roles from their header names once per file; each
/// row is then mapped without any fixed schema. The IPv4 host check is the
/// one content-based rule and it outranks header names.
#[derive(Debug, Default, Clone, Copy)]
pub struct CsvParser;

impl CsvParser {
    pub fn new() -> Self {
        Self
    }
}

impl LogParser for CsvParser {
    fn format(&self) -> FormatTag {
        FormatTag::Csv
    }

    fn stream(&self, path: &Path) -> Result<EventStream, ParseError> {
        let mut file = File::open(path).map_err(|e| ParseError::io(path, e))?;

        let mut sample = Vec::with_capacity(SNIFF_BYTES as usize);
        file.by_ref()
            .take(SNIFF_BYTES)
            .read_to_end(&mut sample)
            .map_err(|e| ParseError::io(path, e))?;
        file.seek(SeekFrom::Start(0)).map_err(|e| ParseError::io(path, e))?;

        let delimiter = sniff_delimiter(&sample, sample.len() as u64 >= SNIFF_BYTES);
        let mut reader = ReaderBuilder::new()
            .delimiter(delimiter)
            .has_headers(true)
            .flexible(true)
            .from_reader(BufReader::with_capacity(64 * 1024, file));

        let layout = Layout::from_headers(reader.byte_headers()?);
        debug!(
            path = %path.display(),
            delimiter = %char::from(delimiter).escape_default(),
            columns = layout.headers.len(),
            "CSV layout inferred"
        );

        let records = CsvRecords {
            records: reader.into_byte_records(),
            layout,
            hint: None,
            fallback_line: 1,
            done: false,
        };
        Ok(EventStream::new(FormatTag::Csv, records))
    }
}

/// Pick the candidate delimiter that appears the same nonzero number of
/// times on every sampled line, preferring the highest count. Comma when
/// nothing is consistent.
fn sniff_delimiter(sample: &[u8], truncated: bool) -> u8 {
    let text = decode_lossy(sample);
    let mut lines: Vec<&str> = text.lines().filter(|l| !l.trim().is_empty()).collect();
    if truncated && lines.len() > 1 {
        // Last line was probably cut by the sample window
        lines.pop();
    }
    let Some(first) = lines.first() else {
        return b',';
    };

    // Delimiters inside quoted cells do not count
    let count = |line: &str, d: u8| {
        let mut quoted = false;
        line.bytes()
            .filter(|b| {
                if *b == b'"' {
                    quoted = !quoted;
                }
                !quoted && *b == d
            })
            .count()
    };
    let mut best: Option<(usize, u8)> = None;
    for d in CANDIDATE_DELIMITERS {
        let expected = count(first, d);
        if expected == 0 || !lines.iter().all(|l| count(l, d) == expected) {
            continue;
        }
        if best.map_or(true, |(n, _)| expected > n) {
            best = Some((expected, d));
        }
    }
    best.map_or(b',', |(_, d)| d)
}

/// Lower-case, trim, and turn spaces and dots into underscores.
pub fn normalize_key(header: &str) -> String {
    header
        .trim()
        .to_lowercase()
        .chars()
        .map(|c| if c == ' ' || c == '.' { '_' } else { c })
        .collect()
}

/// 0 = exact, 1 = whole `_` token, 2 = substring (keywords of 4+ chars only,
/// so `ip` does not match `description`).
fn match_quality(key: &str, keyword: &str) -> Option<u8> {
    if key == keyword {
        Some(0)
    } else if key.split('_').any(|token| token == keyword) {
        Some(1)
    } else if keyword.len() >= 4 && key.contains(keyword) {
        Some(2)
    } else {
        None
    }
}

/// Column indices whose key matches any keyword, best matches first.
fn ranked(keys: &[String], keywords: &[&str]) -> Vec<usize> {
    let mut hits: Vec<(u8, usize)> = keys
        .iter()
        .enumerate()
        .filter_map(|(i, key)| {
            keywords
                .iter()
                .filter_map(|kw| match_quality(key, kw))
                .min()
                .map(|q| (q, i))
        })
        .collect();
    hits.sort_unstable();
    hits.into_iter().map(|(_, i)| i).collect()
}

/// Per-file column role assignment.
#[derive(Debug, Default)]
struct Layout {
    headers: Vec<String>,
    keys: Vec<String>,
    timestamp: Vec<usize>,
    user: Vec<usize>,
    host: Vec<usize>,
    action: Vec<usize>,
    request: Vec<usize>,
    id: Vec<usize>,
}

impl Layout {
    fn from_headers(record: &ByteRecord) -> Self {
        let headers: Vec<String> = record
            .iter()
            .enumerate()
            .map(|(i, raw)| {
                let name = decode_lossy(raw).trim().trim_start_matches('\u{feff}').to_string();
                if name.is_empty() {
                    format!("column_{}", i + 1)
                } else {
                    name
                }
            })
            .collect();
        let keys: Vec<String> = headers.iter().map(|h| normalize_key(h)).collect();

        let id = ranked(&keys, ID_KEYWORDS);
        // `event_id` names an identifier, not an action
        let action = ranked(&keys, ACTION_KEYWORDS)
            .into_iter()
            .filter(|i| !id.contains(i))
            .collect();

        Self {
            timestamp: ranked(&keys, TIMESTAMP_KEYWORDS),
            user: ranked(&keys, USER_KEYWORDS),
            host: ranked(&keys, HOST_KEYWORDS),
            request: ranked(&keys, REQUEST_KEYWORDS),
            action,
            id,
            headers,
            keys,
        }
    }

    fn header(&self, index: usize) -> String {
        self.headers
            .get(index)
            .cloned()
            .unwrap_or_else(|| format!("column_{}", index + 1))
    }

    fn key(&self, index: usize) -> String {
        self.keys
            .get(index)
            .cloned()
            .unwrap_or_else(|| format!("column_{}", index + 1))
    }

    fn map_row(&self, record: &ByteRecord, line_number: u64, hint: &mut Option<TimestampFormat>) -> RecordOutcome {
        let values: Vec<String> = record
            .iter()
            .map(|field| decode_lossy(field).trim().to_string())
            .collect();
        if values.iter().all(|v| v.is_empty()) {
            return RecordOutcome::Skipped;
        }

        let cell = |i: &usize| values.get(*i).map(String::as_str).filter(|v| !v.is_empty());

        let timestamp = self
            .timestamp
            .iter()
            .filter_map(cell)
            .find_map(|v| {
                let ts = parse_with_hint(v, *hint);
                if ts.is_some() && hint.is_none() {
                    *hint = detect_format(v);
                }
                ts
            })
            .or_else(|| {
                values
                    .iter()
                    .filter(|v| !v.is_empty())
                    .find_map(|v| parse_timestamp_strict(v))
            })
            .unwrap_or_else(Utc::now);

        let user = self.user.iter().find_map(cell).unwrap_or_default();

        let host = values
            .iter()
            .find_map(|v| IPV4_VALUE.captures(v).and_then(|c| c.name("ip")).map(|m| m.as_str()))
            .or_else(|| self.host.iter().find_map(cell))
            .unwrap_or_default();

        let event_type = self
            .action
            .iter()
            .find_map(cell)
            .or_else(|| {
                self.request
                    .iter()
                    .find_map(cell)
                    .and_then(|v| v.split_whitespace().next())
            })
            .or_else(|| self.id.iter().find_map(cell))
            .or_else(|| values.iter().map(String::as_str).find(|v| !v.is_empty()))
            .unwrap_or_default();

        let raw_message = values
            .iter()
            .enumerate()
            .filter(|(_, v)| !v.is_empty())
            .map(|(i, v)| format!("{}={}", self.header(i), v))
            .collect::<Vec<_>>()
            .join(" | ");

        let mut event = NormalizedEvent::new(timestamp, event_type, raw_message, line_number);
        event.user = user.to_string();
        event.host = host.to_string();
        for (i, value) in values.iter().enumerate() {
            event.set_extra(self.key(i), value.as_str());
        }
        RecordOutcome::Event(event)
    }
}

struct CsvRecords {
    records: ByteRecordsIntoIter<BufReader<File>>,
    layout: Layout,
    hint: Option<TimestampFormat>,
    /// Used when the reader cannot report a position. Header is line 1.
    fallback_line: u64,
    done: bool,
}

impl Iterator for CsvRecords {
    type Item = RecordOutcome;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        let result = self.records.next()?;
        self.fallback_line += 1;

        match result {
            Ok(record) => {
                let line = record.position().map_or(self.fallback_line, |p| p.line());
                Some(self.layout.map_row(&record, line, &mut self.hint))
            }
            Err(error) => {
                let line = error.position().map_or(self.fallback_line, |p| p.line());
                if error.is_io_error() {
                    // The underlying reader is unusable after an I/O error
                    self.done = true;
                }
                Some(RecordOutcome::Failed { line, error: ParseError::Csv(error) })
            }
        }
    }
}
