use std::sync::Arc;

use dashmap::DashMap;
use tracing::debug;

use super::formats::{AccessLogParser, CsvParser, SyslogParser};
use super::{FormatTag, LogParser};

/// Format → parser registry.
///
/// Keys are upper-cased format names so callers can register formats that
/// have no [`FormatTag`] variant. Registration is safe from any thread.
pub struct ParserFactory {
    parsers: DashMap<String, Arc<dyn LogParser>>,
}

impl ParserFactory {
    /// An empty registry.
    pub fn empty() -> Self {
        Self {
            parsers: DashMap::new(),
        }
    }

    /// Registry with the built-in CSV, syslog and access-log parsers.
    pub fn new() -> Self {
        let factory = Self::empty();
        factory.register(FormatTag::Csv.as_str(), Arc::new(CsvParser::new()));
        factory.register(FormatTag::Syslog.as_str(), Arc::new(SyslogParser::new()));
        factory.register(FormatTag::AccessLog.as_str(), Arc::new(AccessLogParser::new()));
        factory
    }

    /// Register (or replace) the parser for a format name.
    pub fn register(&self, format: &str, parser: Arc<dyn LogParser>) {
        let key = normalize_key(format);
        debug!(format = %key, "Registering parser");
        self.parsers.insert(key, parser);
    }

    pub fn unregister(&self, format: &str) -> bool {
        self.parsers.remove(&normalize_key(format)).is_some()
    }

    /// Look up the parser for a detected format. `None` is a recoverable
    /// condition for the caller, not an error.
    pub fn get_parser(&self, format: FormatTag) -> Option<Arc<dyn LogParser>> {
        self.get_parser_by_name(format.as_str())
    }

    pub fn get_parser_by_name(&self, format: &str) -> Option<Arc<dyn LogParser>> {
        self.parsers
            .get(&normalize_key(format))
            .map(|entry| Arc::clone(entry.value()))
    }

    pub fn is_registered(&self, format: &str) -> bool {
        self.parsers.contains_key(&normalize_key(format))
    }

    /// Registered format names, sorted.
    pub fn formats(&self) -> Vec<String> {
        let mut names: Vec<String> = self.parsers.iter().map(|e| e.key().clone()).collect();
        names.sort();
        names
    }

    pub fn len(&self) -> usize {
        self.parsers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.parsers.is_empty()
    }
}

impl Default for ParserFactory {
    fn default() -> Self {
        Self::new()
    }
}

fn normalize_key(format: &str) -> String {
    format.trim().to_ascii_uppercase()
}
