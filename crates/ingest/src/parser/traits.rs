use std::path::Path;

use tracing::{debug, warn};

pub use super::model::{FormatTag, NormalizedEvent, ParseError, ParseOutcome};

/// Per-record result produced by a parser's inner iterator.
#[derive(Debug)]
pub enum RecordOutcome {
    Event(NormalizedEvent),
    /// Blank line, comment, or empty row
    Skipped,
    Failed { line: u64, error: ParseError },
}

/// Number of failures per file surfaced at `warn` before dropping to `debug`.
const LOUD_FAILURES: u64 = 5;

/// Lazy event stream over one file.
///
/// Yields only valid events. Failures and skips are counted rather than
/// surfaced, so one malformed line never ends the stream.
pub struct EventStream {
    inner: Box<dyn Iterator<Item = RecordOutcome> + Send>,
    format: FormatTag,
    parsed: u64,
    failed: u64,
    skipped: u64,
}

impl EventStream {
    pub fn new<I>(format: FormatTag, inner: I) -> Self
    where
        I: Iterator<Item = RecordOutcome> + Send + 'static,
    {
        Self {
            inner: Box::new(inner),
            format,
            parsed: 0,
            failed: 0,
            skipped: 0,
        }
    }

    pub fn format(&self) -> FormatTag {
        self.format
    }

    pub fn parsed(&self) -> u64 {
        self.parsed
    }

    pub fn failed(&self) -> u64 {
        self.failed
    }

    pub fn skipped(&self) -> u64 {
        self.skipped
    }

    /// Drain the stream into a collected outcome.
    pub fn into_outcome(mut self) -> ParseOutcome {
        let mut events = Vec::new();
        for event in self.by_ref() {
            events.push(event);
        }
        ParseOutcome {
            events,
            parsed: self.parsed,
            failed: self.failed,
            skipped: self.skipped,
        }
    }

    fn record_failure(&mut self, line: u64, error: &ParseError) {
        self.failed += 1;
        if self.failed <= LOUD_FAILURES {
            warn!(format = %self.format, line, error = %error, "Skipping unparseable record");
        } else {
            debug!(format = %self.format, line, error = %error, "Skipping unparseable record");
        }
    }
}

impl Iterator for EventStream {
    type Item = NormalizedEvent;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            match self.inner.next()? {
                RecordOutcome::Event(event) => match event.validate() {
                    Ok(()) => {
                        self.parsed += 1;
                        return Some(event);
                    }
                    Err(e) => {
                        let line = event.line_number;
                        self.record_failure(line, &e);
                    }
                },
                RecordOutcome::Skipped => self.skipped += 1,
                RecordOutcome::Failed { line, error } => self.record_failure(line, &error),
            }
        }
    }
}

pub trait LogParser: Send + Sync {
    fn format(&self) -> FormatTag;

    /// Open `path` and return a lazy stream of events.
    ///
    /// Only failure to open the file is an error; everything after that is
    /// handled per record.
    fn stream(&self, path: &Path) -> Result<EventStream, ParseError>;

    /// Parse the whole file into a finite, collected outcome.
    fn parse(&self, path: &Path) -> Result<ParseOutcome, ParseError> {
        Ok(self.stream(path)?.into_outcome())
    }
}
