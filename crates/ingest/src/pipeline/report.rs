use std::path::PathBuf;

use serde::Serialize;

use crate::parser::stats::EventStatistics;
use crate::parser::FormatTag;
use crate::scoring::{RiskDistribution, ScoredEvent};

/// Outcome of ingesting one evidence file.
#[derive(Debug, Clone, Serialize)]
pub struct FileReport {
    pub path: PathBuf,
    pub filename: String,
    pub format: FormatTag,
    /// Lowercase hex SHA-256 of the file as read
    pub sha256: String,
    pub parsed: u64,
    pub failed: u64,
    pub skipped: u64,
    pub scored: u64,
    /// Parsed lazily without holding the file's events in memory
    pub streamed: bool,
    pub elapsed_ms: f64,
    pub risk_distribution: RiskDistribution,
    /// Not computed for streamed files
    pub statistics: Option<EventStatistics>,
}

/// A report plus every scored event of the file.
#[derive(Debug, Clone)]
pub struct ProcessedFile {
    pub report: FileReport,
    pub events: Vec<ScoredEvent>,
}
