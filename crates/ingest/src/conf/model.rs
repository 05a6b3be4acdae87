//! IngestConfig and its validation.

use serde::{Deserialize, Serialize};

use crate::parser::formats::access_log::Signature;
use crate::parser::{DETECTION_SAMPLE_SIZE, STREAMING_THRESHOLD_BYTES};
use crate::scoring::{ScoringTables, DEFAULT_THRESHOLD};
use crate::story::TIMELINE_LIMIT;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IngestConfig {
    /// Events below this confidence are archived from the analyst view
    pub confidence_threshold: f64,
    /// Scored events handed to the sink per call
    pub batch_size: usize,
    /// Files larger than this are parsed in streaming mode
    pub streaming_threshold_bytes: u64,
    pub detection_sample_lines: usize,
    pub max_concurrent_files: usize,
    pub story_event_limit: usize,
    pub timeline_limit: usize,
    /// Replaces the built-in attack signature table when non-empty
    pub signatures: Vec<Signature>,
    pub scoring: ScoringTables,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            confidence_threshold: DEFAULT_THRESHOLD,
            batch_size: 1000,
            streaming_threshold_bytes: STREAMING_THRESHOLD_BYTES,
            detection_sample_lines: DETECTION_SAMPLE_SIZE,
            max_concurrent_files: 4,
            story_event_limit: 100,
            timeline_limit: TIMELINE_LIMIT,
            signatures: Vec::new(),
            scoring: ScoringTables::default(),
        }
    }
}

impl IngestConfig {
    /// Validate configuration values
    pub fn validate(&self) -> Result<(), String> {
        if !(0.0..=1.0).contains(&self.confidence_threshold) {
            return Err(format!(
                "confidence_threshold must be between 0.0 and 1.0, got {}",
                self.confidence_threshold
            ));
        }
        if self.batch_size == 0 {
            return Err("batch_size must be > 0".to_string());
        }
        if self.detection_sample_lines == 0 {
            return Err("detection_sample_lines must be > 0".to_string());
        }
        if self.max_concurrent_files == 0 {
            return Err("max_concurrent_files must be > 0".to_string());
        }
        if let Some(bad) = self.signatures.iter().find(|s| s.label.trim().is_empty()) {
            return Err(format!("signature '{}' has an empty label", bad.pattern));
        }
        self.scoring.validate().map_err(|e| format!("scoring: {}", e))
    }
}
