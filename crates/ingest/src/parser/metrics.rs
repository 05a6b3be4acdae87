use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use serde::Serialize;

use super::FormatTag;
use crate::scoring::RiskLabel;

/// A wrapper that forces the wrapped data onto its own cache line(s).
///
/// Uses `#[repr(align(64))]` so each instance starts on a 64-byte boundary.
/// Worker threads bumping different groups then never share a line.
#[repr(align(64))]
#[derive(Debug, Default)]
pub struct CacheAligned<T>(pub T);

/// Format detection outcomes
#[derive(Debug, Default)]
pub struct DetectionMetrics {
    pub attempts: AtomicU64,
    pub unknown: AtomicU64,
    /// Detected, but nothing registered for the format
    pub no_parser: AtomicU64,
}

/// Accepted events per format (hottest path)
#[derive(Debug, Default)]
pub struct FormatMetrics {
    pub csv: AtomicU64,
    pub syslog: AtomicU64,
    pub access_log: AtomicU64,
    pub other: AtomicU64,
}

/// Per-file totals
#[derive(Debug, Default)]
pub struct TotalMetrics {
    pub files: AtomicU64,
    pub events: AtomicU64,
    pub time_nanos: AtomicU64,
}

/// Lines that did not become events, and files that could not be read
#[derive(Debug, Default)]
pub struct LineMetrics {
    pub failed: AtomicU64,
    pub skipped: AtomicU64,
    pub file_errors: AtomicU64,
}

/// Scored events by label
#[derive(Debug, Default)]
pub struct RiskMetrics {
    pub low: AtomicU64,
    pub medium: AtomicU64,
    pub high: AtomicU64,
    pub critical: AtomicU64,
}

/// Counters shared by every worker processing files.
///
/// Each group sits on its own cache line via [`CacheAligned`]. All operations
/// use `Ordering::Relaxed`; `snapshot()` is not transactional across groups,
/// so totals may briefly disagree while files are in flight.
#[derive(Debug, Default)]
pub struct ParsingMetrics {
    pub detection: CacheAligned<DetectionMetrics>,
    pub formats: CacheAligned<FormatMetrics>,
    pub totals: CacheAligned<TotalMetrics>,
    pub lines: CacheAligned<LineMetrics>,
    pub risk: CacheAligned<RiskMetrics>,
}

impl ParsingMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn record_detection(&self, format: FormatTag) {
        self.detection.0.attempts.fetch_add(1, Ordering::Relaxed);
        if format == FormatTag::Unknown {
            self.detection.0.unknown.fetch_add(1, Ordering::Relaxed);
        }
    }

    #[inline]
    pub fn record_no_parser(&self) {
        self.detection.0.no_parser.fetch_add(1, Ordering::Relaxed);
    }

    /// Record one finished file.
    pub fn record_file(&self, format: FormatTag, parsed: u64, failed: u64, skipped: u64, elapsed: Duration) {
        self.totals.0.files.fetch_add(1, Ordering::Relaxed);
        self.totals.0.events.fetch_add(parsed, Ordering::Relaxed);
        let nanos = u64::try_from(elapsed.as_nanos()).unwrap_or(u64::MAX);
        self.totals.0.time_nanos.fetch_add(nanos, Ordering::Relaxed);

        let counter = match format {
            FormatTag::Csv => &self.formats.0.csv,
            FormatTag::Syslog => &self.formats.0.syslog,
            FormatTag::AccessLog => &self.formats.0.access_log,
            FormatTag::Json | FormatTag::Evtx | FormatTag::Unknown => &self.formats.0.other,
        };
        counter.fetch_add(parsed, Ordering::Relaxed);

        self.lines.0.failed.fetch_add(failed, Ordering::Relaxed);
        self.lines.0.skipped.fetch_add(skipped, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_file_error(&self) {
        self.lines.0.file_errors.fetch_add(1, Ordering::Relaxed);
    }

    /// Called once per scored event.
    #[inline]
    pub fn record_risk(&self, label: RiskLabel) {
        let counter = match label {
            RiskLabel::Low => &self.risk.0.low,
            RiskLabel::Medium => &self.risk.0.medium,
            RiskLabel::High => &self.risk.0.high,
            RiskLabel::Critical => &self.risk.0.critical,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        let files = self.totals.0.files.load(Ordering::Relaxed);
        let total_events = self.totals.0.events.load(Ordering::Relaxed);
        let time_nanos = self.totals.0.time_nanos.load(Ordering::Relaxed);
        let failed_lines = self.lines.0.failed.load(Ordering::Relaxed);
        let attempts = total_events + failed_lines;

        MetricsSnapshot {
            detection_attempts: self.detection.0.attempts.load(Ordering::Relaxed),
            detection_unknown: self.detection.0.unknown.load(Ordering::Relaxed),
            no_parser: self.detection.0.no_parser.load(Ordering::Relaxed),

            csv_events: self.formats.0.csv.load(Ordering::Relaxed),
            syslog_events: self.formats.0.syslog.load(Ordering::Relaxed),
            access_log_events: self.formats.0.access_log.load(Ordering::Relaxed),
            other_events: self.formats.0.other.load(Ordering::Relaxed),

            files_processed: files,
            total_events,
            avg_file_time_ms: if files > 0 {
                (time_nanos as f64 / files as f64) / 1_000_000.0
            } else {
                0.0
            },

            failed_lines,
            skipped_lines: self.lines.0.skipped.load(Ordering::Relaxed),
            file_errors: self.lines.0.file_errors.load(Ordering::Relaxed),
            success_rate: if attempts > 0 {
                total_events as f64 / attempts as f64
            } else {
                1.0
            },

            low: self.risk.0.low.load(Ordering::Relaxed),
            medium: self.risk.0.medium.load(Ordering::Relaxed),
            high: self.risk.0.high.load(Ordering::Relaxed),
            critical: self.risk.0.critical.load(Ordering::Relaxed),
        }
    }
}

/// A read-only, serializable view of [`ParsingMetrics`].
#[derive(Debug, Clone, Serialize)]
pub struct MetricsSnapshot {
    // Detection
    pub detection_attempts: u64,
    pub detection_unknown: u64,
    pub no_parser: u64,

    // Events per format
    pub csv_events: u64,
    pub syslog_events: u64,
    pub access_log_events: u64,
    pub other_events: u64,

    // Totals
    pub files_processed: u64,
    pub total_events: u64,
    pub avg_file_time_ms: f64,

    // Lines
    pub failed_lines: u64,
    pub skipped_lines: u64,
    pub file_errors: u64,
    pub success_rate: f64,

    // Risk labels
    pub low: u64,
    pub medium: u64,
    pub high: u64,
    pub critical: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_metrics_are_empty() {
        let snap = ParsingMetrics::new().snapshot();
        assert_eq!(snap.total_events, 0);
        assert_eq!(snap.failed_lines, 0);
        assert_eq!(snap.avg_file_time_ms, 0.0);
        assert_eq!(snap.success_rate, 1.0);
    }

    #[test]
    fn test_record_detection() {
        let metrics = ParsingMetrics::new();
        metrics.record_detection(FormatTag::Csv);
        metrics.record_detection(FormatTag::Unknown);
        metrics.record_detection(FormatTag::Evtx);
        metrics.record_no_parser();

        let snap = metrics.snapshot();
        assert_eq!(snap.detection_attempts, 3);
        assert_eq!(snap.detection_unknown, 1);
        assert_eq!(snap.no_parser, 1);
    }

    #[test]
    fn test_record_file_counts_and_times() {
        let metrics = ParsingMetrics::new();
        metrics.record_file(FormatTag::Csv, 6, 2, 1, Duration::from_millis(2));
        metrics.record_file(FormatTag::AccessLog, 2, 0, 0, Duration::from_millis(4));

        let snap = metrics.snapshot();
        assert_eq!(snap.files_processed, 2);
        assert_eq!(snap.total_events, 8);
        assert_eq!(snap.csv_events, 6);
        assert_eq!(snap.access_log_events, 2);
        assert_eq!(snap.skipped_lines, 1);
        assert!((snap.avg_file_time_ms - 3.0).abs() < 1e-9);
        // 8 events out of 10 attempted lines
        assert!((snap.success_rate - 0.8).abs() < 1e-9);
    }

    #[test]
    fn test_risk_labels() {
        let metrics = ParsingMetrics::new();
        metrics.record_risk(RiskLabel::Low);
        metrics.record_risk(RiskLabel::Critical);
        metrics.record_risk(RiskLabel::Critical);
        metrics.record_file_error();

        let snap = metrics.snapshot();
        assert_eq!(snap.low, 1);
        assert_eq!(snap.critical, 2);
        assert_eq!(snap.medium + snap.high, 0);
        assert_eq!(snap.file_errors, 1);
    }

    #[test]
    fn test_other_formats_are_grouped() {
        let metrics = ParsingMetrics::new();
        metrics.record_file(FormatTag::Json, 1, 0, 0, Duration::ZERO);
        metrics.record_file(FormatTag::Evtx, 1, 0, 0, Duration::ZERO);
        assert_eq!(metrics.snapshot().other_events, 2);
    }
}
