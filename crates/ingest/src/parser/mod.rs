/// Log format detection and parsing
///
/// Converts heterogeneous security log files (CSV, syslog, web access logs,
/// free-form text) into a uniform stream of [`NormalizedEvent`]s.
///
/// # Architecture
///
/// - `detector.rs`: single-line format classifier (extension first, then content)
/// - `factory.rs`: runtime-extensible format → parser registry
/// - `formats/`: individual parser implementations
/// - `reader.rs`: numbered, UTF-8-lossy line reader shared by line parsers
/// - `timestamp.rs`: ordered timestamp grammar with sub-format detection
/// - `metrics.rs`: lock-free counters shared by concurrent workers
/// - `stats.rs`: per-file event statistics
///
/// # Guarantees
///
/// All parsers:
/// - never abort a file because of one malformed line (failures are counted)
/// - never fail on an unparseable timestamp (it degrades to "now", UTC)
/// - hold no state between calls, so one instance can serve many threads

pub mod traits;
pub mod detector;
pub mod factory;
pub mod metrics;
pub mod formats;
pub mod model;
pub mod reader;
pub mod stats;
pub mod timestamp;
mod serde_utils;

// Re-export commonly used types
pub use traits::{EventStream, LogParser};
pub use model::{ExtraValue, FormatTag, NormalizedEvent, ParseError, ParseOutcome};
pub use detector::detect_log_type;
pub use factory::ParserFactory;

// Constants
pub const MAX_LINE_SIZE: usize = 1_048_576; // 1MB
pub const DETECTION_SAMPLE_SIZE: usize = 10; // Lines sampled for grammar detection
pub const GRAMMAR_MATCH_RATIO: f64 = 0.5;
pub const STREAMING_THRESHOLD_BYTES: u64 = 100 * 1024 * 1024;
pub const PROGRESS_INTERVAL: u64 = 100_000;
