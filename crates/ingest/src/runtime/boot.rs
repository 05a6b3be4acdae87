//! Boot: logging init and config load.

use std::path::Path;

use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::conf::{ConfigError, IngestConfig};

/// Initialise the tracing / logging subsystem.
///
/// Logs go to stderr so stdout stays clean for event output.
pub fn init_logging() {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "ingest=info".into()))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

/// Load and validate config, applying a command-line threshold last.
pub fn boot(config_path: Option<&Path>, threshold: Option<f64>) -> Result<IngestConfig, ConfigError> {
    info!("Starting ingest v{}", env!("CARGO_PKG_VERSION"));

    let mut config = IngestConfig::load(config_path)?;
    if let Some(threshold) = threshold {
        config.confidence_threshold = threshold;
        config.validate().map_err(ConfigError::Invalid)?;
    }

    info!(
        "Loaded configuration: threshold={}, batch_size={}, max_concurrent_files={}",
        config.confidence_threshold, config.batch_size, config.max_concurrent_files
    );
    info!(
        "Streaming mode above {} bytes, detection sample of {} lines",
        config.streaming_threshold_bytes, config.detection_sample_lines
    );

    Ok(config)
}
