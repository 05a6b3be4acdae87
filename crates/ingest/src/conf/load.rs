//! Configuration loading from file and environment variables.

use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use thiserror::Error;
use tracing::{info, warn};

use super::model::IngestConfig;

pub const CONFIG_FILE_ENV: &str = "INGEST_CONFIG_FILE";
pub const DEFAULT_CONFIG_FILE: &str = "ingest.toml";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid TOML in {path}: {source}")]
    Toml {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

impl IngestConfig {
    /// Load configuration from file or environment variables
    /// Priority: Environment Variables > Config File > Defaults
    ///
    /// An explicit `path` must exist. Without one, the file named by
    /// `INGEST_CONFIG_FILE` (or `ingest.toml`) is used when present.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = match path {
            Some(path) => {
                info!("Loading configuration from: {}", path.display());
                Self::from_file(path)?
            }
            None => {
                let default_path = std::env::var(CONFIG_FILE_ENV).unwrap_or_else(|_| DEFAULT_CONFIG_FILE.to_string());
                let default_path = Path::new(&default_path);
                if default_path.exists() {
                    info!("Loading configuration from: {}", default_path.display());
                    Self::from_file(default_path)?
                } else {
                    info!(
                        "Config file not found at {}, using defaults and environment variables",
                        default_path.display()
                    );
                    Self::default()
                }
            }
        };

        config.apply_env(|key| std::env::var(key).ok());
        config.validate().map_err(ConfigError::Invalid)?;
        Ok(config)
    }

    /// Load configuration from TOML file
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        toml::from_str(&contents).map_err(|source| ConfigError::Toml {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Override individual settings from `lookup`, normally the process
    /// environment. Unparseable values are logged and ignored.
    pub fn apply_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        override_from(&lookup, "INGEST_CONFIDENCE_THRESHOLD", &mut self.confidence_threshold);
        override_from(&lookup, "INGEST_BATCH_SIZE", &mut self.batch_size);
        override_from(&lookup, "INGEST_STREAMING_THRESHOLD_BYTES", &mut self.streaming_threshold_bytes);
        override_from(&lookup, "INGEST_MAX_CONCURRENT_FILES", &mut self.max_concurrent_files);
    }
}

fn override_from<F, T>(lookup: &F, key: &str, slot: &mut T)
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
{
    let Some(raw) = lookup(key) else {
        return;
    };
    match raw.trim().parse() {
        Ok(value) => *slot = value,
        Err(_) => warn!("Ignoring {}={:?}: not a valid value", key, raw),
    }
}
