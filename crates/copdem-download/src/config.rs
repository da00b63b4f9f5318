//! Download configuration.
//!
//! All fields have defaults, so a YAML file only needs the values it changes:
//!
//! ```yaml
//! base_url: http://localhost:9000/copernicus-dem-30m
//! timeout_secs: 120
//! probe_sizes: false
//! ```

use crate::tile::DEFAULT_BASE_URL;
use crate::ConfigError;
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

/// Read buffer size per chunk (1 MiB).
pub const DEFAULT_CHUNK_SIZE: usize = 1024 * 1024;

/// HTTP timeout in seconds.
pub const DEFAULT_TIMEOUT_SECS: u64 = 60;

/// Configuration for fetching tiles.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DownloadConfig {
    /// Root URL of the tile bucket.
    pub base_url: String,

    /// Timeout in seconds for connecting, for the response headers and for
    /// each body read. A slow but steady download never hits it.
    pub timeout_secs: u64,

    /// Bytes read from the connection between cancellation checks.
    pub chunk_size: usize,

    /// Suffix of in-progress files next to the destination.
    pub temp_suffix: String,

    /// Issue HEAD requests before downloading so overall progress can be
    /// reported in bytes rather than tiles.
    pub probe_sizes: bool,
}

impl Default for DownloadConfig {
    fn default() -> Self {
        DownloadConfig {
            base_url: DEFAULT_BASE_URL.to_string(),
            timeout_secs: DEFAULT_TIMEOUT_SECS,
            chunk_size: DEFAULT_CHUNK_SIZE,
            temp_suffix: ".part".to_string(),
            probe_sizes: true,
        }
    }
}

impl DownloadConfig {
    /// Parse and validate a YAML document.
    pub fn from_yaml_str(yaml: &str) -> Result<Self, ConfigError> {
        let config: DownloadConfig = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    /// Load and validate a YAML file.
    pub fn from_yaml_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_yaml_str(&contents)
    }

    /// Check values that serde cannot.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.chunk_size == 0 {
            return Err(ConfigError::Invalid("chunk_size must be greater than 0".into()));
        }
        if self.timeout_secs == 0 {
            return Err(ConfigError::Invalid("timeout_secs must be greater than 0".into()));
        }
        if !(self.base_url.starts_with("http://") || self.base_url.starts_with("https://")) {
            return Err(ConfigError::Invalid(format!(
                "base_url must be an http(s) URL, got {:?}",
                self.base_url
            )));
        }
        if self.temp_suffix.is_empty() || self.temp_suffix.contains(['/', '\\']) {
            return Err(ConfigError::Invalid(format!(
                "temp_suffix must be a non-empty file name suffix, got {:?}",
                self.temp_suffix
            )));
        }
        Ok(())
    }

    /// Request timeout as a [`Duration`].
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// Set the bucket URL.
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// Set the chunk size.
    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size;
        self
    }

    /// Enable or disable the size pre-flight.
    pub fn with_probe_sizes(mut self, probe_sizes: bool) -> Self {
        self.probe_sizes = probe_sizes;
        self
    }
}
