//! Error type for the `copdem` front end.

use copdem_download::{BatchError, ConfigError, TileError};
use std::path::PathBuf;
use thiserror::Error;

/// Anything that stops the CLI before or around a batch.
#[derive(Debug, Error)]
pub enum CliError {
    /// Loading or validating the configuration file failed.
    #[error("Config error: {0}")]
    Config(#[from] ConfigError),

    /// A `--tile` or `--bbox` argument was invalid.
    #[error(transparent)]
    Tile(#[from] TileError),

    /// The batch could not be started or its thread failed.
    #[error(transparent)]
    Batch(#[from] BatchError),

    /// The default output directory could not be created.
    #[error("Failed to create output directory {path}: {source}")]
    CreateDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Writing the JSON report failed.
    #[error("Failed to write report {path}: {source}")]
    Report {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The Ctrl-C handler could not be installed.
    #[error("Failed to install Ctrl-C handler: {0}")]
    Signal(#[from] ctrlc::Error),
}
