//! Error types for the download manager.

use std::path::PathBuf;
use thiserror::Error;

/// Errors raised while deriving or parsing tile identifiers.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TileError {
    /// Latitude or longitude is outside the tile grid.
    #[error("Invalid coordinate ({lat}, {lon}): latitude must be in -90..=89 and longitude in -180..=179")]
    InvalidCoordinate {
        /// Requested latitude.
        lat: i32,
        /// Requested longitude.
        lon: i32,
    },

    /// Bounding box is malformed or outside geographic limits.
    #[error("Invalid bounding box: {0}")]
    InvalidBoundingBox(String),

    /// A tile name could not be parsed.
    #[error("Invalid tile name: {0}")]
    InvalidName(String),
}

/// Per-job transfer failures.
///
/// These never abort a batch; they are recorded on the job and the
/// orchestrator moves on to the next tile.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransferError {
    /// The store has no object for this tile.
    #[error("Remote object not found: {url}")]
    RemoteNotFound {
        /// Locator that was requested.
        url: String,
    },

    /// The store refused access to the object.
    #[error("Remote access denied ({status}): {url}")]
    RemoteAccessDenied {
        /// Locator that was requested.
        url: String,
        /// HTTP status code.
        status: u16,
    },

    /// Connection, protocol or unexpected status failure.
    #[error("Network failure: {0}")]
    NetworkFailure(String),

    /// Writing or finalizing the local file failed.
    #[error("Local write failure for {path}: {reason}")]
    LocalWriteFailure {
        /// Path being written.
        path: PathBuf,
        /// Reason for failure.
        reason: String,
    },

    /// The batch cancellation flag was observed.
    #[error("Transfer cancelled")]
    Cancelled,
}

impl TransferError {
    pub(crate) fn local_write(path: impl Into<PathBuf>, err: impl std::fmt::Display) -> Self {
        TransferError::LocalWriteFailure {
            path: path.into(),
            reason: err.to_string(),
        }
    }
}

impl From<reqwest::Error> for TransferError {
    fn from(err: reqwest::Error) -> Self {
        TransferError::NetworkFailure(err.to_string())
    }
}

/// Batch-level failures. These abort before any job runs.
#[derive(Debug, Error)]
pub enum BatchError {
    /// Destination directory is missing, not a directory, or not writable.
    #[error("Destination unavailable: {path}: {reason}")]
    DestinationUnavailable {
        /// Destination directory.
        path: PathBuf,
        /// Reason it cannot be used.
        reason: String,
    },

    /// The selection set was empty when a download was requested.
    #[error("No tiles selected")]
    NothingSelected,

    /// A batch is already running in this session.
    #[error("A download batch is already in progress")]
    BatchInProgress,

    /// The background thread could not be started.
    #[error("Failed to spawn batch thread: {0}")]
    Spawn(#[from] std::io::Error),

    /// The background thread panicked before producing a report.
    #[error("Batch thread panicked: {0}")]
    WorkerPanicked(String),

    /// The HTTP client could not be constructed.
    #[error("HTTP client error: {0}")]
    HttpClient(#[from] reqwest::Error),
}

/// Errors loading a [`DownloadConfig`](crate::DownloadConfig).
#[derive(Debug, Error)]
pub enum ConfigError {
    /// I/O error reading the config file.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// YAML parsing error.
    #[error("YAML parse error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// A value failed validation.
    #[error("Invalid config value: {0}")]
    Invalid(String),
}
