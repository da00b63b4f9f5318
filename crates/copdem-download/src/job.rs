//! Download jobs and batch results.

use crate::{TileId, TransferError};
use serde::Serialize;
use std::fmt;
use std::path::PathBuf;

/// Lifecycle of a single job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Pending,
    InProgress,
    Done,
    Skipped,
    Failed,
    Cancelled,
}

impl JobStatus {
    /// Whether the job will not change again.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            JobStatus::Done | JobStatus::Skipped | JobStatus::Failed | JobStatus::Cancelled
        )
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            JobStatus::Pending => "pending",
            JobStatus::InProgress => "downloading",
            JobStatus::Done => "done",
            JobStatus::Skipped => "skipped",
            JobStatus::Failed => "failed",
            JobStatus::Cancelled => "cancelled",
        };
        f.write_str(s)
    }
}

/// One tile transfer within a batch.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DownloadJob {
    /// Tile being fetched.
    pub tile: TileId,
    /// Final file path.
    pub destination: PathBuf,
    /// Current status.
    pub status: JobStatus,
    /// Bytes received so far.
    pub bytes_transferred: u64,
    /// Size from the response headers, once known.
    pub total_bytes: Option<u64>,
    /// Failure cause when `status` is `Failed`.
    #[serde(serialize_with = "serialize_error")]
    pub error: Option<TransferError>,
}

fn serialize_error<S: serde::Serializer>(
    error: &Option<TransferError>,
    serializer: S,
) -> Result<S::Ok, S::Error> {
    match error {
        Some(e) => serializer.serialize_some(&e.to_string()),
        None => serializer.serialize_none(),
    }
}

impl DownloadJob {
    pub(crate) fn new(tile: TileId, destination: PathBuf, status: JobStatus) -> Self {
        Self {
            tile,
            destination,
            status,
            bytes_transferred: 0,
            total_bytes: None,
            error: None,
        }
    }
}

/// Terminal state of a batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BatchState {
    /// The queue ran to exhaustion. Individual jobs may still have failed.
    Completed,
    /// The user cancelled, either at the conflict prompt or mid-run.
    Cancelled,
}

/// Per-status job counts for a finished batch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct BatchTally {
    pub done: usize,
    pub skipped: usize,
    pub failed: usize,
    pub cancelled: usize,
}

impl BatchTally {
    /// Count terminal statuses across `jobs`.
    pub fn from_jobs(jobs: &[DownloadJob]) -> Self {
        let mut tally = BatchTally::default();
        for job in jobs {
            match job.status {
                JobStatus::Done => tally.done += 1,
                JobStatus::Skipped => tally.skipped += 1,
                JobStatus::Failed => tally.failed += 1,
                JobStatus::Cancelled => tally.cancelled += 1,
                JobStatus::Pending | JobStatus::InProgress => {}
            }
        }
        tally
    }

    pub fn total(&self) -> usize {
        self.done + self.skipped + self.failed + self.cancelled
    }
}

impl fmt::Display for BatchTally {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} done, {} skipped, {} failed, {} cancelled",
            self.done, self.skipped, self.failed, self.cancelled
        )
    }
}

/// Everything the caller learns about a finished batch.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BatchReport {
    pub state: BatchState,
    pub tally: BatchTally,
    pub jobs: Vec<DownloadJob>,
}

impl BatchReport {
    /// Build a report, tallying `jobs`.
    pub fn new(state: BatchState, jobs: Vec<DownloadJob>) -> Self {
        Self {
            state,
            tally: BatchTally::from_jobs(&jobs),
            jobs,
        }
    }

    /// Tiles whose job failed, in batch order.
    pub fn failed_tiles(&self) -> Vec<TileId> {
        self.jobs
            .iter()
            .filter(|j| j.status == JobStatus::Failed)
            .map(|j| j.tile)
            .collect()
    }
}
