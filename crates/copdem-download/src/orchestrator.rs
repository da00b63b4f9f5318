//! Batch orchestration.
//!
//! A batch moves through:
//!
//! ```text
//! Created -> ConflictCheck -> (Cancelled | Queued) -> Running -> (Completed | Cancelled)
//! ```
//!
//! The conflict check runs on the caller's thread because it may prompt the
//! user. Everything after that runs on a dedicated `copdem-batch` thread which
//! transfers tiles one at a time, in snapshot order, and reports back over a
//! [`DownloadEvent`] channel.

use crate::conflict::{resolve_conflicts, ConflictDecision, ConflictPrompt};
use crate::job::{BatchReport, BatchState, BatchTally, DownloadJob, JobStatus};
use crate::source::TileSource;
use crate::transfer::{transfer_tile, CancelToken, FinalizeMode, Progress, TransferRequest};
use crate::{BatchError, DownloadConfig, TileId, TransferError};
use crossbeam_channel::Sender;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use tracing::{debug, info, warn};

// ============================================================================
// Events (Orchestrator -> Interaction Surface)
// ============================================================================

/// Unit of the overall batch fraction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProgressMode {
    /// Every queued tile's size was known up front.
    Bytes,
    /// Coarse "N of M tiles finished".
    Tiles,
}

/// Notifications sent while a batch runs.
#[derive(Debug, Clone, PartialEq)]
pub enum DownloadEvent {
    /// Overall progress changed.
    BatchProgress {
        /// Overall fraction in `0.0..=1.0`. Never decreases within a batch.
        fraction: f64,
        /// Whether `fraction` counts bytes or tiles.
        mode: ProgressMode,
        /// Display name of the tile being transferred.
        current_tile: String,
        /// Progress of that tile alone.
        job: Progress,
    },

    /// A job changed status.
    TileStatusChanged {
        tile: TileId,
        status: JobStatus,
    },

    /// The batch reached a terminal state. Always the last event of a batch.
    BatchFinished {
        state: BatchState,
        tally: BatchTally,
    },
}

// ============================================================================
// Batch Handle
// ============================================================================

enum HandleState {
    Running(JoinHandle<BatchReport>),
    Finished(BatchReport),
}

/// Handle to a started batch.
pub struct BatchHandle {
    cancel: CancelToken,
    state: HandleState,
}

impl BatchHandle {
    /// Raise the batch cancellation flag. Returns `false` if already raised.
    pub fn cancel(&self) -> bool {
        self.cancel.cancel()
    }

    /// A clone of the batch's cancellation flag.
    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    /// Whether the batch has reached a terminal state.
    pub fn is_finished(&self) -> bool {
        match &self.state {
            HandleState::Running(thread) => thread.is_finished(),
            HandleState::Finished(_) => true,
        }
    }

    /// Block until the batch finishes and return its report.
    pub fn join(self) -> Result<BatchReport, BatchError> {
        match self.state {
            HandleState::Finished(report) => Ok(report),
            HandleState::Running(thread) => thread.join().map_err(|panic| {
                let msg = panic
                    .downcast_ref::<&str>()
                    .map(|s| s.to_string())
                    .or_else(|| panic.downcast_ref::<String>().cloned())
                    .unwrap_or_else(|| "unknown panic".to_string());
                BatchError::WorkerPanicked(msg)
            }),
        }
    }
}

impl std::fmt::Debug for BatchHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BatchHandle")
            .field("cancelled", &self.cancel.is_cancelled())
            .field("finished", &self.is_finished())
            .finish()
    }
}

// ============================================================================
// Orchestrator
// ============================================================================

/// Creates batches and runs them on a background thread.
pub struct Orchestrator {
    source: Arc<dyn TileSource>,
    config: DownloadConfig,
    events: Sender<DownloadEvent>,
}

impl Orchestrator {
    pub fn new(source: Arc<dyn TileSource>, config: DownloadConfig, events: Sender<DownloadEvent>) -> Self {
        Self { source, config, events }
    }

    pub fn config(&self) -> &DownloadConfig {
        &self.config
    }

    /// Start a batch over `tiles` into `dest`, with a fresh cancellation flag.
    pub fn start_batch(
        &self,
        tiles: Vec<TileId>,
        dest: &Path,
        prompt: &mut dyn ConflictPrompt,
    ) -> Result<BatchHandle, BatchError> {
        self.start_batch_with_cancel(tiles, dest, prompt, CancelToken::new())
    }

    /// Start a batch using a caller-supplied cancellation flag.
    ///
    /// `tiles` is the frozen snapshot; it is downloaded in the given order.
    /// Fails only with batch-level errors, before any job exists.
    pub fn start_batch_with_cancel(
        &self,
        tiles: Vec<TileId>,
        dest: &Path,
        prompt: &mut dyn ConflictPrompt,
        cancel: CancelToken,
    ) -> Result<BatchHandle, BatchError> {
        debug!("Batch created with {} tiles for {}", tiles.len(), dest.display());

        let resolution = resolve_conflicts(dest, &tiles, prompt)?;

        if resolution.decision == ConflictDecision::CancelBatch {
            let jobs: Vec<DownloadJob> = tiles
                .iter()
                .map(|t| DownloadJob::new(*t, t.destination_in(dest), JobStatus::Cancelled))
                .collect();
            for job in &jobs {
                let _ = self.events.send(DownloadEvent::TileStatusChanged {
                    tile: job.tile,
                    status: job.status,
                });
            }
            let report = BatchReport::new(BatchState::Cancelled, jobs);
            info!("Batch cancelled at conflict check");
            let _ = self.events.send(DownloadEvent::BatchFinished {
                state: report.state,
                tally: report.tally,
            });
            cancel.cancel();
            return Ok(BatchHandle {
                cancel,
                state: HandleState::Finished(report),
            });
        }

        let skip_existing = resolution.decision == ConflictDecision::SkipExisting;
        let jobs: Vec<DownloadJob> = tiles
            .iter()
            .map(|t| {
                let status = if skip_existing && resolution.is_conflict(t) {
                    JobStatus::Skipped
                } else {
                    JobStatus::Pending
                };
                DownloadJob::new(*t, t.destination_in(dest), status)
            })
            .collect();

        let finalize = if resolution.decision == ConflictDecision::OverwriteAll {
            FinalizeMode::Overwrite
        } else {
            FinalizeMode::NoClobber
        };

        let runner = BatchRunner {
            source: Arc::clone(&self.source),
            config: self.config.clone(),
            events: self.events.clone(),
            cancel: cancel.clone(),
            dest: dest.to_path_buf(),
            finalize,
            jobs,
        };

        let thread = thread::Builder::new()
            .name("copdem-batch".to_string())
            .spawn(move || runner.run())?;

        Ok(BatchHandle {
            cancel,
            state: HandleState::Running(thread),
        })
    }
}

// ============================================================================
// Batch Runner (background thread)
// ============================================================================

/// Aggregates per-job progress into a monotonic batch fraction.
struct ProgressTracker {
    mode: ProgressMode,
    batch_total_bytes: u64,
    bytes_done: u64,
    tiles_done: usize,
    tiles_total: usize,
    last_fraction: f64,
}

impl ProgressTracker {
    fn new(expected: &[Option<u64>]) -> Self {
        let known: Option<Vec<u64>> = expected.iter().copied().collect();
        let (mode, batch_total_bytes) = match known {
            Some(sizes) if !sizes.is_empty() && sizes.iter().sum::<u64>() > 0 => {
                (ProgressMode::Bytes, sizes.iter().sum())
            }
            _ => (ProgressMode::Tiles, 0),
        };
        Self {
            mode,
            batch_total_bytes,
            bytes_done: 0,
            tiles_done: 0,
            tiles_total: expected.len(),
            last_fraction: 0.0,
        }
    }

    /// Fraction including `current` bytes of an unfinished job.
    fn fraction(&mut self, current: u64, expected: Option<u64>) -> f64 {
        let raw = match self.mode {
            ProgressMode::Bytes => {
                let current = expected.map_or(current, |e| current.min(e));
                (self.bytes_done + current) as f64 / self.batch_total_bytes as f64
            }
            ProgressMode::Tiles if self.tiles_total == 0 => 1.0,
            ProgressMode::Tiles => self.tiles_done as f64 / self.tiles_total as f64,
        };
        self.last_fraction = raw.clamp(self.last_fraction, 1.0);
        self.last_fraction
    }

    /// Account for a job reaching a terminal state.
    fn finish_job(&mut self, expected: Option<u64>, transferred: u64) {
        self.bytes_done += expected.unwrap_or(transferred);
        self.tiles_done += 1;
    }
}

/// State moved onto the batch thread.
struct BatchRunner {
    source: Arc<dyn TileSource>,
    config: DownloadConfig,
    events: Sender<DownloadEvent>,
    cancel: CancelToken,
    dest: PathBuf,
    finalize: FinalizeMode,
    jobs: Vec<DownloadJob>,
}

impl BatchRunner {
    fn send(&self, event: DownloadEvent) {
        // The surface may have gone away; the batch still runs to completion.
        let _ = self.events.send(event);
    }

    fn set_status(&mut self, index: usize, status: JobStatus) {
        self.jobs[index].status = status;
        let tile = self.jobs[index].tile;
        self.send(DownloadEvent::TileStatusChanged { tile, status });
    }

    /// Size pre-flight. Returns the expected size of each queued job.
    fn probe_sizes(&self, queued: &[usize]) -> Vec<Option<u64>> {
        let mut expected = vec![None; queued.len()];
        if !self.config.probe_sizes {
            return expected;
        }
        for (slot, &index) in expected.iter_mut().zip(queued) {
            if self.cancel.is_cancelled() {
                debug!("Cancelled during size pre-flight");
                break;
            }
            let tile = self.jobs[index].tile;
            match self.source.probe(&tile) {
                Ok(size) => *slot = size,
                // The GET will report the real error on the job.
                Err(e) => debug!("{}: size probe failed: {}", tile, e),
            }
        }
        expected
    }

    fn run(mut self) -> BatchReport {
        let queued: Vec<usize> = (0..self.jobs.len())
            .filter(|&i| self.jobs[i].status == JobStatus::Pending)
            .collect();
        info!(
            "Starting batch: {} to download, {} skipped, into {}",
            queued.len(),
            self.jobs.len() - queued.len(),
            self.dest.display()
        );

        for i in 0..self.jobs.len() {
            let tile = self.jobs[i].tile;
            let status = self.jobs[i].status;
            self.send(DownloadEvent::TileStatusChanged { tile, status });
        }

        let expected = self.probe_sizes(&queued);
        let mut tracker = ProgressTracker::new(&expected);
        debug!("Progress mode {:?}, {} bytes expected", tracker.mode, tracker.batch_total_bytes);

        let mut saw_cancel = false;
        for (&index, &expected_size) in queued.iter().zip(&expected) {
            if self.cancel.is_cancelled() {
                saw_cancel = true;
                self.set_status(index, JobStatus::Cancelled);
                continue;
            }

            self.set_status(index, JobStatus::InProgress);
            let tile = self.jobs[index].tile;
            let name = tile.display_name();
            let destination = self.jobs[index].destination.clone();
            let request = TransferRequest {
                tile,
                destination: &destination,
                temp_suffix: &self.config.temp_suffix,
                chunk_size: self.config.chunk_size,
                finalize: self.finalize,
            };

            let job = &mut self.jobs[index];
            let events = &self.events;
            let result = transfer_tile(self.source.as_ref(), &request, &self.cancel, &mut |progress| {
                job.bytes_transferred = progress.done();
                job.total_bytes = progress.total();
                let fraction = tracker.fraction(progress.done(), expected_size);
                let _ = events.send(DownloadEvent::BatchProgress {
                    fraction,
                    mode: tracker.mode,
                    current_tile: name.clone(),
                    job: progress,
                });
            });

            let status = match result {
                Ok(done) => {
                    job.bytes_transferred = done.bytes;
                    job.total_bytes = done.total;
                    info!("{}: downloaded {} bytes", name, done.bytes);
                    JobStatus::Done
                }
                Err(TransferError::Cancelled) => {
                    saw_cancel = true;
                    info!("{}: cancelled after {} bytes", name, job.bytes_transferred);
                    JobStatus::Cancelled
                }
                Err(e) => {
                    warn!("{}: {}", name, e);
                    job.error = Some(e);
                    JobStatus::Failed
                }
            };

            let final_progress = match job.total_bytes {
                Some(total) => Progress::Known { done: job.bytes_transferred, total },
                None => Progress::Unknown { done: job.bytes_transferred },
            };
            tracker.finish_job(expected_size, job.bytes_transferred);
            let fraction = tracker.fraction(0, None);
            self.send(DownloadEvent::BatchProgress {
                fraction,
                mode: tracker.mode,
                current_tile: name,
                job: final_progress,
            });
            self.set_status(index, status);
        }

        let state = if saw_cancel { BatchState::Cancelled } else { BatchState::Completed };
        let report = BatchReport::new(state, self.jobs);
        info!("Batch {:?}: {}", state, report.tally);
        let _ = self.events.send(DownloadEvent::BatchFinished {
            state,
            tally: report.tally,
        });
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::conflict::{ConflictChoice, FixedChoice};
    use crate::testing::{dir_entries, FakeSource, FakeTile};
    use crossbeam_channel::Receiver;
    use sha2::{Digest, Sha256};

    fn tile(lat: i32, lon: i32) -> TileId {
        TileId::new(lat, lon).unwrap()
    }

    fn orchestrator(source: Arc<FakeSource>) -> (Orchestrator, Receiver<DownloadEvent>) {
        let (tx, rx) = crossbeam_channel::unbounded();
        let config = DownloadConfig::default().with_chunk_size(4);
        (Orchestrator::new(source, config, tx), rx)
    }

    fn never_prompt() -> impl FnMut(&[String]) -> ConflictChoice {
        |names: &[String]| -> ConflictChoice { panic!("unexpected conflict prompt for {:?}", names) }
    }

    fn statuses_for(events: &[DownloadEvent], t: TileId) -> Vec<JobStatus> {
        events
            .iter()
            .filter_map(|e| match e {
                DownloadEvent::TileStatusChanged { tile, status } if *tile == t => Some(*status),
                _ => None,
            })
            .collect()
    }

    fn fractions(events: &[DownloadEvent]) -> Vec<(f64, ProgressMode)> {
        events
            .iter()
            .filter_map(|e| match e {
                DownloadEvent::BatchProgress { fraction, mode, .. } => Some((*fraction, *mode)),
                _ => None,
            })
            .collect()
    }

    fn sha256(path: &Path) -> Vec<u8> {
        Sha256::digest(std::fs::read(path).unwrap()).to_vec()
    }

    #[test]
    fn test_two_tiles_into_empty_directory() {
        let dir = tempfile::tempdir().unwrap();
        let (a, b) = (tile(41, 12), tile(42, 12));
        let source = Arc::new(
            FakeSource::new()
                .with(a, FakeTile::ok(vec![1; 10]))
                .with(b, FakeTile::ok(vec![2; 30])),
        );
        let (orch, rx) = orchestrator(source.clone());

        let report = orch
            .start_batch(vec![a, b], dir.path(), &mut never_prompt())
            .unwrap()
            .join()
            .unwrap();
        let events: Vec<DownloadEvent> = rx.try_iter().collect();

        assert_eq!(report.state, BatchState::Completed);
        assert_eq!(report.tally, BatchTally { done: 2, skipped: 0, failed: 0, cancelled: 0 });
        assert_eq!(dir_entries(dir.path()), vec![a.file_name(), b.file_name()]);
        assert_eq!(std::fs::read(a.destination_in(dir.path())).unwrap(), vec![1; 10]);
        assert_eq!(report.jobs[1].bytes_transferred, 30);
        assert_eq!(report.jobs[1].total_bytes, Some(30));

        assert_eq!(
            statuses_for(&events, a),
            vec![JobStatus::Pending, JobStatus::InProgress, JobStatus::Done]
        );
        assert_eq!(
            events.last(),
            Some(&DownloadEvent::BatchFinished { state: BatchState::Completed, tally: report.tally })
        );

        let fractions = fractions(&events);
        assert!(fractions.iter().all(|(_, m)| *m == ProgressMode::Bytes));
        assert!(fractions.windows(2).all(|w| w[0].0 <= w[1].0), "{:?}", fractions);
        assert_eq!(fractions.last().map(|f| f.0), Some(1.0));
        // 10 of 40 bytes after the first tile
        assert!(fractions.iter().any(|(f, _)| (*f - 0.25).abs() < 1e-9));
    }

    #[test]
    fn test_skip_existing_leaves_file_untouched() {
        let dir = tempfile::tempdir().unwrap();
        let t = tile(41, 12);
        let existing = t.destination_in(dir.path());
        std::fs::write(&existing, b"precious local copy").unwrap();
        let before = sha256(&existing);

        let source = Arc::new(FakeSource::new().with(t, FakeTile::ok(vec![9; 64])));
        let (orch, rx) = orchestrator(source.clone());

        let mut prompts = 0;
        let mut prompt = |names: &[String]| {
            prompts += 1;
            assert_eq!(names, [t.file_name()]);
            ConflictChoice::SkipExisting
        };
        let report = orch.start_batch(vec![t], dir.path(), &mut prompt).unwrap().join().unwrap();
        let events: Vec<DownloadEvent> = rx.try_iter().collect();

        assert_eq!(prompts, 1);
        assert_eq!(report.state, BatchState::Completed);
        assert_eq!(report.tally, BatchTally { done: 0, skipped: 1, failed: 0, cancelled: 0 });
        assert_eq!(report.jobs[0].status, JobStatus::Skipped);
        assert!(source.opened().is_empty(), "no request for skipped tiles");
        assert!(source.probed().is_empty());
        assert_eq!(sha256(&existing), before);
        assert_eq!(statuses_for(&events, t), vec![JobStatus::Skipped]);
    }

    #[test]
    fn test_skip_existing_downloads_the_rest() {
        let dir = tempfile::tempdir().unwrap();
        let (a, b) = (tile(10, 10), tile(11, 10));
        std::fs::write(a.destination_in(dir.path()), b"old").unwrap();
        let source = Arc::new(
            FakeSource::new()
                .with(a, FakeTile::ok(vec![1; 8]))
                .with(b, FakeTile::ok(vec![2; 8])),
        );
        let (orch, _rx) = orchestrator(source.clone());

        let report = orch
            .start_batch(vec![a, b], dir.path(), &mut FixedChoice(ConflictChoice::SkipExisting))
            .unwrap()
            .join()
            .unwrap();

        assert_eq!(report.tally, BatchTally { done: 1, skipped: 1, failed: 0, cancelled: 0 });
        assert_eq!(source.opened(), vec![b]);
        assert_eq!(std::fs::read(a.destination_in(dir.path())).unwrap(), b"old");
    }

    #[test]
    fn test_overwrite_all_replaces_existing() {
        let dir = tempfile::tempdir().unwrap();
        let t = tile(0, 0);
        std::fs::write(t.destination_in(dir.path()), b"stale").unwrap();
        let source = Arc::new(FakeSource::new().with(t, FakeTile::ok(b"fresh".to_vec())));
        let (orch, _rx) = orchestrator(source);

        let report = orch
            .start_batch(vec![t], dir.path(), &mut FixedChoice(ConflictChoice::OverwriteAll))
            .unwrap()
            .join()
            .unwrap();

        assert_eq!(report.tally.done, 1);
        assert_eq!(std::fs::read(t.destination_in(dir.path())).unwrap(), b"fresh");
        assert_eq!(dir_entries(dir.path()), vec![t.file_name()]);
    }

    #[test]
    fn test_cancel_mid_transfer_cancels_rest() {
        let dir = tempfile::tempdir().unwrap();
        let (a, b, c) = (tile(41, 12), tile(42, 12), tile(43, 12));
        let cancel = CancelToken::new();
        let source = Arc::new(
            FakeSource::new()
                .with(a, FakeTile::ok(vec![1; 12]))
                .with(b, FakeTile::ok(vec![2; 40]).cancel_after(8, cancel.clone()))
                .with(c, FakeTile::ok(vec![3; 12])),
        );
        let (orch, rx) = orchestrator(source.clone());

        let report = orch
            .start_batch_with_cancel(vec![a, b, c], dir.path(), &mut never_prompt(), cancel)
            .unwrap()
            .join()
            .unwrap();
        let events: Vec<DownloadEvent> = rx.try_iter().collect();

        assert_eq!(report.state, BatchState::Cancelled);
        let statuses: Vec<JobStatus> = report.jobs.iter().map(|j| j.status).collect();
        assert_eq!(statuses, vec![JobStatus::Done, JobStatus::Cancelled, JobStatus::Cancelled]);
        assert_eq!(report.tally, BatchTally { done: 1, skipped: 0, failed: 0, cancelled: 2 });
        assert_eq!(source.opened(), vec![a, b], "tile 3 never starts");

        // Only the finished tile is on disk: no temp files, no partial tile 2.
        assert_eq!(dir_entries(dir.path()), vec![a.file_name()]);
        assert_eq!(statuses_for(&events, c), vec![JobStatus::Pending, JobStatus::Cancelled]);
        assert_eq!(
            events.last(),
            Some(&DownloadEvent::BatchFinished { state: BatchState::Cancelled, tally: report.tally })
        );
    }

    #[test]
    fn test_not_found_fails_one_job_only() {
        let dir = tempfile::tempdir().unwrap();
        let (a, b, c) = (tile(1, 1), tile(2, 1), tile(3, 1));
        let source = Arc::new(
            FakeSource::new()
                .with(a, FakeTile::ok(vec![1; 5]))
                .with(b, FakeTile::not_found())
                .with(c, FakeTile::ok(vec![3; 5])),
        );
        let (orch, rx) = orchestrator(source);

        let report = orch
            .start_batch(vec![a, b, c], dir.path(), &mut never_prompt())
            .unwrap()
            .join()
            .unwrap();
        let events: Vec<DownloadEvent> = rx.try_iter().collect();

        assert_eq!(report.state, BatchState::Completed);
        assert_eq!(report.tally, BatchTally { done: 2, skipped: 0, failed: 1, cancelled: 0 });
        assert!(matches!(report.jobs[1].error, Some(TransferError::RemoteNotFound { .. })));
        assert_eq!(report.failed_tiles(), vec![b]);
        assert_eq!(dir_entries(dir.path()), vec![a.file_name(), c.file_name()]);

        // A failed probe means sizes are not all known.
        let fractions = fractions(&events);
        assert!(fractions.iter().all(|(_, m)| *m == ProgressMode::Tiles));
        assert!(fractions.windows(2).all(|w| w[0].0 <= w[1].0));
        assert_eq!(fractions.last().map(|f| f.0), Some(1.0));
    }

    #[test]
    fn test_cancel_decision_runs_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let (a, b) = (tile(5, 5), tile(6, 5));
        std::fs::write(a.destination_in(dir.path()), b"x").unwrap();
        let source = Arc::new(
            FakeSource::new()
                .with(a, FakeTile::ok(vec![1; 4]))
                .with(b, FakeTile::ok(vec![1; 4])),
        );
        let (orch, rx) = orchestrator(source.clone());

        let handle = orch
            .start_batch(vec![a, b], dir.path(), &mut FixedChoice(ConflictChoice::CancelBatch))
            .unwrap();
        assert!(handle.is_finished());
        let report = handle.join().unwrap();
        let events: Vec<DownloadEvent> = rx.try_iter().collect();

        assert_eq!(report.state, BatchState::Cancelled);
        assert_eq!(report.tally, BatchTally { done: 0, skipped: 0, failed: 0, cancelled: 2 });
        assert!(source.opened().is_empty());
        assert!(source.probed().is_empty());
        assert_eq!(dir_entries(dir.path()), vec![a.file_name()]);
        assert!(matches!(events.last(), Some(DownloadEvent::BatchFinished { state: BatchState::Cancelled, .. })));
    }

    #[test]
    fn test_unavailable_destination_creates_no_jobs() {
        let dir = tempfile::tempdir().unwrap();
        let source = Arc::new(FakeSource::new());
        let (orch, rx) = orchestrator(source.clone());

        let err = orch
            .start_batch(vec![tile(1, 1)], &dir.path().join("missing"), &mut never_prompt())
            .unwrap_err();

        assert!(matches!(err, BatchError::DestinationUnavailable { .. }));
        assert!(rx.try_iter().next().is_none());
        assert!(source.opened().is_empty());
    }

    #[cfg(unix)]
    #[test]
    fn test_read_only_destination_creates_no_jobs() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let locked = dir.path().join("locked");
        std::fs::create_dir(&locked).unwrap();
        std::fs::set_permissions(&locked, std::fs::Permissions::from_mode(0o555)).unwrap();
        // Permission bits do not stop root.
        if std::fs::write(locked.join("x"), b"").is_ok() {
            return;
        }

        let source = Arc::new(FakeSource::new().with(tile(1, 1), FakeTile::ok(vec![1; 4])));
        let (orch, rx) = orchestrator(source.clone());
        let err = orch
            .start_batch(vec![tile(1, 1)], &locked, &mut never_prompt())
            .unwrap_err();

        match err {
            BatchError::DestinationUnavailable { path, reason } => {
                assert_eq!(path, locked);
                assert!(reason.starts_with("not writable"), "{}", reason);
            }
            other => panic!("expected DestinationUnavailable, got {:?}", other),
        }
        assert!(rx.try_iter().next().is_none());
        assert!(source.opened().is_empty());
        std::fs::set_permissions(&locked, std::fs::Permissions::from_mode(0o755)).unwrap();
    }

    #[test]
    fn test_unknown_sizes_use_tile_fraction() {
        let dir = tempfile::tempdir().unwrap();
        let (a, b) = (tile(7, 7), tile(8, 7));
        let source = Arc::new(
            FakeSource::new()
                .with(a, FakeTile::ok(vec![1; 6]).unknown_length())
                .with(b, FakeTile::ok(vec![1; 6]).unknown_length()),
        );
        let (orch, rx) = orchestrator(source);

        let report = orch
            .start_batch(vec![a, b], dir.path(), &mut never_prompt())
            .unwrap()
            .join()
            .unwrap();
        let events: Vec<DownloadEvent> = rx.try_iter().collect();

        assert_eq!(report.tally.done, 2);
        assert_eq!(report.jobs[0].total_bytes, None);
        let progress: Vec<(f64, ProgressMode, Progress)> = events
            .iter()
            .filter_map(|e| match e {
                DownloadEvent::BatchProgress { fraction, mode, job, .. } => Some((*fraction, *mode, *job)),
                _ => None,
            })
            .collect();
        assert!(progress.iter().all(|(_, m, _)| *m == ProgressMode::Tiles));
        assert!(progress.iter().all(|(_, _, job)| job.fraction().is_none()));
        assert!(progress.iter().any(|(f, _, _)| *f == 0.5));
        assert_eq!(progress.last().map(|p| p.0), Some(1.0));
    }

    #[test]
    fn test_events_for_job_precede_next_job() {
        let dir = tempfile::tempdir().unwrap();
        let tiles = vec![tile(1, 2), tile(1, 3), tile(1, 4)];
        let mut fake = FakeSource::new();
        for t in &tiles {
            fake = fake.with(*t, FakeTile::ok(vec![0; 9]));
        }
        let (orch, rx) = orchestrator(Arc::new(fake));

        orch.start_batch(tiles.clone(), dir.path(), &mut never_prompt())
            .unwrap()
            .join()
            .unwrap();
        let events: Vec<DownloadEvent> = rx.try_iter().collect();

        // Every progress event names the tile whose InProgress was announced last.
        let mut current: Option<String> = None;
        for event in &events {
            match event {
                DownloadEvent::TileStatusChanged { tile, status: JobStatus::InProgress } => {
                    current = Some(tile.display_name());
                }
                DownloadEvent::BatchProgress { current_tile, .. } => {
                    assert_eq!(Some(current_tile), current.as_ref());
                }
                _ => {}
            }
        }
    }

    #[test]
    fn test_probing_disabled_skips_head_requests() {
        let dir = tempfile::tempdir().unwrap();
        let t = tile(3, 3);
        let source = Arc::new(FakeSource::new().with(t, FakeTile::ok(vec![1; 4])));
        let (tx, rx) = crossbeam_channel::unbounded();
        let config = DownloadConfig::default().with_chunk_size(4).with_probe_sizes(false);
        let orch = Orchestrator::new(source.clone(), config, tx);

        orch.start_batch(vec![t], dir.path(), &mut never_prompt()).unwrap().join().unwrap();

        assert!(source.probed().is_empty());
        assert!(fractions(&rx.try_iter().collect::<Vec<_>>()).iter().all(|(_, m)| *m == ProgressMode::Tiles));
    }
}
