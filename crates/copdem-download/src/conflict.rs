//! Pre-existing file detection and the single per-batch decision.

use crate::{BatchError, TileId};
use std::collections::BTreeSet;
use std::path::Path;
use tracing::{debug, info};

/// What the user chose when some files already exist.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConflictChoice {
    OverwriteAll,
    SkipExisting,
    CancelBatch,
}

/// The decision governing a whole batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConflictDecision {
    /// Nothing collided; the user was not asked.
    ProceedAll,
    OverwriteAll,
    SkipExisting,
    CancelBatch,
}

impl From<ConflictChoice> for ConflictDecision {
    fn from(choice: ConflictChoice) -> Self {
        match choice {
            ConflictChoice::OverwriteAll => ConflictDecision::OverwriteAll,
            ConflictChoice::SkipExisting => ConflictDecision::SkipExisting,
            ConflictChoice::CancelBatch => ConflictDecision::CancelBatch,
        }
    }
}

/// Asks the user how to handle colliding files.
///
/// Called at most once per batch, with the file names that already exist.
pub trait ConflictPrompt {
    fn decide(&mut self, conflicting: &[String]) -> ConflictChoice;
}

impl<F> ConflictPrompt for F
where
    F: FnMut(&[String]) -> ConflictChoice,
{
    fn decide(&mut self, conflicting: &[String]) -> ConflictChoice {
        self(conflicting)
    }
}

/// A prompt that always gives the same answer, for non-interactive runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FixedChoice(pub ConflictChoice);

impl ConflictPrompt for FixedChoice {
    fn decide(&mut self, conflicting: &[String]) -> ConflictChoice {
        debug!("{} existing files, applying {:?}", conflicting.len(), self.0);
        self.0
    }
}

/// Outcome of conflict resolution for one batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConflictResolution {
    pub decision: ConflictDecision,
    /// Tiles whose destination file already existed.
    pub conflicts: BTreeSet<TileId>,
}

impl ConflictResolution {
    pub fn is_conflict(&self, tile: &TileId) -> bool {
        self.conflicts.contains(tile)
    }
}

/// Fail unless `dir` is an existing, writable directory.
pub fn check_destination(dir: &Path) -> Result<(), BatchError> {
    let unavailable = |reason: String| BatchError::DestinationUnavailable {
        path: dir.to_path_buf(),
        reason,
    };

    let meta = std::fs::metadata(dir).map_err(|e| unavailable(e.to_string()))?;
    if !meta.is_dir() {
        return Err(unavailable("not a directory".into()));
    }

    // Permission bits are unreliable (ACLs, root, read-only mounts), so try it.
    tempfile::Builder::new()
        .prefix(".copdem-write-check")
        .tempfile_in(dir)
        .map_err(|e| unavailable(format!("not writable: {}", e)))?;
    Ok(())
}

/// Determine which tiles already exist in `dir` and obtain one decision.
///
/// `prompt` is only consulted when at least one file exists.
pub fn resolve_conflicts(
    dir: &Path,
    tiles: &[TileId],
    prompt: &mut dyn ConflictPrompt,
) -> Result<ConflictResolution, BatchError> {
    check_destination(dir)?;

    let conflicts: BTreeSet<TileId> = tiles
        .iter()
        .filter(|t| t.destination_in(dir).exists())
        .copied()
        .collect();

    if conflicts.is_empty() {
        return Ok(ConflictResolution {
            decision: ConflictDecision::ProceedAll,
            conflicts,
        });
    }

    // Keep the batch order in what the user sees.
    let names: Vec<String> = tiles
        .iter()
        .filter(|t| conflicts.contains(t))
        .map(|t| t.file_name())
        .collect();
    let decision = ConflictDecision::from(prompt.decide(&names));
    info!(
        "{} of {} files already exist in {}: {:?}",
        conflicts.len(),
        tiles.len(),
        dir.display(),
        decision
    );

    Ok(ConflictResolution { decision, conflicts })
}
