//! Application session.
//!
//! The [`Session`] is the one owner of the selection set and of the batch
//! currently running. Its methods are the inbound events an interaction
//! surface (map view, CLI) delivers; outbound notifications are read from
//! [`Session::events`].

use crate::conflict::ConflictPrompt;
use crate::job::BatchReport;
use crate::orchestrator::{BatchHandle, DownloadEvent, Orchestrator};
use crate::source::{HttpTileSource, TileSource};
use crate::transfer::CancelToken;
use crate::{BatchError, DownloadConfig, SelectionSet, TileError, TileId};
use crossbeam_channel::Receiver;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info};

/// Status-bar information for the pointer position.
#[derive(Debug, Clone, PartialEq)]
pub struct PointerStatus {
    /// Formatted coordinates, e.g. `Lat: 41.90000, Lon: 12.50000`.
    pub text: String,
    /// Map zoom level as reported by the surface.
    pub zoom: u8,
    /// Tile under the pointer, if it is on the grid.
    pub tile: Option<TileId>,
}

/// Selection state plus at most one running batch.
pub struct Session {
    selection: SelectionSet,
    orchestrator: Orchestrator,
    events: Receiver<DownloadEvent>,
    active: Option<BatchHandle>,
}

impl Session {
    /// Create a session fetching over HTTP.
    pub fn new(config: DownloadConfig) -> Result<Self, BatchError> {
        let source = HttpTileSource::new(&config)?;
        Ok(Self::with_source(Arc::new(source), config))
    }

    /// Create a session with a custom tile source.
    pub fn with_source(source: Arc<dyn TileSource>, config: DownloadConfig) -> Self {
        let (tx, rx) = crossbeam_channel::unbounded();
        Self {
            selection: SelectionSet::new(),
            orchestrator: Orchestrator::new(source, config, tx),
            events: rx,
            active: None,
        }
    }

    pub fn selection(&self) -> &SelectionSet {
        &self.selection
    }

    pub fn config(&self) -> &DownloadConfig {
        self.orchestrator.config()
    }

    /// Outbound notifications for every batch of this session.
    pub fn events(&self) -> &Receiver<DownloadEvent> {
        &self.events
    }

    /// A tile was clicked. Returns whether it is now selected.
    pub fn tile_toggled(&mut self, lat: i32, lon: i32) -> Result<bool, TileError> {
        let tile = TileId::new(lat, lon)?;
        let selected = self.selection.toggle(tile);
        debug!(
            "Tile {} {} ({} selected)",
            tile.short_name(),
            if selected { "selected" } else { "deselected" },
            self.selection.len()
        );
        Ok(selected)
    }

    /// Replace the selection wholesale, e.g. from a bounding box.
    pub fn select_tiles<I: IntoIterator<Item = TileId>>(&mut self, tiles: I) -> bool {
        self.selection.replace(tiles)
    }

    /// Deselect a single tile.
    pub fn deselect(&mut self, tile: &TileId) -> bool {
        self.selection.remove(tile)
    }

    pub fn clear_selection(&mut self) {
        debug!("Clearing {} selected tiles", self.selection.len());
        self.selection.clear();
    }

    /// The pointer moved over the map. Has no effect on session state.
    pub fn pointer_moved(&self, lat: f64, lon: f64, zoom: u8) -> PointerStatus {
        PointerStatus {
            text: format!("Lat: {:.5}, Lon: {:.5}", lat, lon),
            zoom,
            tile: TileId::containing(lat, lon).ok(),
        }
    }

    /// Whether a batch is still running.
    pub fn is_downloading(&self) -> bool {
        self.active.as_ref().is_some_and(|h| !h.is_finished())
    }

    /// Start downloading a snapshot of the current selection into `dest`.
    ///
    /// Runs the conflict check (and `prompt`, if needed) before returning.
    pub fn download_requested(
        &mut self,
        dest: &Path,
        prompt: &mut dyn ConflictPrompt,
    ) -> Result<CancelToken, BatchError> {
        let token = CancelToken::new();
        self.download_with_cancel(dest, prompt, token.clone())?;
        Ok(token)
    }

    /// Like [`download_requested`](Self::download_requested), with a token the
    /// caller already holds. A token raised before the batch starts cancels
    /// every job that was not skipped.
    pub fn download_with_cancel(
        &mut self,
        dest: &Path,
        prompt: &mut dyn ConflictPrompt,
        cancel: CancelToken,
    ) -> Result<(), BatchError> {
        if self.is_downloading() {
            info!("Download already in progress");
            return Err(BatchError::BatchInProgress);
        }
        if self.selection.is_empty() {
            return Err(BatchError::NothingSelected);
        }
        // Reap a finished batch nobody waited for.
        if let Some(previous) = self.active.take() {
            let _ = previous.join();
        }

        let snapshot = self.selection.snapshot();
        info!("Download requested: {} tiles into {}", snapshot.len(), dest.display());
        let handle = self.orchestrator.start_batch_with_cancel(snapshot, dest, prompt, cancel)?;
        self.active = Some(handle);
        Ok(())
    }

    /// Ask the running batch to stop. Returns `false` if nothing was running
    /// or it was already asked.
    pub fn cancel_requested(&self) -> bool {
        match &self.active {
            Some(handle) if !handle.is_finished() => {
                info!("Stopping download...");
                handle.cancel()
            }
            _ => false,
        }
    }

    /// Block until the current batch finishes. `None` if there is none.
    pub fn wait(&mut self) -> Option<Result<BatchReport, BatchError>> {
        self.active.take().map(BatchHandle::join)
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        if let Some(handle) = self.active.take() {
            if !handle.is_finished() {
                info!("Session closing, cancelling running batch");
                handle.cancel();
            }
            let _ = handle.join();
        }
    }
}
