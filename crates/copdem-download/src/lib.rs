//! # copdem-download
//!
//! Batch downloader for Copernicus GLO-30 DEM tiles.
//!
//! ## Overview
//!
//! The Copernicus DEM is published as one GeoTIFF per 1x1 degree cell in a
//! public S3 bucket. A cell is named by its south-west corner:
//!
//! - Latitude `N41` / `S01`, longitude `E012` / `W001`
//! - Object key: `Copernicus_DSM_COG_10_N41_00_E012_00_DEM/Copernicus_DSM_COG_10_N41_00_E012_00_DEM.tif`
//! - Fetched from: `https://copernicus-dem-30m.s3.amazonaws.com/{key}`
//!
//! The crate keeps a set of selected tiles, snapshots it when a download is
//! requested, asks once how to treat files that already exist, and then
//! transfers the tiles one at a time on a background thread. Each file is
//! streamed into a temporary sibling and renamed into place only once it is
//! complete, so the destination directory never holds a partial tile.
//!
//! ## Examples
//!
//! ```no_run
//! use copdem_download::{ConflictChoice, DownloadConfig, DownloadEvent, FixedChoice, Session};
//! use std::path::Path;
//!
//! let mut session = Session::new(DownloadConfig::default())?;
//! session.tile_toggled(41, 12)?;
//! session.tile_toggled(42, 12)?;
//!
//! session.download_requested(Path::new("dem"), &mut FixedChoice(ConflictChoice::SkipExisting))?;
//! for event in session.events().iter() {
//!     match event {
//!         DownloadEvent::BatchProgress { fraction, current_tile, .. } => {
//!             println!("{:5.1}% {}", fraction * 100.0, current_tile);
//!         }
//!         DownloadEvent::BatchFinished { state, tally } => {
//!             println!("{:?}: {}", state, tally);
//!             break;
//!         }
//!         _ => {}
//!     }
//! }
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

mod config;
mod conflict;
mod error;
mod job;
mod orchestrator;
mod selection;
mod session;
mod source;
mod tile;
mod transfer;

#[cfg(test)]
mod testing;

pub use config::{DownloadConfig, DEFAULT_CHUNK_SIZE, DEFAULT_TIMEOUT_SECS};
pub use conflict::{
    check_destination, resolve_conflicts, ConflictChoice, ConflictDecision, ConflictPrompt, ConflictResolution,
    FixedChoice,
};
pub use error::{BatchError, ConfigError, TileError, TransferError};
pub use job::{BatchReport, BatchState, BatchTally, DownloadJob, JobStatus};
pub use orchestrator::{BatchHandle, DownloadEvent, Orchestrator, ProgressMode};
pub use selection::SelectionSet;
pub use session::{PointerStatus, Session};
pub use source::{classify_status, HttpTileSource, RemoteBody, TileSource};
pub use tile::{BoundingBox, TileId, DEFAULT_BASE_URL, MAX_LAT, MAX_LON, MIN_LAT, MIN_LON};
pub use transfer::{transfer_tile, CancelToken, FinalizeMode, Progress, TransferRequest, Transferred};
