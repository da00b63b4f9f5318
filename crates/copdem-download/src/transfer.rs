//! Single-tile transfer.
//!
//! Bytes are streamed into a uniquely named temporary file next to the
//! destination and only renamed into place once the whole body has arrived,
//! so the destination path never holds a truncated tile.

use crate::source::TileSource;
use crate::{TileId, TransferError};
use serde::Serialize;
use std::io::{ErrorKind, Read, Write};
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::debug;

/// Batch-scoped cooperative cancellation flag.
///
/// Clones share the same flag. Once raised it stays raised.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Raise the flag. Returns `true` only for the call that raised it.
    pub fn cancel(&self) -> bool {
        self.flag
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }
}

/// Progress of a single transfer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum Progress {
    /// The server announced the size, so an exact fraction is available.
    Known { done: u64, total: u64 },
    /// No content length; only the byte count is known.
    Unknown { done: u64 },
}

impl Progress {
    fn new(done: u64, total: Option<u64>) -> Self {
        match total {
            Some(total) => Progress::Known { done, total },
            None => Progress::Unknown { done },
        }
    }

    /// Bytes received so far.
    pub fn done(&self) -> u64 {
        match *self {
            Progress::Known { done, .. } | Progress::Unknown { done } => done,
        }
    }

    /// Announced size, if any.
    pub fn total(&self) -> Option<u64> {
        match *self {
            Progress::Known { total, .. } => Some(total),
            Progress::Unknown { .. } => None,
        }
    }

    /// Completed fraction in `0.0..=1.0`, or `None` when indeterminate.
    pub fn fraction(&self) -> Option<f64> {
        match *self {
            Progress::Known { total: 0, .. } => Some(1.0),
            Progress::Known { done, total } => Some((done as f64 / total as f64).min(1.0)),
            Progress::Unknown { .. } => None,
        }
    }
}

/// How the finished temporary file is moved to its destination.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FinalizeMode {
    /// Replace an existing file. Only used under an overwrite-all decision.
    Overwrite,
    /// Fail rather than replace an existing file.
    NoClobber,
}

/// Parameters for one transfer.
#[derive(Debug, Clone, Copy)]
pub struct TransferRequest<'a> {
    /// Tile to fetch.
    pub tile: TileId,
    /// Final file path.
    pub destination: &'a Path,
    /// Suffix for the temporary file.
    pub temp_suffix: &'a str,
    /// Read buffer size.
    pub chunk_size: usize,
    /// Overwrite policy at rename time.
    pub finalize: FinalizeMode,
}

/// Result of a completed transfer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transferred {
    /// Bytes written to the destination.
    pub bytes: u64,
    /// Size announced by the server.
    pub total: Option<u64>,
}

/// Download one tile to `request.destination`.
///
/// `cancel` is checked before every read and before every write. On any
/// error, including cancellation, the temporary file is removed and the
/// destination is left untouched.
pub fn transfer_tile(
    source: &dyn TileSource,
    request: &TransferRequest<'_>,
    cancel: &CancelToken,
    on_progress: &mut dyn FnMut(Progress),
) -> Result<Transferred, TransferError> {
    if cancel.is_cancelled() {
        return Err(TransferError::Cancelled);
    }

    let body = source.open(&request.tile)?;
    let total = body.content_length;
    let mut reader = body.reader;

    let dir = match request.destination.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    let prefix = format!("{}.", request.tile.display_name());
    let mut temp = tempfile::Builder::new()
        .prefix(&prefix)
        .suffix(request.temp_suffix)
        .tempfile_in(dir)
        .map_err(|e| TransferError::local_write(dir, e))?;
    debug!("{}: streaming into {}", request.tile, temp.path().display());

    on_progress(Progress::new(0, total));

    let mut buf = vec![0u8; request.chunk_size.max(1)];
    let mut done: u64 = 0;
    loop {
        if cancel.is_cancelled() {
            return Err(TransferError::Cancelled);
        }
        let n = match reader.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => {
                return Err(TransferError::NetworkFailure(format!(
                    "read failed after {} bytes: {}",
                    done, e
                )))
            }
        };
        if cancel.is_cancelled() {
            return Err(TransferError::Cancelled);
        }
        temp.write_all(&buf[..n])
            .map_err(|e| TransferError::local_write(temp.path(), e))?;
        done += n as u64;
        on_progress(Progress::new(done, total));
    }

    if let Some(expected) = total {
        if done != expected {
            return Err(TransferError::NetworkFailure(format!(
                "body ended after {} of {} bytes",
                done, expected
            )));
        }
    }

    // Close the connection before touching the destination.
    drop(reader);

    temp.flush()
        .and_then(|_| temp.as_file().sync_all())
        .map_err(|e| TransferError::local_write(temp.path(), e))?;

    let persisted = match request.finalize {
        FinalizeMode::Overwrite => temp.persist(request.destination),
        FinalizeMode::NoClobber => temp.persist_noclobber(request.destination),
    };
    // A failed persist hands the temp file back; dropping it deletes it.
    persisted.map_err(|e| TransferError::local_write(request.destination, e.error))?;

    Ok(Transferred { bytes: done, total })
}
