//! In-memory tile source for unit tests.

use crate::source::{RemoteBody, TileSource};
use crate::transfer::CancelToken;
use crate::{TileId, TransferError};
use crossbeam_channel::Receiver;
use std::collections::HashMap;
use std::io::{self, Read};
use std::path::Path;
use std::sync::Mutex;

/// Scripted response for one tile.
#[derive(Clone)]
pub(crate) struct FakeTile {
    data: Vec<u8>,
    length: Option<u64>,
    probe_length: Option<u64>,
    error: Option<TransferError>,
    cancel_after: Option<(usize, CancelToken)>,
    fail_after: Option<usize>,
    gate: Option<Receiver<()>>,
}

impl FakeTile {
    pub(crate) fn ok(data: Vec<u8>) -> Self {
        let len = data.len() as u64;
        Self {
            data,
            length: Some(len),
            probe_length: Some(len),
            error: None,
            cancel_after: None,
            fail_after: None,
            gate: None,
        }
    }

    pub(crate) fn error(error: TransferError) -> Self {
        Self {
            error: Some(error),
            probe_length: None,
            ..Self::ok(Vec::new())
        }
    }

    pub(crate) fn not_found() -> Self {
        Self::error(TransferError::RemoteNotFound {
            url: "fake://not-found".into(),
        })
    }

    /// Neither HEAD nor GET reports a size.
    pub(crate) fn unknown_length(self) -> Self {
        self.with_length(None).with_probe_length(None)
    }

    pub(crate) fn with_length(mut self, length: Option<u64>) -> Self {
        self.length = length;
        self
    }

    pub(crate) fn with_probe_length(mut self, length: Option<u64>) -> Self {
        self.probe_length = length;
        self
    }

    /// Raise `token` once `bytes` have been served, as if the user hit cancel.
    pub(crate) fn cancel_after(mut self, bytes: usize, token: CancelToken) -> Self {
        self.cancel_after = Some((bytes, token));
        self
    }

    /// Block the first read until `gate` yields or disconnects.
    pub(crate) fn wait_for(mut self, gate: Receiver<()>) -> Self {
        self.gate = Some(gate);
        self
    }

    /// Return an I/O error once `bytes` have been served.
    pub(crate) fn fail_after(mut self, bytes: usize) -> Self {
        self.fail_after = Some(bytes);
        self
    }
}

/// Reader that serves at most `chunk` bytes per call.
struct ScriptedReader {
    data: Vec<u8>,
    pos: usize,
    chunk: usize,
    cancel_after: Option<(usize, CancelToken)>,
    fail_after: Option<usize>,
    gate: Option<Receiver<()>>,
}

impl Read for ScriptedReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if let Some(gate) = self.gate.take() {
            let _ = gate.recv();
        }
        if let Some(limit) = self.fail_after {
            if self.pos >= limit {
                return Err(io::Error::new(io::ErrorKind::ConnectionReset, "connection reset"));
            }
        }
        let n = self.chunk.min(buf.len()).min(self.data.len() - self.pos);
        buf[..n].copy_from_slice(&self.data[self.pos..self.pos + n]);
        self.pos += n;
        if let Some((after, token)) = &self.cancel_after {
            if self.pos >= *after {
                token.cancel();
            }
        }
        Ok(n)
    }
}

/// Tile source answering from a fixed table and recording every request.
#[derive(Default)]
pub(crate) struct FakeSource {
    tiles: HashMap<TileId, FakeTile>,
    chunk: usize,
    opened: Mutex<Vec<TileId>>,
    probed: Mutex<Vec<TileId>>,
}

impl FakeSource {
    pub(crate) fn new() -> Self {
        Self {
            chunk: 4,
            ..Default::default()
        }
    }

    pub(crate) fn with(mut self, tile: TileId, fake: FakeTile) -> Self {
        self.tiles.insert(tile, fake);
        self
    }

    pub(crate) fn opened(&self) -> Vec<TileId> {
        self.opened.lock().unwrap().clone()
    }

    pub(crate) fn probed(&self) -> Vec<TileId> {
        self.probed.lock().unwrap().clone()
    }

    fn lookup(&self, tile: &TileId) -> Result<&FakeTile, TransferError> {
        let fake = self
            .tiles
            .get(tile)
            .ok_or_else(|| TransferError::RemoteNotFound { url: self.locator(tile) })?;
        match &fake.error {
            Some(err) => Err(err.clone()),
            None => Ok(fake),
        }
    }
}

impl TileSource for FakeSource {
    fn probe(&self, tile: &TileId) -> Result<Option<u64>, TransferError> {
        self.probed.lock().unwrap().push(*tile);
        Ok(self.lookup(tile)?.probe_length)
    }

    fn open(&self, tile: &TileId) -> Result<RemoteBody, TransferError> {
        self.opened.lock().unwrap().push(*tile);
        let fake = self.lookup(tile)?;
        let reader = ScriptedReader {
            data: fake.data.clone(),
            pos: 0,
            chunk: self.chunk,
            cancel_after: fake.cancel_after.clone(),
            fail_after: fake.fail_after,
            gate: fake.gate.clone(),
        };
        Ok(RemoteBody::new(fake.length, reader))
    }

    fn locator(&self, tile: &TileId) -> String {
        format!("fake://{}", tile.object_key())
    }
}

/// Sorted file names in a directory.
pub(crate) fn dir_entries(dir: &Path) -> Vec<String> {
    let mut names: Vec<String> = std::fs::read_dir(dir)
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    names.sort();
    names
}
