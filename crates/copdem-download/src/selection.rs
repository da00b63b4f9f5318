//! The set of tiles the user has picked.

use crate::TileId;
use std::collections::BTreeSet;

/// Unique set of selected tiles.
///
/// [`snapshot`](Self::snapshot) order is `(lat, lon)` ascending,
/// which is also the order batches are downloaded in.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SelectionSet {
    tiles: BTreeSet<TileId>,
}

impl SelectionSet {
    /// Create an empty selection.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add the tile if absent, remove it if present.
    ///
    /// Returns `true` if the tile is selected afterwards.
    pub fn toggle(&mut self, tile: TileId) -> bool {
        if self.tiles.remove(&tile) {
            false
        } else {
            self.tiles.insert(tile);
            true
        }
    }

    /// Remove a single tile. Returns `true` if it was selected.
    pub fn remove(&mut self, tile: &TileId) -> bool {
        self.tiles.remove(tile)
    }

    /// Deselect everything.
    pub fn clear(&mut self) {
        self.tiles.clear();
    }

    /// Replace the whole selection.
    ///
    /// Returns `true` if the selection changed.
    pub fn replace<I: IntoIterator<Item = TileId>>(&mut self, tiles: I) -> bool {
        let tiles: BTreeSet<TileId> = tiles.into_iter().collect();
        if tiles == self.tiles {
            return false;
        }
        self.tiles = tiles;
        true
    }

    pub fn contains(&self, tile: &TileId) -> bool {
        self.tiles.contains(tile)
    }

    pub fn len(&self) -> usize {
        self.tiles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tiles.is_empty()
    }

    /// Frozen, ordered copy for a batch. Later edits do not affect it.
    pub fn snapshot(&self) -> Vec<TileId> {
        self.tiles.iter().copied().collect()
    }
}

impl FromIterator<TileId> for SelectionSet {
    fn from_iter<I: IntoIterator<Item = TileId>>(iter: I) -> Self {
        Self {
            tiles: iter.into_iter().collect(),
        }
    }
}
