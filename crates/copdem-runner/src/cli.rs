//! Command-line arguments.

use clap::{Args, Parser, Subcommand, ValueEnum};
use copdem_download::{BoundingBox, ConflictChoice, DownloadConfig, TileId};
use std::collections::BTreeSet;
use std::path::PathBuf;

use crate::CliError;

/// Output directory used when `-o` is not given.
pub const DEFAULT_OUTPUT_DIR: &str = "copernicus_dem_tiles";

/// Download Copernicus GLO-30 DEM tiles.
#[derive(Parser, Debug)]
#[command(name = "copdem")]
#[command(version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// YAML configuration file
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Download the selected tiles
    Download(DownloadArgs),

    /// Print the selected tiles without downloading
    List(ListArgs),
}

/// Tile selection shared by every subcommand.
#[derive(Args, Debug, Clone, Default)]
pub struct SelectionArgs {
    /// Tile to select, e.g. N41E012 or a full Copernicus name (repeatable)
    #[arg(short, long = "tile", value_name = "TILE")]
    pub tiles: Vec<TileId>,

    /// Select every tile touching a bounding box
    #[arg(
        long,
        num_args = 4,
        value_names = ["MIN_LON", "MIN_LAT", "MAX_LON", "MAX_LAT"],
        allow_negative_numbers = true
    )]
    pub bbox: Option<Vec<f64>>,
}

impl SelectionArgs {
    /// All selected tiles, sorted and de-duplicated.
    pub fn resolve(&self) -> Result<Vec<TileId>, CliError> {
        let mut tiles: BTreeSet<TileId> = self.tiles.iter().copied().collect();
        if let Some(bbox) = &self.bbox {
            // clap enforces exactly four values.
            let bbox = BoundingBox::new(bbox[0], bbox[1], bbox[2], bbox[3])?;
            tiles.extend(bbox.tiles()?);
        }
        Ok(tiles.into_iter().collect())
    }
}

/// Overrides applied on top of the configuration file.
#[derive(Args, Debug, Clone, Default)]
pub struct ConfigOverrides {
    /// Bucket root URL
    #[arg(long)]
    pub base_url: Option<String>,

    /// Connect, response and per-read timeout in seconds
    #[arg(long)]
    pub timeout_secs: Option<u64>,

    /// Skip the HEAD size pre-flight (progress falls back to tile counts)
    #[arg(long)]
    pub no_probe: bool,
}

impl ConfigOverrides {
    pub fn apply(&self, mut config: DownloadConfig) -> DownloadConfig {
        if let Some(url) = &self.base_url {
            config.base_url = url.clone();
        }
        if let Some(secs) = self.timeout_secs {
            config.timeout_secs = secs;
        }
        if self.no_probe {
            config.probe_sizes = false;
        }
        config
    }
}

/// How to answer the conflict question.
#[derive(ValueEnum, Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum OnConflict {
    /// Ask on the terminal
    #[default]
    Ask,
    /// Overwrite every existing file
    Overwrite,
    /// Keep existing files and download the rest
    Skip,
    /// Abort the batch
    Cancel,
}

impl OnConflict {
    /// Fixed answer, or `None` when the user must be asked.
    pub fn fixed(self) -> Option<ConflictChoice> {
        match self {
            OnConflict::Ask => None,
            OnConflict::Overwrite => Some(ConflictChoice::OverwriteAll),
            OnConflict::Skip => Some(ConflictChoice::SkipExisting),
            OnConflict::Cancel => Some(ConflictChoice::CancelBatch),
        }
    }
}

#[derive(Args, Debug, Clone)]
pub struct DownloadArgs {
    #[command(flatten)]
    pub selection: SelectionArgs,

    #[command(flatten)]
    pub overrides: ConfigOverrides,

    /// Output directory [default: copernicus_dem_tiles, created if missing]
    #[arg(short, long, value_name = "DIR")]
    pub output: Option<PathBuf>,

    /// What to do when files already exist
    #[arg(long, value_enum, default_value_t = OnConflict::Ask)]
    pub on_conflict: OnConflict,

    /// Write the batch report as JSON
    #[arg(long, value_name = "FILE")]
    pub report: Option<PathBuf>,

    /// Run failed tiles once more as a new batch
    #[arg(long)]
    pub retry_failed: bool,
}

#[derive(Args, Debug, Clone)]
pub struct ListArgs {
    #[command(flatten)]
    pub selection: SelectionArgs,

    #[command(flatten)]
    pub overrides: ConfigOverrides,

    /// Print download URLs instead of names
    #[arg(long)]
    pub urls: bool,
}
