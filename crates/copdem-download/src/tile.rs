//! Copernicus DEM tile identifiers.
//!
//! GLO-30 tiles are 1x1 degree cells named after their south-west corner.
//! The bucket layout is:
//!
//! ```text
//! Copernicus_DSM_COG_10_N41_00_E012_00_DEM/Copernicus_DSM_COG_10_N41_00_E012_00_DEM.tif
//! ```
//!
//! Latitude is zero-padded to two digits, longitude to three, and the
//! hemisphere letter is `N`/`E` for values >= 0 and `S`/`W` otherwise.

use crate::TileError;
use serde::Serialize;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// Southern-most valid tile latitude.
pub const MIN_LAT: i32 = -90;
/// Northern-most valid tile latitude (the tile covering 89..90).
pub const MAX_LAT: i32 = 89;
/// Western-most valid tile longitude.
pub const MIN_LON: i32 = -180;
/// Eastern-most valid tile longitude (the tile covering 179..180).
pub const MAX_LON: i32 = 179;

/// Public bucket holding the GLO-30 tiles.
pub const DEFAULT_BASE_URL: &str = "https://copernicus-dem-30m.s3.amazonaws.com";

const NAME_PREFIX: &str = "Copernicus_DSM_COG_10_";
const NAME_SUFFIX: &str = "_DEM";
const FILE_EXTENSION: &str = "tif";

/// A 1x1 degree tile identified by its south-west corner.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct TileId {
    lat: i32,
    lon: i32,
}

impl TileId {
    /// Create a tile identifier, rejecting coordinates outside the grid.
    pub fn new(lat: i32, lon: i32) -> Result<Self, TileError> {
        if !(MIN_LAT..=MAX_LAT).contains(&lat) || !(MIN_LON..=MAX_LON).contains(&lon) {
            return Err(TileError::InvalidCoordinate { lat, lon });
        }
        Ok(Self { lat, lon })
    }

    /// The tile containing a floating point coordinate.
    pub fn containing(lat: f64, lon: f64) -> Result<Self, TileError> {
        if !lat.is_finite() || !lon.is_finite() {
            return Err(TileError::InvalidCoordinate {
                lat: lat as i32,
                lon: lon as i32,
            });
        }
        let lat = lat.floor();
        let lon = lon.floor();
        if lat < i32::MIN as f64 || lat > i32::MAX as f64 || lon < i32::MIN as f64 || lon > i32::MAX as f64 {
            return Err(TileError::InvalidCoordinate {
                lat: lat as i32,
                lon: lon as i32,
            });
        }
        Self::new(lat as i32, lon as i32)
    }

    /// Latitude of the south-west corner.
    pub fn lat(&self) -> i32 {
        self.lat
    }

    /// Longitude of the south-west corner.
    pub fn lon(&self) -> i32 {
        self.lon
    }

    fn lat_part(&self) -> String {
        let hemi = if self.lat >= 0 { 'N' } else { 'S' };
        format!("{}{:02}", hemi, self.lat.unsigned_abs())
    }

    fn lon_part(&self) -> String {
        let hemi = if self.lon >= 0 { 'E' } else { 'W' };
        format!("{}{:03}", hemi, self.lon.unsigned_abs())
    }

    /// Short form such as `N41E012`, accepted back by [`FromStr`].
    pub fn short_name(&self) -> String {
        format!("{}{}", self.lat_part(), self.lon_part())
    }

    /// Canonical tile name, also used as the local file stem.
    pub fn display_name(&self) -> String {
        format!(
            "{}{}_00_{}_00{}",
            NAME_PREFIX,
            self.lat_part(),
            self.lon_part(),
            NAME_SUFFIX
        )
    }

    /// Object key relative to the bucket root.
    pub fn object_key(&self) -> String {
        let name = self.display_name();
        format!("{}/{}.{}", name, name, FILE_EXTENSION)
    }

    /// Full URL of the tile under `base_url`.
    pub fn resource_locator(&self, base_url: &str) -> String {
        format!("{}/{}", base_url.trim_end_matches('/'), self.object_key())
    }

    /// Name of the downloaded file.
    pub fn file_name(&self) -> String {
        format!("{}.{}", self.display_name(), FILE_EXTENSION)
    }

    /// Final destination of this tile inside `dir`.
    pub fn destination_in(&self, dir: &Path) -> PathBuf {
        dir.join(self.file_name())
    }
}

impl fmt::Display for TileId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.display_name())
    }
}

/// Parse a hemisphere-prefixed component like `N41` or `w075`.
fn parse_component(s: &str, positive: char, negative: char) -> Option<i32> {
    let mut chars = s.chars();
    let hemi = chars.next()?.to_ascii_uppercase();
    let digits = chars.as_str();
    if digits.is_empty() || !digits.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    let value: i32 = digits.parse().ok()?;
    if hemi == positive {
        Some(value)
    } else if hemi == negative {
        Some(-value)
    } else {
        None
    }
}

impl FromStr for TileId {
    type Err = TileError;

    /// Accepts `N41E012` style short names and full display names,
    /// with or without the `.tif` extension.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || TileError::InvalidName(s.to_string());
        let trimmed = s.trim();
        let trimmed = trimmed.strip_suffix(".tif").unwrap_or(trimmed);

        let (lat, lon) = if let Some(rest) = trimmed.strip_prefix(NAME_PREFIX) {
            // N41_00_E012_00_DEM
            let rest = rest.strip_suffix(NAME_SUFFIX).ok_or_else(invalid)?;
            let parts: Vec<&str> = rest.split('_').collect();
            if parts.len() != 4 || parts[1] != "00" || parts[3] != "00" {
                return Err(invalid());
            }
            (
                parse_component(parts[0], 'N', 'S').ok_or_else(invalid)?,
                parse_component(parts[2], 'E', 'W').ok_or_else(invalid)?,
            )
        } else {
            let split = trimmed
                .char_indices()
                .skip(1)
                .find(|(_, c)| matches!(c.to_ascii_uppercase(), 'E' | 'W'))
                .map(|(i, _)| i)
                .ok_or_else(invalid)?;
            let (lat_str, lon_str) = trimmed.split_at(split);
            (
                parse_component(lat_str, 'N', 'S').ok_or_else(invalid)?,
                parse_component(lon_str, 'E', 'W').ok_or_else(invalid)?,
            )
        };

        TileId::new(lat, lon)
    }
}

/// Geographic bounding box in degrees.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoundingBox {
    /// Western edge.
    pub min_lon: f64,
    /// Southern edge.
    pub min_lat: f64,
    /// Eastern edge.
    pub max_lon: f64,
    /// Northern edge.
    pub max_lat: f64,
}

impl BoundingBox {
    /// Create a validated bounding box (argument order matches bboxfinder.com).
    pub fn new(min_lon: f64, min_lat: f64, max_lon: f64, max_lat: f64) -> Result<Self, TileError> {
        let lon_ok = |v: f64| v.is_finite() && (-180.0..=180.0).contains(&v);
        let lat_ok = |v: f64| v.is_finite() && (-90.0..=90.0).contains(&v);
        if !(lon_ok(min_lon) && lon_ok(max_lon) && lat_ok(min_lat) && lat_ok(max_lat)) {
            return Err(TileError::InvalidBoundingBox(format!(
                "[{}, {}, {}, {}]: longitude must be within -180..180 and latitude within -90..90",
                min_lon, min_lat, max_lon, max_lat
            )));
        }
        if min_lon >= max_lon || min_lat >= max_lat {
            return Err(TileError::InvalidBoundingBox(format!(
                "[{}, {}, {}, {}]: minimum must be less than maximum",
                min_lon, min_lat, max_lon, max_lat
            )));
        }
        Ok(Self {
            min_lon,
            min_lat,
            max_lon,
            max_lat,
        })
    }

    /// All tiles intersecting the box, south to north then west to east.
    pub fn tiles(&self) -> Result<Vec<TileId>, TileError> {
        let lat_start = self.min_lat.floor() as i32;
        let lat_end = self.max_lat.ceil() as i32;
        let lon_start = self.min_lon.floor() as i32;
        let lon_end = self.max_lon.ceil() as i32;

        let mut tiles = Vec::new();
        for lat in lat_start..lat_end {
            for lon in lon_start..lon_end {
                tiles.push(TileId::new(lat, lon)?);
            }
        }
        Ok(tiles)
    }
}
