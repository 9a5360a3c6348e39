//! ASTER GDEM filename utilities.
//!
//! This module provides functions for converting between tile origins and
//! ASTER GDEM v3 GeoTIFF filenames.
//!
//! # Filename Format
//!
//! Tiles follow the naming convention `ASTGTMV003_{N|S}{lat}{E|W}{lng}_dem.tif`
//!
//! - Latitude: 2 digits with N/S prefix (e.g., N36, S06)
//! - Longitude: 3 digits with E/W prefix (e.g., E025, W004)
//!
//! The name represents the **southwest corner** of the 1° × 1° tile. USGS
//! distributes each tile as `ASTGTMV003_{N|S}{lat}{E|W}{lng}.zip`, holding
//! the `_dem.tif` next to a `_num.tif` quality layer.

use crate::coords::TileId;

const PREFIX: &str = "ASTGTMV003_";
const DEM_SUFFIX: &str = "_dem.tif";
const ARCHIVE_SUFFIX: &str = ".zip";

/// Return the GeoTIFF filename for a tile.
///
/// # Examples
///
/// ```
/// use updown::{coords::TileId, filename::tile_file_name};
///
/// assert_eq!(tile_file_name(TileId::new(25, 36)), "ASTGTMV003_N36E025_dem.tif");
/// assert_eq!(tile_file_name(TileId::new(-4, -6)), "ASTGTMV003_S06W004_dem.tif");
/// ```
pub fn tile_file_name(tile: TileId) -> String {
    format!("{}{}{}", PREFIX, tile_stem(tile), DEM_SUFFIX)
}

/// Return the USGS distribution archive name for a tile.
///
/// ```
/// use updown::{coords::TileId, filename::archive_file_name};
///
/// assert_eq!(archive_file_name(TileId::new(25, 36)), "ASTGTMV003_N36E025.zip");
/// ```
pub fn archive_file_name(tile: TileId) -> String {
    format!("{}{}{}", PREFIX, tile_stem(tile), ARCHIVE_SUFFIX)
}

/// `N36E025` part of the name.
fn tile_stem(tile: TileId) -> String {
    let lat_prefix = if tile.lat >= 0 { 'N' } else { 'S' };
    let lng_prefix = if tile.lng >= 0 { 'E' } else { 'W' };

    format!(
        "{}{:02}{}{:03}",
        lat_prefix,
        tile.lat.unsigned_abs(),
        lng_prefix,
        tile.lng.unsigned_abs()
    )
}

/// Parse a tile filename back into its origin.
///
/// Accepts a bare name or a path, the `_dem.tif` name or the `.zip`
/// archive name, and hemisphere letters in either case.
///
/// # Examples
///
/// ```
/// use updown::{coords::TileId, filename::parse_tile_file_name};
///
/// assert_eq!(parse_tile_file_name("ASTGTMV003_N36E025_dem.tif"), Some(TileId::new(25, 36)));
/// assert_eq!(parse_tile_file_name("/data/ASTGTMV003_S06W004.zip"), Some(TileId::new(-4, -6)));
/// assert_eq!(parse_tile_file_name("N36E025.hgt"), None);
/// ```
pub fn parse_tile_file_name(filename: &str) -> Option<TileId> {
    // Extract just the filename if a path is given
    let name = filename
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or(filename);

    let name = name.strip_prefix(PREFIX)?;
    let name = name
        .strip_suffix(DEM_SUFFIX)
        .or_else(|| name.strip_suffix(ARCHIVE_SUFFIX))?;

    // Must be exactly 7 characters: N00E000
    if name.len() != 7 || !name.is_ascii() {
        return None;
    }

    let bytes = name.as_bytes();

    let lat_sign = match bytes[0] {
        b'N' | b'n' => 1,
        b'S' | b's' => -1,
        _ => return None,
    };
    let lat: i32 = name[1..3].parse().ok()?;

    let lng_sign = match bytes[3] {
        b'E' | b'e' => 1,
        b'W' | b'w' => -1,
        _ => return None,
    };
    let lng: i32 = name[4..7].parse().ok()?;

    Some(TileId::new(lng * lng_sign, lat * lat_sign))
}

/// Check that a coordinate lies in the physical range.
///
/// Longitude must be in `[-180, 180)` and latitude in `[-90, 90]`.
pub fn is_valid_coord(lng: f64, lat: f64) -> bool {
    (-180.0..180.0).contains(&lng) && (-90.0..=90.0).contains(&lat)
}
