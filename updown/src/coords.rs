//! Geographic point to tile pixel resolution.
//!
//! ASTER GDEM v3 tiles use the pixel-as-area convention: every sample sits
//! at the centre of a 1-arc-second pixel, and sample centres fall on whole
//! arc-seconds. The raster's upper-left corner is therefore half a pixel
//! west and half a pixel north of the tile's north-west corner, and a tile
//! holds [`TILE_SAMPLES`] samples per side.
//!
//! Everything here is pure arithmetic with no I/O.

use serde::{Deserialize, Serialize};

/// Pixels per degree for 1-arc-second tiles.
pub const PIXELS_PER_DEGREE: u32 = 3600;

/// Samples per row/column of a tile (both edge parallels/meridians included).
pub const TILE_SAMPLES: u32 = PIXELS_PER_DEGREE + 1;

/// Width of one pixel in degrees.
pub const PIXEL_WIDTH: f64 = 1.0 / PIXELS_PER_DEGREE as f64;

/// Half a pixel in degrees.
pub const HALF_PIXEL: f64 = PIXEL_WIDTH / 2.0;

/// A geographic coordinate in decimal degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Point {
    /// Longitude, `[-180, 180)`.
    pub lng: f64,
    /// Latitude, `[-90, 90]`.
    pub lat: f64,
}

impl Point {
    pub fn new(lng: f64, lat: f64) -> Self {
        Self { lng, lat }
    }
}

/// Whole-degree south-west origin of a tile.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TileId {
    pub lng: i32,
    pub lat: i32,
}

impl TileId {
    pub fn new(lng: i32, lat: i32) -> Self {
        Self { lng, lat }
    }

    /// The tile containing `point`.
    ///
    /// Uses a true floor, so `-5.0` belongs to the tile at `-5` and `-5.1`
    /// to the tile at `-6`.
    pub fn containing(point: Point) -> Self {
        Self {
            lng: point.lng.floor() as i32,
            lat: point.lat.floor() as i32,
        }
    }
}

/// Pixel position in a tile's raster frame, origin at the upper-left pixel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PixelCoord {
    pub col: u32,
    pub row: u32,
}

impl PixelCoord {
    pub fn new(col: u32, row: u32) -> Self {
        Self { col, row }
    }
}

/// Fractional position of a point inside a 2×2 interpolation block.
///
/// Measured from the centre of the block's upper-left pixel in units of one
/// pixel: `x` grows east and `y` grows south.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct SubPixelOffset {
    pub x: f64,
    pub y: f64,
}

/// Which tile pixel a point reads from.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ResolvedPoint {
    pub tile: TileId,
    /// The nearest pixel, or the upper-left pixel of the 2×2 block when
    /// interpolating.
    pub pixel: PixelCoord,
    /// Present only when interpolating.
    pub offset: Option<SubPixelOffset>,
}

/// Resolve a point to its tile, pixel and (optionally) sub-pixel offset.
///
/// Out-of-range input produces a deterministic but meaningless tile;
/// callers are expected to validate coordinates first.
///
/// # Examples
///
/// ```
/// use updown::coords::{resolve, PixelCoord, Point, TileId};
///
/// let resolved = resolve(Point::new(25.5, 36.5), false);
/// assert_eq!(resolved.tile, TileId::new(25, 36));
/// assert_eq!(resolved.pixel, PixelCoord::new(1800, 1800));
/// ```
pub fn resolve(point: Point, interpolate: bool) -> ResolvedPoint {
    let tile = TileId::containing(point);

    // Upper-left corner of the upper-left pixel
    let raster_lng = tile.lng as f64 - HALF_PIXEL;
    let raster_lat = tile.lat as f64 + 1.0 + HALF_PIXEL;

    let mut d_lng = point.lng - raster_lng;
    let mut d_lat = raster_lat - point.lat;

    if !interpolate {
        let pixel = PixelCoord::new(
            pixel_index(d_lng, TILE_SAMPLES - 1),
            pixel_index(d_lat, TILE_SAMPLES - 1),
        );
        return ResolvedPoint {
            tile,
            pixel,
            offset: None,
        };
    }

    // Shift to pixel centres so the floor lands on the block's upper-left pixel
    d_lng -= HALF_PIXEL;
    d_lat -= HALF_PIXEL;

    // The block needs a right and lower neighbour inside the tile
    let pixel = PixelCoord::new(
        pixel_index(d_lng, TILE_SAMPLES - 2),
        pixel_index(d_lat, TILE_SAMPLES - 2),
    );

    let anchor_lng = tile.lng as f64 + pixel.col as f64 * PIXEL_WIDTH;
    let anchor_lat = tile.lat as f64 + 1.0 - pixel.row as f64 * PIXEL_WIDTH;

    let offset = SubPixelOffset {
        x: ((point.lng - anchor_lng) / PIXEL_WIDTH).clamp(0.0, 1.0),
        y: ((anchor_lat - point.lat) / PIXEL_WIDTH).clamp(0.0, 1.0),
    };

    ResolvedPoint {
        tile,
        pixel,
        offset: Some(offset),
    }
}

/// `floor(delta / PIXEL_WIDTH)` clamped to `0..=max`.
fn pixel_index(delta: f64, max: u32) -> u32 {
    let index = (delta / PIXEL_WIDTH).floor();
    if index <= 0.0 {
        0
    } else {
        (index as u32).min(max)
    }
}
