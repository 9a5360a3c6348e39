//! Grouping of batch points into per-tile read plans.
//!
//! Aggregation is a build phase: a private builder collects points tile by
//! tile, and [`aggregate`] hands back immutable [`ImageAssociation`]s. Each
//! association lists every distinct pixel its tile must supply, who needs
//! each pixel, and the smallest window that covers them all, so a tile is
//! read exactly once however many points fall on it.

use std::collections::HashMap;

use crate::coords::{resolve, PixelCoord, Point, SubPixelOffset, TileId};
use crate::filename::tile_file_name;
use crate::raster::RasterWindow;

/// Position of a pixel inside a 2×2 interpolation block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Corner {
    TopLeft,
    TopRight,
    BottomLeft,
    BottomRight,
}

impl Corner {
    pub const ALL: [Corner; 4] = [
        Corner::TopLeft,
        Corner::TopRight,
        Corner::BottomLeft,
        Corner::BottomRight,
    ];

    /// Column and row step from the block's upper-left pixel.
    fn step(self) -> (u32, u32) {
        match self {
            Corner::TopLeft => (0, 0),
            Corner::TopRight => (1, 0),
            Corner::BottomLeft => (0, 1),
            Corner::BottomRight => (1, 1),
        }
    }

    /// Bilinear weight of this corner for a point at `offset`.
    pub fn weight(self, offset: SubPixelOffset) -> f64 {
        let SubPixelOffset { x, y } = offset;
        match self {
            Corner::TopLeft => (1.0 - x) * (1.0 - y),
            Corner::TopRight => x * (1.0 - y),
            Corner::BottomLeft => (1.0 - x) * y,
            Corner::BottomRight => x * y,
        }
    }
}

/// One point's claim on a pixel.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PixelUse {
    /// Index of the point in the batch.
    pub point: usize,
    pub corner: Corner,
    /// Sub-pixel offset when interpolating; `None` reads the pixel as is.
    pub offset: Option<SubPixelOffset>,
}

impl PixelUse {
    /// How much of the pixel's sample goes into the point's elevation.
    pub fn weight(&self) -> f64 {
        match self.offset {
            Some(offset) => self.corner.weight(offset),
            None => 1.0,
        }
    }
}

/// A distinct pixel of a tile and every point that depends on it.
#[derive(Debug, Clone, PartialEq)]
pub struct PixelRequest {
    pixel: PixelCoord,
    users: Vec<PixelUse>,
}

impl PixelRequest {
    pub fn pixel(&self) -> PixelCoord {
        self.pixel
    }

    pub fn users(&self) -> &[PixelUse] {
        &self.users
    }
}

/// Inclusive bounding box of requested pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PixelBounds {
    pub min_col: u32,
    pub min_row: u32,
    pub max_col: u32,
    pub max_row: u32,
}

impl PixelBounds {
    fn new(pixel: PixelCoord) -> Self {
        Self {
            min_col: pixel.col,
            min_row: pixel.row,
            max_col: pixel.col,
            max_row: pixel.row,
        }
    }

    fn expand(&mut self, pixel: PixelCoord) {
        self.min_col = self.min_col.min(pixel.col);
        self.min_row = self.min_row.min(pixel.row);
        self.max_col = self.max_col.max(pixel.col);
        self.max_row = self.max_row.max(pixel.row);
    }

    /// The half-open window covering these bounds.
    pub fn window(&self) -> RasterWindow {
        RasterWindow::new(
            self.min_col,
            self.min_row,
            self.max_col + 1,
            self.max_row + 1,
        )
    }
}

/// The read plan for one tile of a batch.
#[derive(Debug, Clone, PartialEq)]
pub struct ImageAssociation {
    tile: TileId,
    file_name: String,
    pixels: Vec<PixelRequest>,
    bounds: PixelBounds,
}

impl ImageAssociation {
    pub fn tile(&self) -> TileId {
        self.tile
    }

    pub fn file_name(&self) -> &str {
        &self.file_name
    }

    /// Distinct pixels, in the order they were first requested.
    pub fn pixels(&self) -> &[PixelRequest] {
        &self.pixels
    }

    pub fn bounds(&self) -> PixelBounds {
        self.bounds
    }

    /// The single window this tile is read with.
    pub fn window(&self) -> RasterWindow {
        self.bounds.window()
    }

    /// Sorted, distinct indices of the points that depend on this tile.
    pub fn point_indices(&self) -> Vec<usize> {
        let mut indices: Vec<usize> = self
            .pixels
            .iter()
            .flat_map(|p| p.users.iter().map(|u| u.point))
            .collect();
        indices.sort_unstable();
        indices.dedup();
        indices
    }
}

/// Group `points` by tile and deduplicate their pixels.
///
/// Tiles come back in the order their first point appears in the batch.
/// When `interpolate` is set, every point registers all four pixels of its
/// interpolation block.
///
/// # Examples
///
/// ```
/// use updown::aggregate::aggregate;
/// use updown::coords::Point;
///
/// let points = [
///     Point::new(25.5, 36.5),
///     Point::new(25.5, 36.5),
///     Point::new(-3.2, -5.9),
/// ];
/// let plans = aggregate(&points, false);
///
/// assert_eq!(plans.len(), 2);
/// assert_eq!(plans[0].file_name(), "ASTGTMV003_N36E025_dem.tif");
/// assert_eq!(plans[0].pixels().len(), 1);
/// assert_eq!(plans[0].point_indices(), vec![0, 1]);
/// ```
pub fn aggregate(points: &[Point], interpolate: bool) -> Vec<ImageAssociation> {
    let mut aggregator = Aggregator::default();
    for (index, point) in points.iter().enumerate() {
        aggregator.add(index, *point, interpolate);
    }
    aggregator.finish()
}

#[derive(Default)]
struct Aggregator {
    tiles: Vec<AssociationBuilder>,
    by_tile: HashMap<TileId, usize>,
}

impl Aggregator {
    fn add(&mut self, index: usize, point: Point, interpolate: bool) {
        let resolved = resolve(point, interpolate);

        let slot = match self.by_tile.get(&resolved.tile) {
            Some(&slot) => slot,
            None => {
                self.tiles.push(AssociationBuilder::new(resolved.tile));
                self.by_tile.insert(resolved.tile, self.tiles.len() - 1);
                self.tiles.len() - 1
            }
        };
        let builder = &mut self.tiles[slot];

        match resolved.offset {
            None => builder.register(
                resolved.pixel,
                PixelUse {
                    point: index,
                    corner: Corner::TopLeft,
                    offset: None,
                },
            ),
            Some(offset) => {
                for corner in Corner::ALL {
                    let (dc, dr) = corner.step();
                    builder.register(
                        PixelCoord::new(resolved.pixel.col + dc, resolved.pixel.row + dr),
                        PixelUse {
                            point: index,
                            corner,
                            offset: Some(offset),
                        },
                    );
                }
            }
        }
    }

    fn finish(self) -> Vec<ImageAssociation> {
        self.tiles
            .into_iter()
            .filter_map(AssociationBuilder::finish)
            .collect()
    }
}

struct AssociationBuilder {
    tile: TileId,
    pixels: Vec<PixelRequest>,
    by_pixel: HashMap<PixelCoord, usize>,
    bounds: Option<PixelBounds>,
}

impl AssociationBuilder {
    fn new(tile: TileId) -> Self {
        Self {
            tile,
            pixels: Vec::new(),
            by_pixel: HashMap::new(),
            bounds: None,
        }
    }

    fn register(&mut self, pixel: PixelCoord, pixel_use: PixelUse) {
        if let Some(&slot) = self.by_pixel.get(&pixel) {
            self.pixels[slot].users.push(pixel_use);
            return;
        }

        self.by_pixel.insert(pixel, self.pixels.len());
        self.pixels.push(PixelRequest {
            pixel,
            users: vec![pixel_use],
        });
        match &mut self.bounds {
            Some(bounds) => bounds.expand(pixel),
            None => self.bounds = Some(PixelBounds::new(pixel)),
        }
    }

    fn finish(self) -> Option<ImageAssociation> {
        // A builder only exists once a pixel was registered
        let bounds = self.bounds?;
        Some(ImageAssociation {
            tile: self.tile,
            file_name: tile_file_name(self.tile),
            pixels: self.pixels,
            bounds,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coords::{PIXEL_WIDTH, TILE_SAMPLES};

    #[test]
    fn test_empty_batch() {
        assert!(aggregate(&[], false).is_empty());
        assert!(aggregate(&[], true).is_empty());
    }

    #[test]
    fn test_shared_pixel_is_deduplicated() {
        let points = [
            Point::new(25.5, 36.5),
            Point::new(25.5 + PIXEL_WIDTH * 0.1, 36.5), // same pixel
            Point::new(25.5, 36.5),
        ];
        let plans = aggregate(&points, false);

        assert_eq!(plans.len(), 1);
        let plan = &plans[0];
        assert_eq!(plan.pixels().len(), 1);
        assert_eq!(plan.pixels()[0].pixel(), PixelCoord::new(1800, 1800));
        let users: Vec<usize> = plan.pixels()[0].users().iter().map(|u| u.point).collect();
        assert_eq!(users, vec![0, 1, 2]);
        assert_eq!(plan.window(), RasterWindow::new(1800, 1800, 1801, 1801));
    }

    #[test]
    fn test_tiles_in_first_seen_order() {
        let points = [
            Point::new(-3.2, -5.9),
            Point::new(25.5, 36.5),
            Point::new(-3.5, -5.5),
        ];
        let plans = aggregate(&points, false);

        let names: Vec<&str> = plans.iter().map(|p| p.file_name()).collect();
        assert_eq!(
            names,
            vec!["ASTGTMV003_S06W004_dem.tif", "ASTGTMV003_N36E025_dem.tif"]
        );
        assert_eq!(plans[0].point_indices(), vec![0, 2]);
        assert_eq!(plans[1].point_indices(), vec![1]);
    }

    #[test]
    fn test_bounds_cover_all_pixels() {
        let points = [
            Point::new(25.1, 36.9),
            Point::new(25.2, 36.8),
            Point::new(25.15, 36.85),
        ];
        let plans = aggregate(&points, false);
        let plan = &plans[0];

        let window = plan.window();
        for request in plan.pixels() {
            assert!(window.contains(request.pixel()));
        }
        // Smallest such rectangle
        assert_eq!(window.min_col, 360);
        assert_eq!(window.max_col, 721);
        assert_eq!(window.min_row, 360);
        assert_eq!(window.max_row, 721);
    }

    #[test]
    fn test_interpolation_registers_block() {
        let points = [Point::new(
            25.5 + 0.25 * PIXEL_WIDTH,
            36.5 - 0.75 * PIXEL_WIDTH,
        )];
        let plans = aggregate(&points, true);
        let plan = &plans[0];

        let pixels: Vec<PixelCoord> = plan.pixels().iter().map(|p| p.pixel()).collect();
        assert_eq!(
            pixels,
            vec![
                PixelCoord::new(1800, 1800),
                PixelCoord::new(1801, 1800),
                PixelCoord::new(1800, 1801),
                PixelCoord::new(1801, 1801),
            ]
        );
        assert_eq!(plan.window(), RasterWindow::new(1800, 1800, 1802, 1802));

        let total: f64 = plan
            .pixels()
            .iter()
            .flat_map(|p| p.users())
            .map(|u| u.weight())
            .sum();
        assert!((total - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_interpolation_blocks_share_pixels() {
        // Two points in neighbouring blocks share the column between them
        let points = [
            Point::new(25.5 + 0.5 * PIXEL_WIDTH, 36.5 - 0.5 * PIXEL_WIDTH),
            Point::new(25.5 + 1.5 * PIXEL_WIDTH, 36.5 - 0.5 * PIXEL_WIDTH),
        ];
        let plans = aggregate(&points, true);
        let plan = &plans[0];

        assert_eq!(plan.pixels().len(), 6);
        let shared = plan
            .pixels()
            .iter()
            .find(|p| p.pixel() == PixelCoord::new(1801, 1800))
            .unwrap();
        let corners: Vec<(usize, Corner)> =
            shared.users().iter().map(|u| (u.point, u.corner)).collect();
        assert_eq!(
            corners,
            vec![(0, Corner::TopRight), (1, Corner::TopLeft)]
        );
    }

    #[test]
    fn test_window_stays_inside_extent_at_edges() {
        let points = [
            Point::new(25.0, 36.0),
            Point::new(25.999_999_9, 36.999_999_9),
            Point::new(25.999_999_9, 36.0),
        ];
        for interpolate in [false, true] {
            for plan in aggregate(&points, interpolate) {
                assert!(plan.window().fits(TILE_SAMPLES, TILE_SAMPLES));
            }
        }
    }

    #[test]
    fn test_corner_weights() {
        let offset = SubPixelOffset { x: 0.25, y: 0.75 };
        assert!((Corner::TopLeft.weight(offset) - 0.1875).abs() < 1e-12);
        assert!((Corner::TopRight.weight(offset) - 0.0625).abs() < 1e-12);
        assert!((Corner::BottomLeft.weight(offset) - 0.5625).abs() < 1e-12);
        assert!((Corner::BottomRight.weight(offset) - 0.1875).abs() < 1e-12);

        let sum: f64 = Corner::ALL.iter().map(|c| c.weight(offset)).sum();
        assert!((sum - 1.0).abs() < 1e-12);
    }
}
