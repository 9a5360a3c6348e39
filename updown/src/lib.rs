//! # updown - batched ASTER GDEM elevation lookups
//!
//! Resolves elevations for lists of longitude/latitude points from ASTER
//! GDEM v3 tiles (`ASTGTMV003_*_dem.tif`, one single-band GeoTIFF per
//! whole-degree tile).
//!
//! ## Features
//!
//! - **One read per tile**: points are grouped by tile and identical pixels
//!   are deduplicated before any I/O; each tile is read once, through the
//!   smallest window covering every pixel the batch needs
//! - **Concurrent**: tiles of a batch are read in parallel blocking tasks
//! - **Bilinear interpolation** between the four surrounding samples
//! - **Scoped caching**: opened tiles live for one batch by default, or for
//!   the whole process when asked to
//!
//! ## Quick Start
//!
//! ```ignore
//! use updown::{ElevationService, Point, ResolveOptions};
//!
//! let service = ElevationService::new("/data/aster");
//! let points = [Point::new(25.5, 36.5), Point::new(-3.2, -5.9)];
//!
//! let results = service.elevations(&points, ResolveOptions::default()).await?;
//! assert_eq!(results.len(), 2);
//! ```
//!
//! ## Tile geometry
//!
//! ASTER GDEM v3 tiles hold 3601 × 3601 samples at 1 arc-second spacing.
//! Samples are pixel-as-area: the stored value of a pixel belongs to its
//! centre, and sample centres fall on whole arc-seconds. See [`coords`].
//!
//! ## Data Sources
//!
//! Download ASTER GDEM v3 from:
//! - <https://search.earthdata.nasa.gov/>
//! - <https://lpdaac.usgs.gov/products/astgtmv003/>

pub mod aggregate;
pub mod cache;
pub mod coords;
pub mod error;
pub mod filename;
#[cfg(feature = "geojson")]
pub mod geojson;
pub mod raster;
pub mod resolver;
pub mod service;

// Re-export main types at crate root for convenience
pub use cache::{CacheScope, CacheStats};
pub use coords::{Point, TileId};
pub use error::{ElevationError, Result};
pub use raster::{GeoTiffSource, RasterSource};
pub use service::{
    BatchStats, BoundingBox, ElevationBatch, ElevationResult, ElevationService,
    ElevationServiceBuilder, PreloadStats, ResolveOptions,
};
