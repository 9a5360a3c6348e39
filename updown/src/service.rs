//! Batch elevation service with scoped tile caching.
//!
//! This module provides [`ElevationService`], the entry point that turns a
//! list of points into a list of elevations: it validates the batch, plans
//! one read per tile, resolves the plan concurrently and returns results in
//! input order.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use serde::{Deserialize, Serialize};

use crate::aggregate::aggregate;
use crate::cache::{CacheScope, CacheStats, HandleCache, ResultCache};
use crate::coords::{Point, TileId};
use crate::error::{ElevationError, Result};
use crate::filename::{is_valid_coord, parse_tile_file_name};
use crate::raster::{GeoTiffSource, RasterSource};
use crate::resolver::BatchResolver;

/// Default number of tiles kept by a process-scoped cache.
pub const DEFAULT_CACHE_SIZE: u64 = 16;

/// Per-batch options.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResolveOptions {
    /// Bilinearly interpolate between the four surrounding samples.
    pub interpolate: bool,
    /// Round elevations to one decimal place.
    pub round: bool,
}

impl Default for ResolveOptions {
    fn default() -> Self {
        Self {
            interpolate: false,
            round: true,
        }
    }
}

impl ResolveOptions {
    pub fn interpolated() -> Self {
        Self {
            interpolate: true,
            ..Self::default()
        }
    }
}

/// Elevation of one input point.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ElevationResult {
    pub lng: f64,
    pub lat: f64,
    /// Elevation in meters.
    pub elev: f64,
}

/// What a batch touched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BatchStats {
    /// Distinct tiles read.
    pub tiles: u64,
    /// Distinct pixels sampled.
    pub pixels: u64,
}

/// Results of one batch, in input order.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ElevationBatch {
    pub results: Vec<ElevationResult>,
    pub stats: BatchStats,
}

/// A geographic bounding box for filtering tiles during preload.
///
/// Coordinates are in decimal degrees (WGS84).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoundingBox {
    /// Minimum longitude (western boundary).
    pub min_lng: f64,
    /// Minimum latitude (southern boundary).
    pub min_lat: f64,
    /// Maximum longitude (eastern boundary).
    pub max_lng: f64,
    /// Maximum latitude (northern boundary).
    pub max_lat: f64,
}

impl BoundingBox {
    pub fn new(min_lng: f64, min_lat: f64, max_lng: f64, max_lat: f64) -> Self {
        Self {
            min_lng,
            min_lat,
            max_lng,
            max_lat,
        }
    }

    /// Check if this bounding box overlaps with a 1°×1° tile.
    ///
    /// A tile covers `[lng, lng+1) × [lat, lat+1)`.
    pub fn overlaps_tile(&self, tile: TileId) -> bool {
        let tile_max_lng = tile.lng + 1;
        let tile_max_lat = tile.lat + 1;

        self.min_lat < tile_max_lat as f64
            && self.max_lat > tile.lat as f64
            && self.min_lng < tile_max_lng as f64
            && self.max_lng > tile.lng as f64
    }
}

/// Statistics from a preload operation.
#[derive(Debug, Clone, Default)]
pub struct PreloadStats {
    /// Number of tiles successfully opened into the cache.
    pub tiles_loaded: u64,
    /// Number of tiles that were already in cache.
    pub tiles_already_cached: u64,
    /// Number of tiles that failed to open.
    pub tiles_failed: u64,
    /// Number of tiles that matched the bounding box filter.
    pub tiles_matched: u64,
    /// Total elapsed time in milliseconds.
    pub elapsed_ms: u64,
}

/// Batch elevation service.
///
/// # Example
///
/// ```ignore
/// use updown::{ElevationService, Point, ResolveOptions};
///
/// let service = ElevationService::builder("/data/aster").build();
///
/// let points = [Point::new(25.5, 36.5), Point::new(-3.2, -5.9)];
/// let batch = service.resolve_batch(&points, ResolveOptions::default()).await?;
/// for result in batch.results {
///     println!("{},{} -> {}m", result.lng, result.lat, result.elev);
/// }
/// ```
pub struct ElevationService<S: RasterSource = GeoTiffSource> {
    resolver: BatchResolver<S>,
    scope: CacheScope,
    /// Handle cache shared by every batch; only for [`CacheScope::Process`].
    shared: Option<Arc<HandleCache<S::Handle>>>,
    /// Hit/miss totals of the per-batch caches.
    batch_hits: AtomicU64,
    batch_misses: AtomicU64,
}

impl ElevationService<GeoTiffSource> {
    /// Create a service over a tile directory with per-batch caching.
    pub fn new<P: AsRef<Path>>(data_dir: P) -> Self {
        ElevationServiceBuilder::new(data_dir).build()
    }

    /// Create a builder for more configuration options.
    pub fn builder<P: AsRef<Path>>(data_dir: P) -> ElevationServiceBuilder {
        ElevationServiceBuilder::new(data_dir)
    }

    /// Get the data directory path.
    pub fn data_dir(&self) -> &Path {
        self.source().data_dir()
    }

    /// Scan the data directory for tiles and tile archives.
    pub fn scan_tile_files(&self) -> Vec<String> {
        self.source().scan_tile_files()
    }

    /// Open tiles from the data directory into the process-scoped cache.
    ///
    /// With `bounds`, only tiles that overlap at least one box are opened.
    /// A service with [`CacheScope::Batch`] has nothing to warm and returns
    /// empty statistics.
    ///
    /// This blocks on file I/O; call it at startup or from a blocking task.
    pub fn preload(&self, bounds: Option<&[BoundingBox]>) -> PreloadStats {
        let start = Instant::now();
        let mut stats = PreloadStats::default();

        let Some(shared) = &self.shared else {
            tracing::warn!("Preload skipped: handles are not kept across batches");
            return stats;
        };

        for filename in self.scan_tile_files() {
            let tile = match parse_tile_file_name(&filename) {
                Some(tile) => tile,
                None => continue,
            };

            if let Some(boxes) = bounds {
                if !boxes.iter().any(|b| b.overlaps_tile(tile)) {
                    continue;
                }
            }

            stats.tiles_matched += 1;

            if shared.contains(&filename) {
                stats.tiles_already_cached += 1;
                continue;
            }

            match shared.get_or_load(&filename, || self.source().open(&filename)) {
                Ok(_) => stats.tiles_loaded += 1,
                Err(e) => {
                    tracing::warn!(file = %filename, error = %e, "Failed to preload tile");
                    stats.tiles_failed += 1;
                }
            }
        }

        stats.elapsed_ms = start.elapsed().as_millis() as u64;
        stats
    }
}

impl<S: RasterSource> ElevationService<S> {
    /// Create a service over any raster source.
    pub fn with_source(source: S, scope: CacheScope, cache_size: u64) -> Self {
        let shared = match scope {
            CacheScope::Batch => None,
            CacheScope::Process => Some(Arc::new(HandleCache::bounded(cache_size))),
        };

        Self {
            resolver: BatchResolver::new(Arc::new(source)),
            scope,
            shared,
            batch_hits: AtomicU64::new(0),
            batch_misses: AtomicU64::new(0),
        }
    }

    pub fn source(&self) -> &S {
        self.resolver.source()
    }

    pub fn cache_scope(&self) -> CacheScope {
        self.scope
    }

    /// Resolve a batch of points.
    ///
    /// Every point is validated before any tile is touched. An empty batch
    /// resolves to an empty result without I/O.
    ///
    /// # Errors
    ///
    /// - [`ElevationError::InvalidCoordinate`] for the first point out of range
    /// - [`ElevationError::TileNotFound`] / [`ElevationError::RasterRead`]
    ///   when a tile cannot be read; no partial results are returned
    pub async fn resolve_batch(
        &self,
        points: &[Point],
        options: ResolveOptions,
    ) -> Result<ElevationBatch> {
        for (index, point) in points.iter().enumerate() {
            if !is_valid_coord(point.lng, point.lat) {
                return Err(ElevationError::InvalidCoordinate {
                    index,
                    lng: point.lng,
                    lat: point.lat,
                });
            }
        }

        if points.is_empty() {
            return Ok(ElevationBatch::default());
        }

        let start = Instant::now();
        let associations = aggregate(points, options.interpolate);
        let tiles = associations.len() as u64;

        let cache = Arc::new(self.batch_cache());
        let elevations = self
            .resolver
            .resolve(associations, points.len(), Arc::clone(&cache))
            .await?;

        if self.shared.is_none() {
            let batch = cache.handles().stats();
            self.batch_hits.fetch_add(batch.hit_count, Ordering::Relaxed);
            self.batch_misses.fetch_add(batch.miss_count, Ordering::Relaxed);
        }

        let results = points
            .iter()
            .zip(elevations)
            .map(|(point, elev)| ElevationResult {
                lng: point.lng,
                lat: point.lat,
                elev: if options.round {
                    round_decimeter(elev)
                } else {
                    elev
                },
            })
            .collect();

        let stats = BatchStats {
            tiles,
            pixels: cache.sample_count(),
        };

        tracing::info!(
            points = points.len(),
            tiles = stats.tiles,
            pixels = stats.pixels,
            interpolate = options.interpolate,
            elapsed_ms = start.elapsed().as_millis() as u64,
            "Resolved batch"
        );

        Ok(ElevationBatch { results, stats })
    }

    /// Resolve a batch and return only the per-point results.
    pub async fn elevations(
        &self,
        points: &[Point],
        options: ResolveOptions,
    ) -> Result<Vec<ElevationResult>> {
        Ok(self.resolve_batch(points, options).await?.results)
    }

    /// Resolve a single point.
    pub async fn elevation(&self, point: Point, options: ResolveOptions) -> Result<f64> {
        let results = self.elevations(&[point], options).await?;
        results
            .first()
            .map(|r| r.elev)
            .ok_or_else(|| ElevationError::TaskFailed {
                reason: "no result for point".to_string(),
            })
    }

    /// Get cache statistics.
    ///
    /// With [`CacheScope::Batch`] no handle outlives its batch, so
    /// `entry_count` is always zero and the counters are batch totals.
    pub fn cache_stats(&self) -> CacheStats {
        match &self.shared {
            Some(shared) => shared.stats(),
            None => CacheStats {
                entry_count: 0,
                hit_count: self.batch_hits.load(Ordering::Relaxed),
                miss_count: self.batch_misses.load(Ordering::Relaxed),
            },
        }
    }

    /// Get the maximum cache size, or 0 when handles are per batch.
    pub fn cache_capacity(&self) -> u64 {
        self.shared
            .as_ref()
            .and_then(|shared| shared.capacity())
            .unwrap_or(0)
    }

    /// Invalidate (remove) a specific tile from the cache.
    ///
    /// Use after replacing a tile file while the service runs.
    pub fn invalidate_tile(&self, file_name: &str) {
        if let Some(shared) = &self.shared {
            shared.invalidate(file_name);
        }
    }

    /// Clear all tiles from the cache.
    pub fn clear_cache(&self) {
        if let Some(shared) = &self.shared {
            shared.clear();
        }
    }

    fn batch_cache(&self) -> ResultCache<S::Handle> {
        match &self.shared {
            Some(shared) => ResultCache::with_handles(Arc::clone(shared)),
            None => ResultCache::per_batch(),
        }
    }
}

/// Round to one decimal place.
pub fn round_decimeter(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}

/// Builder for creating [`ElevationService`] with custom configuration.
///
/// # Example
///
/// ```ignore
/// use updown::{CacheScope, ElevationServiceBuilder};
///
/// let service = ElevationServiceBuilder::new("/data/aster")
///     .cache_scope(CacheScope::Process)
///     .cache_size(32)
///     .build();
/// ```
#[derive(Debug, Clone)]
pub struct ElevationServiceBuilder {
    data_dir: PathBuf,
    cache_scope: CacheScope,
    cache_size: u64,
}

impl ElevationServiceBuilder {
    /// Create a new builder with the specified data directory.
    pub fn new<P: AsRef<Path>>(data_dir: P) -> Self {
        Self {
            data_dir: data_dir.as_ref().to_path_buf(),
            cache_scope: CacheScope::default(),
            cache_size: DEFAULT_CACHE_SIZE,
        }
    }

    /// Create a builder configured from environment variables.
    ///
    /// # Environment Variables
    ///
    /// | Variable | Description | Default |
    /// |----------|-------------|---------|
    /// | `UPDOWN_DATA_DIR` | Directory containing `_dem.tif` files | Required |
    /// | `UPDOWN_CACHE_SCOPE` | `batch` or `process` | `batch` |
    /// | `UPDOWN_CACHE_SIZE` | Maximum tiles kept with `process` scope | 16 |
    ///
    /// # Errors
    ///
    /// Returns an error if `UPDOWN_DATA_DIR` is not set or
    /// `UPDOWN_CACHE_SCOPE` is not a known scope.
    pub fn from_env() -> Result<Self> {
        let data_dir = std::env::var("UPDOWN_DATA_DIR").map_err(|_| ElevationError::Config {
            message: "UPDOWN_DATA_DIR environment variable not set".to_string(),
        })?;

        let cache_scope = match std::env::var("UPDOWN_CACHE_SCOPE") {
            Ok(scope) => scope.parse()?,
            Err(_) => CacheScope::default(),
        };

        let cache_size: u64 = std::env::var("UPDOWN_CACHE_SIZE")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(DEFAULT_CACHE_SIZE);

        Ok(Self {
            data_dir: PathBuf::from(data_dir),
            cache_scope,
            cache_size,
        })
    }

    /// Set the data directory.
    ///
    /// Overrides the directory set in the constructor or from environment.
    pub fn data_dir<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.data_dir = path.as_ref().to_path_buf();
        self
    }

    /// Set how long opened tiles are kept.
    pub fn cache_scope(mut self, scope: CacheScope) -> Self {
        self.cache_scope = scope;
        self
    }

    /// Set the maximum number of tiles a process-scoped cache keeps.
    ///
    /// Default is 16 tiles.
    pub fn cache_size(mut self, size: u64) -> Self {
        self.cache_size = size;
        self
    }

    /// Build the [`ElevationService`].
    pub fn build(self) -> ElevationService<GeoTiffSource> {
        ElevationService::with_source(
            GeoTiffSource::new(self.data_dir),
            self.cache_scope,
            self.cache_size,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coords::PIXEL_WIDTH;
    use crate::raster::synthetic::SyntheticSource;
    use crate::raster::test_tiles::{gradient, write_tile};
    use std::fs;
    use std::io::Write;
    use tempfile::TempDir;

    /// The point sitting exactly on a sample centre of `tile`.
    fn point_at(tile: TileId, col: u32, row: u32) -> Point {
        Point::new(
            tile.lng as f64 + col as f64 * PIXEL_WIDTH,
            tile.lat as f64 + 1.0 - row as f64 * PIXEL_WIDTH,
        )
    }

    /// Small GeoTIFF covering the north-west corner of a tile.
    fn create_test_tile(dir: &Path, tile: TileId) {
        write_tile(
            &dir.join(crate::filename::tile_file_name(tile)),
            64,
            64,
            8,
            gradient,
        );
    }

    fn synthetic(scope: CacheScope) -> ElevationService<SyntheticSource> {
        let source = SyntheticSource::new()
            .with_tile(TileId::new(25, 36), |col, row| (col + row) as f64)
            .with_tile(TileId::new(-4, -6), |_, _| 100.26);
        ElevationService::with_source(source, scope, 4)
    }

    #[tokio::test]
    async fn test_service_basic() {
        let temp_dir = TempDir::new().unwrap();
        let tile = TileId::new(25, 36);
        create_test_tile(temp_dir.path(), tile);

        let service = ElevationService::new(temp_dir.path());
        let elevation = service
            .elevation(point_at(tile, 10, 20), ResolveOptions::default())
            .await
            .unwrap();

        assert_eq!(elevation, gradient(10, 20) as f64);
    }

    #[tokio::test]
    async fn test_results_keep_input_order() {
        let service = synthetic(CacheScope::Batch);
        let points = [
            point_at(TileId::new(25, 36), 5, 7),
            Point::new(-3.2, -5.9),
            point_at(TileId::new(25, 36), 1, 1),
            point_at(TileId::new(25, 36), 5, 7),
        ];

        let batch = service
            .resolve_batch(&points, ResolveOptions::default())
            .await
            .unwrap();

        assert_eq!(batch.results.len(), points.len());
        for (result, point) in batch.results.iter().zip(points.iter()) {
            assert_eq!((result.lng, result.lat), (point.lng, point.lat));
        }
        let elevs: Vec<f64> = batch.results.iter().map(|r| r.elev).collect();
        assert_eq!(elevs, vec![12.0, 100.3, 2.0, 12.0]);
        assert_eq!(batch.stats, BatchStats { tiles: 2, pixels: 3 });
        assert_eq!(service.source().reads().len(), 2);
    }

    #[tokio::test]
    async fn test_rounding_can_be_disabled() {
        let service = synthetic(CacheScope::Batch);
        let point = Point::new(-3.2, -5.9);

        let rounded = service
            .elevation(point, ResolveOptions::default())
            .await
            .unwrap();
        assert_eq!(rounded, 100.3);

        let raw = service
            .elevation(
                point,
                ResolveOptions {
                    interpolate: false,
                    round: false,
                },
            )
            .await
            .unwrap();
        assert_eq!(raw, 100.26);
    }

    #[tokio::test]
    async fn test_invalid_coordinate_rejected_before_io() {
        let service = synthetic(CacheScope::Batch);
        let points = [
            Point::new(25.5, 36.5),
            Point::new(25.5, 91.0),
            Point::new(200.0, 0.0),
        ];

        match service.resolve_batch(&points, ResolveOptions::default()).await {
            Err(ElevationError::InvalidCoordinate { index, lat, .. }) => {
                assert_eq!(index, 1);
                assert_eq!(lat, 91.0);
            }
            other => panic!("Expected InvalidCoordinate, got {other:?}"),
        }
        assert_eq!(service.source().opens(), 0);
    }

    #[tokio::test]
    async fn test_empty_batch() {
        let service = synthetic(CacheScope::Batch);
        let batch = service
            .resolve_batch(&[], ResolveOptions::default())
            .await
            .unwrap();

        assert!(batch.results.is_empty());
        assert_eq!(batch.stats, BatchStats::default());
        assert_eq!(service.source().opens(), 0);
    }

    #[tokio::test]
    async fn test_missing_tile() {
        let temp_dir = TempDir::new().unwrap();
        let service = ElevationService::new(temp_dir.path());

        let err = service
            .elevations(&[Point::new(25.5, 36.5)], ResolveOptions::default())
            .await
            .unwrap_err();

        match err {
            ElevationError::TileNotFound { file_name, points } => {
                assert_eq!(file_name, "ASTGTMV003_N36E025_dem.tif");
                assert_eq!(points, vec![0]);
            }
            other => panic!("Expected TileNotFound, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_undersized_tile_blames_its_points() {
        let temp_dir = TempDir::new().unwrap();
        let tile = TileId::new(25, 36);
        create_test_tile(temp_dir.path(), tile);

        let service = ElevationService::new(temp_dir.path());
        let points = [Point::new(25.5, 36.5), Point::new(25.6, 36.6)];

        let err = service
            .elevations(&points, ResolveOptions::default())
            .await
            .unwrap_err();

        match &err {
            ElevationError::InvalidWindow {
                width,
                height,
                points,
                ..
            } => {
                assert_eq!((*width, *height), (64, 64));
                assert_eq!(points, &vec![0, 1]);
            }
            other => panic!("Expected InvalidWindow, got {other:?}"),
        }
        assert_eq!(err.points(), &[0, 1]);
    }

    #[tokio::test]
    async fn test_interpolated_on_geotiff() {
        let temp_dir = TempDir::new().unwrap();
        let tile = TileId::new(25, 36);
        create_test_tile(temp_dir.path(), tile);

        let service = ElevationService::new(temp_dir.path());
        // Half way between samples (10, 20) and (11, 21)
        let point = Point::new(
            25.0 + 10.5 * PIXEL_WIDTH,
            37.0 - 20.5 * PIXEL_WIDTH,
        );
        let elevation = service
            .elevation(point, ResolveOptions::interpolated())
            .await
            .unwrap();

        // Mean of 2010, 2011, 2110, 2111
        assert_eq!(elevation, 2060.5);
    }

    #[tokio::test]
    async fn test_process_scope_reuses_handles() {
        let service = synthetic(CacheScope::Process);
        let points = [Point::new(25.5, 36.5)];

        for _ in 0..3 {
            service
                .elevations(&points, ResolveOptions::default())
                .await
                .unwrap();
        }

        assert_eq!(service.source().opens(), 1);
        let stats = service.cache_stats();
        assert_eq!(stats.miss_count, 1);
        assert_eq!(stats.hit_count, 2);
        assert_eq!(stats.entry_count, 1);
        assert_eq!(service.cache_capacity(), 4);
    }

    #[tokio::test]
    async fn test_batch_scope_reopens() {
        let service = synthetic(CacheScope::Batch);
        let points = [Point::new(25.5, 36.5)];

        for _ in 0..3 {
            service
                .elevations(&points, ResolveOptions::default())
                .await
                .unwrap();
        }

        assert_eq!(service.source().opens(), 3);
        let stats = service.cache_stats();
        assert_eq!(stats.miss_count, 3);
        assert_eq!(stats.entry_count, 0);
        assert_eq!(service.cache_capacity(), 0);
    }

    #[tokio::test]
    async fn test_invalidate_and_clear_cache() {
        let service = synthetic(CacheScope::Process);
        let points = [Point::new(25.5, 36.5), Point::new(-3.2, -5.9)];

        service
            .elevations(&points, ResolveOptions::default())
            .await
            .unwrap();
        assert_eq!(service.cache_stats().entry_count, 2);

        service.invalidate_tile("ASTGTMV003_N36E025_dem.tif");
        assert_eq!(service.cache_stats().entry_count, 1);

        service.clear_cache();
        assert_eq!(service.cache_stats().entry_count, 0);

        service
            .elevations(&points, ResolveOptions::default())
            .await
            .unwrap();
        assert_eq!(service.source().opens(), 4);
    }

    #[test]
    fn test_round_decimeter() {
        assert_eq!(round_decimeter(812.04), 812.0);
        assert_eq!(round_decimeter(812.06), 812.1);
        assert_eq!(round_decimeter(-12.36), -12.4);
        assert_eq!(round_decimeter(0.0), 0.0);
    }

    #[test]
    fn test_from_env() {
        let temp_dir = TempDir::new().unwrap();

        // Save original values
        let orig_dir = std::env::var("UPDOWN_DATA_DIR").ok();
        let orig_scope = std::env::var("UPDOWN_CACHE_SCOPE").ok();
        let orig_size = std::env::var("UPDOWN_CACHE_SIZE").ok();

        std::env::remove_var("UPDOWN_DATA_DIR");
        assert!(matches!(
            ElevationServiceBuilder::from_env(),
            Err(ElevationError::Config { .. })
        ));

        // Defaults
        std::env::set_var("UPDOWN_DATA_DIR", temp_dir.path());
        std::env::remove_var("UPDOWN_CACHE_SCOPE");
        std::env::remove_var("UPDOWN_CACHE_SIZE");
        let builder = ElevationServiceBuilder::from_env().unwrap();
        assert_eq!(builder.data_dir, temp_dir.path());
        assert_eq!(builder.cache_scope, CacheScope::Batch);
        assert_eq!(builder.cache_size, DEFAULT_CACHE_SIZE);

        // Explicit values
        std::env::set_var("UPDOWN_CACHE_SCOPE", "process");
        std::env::set_var("UPDOWN_CACHE_SIZE", "50");
        let builder = ElevationServiceBuilder::from_env().unwrap();
        assert_eq!(builder.cache_scope, CacheScope::Process);
        assert_eq!(builder.cache_size, 50);

        std::env::set_var("UPDOWN_CACHE_SCOPE", "forever");
        assert!(ElevationServiceBuilder::from_env().is_err());

        // Restore original values
        for (key, value) in [
            ("UPDOWN_DATA_DIR", orig_dir),
            ("UPDOWN_CACHE_SCOPE", orig_scope),
            ("UPDOWN_CACHE_SIZE", orig_size),
        ] {
            match value {
                Some(v) => std::env::set_var(key, v),
                None => std::env::remove_var(key),
            }
        }
    }

    // --- Preload tests ---

    #[test]
    fn test_preload_all_tiles() {
        let temp_dir = TempDir::new().unwrap();
        create_test_tile(temp_dir.path(), TileId::new(25, 36));
        create_test_tile(temp_dir.path(), TileId::new(-4, -6));

        let service = ElevationService::builder(temp_dir.path())
            .cache_scope(CacheScope::Process)
            .build();
        let stats = service.preload(None);

        assert_eq!(stats.tiles_matched, 2);
        assert_eq!(stats.tiles_loaded, 2);
        assert_eq!(stats.tiles_already_cached, 0);
        assert_eq!(stats.tiles_failed, 0);

        // Second preload: tiles should be cached
        let stats = service.preload(None);
        assert_eq!(stats.tiles_loaded, 0);
        assert_eq!(stats.tiles_already_cached, 2);
    }

    #[test]
    fn test_preload_with_bounding_boxes() {
        let temp_dir = TempDir::new().unwrap();
        create_test_tile(temp_dir.path(), TileId::new(25, 36));
        create_test_tile(temp_dir.path(), TileId::new(-4, -6));
        create_test_tile(temp_dir.path(), TileId::new(10, 50));

        let service = ElevationService::builder(temp_dir.path())
            .cache_scope(CacheScope::Process)
            .build();

        let aegean = BoundingBox::new(24.0, 35.0, 27.0, 38.0);
        let gulf_of_guinea = BoundingBox::new(-5.0, -7.0, -3.0, -5.0);
        let stats = service.preload(Some(&[aegean, gulf_of_guinea]));

        assert_eq!(stats.tiles_matched, 2);
        assert_eq!(stats.tiles_loaded, 2);
    }

    #[test]
    fn test_preload_counts_failures() {
        let temp_dir = TempDir::new().unwrap();
        fs::write(
            temp_dir.path().join("ASTGTMV003_N36E025_dem.tif"),
            b"not a tiff",
        )
        .unwrap();

        let service = ElevationService::builder(temp_dir.path())
            .cache_scope(CacheScope::Process)
            .build();
        let stats = service.preload(None);

        assert_eq!(stats.tiles_matched, 1);
        assert_eq!(stats.tiles_failed, 1);
    }

    #[test]
    fn test_preload_batch_scope_is_noop() {
        let temp_dir = TempDir::new().unwrap();
        create_test_tile(temp_dir.path(), TileId::new(25, 36));

        let service = ElevationService::new(temp_dir.path());
        let stats = service.preload(None);

        assert_eq!(stats.tiles_matched, 0);
        assert_eq!(stats.tiles_loaded, 0);
    }

    #[tokio::test]
    async fn test_preload_from_archive() {
        let temp_dir = TempDir::new().unwrap();
        let staging = TempDir::new().unwrap();
        let tile = TileId::new(25, 36);
        create_test_tile(staging.path(), tile);
        let tile_bytes =
            fs::read(staging.path().join("ASTGTMV003_N36E025_dem.tif")).unwrap();

        let file = fs::File::create(temp_dir.path().join("ASTGTMV003_N36E025.zip")).unwrap();
        let mut zip_writer = zip::ZipWriter::new(file);
        let options = zip::write::SimpleFileOptions::default()
            .compression_method(zip::CompressionMethod::Stored);
        zip_writer
            .start_file("ASTGTMV003_N36E025_dem.tif", options)
            .unwrap();
        zip_writer.write_all(&tile_bytes).unwrap();
        zip_writer.finish().unwrap();

        let service = ElevationService::builder(temp_dir.path())
            .cache_scope(CacheScope::Process)
            .build();
        let stats = service.preload(None);
        assert_eq!(stats.tiles_loaded, 1);

        let elevation = service
            .elevation(point_at(tile, 3, 4), ResolveOptions::default())
            .await
            .unwrap();
        assert_eq!(elevation, gradient(3, 4) as f64);
        assert_eq!(service.cache_stats().miss_count, 1);
    }

    #[test]
    fn test_bounding_box_overlaps_tile() {
        // Tile N36E025 covers [25, 26) x [36, 37)
        let tile = TileId::new(25, 36);
        assert!(BoundingBox::new(25.5, 36.5, 26.5, 37.5).overlaps_tile(tile));

        // Completely outside
        assert!(!BoundingBox::new(30.0, 40.0, 31.0, 41.0).overlaps_tile(tile));

        // Touching edge (exclusive boundary)
        assert!(!BoundingBox::new(26.0, 37.0, 27.0, 38.0).overlaps_tile(tile));

        // Tile fully contains bbox
        assert!(BoundingBox::new(25.2, 36.2, 25.8, 36.8).overlaps_tile(tile));

        // Negative coordinates
        let bbox = BoundingBox::new(-78.5, -13.5, -76.5, -11.5);
        assert!(bbox.overlaps_tile(TileId::new(-78, -13)));
        assert!(bbox.overlaps_tile(TileId::new(-78, -12)));
        assert!(bbox.overlaps_tile(TileId::new(-77, -13)));
    }

    #[test]
    fn test_scan_tile_files() {
        let temp_dir = TempDir::new().unwrap();
        create_test_tile(temp_dir.path(), TileId::new(25, 36));
        fs::write(temp_dir.path().join("readme.txt"), "not a tile").unwrap();

        let service = ElevationService::new(temp_dir.path());
        assert_eq!(
            service.scan_tile_files(),
            vec!["ASTGTMV003_N36E025_dem.tif".to_string()]
        );
        assert_eq!(service.data_dir(), temp_dir.path());
    }
}
