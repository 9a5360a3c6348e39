//! Raster access: the [`RasterSource`] seam and its GeoTIFF implementation.
//!
//! The batch pipeline only ever asks a source for two things: a handle for a
//! named tile file, and the samples covering a rectangular pixel window of
//! that handle. [`GeoTiffSource`] answers both from a directory of ASTER
//! GDEM `_dem.tif` files, memory-mapping each file and decoding only the
//! strips (or tiles) that intersect the requested window.

use std::collections::HashSet;
use std::fs::File;
use std::io::{Cursor, ErrorKind};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use memmap2::Mmap;
use tiff::decoder::{Decoder, DecodingResult};
use tiff::ColorType;

use crate::coords::PixelCoord;
use crate::error::{ElevationError, Result};
use crate::filename::{archive_file_name, parse_tile_file_name, tile_file_name};

/// Half-open pixel rectangle `[min_col, max_col) × [min_row, max_row)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RasterWindow {
    pub min_col: u32,
    pub min_row: u32,
    pub max_col: u32,
    pub max_row: u32,
}

impl RasterWindow {
    pub fn new(min_col: u32, min_row: u32, max_col: u32, max_row: u32) -> Self {
        Self {
            min_col,
            min_row,
            max_col,
            max_row,
        }
    }

    pub fn width(&self) -> u32 {
        self.max_col.saturating_sub(self.min_col)
    }

    pub fn height(&self) -> u32 {
        self.max_row.saturating_sub(self.min_row)
    }

    /// Number of samples covered by the window.
    pub fn len(&self) -> usize {
        self.width() as usize * self.height() as usize
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn contains(&self, pixel: PixelCoord) -> bool {
        (self.min_col..self.max_col).contains(&pixel.col)
            && (self.min_row..self.max_row).contains(&pixel.row)
    }

    /// Whether the window lies inside a `width × height` raster.
    pub fn fits(&self, width: u32, height: u32) -> bool {
        !self.is_empty() && self.max_col <= width && self.max_row <= height
    }
}

/// Samples covering one [`RasterWindow`], row-major.
#[derive(Debug, Clone, PartialEq)]
pub struct WindowSamples {
    window: RasterWindow,
    values: Vec<f64>,
}

impl WindowSamples {
    /// Wrap row-major `values` for `window`.
    ///
    /// # Panics
    ///
    /// Panics if `values` does not hold exactly one sample per window pixel.
    pub fn new(window: RasterWindow, values: Vec<f64>) -> Self {
        assert_eq!(
            values.len(),
            window.len(),
            "sample count does not match window"
        );
        Self { window, values }
    }

    pub fn window(&self) -> RasterWindow {
        self.window
    }

    pub fn values(&self) -> &[f64] {
        &self.values
    }

    /// Sample at a tile pixel, or `None` when the pixel is outside the window.
    pub fn get(&self, pixel: PixelCoord) -> Option<f64> {
        if !self.window.contains(pixel) {
            return None;
        }
        let local_col = (pixel.col - self.window.min_col) as usize;
        let local_row = (pixel.row - self.window.min_row) as usize;
        self.values
            .get(local_row * self.window.width() as usize + local_col)
            .copied()
    }
}

/// Something that can open tile files and read pixel windows from them.
///
/// Both methods may block on I/O; the batch resolver calls them from
/// blocking tasks. Handles must be immutable once opened so they can be
/// shared between concurrent reads and cached across batches.
pub trait RasterSource: Send + Sync + 'static {
    /// An opened tile.
    type Handle: Send + Sync + 'static;

    /// Open a tile by file name.
    ///
    /// Returns [`ElevationError::TileNotFound`] when the file does not exist.
    fn open(&self, file_name: &str) -> Result<Self::Handle>;

    /// Read a single-band window of samples from an opened tile.
    fn read_window(&self, handle: &Self::Handle, window: RasterWindow) -> Result<WindowSamples>;
}

/// A memory-mapped, single-band GeoTIFF tile.
///
/// The mapping is decoded lazily: only the strips or tiles that intersect a
/// requested window are decompressed.
pub struct DemRaster {
    file_name: String,
    /// Memory-mapped file data
    data: Mmap,
    width: u32,
    height: u32,
}

impl DemRaster {
    /// Map a GeoTIFF file and check that it holds a single-band raster.
    ///
    /// # Errors
    ///
    /// - [`ElevationError::TileNotFound`] if the file does not exist
    /// - [`ElevationError::RasterRead`] if it cannot be mapped or is not a
    ///   single-band TIFF
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());

        let file = File::open(path).map_err(|e| match e.kind() {
            ErrorKind::NotFound => ElevationError::tile_not_found(&file_name),
            _ => ElevationError::raster_read(&file_name, e),
        })?;

        // SAFETY: Memory mapping is safe as long as the file is not modified
        // while mapped. Tile files are opened read-only and never rewritten.
        let data =
            unsafe { Mmap::map(&file) }.map_err(|e| ElevationError::raster_read(&file_name, e))?;

        let mut raster = Self {
            file_name,
            data,
            width: 0,
            height: 0,
        };

        let mut decoder = raster.decoder()?;
        let (width, height) = decoder
            .dimensions()
            .map_err(|e| ElevationError::raster_read(&raster.file_name, e))?;
        match decoder
            .colortype()
            .map_err(|e| ElevationError::raster_read(&raster.file_name, e))?
        {
            ColorType::Gray(_) => {}
            other => {
                return Err(ElevationError::raster_read(
                    &raster.file_name,
                    format!("expected a single-band raster, found {other:?}"),
                ))
            }
        }

        raster.width = width;
        raster.height = height;
        Ok(raster)
    }

    pub fn file_name(&self) -> &str {
        &self.file_name
    }

    /// Size of the mapped file in bytes.
    pub fn size_bytes(&self) -> u64 {
        self.data.len() as u64
    }

    /// Raster width in pixels.
    pub fn width(&self) -> u32 {
        self.width
    }

    /// Raster height in pixels.
    pub fn height(&self) -> u32 {
        self.height
    }

    /// Decode the samples covering `window`.
    ///
    /// # Errors
    ///
    /// Returns [`ElevationError::InvalidWindow`] if the window is empty or
    /// reaches outside the raster, and [`ElevationError::RasterRead`] on a
    /// decoding failure.
    pub fn read_window(&self, window: RasterWindow) -> Result<WindowSamples> {
        if !window.fits(self.width, self.height) {
            return Err(ElevationError::invalid_window(
                &self.file_name,
                window,
                self.width,
                self.height,
            ));
        }

        let mut decoder = self.decoder()?;
        let (chunk_width, chunk_height) = decoder.chunk_dimensions();
        let chunks_across = self.width.div_ceil(chunk_width);

        let mut values = vec![0.0; window.len()];
        let out_width = window.width() as usize;

        let first_chunk_row = window.min_row / chunk_height;
        let last_chunk_row = (window.max_row - 1) / chunk_height;
        let first_chunk_col = window.min_col / chunk_width;
        let last_chunk_col = (window.max_col - 1) / chunk_width;

        for chunk_row in first_chunk_row..=last_chunk_row {
            for chunk_col in first_chunk_col..=last_chunk_col {
                let index = chunk_row * chunks_across + chunk_col;
                let (data_width, data_height) = decoder.chunk_data_dimensions(index);
                let chunk = decoder
                    .read_chunk(index)
                    .map_err(|e| ElevationError::raster_read(&self.file_name, e))?;
                let chunk = samples_to_f64(chunk);

                // Chunk origin in raster pixels
                let origin_col = chunk_col * chunk_width;
                let origin_row = chunk_row * chunk_height;

                let rows = window.min_row.max(origin_row)
                    ..window.max_row.min(origin_row + data_height);
                let cols = window.min_col.max(origin_col)
                    ..window.max_col.min(origin_col + data_width);

                for row in rows {
                    let src_start =
                        ((row - origin_row) * data_width + (cols.start - origin_col)) as usize;
                    let dst_start = (row - window.min_row) as usize * out_width
                        + (cols.start - window.min_col) as usize;
                    let len = cols.len();
                    let src = chunk.get(src_start..src_start + len).ok_or_else(|| {
                        ElevationError::raster_read(&self.file_name, "truncated chunk")
                    })?;
                    values[dst_start..dst_start + len].copy_from_slice(src);
                }
            }
        }

        Ok(WindowSamples::new(window, values))
    }

    fn decoder(&self) -> Result<Decoder<Cursor<&[u8]>>> {
        Decoder::new(Cursor::new(&self.data[..]))
            .map_err(|e| ElevationError::raster_read(&self.file_name, e))
    }
}

fn samples_to_f64(result: DecodingResult) -> Vec<f64> {
    match result {
        DecodingResult::U8(v) => v.into_iter().map(f64::from).collect(),
        DecodingResult::U16(v) => v.into_iter().map(f64::from).collect(),
        DecodingResult::U32(v) => v.into_iter().map(f64::from).collect(),
        DecodingResult::U64(v) => v.into_iter().map(|s| s as f64).collect(),
        DecodingResult::I8(v) => v.into_iter().map(f64::from).collect(),
        DecodingResult::I16(v) => v.into_iter().map(f64::from).collect(),
        DecodingResult::I32(v) => v.into_iter().map(f64::from).collect(),
        DecodingResult::I64(v) => v.into_iter().map(|s| s as f64).collect(),
        DecodingResult::F32(v) => v.into_iter().map(f64::from).collect(),
        DecodingResult::F64(v) => v,
    }
}

/// Raster source backed by a directory of ASTER GDEM GeoTIFF tiles.
///
/// A missing `_dem.tif` is extracted from the tile's USGS distribution
/// archive (`ASTGTMV003_N36E025.zip`) when that archive is present in the
/// same directory.
pub struct GeoTiffSource {
    /// Directory containing `_dem.tif` files and/or their archives.
    data_dir: PathBuf,
    /// Counter for unique temporary names during archive extraction.
    extractions: AtomicU64,
}

impl GeoTiffSource {
    pub fn new<P: AsRef<Path>>(data_dir: P) -> Self {
        Self {
            data_dir: data_dir.as_ref().to_path_buf(),
            extractions: AtomicU64::new(0),
        }
    }

    /// Get the data directory path.
    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    /// Full path of a tile file inside the data directory.
    pub fn tile_path(&self, file_name: &str) -> PathBuf {
        self.data_dir.join(file_name)
    }

    /// Scan the data directory for tile files and archives.
    ///
    /// Returns a sorted, deduplicated list of `_dem.tif` names. An archive
    /// is reported under the name of the tile it contains, so a tile present
    /// both extracted and archived appears once.
    pub fn scan_tile_files(&self) -> Vec<String> {
        let mut filenames = HashSet::new();

        let entries = match std::fs::read_dir(&self.data_dir) {
            Ok(entries) => entries,
            Err(_) => return Vec::new(),
        };

        for entry in entries.flatten() {
            let name = entry.file_name();
            let name = name.to_string_lossy();

            if let Some(tile) = parse_tile_file_name(&name) {
                filenames.insert(tile_file_name(tile));
            }
        }

        let mut result: Vec<String> = filenames.into_iter().collect();
        result.sort();
        result
    }

    /// Find the tile on disk, extracting it from its archive if needed.
    fn locate(&self, file_name: &str) -> Result<PathBuf> {
        let path = self.tile_path(file_name);
        if path.exists() {
            return Ok(path);
        }

        let archive = parse_tile_file_name(file_name)
            .map(|tile| self.data_dir.join(archive_file_name(tile)))
            .filter(|archive| archive.exists())
            .ok_or_else(|| ElevationError::tile_not_found(file_name))?;

        self.extract_from_archive(&archive, file_name)?;
        Ok(path)
    }

    /// Extract a `_dem.tif` entry from a local distribution archive.
    fn extract_from_archive(&self, archive_path: &Path, file_name: &str) -> Result<()> {
        let read_err = |e: &dyn std::fmt::Display| {
            ElevationError::raster_read(
                file_name,
                format!("{}: {}", archive_path.display(), e),
            )
        };

        let file = File::open(archive_path).map_err(|e| read_err(&e))?;
        let mut archive = zip::ZipArchive::new(file).map_err(|e| read_err(&e))?;

        // Write next to the target and rename, so a concurrent reader never
        // maps a half-written file.
        let n = self.extractions.fetch_add(1, Ordering::Relaxed);
        let partial = self
            .data_dir
            .join(format!("{}.{}.{}.part", file_name, std::process::id(), n));

        for i in 0..archive.len() {
            let mut entry = archive.by_index(i).map_err(|e| read_err(&e))?;

            let entry_name = entry.name().to_string();
            if entry_name.rsplit('/').next() == Some(file_name) {
                let mut out_file = File::create(&partial).map_err(|e| read_err(&e))?;
                std::io::copy(&mut entry, &mut out_file).map_err(|e| read_err(&e))?;
                drop(out_file);
                std::fs::rename(&partial, self.tile_path(file_name)).map_err(|e| read_err(&e))?;

                tracing::debug!(
                    archive = %archive_path.display(),
                    file = file_name,
                    "Extracted tile from archive"
                );
                return Ok(());
            }
        }

        Err(read_err(&format!("no {} entry in archive", file_name)))
    }
}

impl RasterSource for GeoTiffSource {
    type Handle = DemRaster;

    fn open(&self, file_name: &str) -> Result<DemRaster> {
        let path = self.locate(file_name)?;
        DemRaster::from_file(path)
    }

    fn read_window(&self, handle: &DemRaster, window: RasterWindow) -> Result<WindowSamples> {
        handle.read_window(window)
    }
}

/// GeoTIFF fixtures shared by the unit tests of this crate.
#[cfg(test)]
pub(crate) mod test_tiles {
    use std::fs::File;
    use std::path::Path;

    use tiff::encoder::{colortype, TiffEncoder};

    /// Write a single-band i16 GeoTIFF whose samples come from `sample(col, row)`.
    pub fn write_tile(
        path: &Path,
        width: u32,
        height: u32,
        rows_per_strip: u32,
        sample: impl Fn(u32, u32) -> i16,
    ) {
        let mut data = Vec::with_capacity((width * height) as usize);
        for row in 0..height {
            for col in 0..width {
                data.push(sample(col, row));
            }
        }

        let file = File::create(path).unwrap();
        let mut encoder = TiffEncoder::new(file).unwrap();
        let mut image = encoder
            .new_image::<colortype::GrayI16>(width, height)
            .unwrap();
        image.rows_per_strip(rows_per_strip).unwrap();
        image.write_data(&data).unwrap();
    }

    /// Sample value used by most fixtures: unique per pixel.
    pub fn gradient(col: u32, row: u32) -> i16 {
        (row * 100 + col) as i16
    }
}


#[cfg(test)]
mod tests {
    use super::test_tiles::{gradient, write_tile};
    use super::*;
    use std::io::Write;
    use tempfile::TempDir;

    const TILE: &str = "ASTGTMV003_N36E025_dem.tif";

    #[test]
    fn test_window_geometry() {
        let window = RasterWindow::new(10, 20, 13, 22);
        assert_eq!(window.width(), 3);
        assert_eq!(window.height(), 2);
        assert_eq!(window.len(), 6);
        assert!(window.contains(PixelCoord::new(12, 21)));
        assert!(!window.contains(PixelCoord::new(13, 21))); // half-open
        assert!(window.fits(13, 22));
        assert!(!window.fits(12, 22));
        assert!(!RasterWindow::new(5, 5, 5, 6).fits(100, 100)); // empty
    }

    #[test]
    fn test_window_samples_local_offsets() {
        let window = RasterWindow::new(10, 20, 12, 22);
        let samples = WindowSamples::new(window, vec![1.0, 2.0, 3.0, 4.0]);

        assert_eq!(samples.get(PixelCoord::new(10, 20)), Some(1.0));
        assert_eq!(samples.get(PixelCoord::new(11, 20)), Some(2.0));
        assert_eq!(samples.get(PixelCoord::new(10, 21)), Some(3.0));
        assert_eq!(samples.get(PixelCoord::new(11, 21)), Some(4.0));
        assert_eq!(samples.get(PixelCoord::new(12, 21)), None);
    }

    #[test]
    fn test_load_geotiff() {
        let dir = TempDir::new().unwrap();
        write_tile(&dir.path().join(TILE), 40, 30, 30, gradient);

        let raster = DemRaster::from_file(dir.path().join(TILE)).unwrap();
        assert_eq!(raster.width(), 40);
        assert_eq!(raster.height(), 30);
        assert_eq!(raster.file_name(), TILE);
        assert_eq!(
            raster.size_bytes(),
            std::fs::metadata(dir.path().join(TILE)).unwrap().len()
        );
    }

    #[test]
    fn test_read_window_across_strips() {
        let dir = TempDir::new().unwrap();
        // 4 rows per strip: the window below touches three strips
        write_tile(&dir.path().join(TILE), 40, 30, 4, gradient);

        let raster = DemRaster::from_file(dir.path().join(TILE)).unwrap();
        let window = RasterWindow::new(5, 3, 9, 10);
        let samples = raster.read_window(window).unwrap();

        assert_eq!(samples.values().len(), 4 * 7);
        for row in 3..10 {
            for col in 5..9 {
                assert_eq!(
                    samples.get(PixelCoord::new(col, row)),
                    Some(gradient(col, row) as f64),
                    "pixel ({col}, {row})"
                );
            }
        }
    }

    #[test]
    fn test_read_single_pixel_window() {
        let dir = TempDir::new().unwrap();
        write_tile(&dir.path().join(TILE), 16, 16, 3, gradient);

        let raster = DemRaster::from_file(dir.path().join(TILE)).unwrap();
        let samples = raster.read_window(RasterWindow::new(15, 15, 16, 16)).unwrap();
        assert_eq!(samples.values(), &[gradient(15, 15) as f64]);
    }

    #[test]
    fn test_window_outside_raster() {
        let dir = TempDir::new().unwrap();
        write_tile(&dir.path().join(TILE), 16, 16, 16, gradient);

        let raster = DemRaster::from_file(dir.path().join(TILE)).unwrap();
        let result = raster.read_window(RasterWindow::new(10, 10, 17, 12));

        match result {
            Err(ElevationError::InvalidWindow { width, height, .. }) => {
                assert_eq!((width, height), (16, 16));
            }
            other => panic!("Expected InvalidWindow, got {other:?}"),
        }
    }

    #[test]
    fn test_missing_file() {
        let dir = TempDir::new().unwrap();
        let source = GeoTiffSource::new(dir.path());

        match source.open(TILE) {
            Err(ElevationError::TileNotFound { file_name, .. }) => assert_eq!(file_name, TILE),
            Err(e) => panic!("Expected TileNotFound, got {e:?}"),
            Ok(_) => panic!("Expected TileNotFound"),
        }
    }

    #[test]
    fn test_not_a_tiff() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join(TILE), b"definitely not a tiff").unwrap();

        let source = GeoTiffSource::new(dir.path());
        assert!(matches!(
            source.open(TILE),
            Err(ElevationError::RasterRead { .. })
        ));
    }

    #[test]
    fn test_archive_extraction() {
        let dir = TempDir::new().unwrap();

        // Build the tile elsewhere, then package it like the USGS download
        let staging = TempDir::new().unwrap();
        write_tile(&staging.path().join(TILE), 8, 8, 8, gradient);
        let tile_bytes = std::fs::read(staging.path().join(TILE)).unwrap();

        let zip_path = dir.path().join("ASTGTMV003_N36E025.zip");
        let file = File::create(&zip_path).unwrap();
        let mut zip_writer = zip::ZipWriter::new(file);
        let options = zip::write::SimpleFileOptions::default()
            .compression_method(zip::CompressionMethod::Stored);
        zip_writer
            .start_file("ASTGTMV003_N36E025_num.tif", options)
            .unwrap();
        zip_writer.write_all(b"quality layer").unwrap();
        zip_writer.start_file(TILE, options).unwrap();
        zip_writer.write_all(&tile_bytes).unwrap();
        zip_writer.finish().unwrap();

        let source = GeoTiffSource::new(dir.path());
        let raster = source.open(TILE).unwrap();
        let samples = source
            .read_window(&raster, RasterWindow::new(2, 3, 3, 4))
            .unwrap();
        assert_eq!(samples.values(), &[gradient(2, 3) as f64]);

        // Extracted file should now exist, with no leftovers
        assert!(dir.path().join(TILE).exists());
        let leftovers = std::fs::read_dir(dir.path())
            .unwrap()
            .flatten()
            .filter(|e| e.file_name().to_string_lossy().ends_with(".part"))
            .count();
        assert_eq!(leftovers, 0);
    }

    #[test]
    fn test_archive_without_dem_entry() {
        let dir = TempDir::new().unwrap();
        let zip_path = dir.path().join("ASTGTMV003_N36E025.zip");
        let file = File::create(&zip_path).unwrap();
        let mut zip_writer = zip::ZipWriter::new(file);
        zip_writer
            .start_file(
                "ASTGTMV003_N36E025_num.tif",
                zip::write::SimpleFileOptions::default(),
            )
            .unwrap();
        zip_writer.write_all(b"quality layer").unwrap();
        zip_writer.finish().unwrap();

        let source = GeoTiffSource::new(dir.path());
        assert!(matches!(
            source.open(TILE),
            Err(ElevationError::RasterRead { .. })
        ));
    }

    #[test]
    fn test_scan_tile_files() {
        let dir = TempDir::new().unwrap();
        write_tile(&dir.path().join(TILE), 4, 4, 4, gradient);
        write_tile(
            &dir.path().join("ASTGTMV003_S06W004_dem.tif"),
            4,
            4,
            4,
            gradient,
        );
        // Archive of an already extracted tile, and a lone archive
        std::fs::write(dir.path().join("ASTGTMV003_N36E025.zip"), b"").unwrap();
        std::fs::write(dir.path().join("ASTGTMV003_N10E010.zip"), b"").unwrap();
        // Not tiles
        std::fs::write(dir.path().join("ASTGTMV003_N36E025_num.tif"), b"").unwrap();
        std::fs::write(dir.path().join("readme.txt"), b"").unwrap();

        let source = GeoTiffSource::new(dir.path());
        assert_eq!(
            source.scan_tile_files(),
            vec![
                "ASTGTMV003_N10E010_dem.tif".to_string(),
                "ASTGTMV003_N36E025_dem.tif".to_string(),
                "ASTGTMV003_S06W004_dem.tif".to_string(),
            ]
        );
    }
}
