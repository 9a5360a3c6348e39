use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use updown::coords::{Point, TileId};
use updown::filename::{parse_tile_file_name, tile_file_name};
use updown::raster::{DemRaster, RasterWindow};
use updown::{GeoTiffSource, RasterSource};

/// Rows decoded per read while scanning a tile.
const BAND_ROWS: u32 = 256;

pub fn run(
    data_dir: Option<PathBuf>,
    tile: Option<String>,
    position: Option<(f64, f64)>,
) -> Result<()> {
    let raster = match (position, tile) {
        (Some((lng, lat)), _) => {
            let name = tile_file_name(TileId::containing(Point::new(lng, lat)));
            open_in_data_dir(data_dir, &name)?
        }
        (None, Some(tile)) if tile.ends_with(".tif") && Path::new(&tile).exists() => {
            DemRaster::from_file(&tile).context("Failed to load tile")?
        }
        (None, Some(tile)) => {
            let name = tile_name(&tile)
                .with_context(|| format!("Not a tile name or existing file: {}", tile))?;
            open_in_data_dir(data_dir, &name)?
        }
        (None, None) => anyhow::bail!("Give a tile name, a path, or --lng and --lat"),
    };

    let file_name = raster.file_name().to_string();
    let file_size = raster.size_bytes();
    let (min_elev, max_elev) = sample_range(&raster)?;

    println!("Tile: {}", file_name);
    if let Some(origin) = parse_tile_file_name(&file_name) {
        println!("Coverage: {}", super::coverage(origin));
    }
    println!("Dimensions: {} x {}", raster.width(), raster.height());
    println!("File size: {}", super::format_size(file_size));
    println!();

    if let Some((min_elev, max_elev)) = min_elev.zip(max_elev) {
        println!("Min elevation: {}m", min_elev);
        println!("Max elevation: {}m", max_elev);
    }

    Ok(())
}

fn open_in_data_dir(data_dir: Option<PathBuf>, file_name: &str) -> Result<DemRaster> {
    let source = GeoTiffSource::new(super::data_dir(data_dir)?);
    source
        .open(file_name)
        .with_context(|| format!("Failed to load tile from {}", source.data_dir().display()))
}

/// Canonical `_dem.tif` name for a full name, archive name or `N36E025`.
fn tile_name(input: &str) -> Option<String> {
    parse_tile_file_name(input)
        .or_else(|| parse_tile_file_name(&format!("ASTGTMV003_{}_dem.tif", input)))
        .map(tile_file_name)
}

/// Lowest and highest sample, read in bands of rows.
fn sample_range(raster: &DemRaster) -> Result<(Option<f64>, Option<f64>)> {
    let (mut min, mut max) = (None::<f64>, None::<f64>);

    let mut row = 0;
    while row < raster.height() {
        let end = (row + BAND_ROWS).min(raster.height());
        let band = raster
            .read_window(RasterWindow::new(0, row, raster.width(), end))
            .context("Failed to read tile")?;
        for &value in band.values() {
            min = Some(min.map_or(value, |m| m.min(value)));
            max = Some(max.map_or(value, |m| m.max(value)));
        }
        row = end;
    }

    Ok((min, max))
}
