use anyhow::Result;
use std::fs;
use updown::filename::{archive_file_name, parse_tile_file_name};
use updown::GeoTiffSource;

use super::{coverage, format_size};

pub fn run(data_dir: Option<std::path::PathBuf>) -> Result<()> {
    let dir = super::data_dir(data_dir)?;

    if !dir.exists() {
        anyhow::bail!("Data directory does not exist: {}", dir.display());
    }

    let source = GeoTiffSource::new(&dir);
    let tiles = source.scan_tile_files();

    if tiles.is_empty() {
        println!("No ASTER GDEM tiles found in: {}", dir.display());
        return Ok(());
    }

    let mut extracted_count = 0;
    let mut archived_count = 0;
    let mut total_size: u64 = 0;

    println!("{:<28} {:>9} {:>26}", "TILE", "STORED", "COVERAGE");
    println!("{}", "-".repeat(65));

    for name in &tiles {
        let Some(tile) = parse_tile_file_name(name) else {
            continue;
        };

        let stored = match file_size(&source.tile_path(name)) {
            Some(size) => {
                extracted_count += 1;
                total_size += size;
                "tif"
            }
            None => {
                archived_count += 1;
                total_size += file_size(&dir.join(archive_file_name(tile))).unwrap_or(0);
                "zip"
            }
        };

        println!("{:<28} {:>9} {:>26}", name, stored, coverage(tile));
    }

    // Summary
    println!();
    println!("Summary:");
    println!("  Total tiles: {}", tiles.len());
    if extracted_count > 0 {
        println!("  Extracted: {}", extracted_count);
    }
    if archived_count > 0 {
        println!("  Archive only: {}", archived_count);
    }
    println!("  Total size: {}", format_size(total_size));
    println!("  Data directory: {}", dir.display());

    Ok(())
}

fn file_size(path: &std::path::Path) -> Option<u64> {
    fs::metadata(path).ok().map(|m| m.len())
}
