pub mod batch;
pub mod info;
pub mod list;
pub mod query;

use anyhow::{Context, Result};
use std::path::PathBuf;
use updown::{CacheScope, ElevationService, ElevationServiceBuilder, TileId};

const DATA_DIR_HINT: &str =
    "UPDOWN_DATA_DIR environment variable not set. Use --data-dir or set UPDOWN_DATA_DIR";

/// Global options shared by the commands that resolve elevations.
pub struct ServiceSettings {
    pub data_dir: Option<PathBuf>,
    pub cache_scope: CacheScope,
    pub cache_size: u64,
}

impl ServiceSettings {
    pub fn build(self) -> Result<ElevationService> {
        let dir = data_dir(self.data_dir)?;
        Ok(ElevationServiceBuilder::new(dir)
            .cache_scope(self.cache_scope)
            .cache_size(self.cache_size)
            .build())
    }
}

/// Resolve the data directory from the flag or the environment.
pub fn data_dir(data_dir: Option<PathBuf>) -> Result<PathBuf> {
    match data_dir {
        Some(dir) => Ok(dir),
        None => {
            let dir = std::env::var("UPDOWN_DATA_DIR").context(DATA_DIR_HINT)?;
            Ok(PathBuf::from(dir))
        }
    }
}

/// Multi-threaded runtime for the async library calls.
pub fn runtime() -> Result<tokio::runtime::Runtime> {
    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("Failed to start async runtime")
}

pub fn format_size(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;
    const GB: u64 = MB * 1024;

    if bytes >= GB {
        format!("{:.2} GB", bytes as f64 / GB as f64)
    } else if bytes >= MB {
        format!("{:.2} MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.2} KB", bytes as f64 / KB as f64)
    } else {
        format!("{} bytes", bytes)
    }
}

/// Degree span of a tile, e.g. `N36 to N37, E025 to E026`.
pub fn coverage(tile: TileId) -> String {
    let lat_prefix = |lat: i32| if lat >= 0 { "N" } else { "S" };
    let lng_prefix = |lng: i32| if lng >= 0 { "E" } else { "W" };
    format!(
        "{}{:02} to {}{:02}, {}{:03} to {}{:03}",
        lat_prefix(tile.lat),
        tile.lat.abs(),
        lat_prefix(tile.lat + 1),
        (tile.lat + 1).abs(),
        lng_prefix(tile.lng),
        tile.lng.abs(),
        lng_prefix(tile.lng + 1),
        (tile.lng + 1).abs()
    )
}
