//! Service configuration from environment variables.
//!
//! | Variable | Description | Default |
//! |----------|-------------|---------|
//! | `UPDOWN_PORT` | HTTP server port | 8080 |
//! | `UPDOWN_MAX_POINTS` | Largest accepted batch | 10000 |
//! | `UPDOWN_RESULTS_DIR` | Where `results.out` is written | `./results` |
//! | `UPDOWN_PRELOAD` | `all` or `min_lng,min_lat,max_lng,max_lat[;...]` | unset |
//!
//! Tile directory and cache settings are read by
//! [`updown::ElevationServiceBuilder::from_env`].

use std::path::PathBuf;

use updown::BoundingBox;

pub const DEFAULT_PORT: u16 = 8080;
pub const DEFAULT_MAX_POINTS: usize = 10_000;
pub const DEFAULT_RESULTS_DIR: &str = "./results";

/// Which tiles to open at startup.
#[derive(Debug, Clone, PartialEq)]
pub enum Preload {
    /// Every tile in the data directory.
    All,
    /// Tiles overlapping at least one box.
    Bounds(Vec<BoundingBox>),
}

impl Preload {
    /// Bounding boxes to filter by, `None` meaning all tiles.
    pub fn bounds(&self) -> Option<&[BoundingBox]> {
        match self {
            Preload::All => None,
            Preload::Bounds(boxes) => Some(boxes),
        }
    }
}

/// HTTP-level settings.
#[derive(Debug, Clone, PartialEq)]
pub struct ServiceConfig {
    pub port: u16,
    /// Batches with more points are rejected with `413`.
    pub max_points: usize,
    /// Directory for the `writeResultsToFile` side channel.
    pub results_dir: PathBuf,
    pub preload: Option<Preload>,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT,
            max_points: DEFAULT_MAX_POINTS,
            results_dir: PathBuf::from(DEFAULT_RESULTS_DIR),
            preload: None,
        }
    }
}

impl ServiceConfig {
    /// Read the configuration, falling back to defaults for unset or
    /// unparsable values.
    pub fn from_env() -> Self {
        let port = std::env::var("UPDOWN_PORT")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(DEFAULT_PORT);

        let max_points = std::env::var("UPDOWN_MAX_POINTS")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(DEFAULT_MAX_POINTS);

        let results_dir = std::env::var("UPDOWN_RESULTS_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from(DEFAULT_RESULTS_DIR));

        let preload = std::env::var("UPDOWN_PRELOAD")
            .ok()
            .map(|value| parse_preload(&value));

        Self {
            port,
            max_points,
            results_dir,
            preload,
        }
    }
}

/// Parse the `UPDOWN_PRELOAD` environment variable value.
///
/// Supported formats:
/// - `true`, `all`, `1`: preload all tiles
/// - `min_lng,min_lat,max_lng,max_lat`: single bounding box
/// - `min_lng,min_lat,max_lng,max_lat;min_lng,...`: multiple bounding boxes
pub fn parse_preload(value: &str) -> Preload {
    let trimmed = value.trim();

    // Check for "all tiles" keywords
    match trimmed.to_lowercase().as_str() {
        "true" | "all" | "1" => return Preload::All,
        _ => {}
    }

    // Parse as bounding boxes separated by ';'
    let boxes: Vec<BoundingBox> = trimmed
        .split(';')
        .filter_map(|bbox_str| {
            let parts: Vec<f64> = bbox_str
                .split(',')
                .filter_map(|s| s.trim().parse::<f64>().ok())
                .collect();
            if parts.len() == 4 {
                Some(BoundingBox::new(parts[0], parts[1], parts[2], parts[3]))
            } else {
                tracing::warn!(
                    bbox = bbox_str,
                    "Invalid bounding box format, expected min_lng,min_lat,max_lng,max_lat"
                );
                None
            }
        })
        .collect();

    if boxes.is_empty() {
        // If parsing failed entirely, fall back to loading all tiles
        tracing::warn!(
            value = trimmed,
            "Could not parse UPDOWN_PRELOAD value, preloading all tiles"
        );
        Preload::All
    } else {
        Preload::Bounds(boxes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_preload_keywords() {
        assert_eq!(parse_preload("all"), Preload::All);
        assert_eq!(parse_preload(" TRUE "), Preload::All);
        assert_eq!(parse_preload("1"), Preload::All);
    }

    #[test]
    fn test_parse_preload_bounds() {
        let preload = parse_preload("24,35,27,38; -5,-7,-3,-5");
        assert_eq!(
            preload.bounds(),
            Some(
                &[
                    BoundingBox::new(24.0, 35.0, 27.0, 38.0),
                    BoundingBox::new(-5.0, -7.0, -3.0, -5.0),
                ][..]
            )
        );
    }

    #[test]
    fn test_parse_preload_skips_bad_boxes() {
        let preload = parse_preload("24,35,27;-5,-7,-3,-5");
        assert_eq!(
            preload,
            Preload::Bounds(vec![BoundingBox::new(-5.0, -7.0, -3.0, -5.0)])
        );

        // Nothing usable: everything
        assert_eq!(parse_preload("somewhere"), Preload::All);
    }

    #[test]
    fn test_defaults() {
        let config = ServiceConfig::default();
        assert_eq!(config.port, 8080);
        assert_eq!(config.max_points, 10_000);
        assert_eq!(config.results_dir, PathBuf::from("./results"));
        assert!(config.preload.is_none());
    }
}
