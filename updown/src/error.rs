//! Error types for the updown library.

use thiserror::Error;

use crate::raster::RasterWindow;

/// Errors that can occur while resolving elevations.
///
/// The type is `Clone` so that a failed tile load can be handed to every
/// caller waiting on the same cache entry.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ElevationError {
    /// A point lies outside the physical coordinate range.
    #[error("Invalid coordinate at index {index}: lng={lng}, lat={lat} (valid: lng -180..180, lat -90..90)")]
    InvalidCoordinate { index: usize, lng: f64, lat: f64 },

    /// No raster file exists for a computed tile.
    #[error("DEM tile not found: {file_name}")]
    TileNotFound {
        file_name: String,
        /// Indices of the batch points that needed this tile.
        points: Vec<usize>,
    },

    /// The raster file exists but could not be opened or decoded.
    #[error("Failed to read DEM tile {file_name}: {reason}")]
    RasterRead {
        file_name: String,
        reason: String,
        /// Indices of the batch points that needed this tile.
        points: Vec<usize>,
    },

    /// A window was requested outside the raster extent.
    #[error("Window {window:?} exceeds the {width}x{height} extent of {file_name}")]
    InvalidWindow {
        file_name: String,
        window: RasterWindow,
        width: u32,
        height: u32,
        /// Indices of the batch points that needed this tile.
        points: Vec<usize>,
    },

    /// A GeoJSON geometry could not be turned into points.
    #[error("Invalid geometry: {message}")]
    InvalidGeometry { message: String },

    /// Service configuration is missing or malformed.
    #[error("Configuration error: {message}")]
    Config { message: String },

    /// A tile task stopped without producing a result.
    #[error("Tile task failed: {reason}")]
    TaskFailed { reason: String },
}

impl ElevationError {
    /// Shorthand for a [`ElevationError::TileNotFound`] not yet tied to any point.
    pub fn tile_not_found(file_name: impl Into<String>) -> Self {
        Self::TileNotFound {
            file_name: file_name.into(),
            points: Vec::new(),
        }
    }

    /// Shorthand for a [`ElevationError::RasterRead`] not yet tied to any point.
    pub fn raster_read(file_name: impl Into<String>, reason: impl ToString) -> Self {
        Self::RasterRead {
            file_name: file_name.into(),
            reason: reason.to_string(),
            points: Vec::new(),
        }
    }

    /// Shorthand for a [`ElevationError::InvalidWindow`] not yet tied to any point.
    pub fn invalid_window(
        file_name: impl Into<String>,
        window: RasterWindow,
        width: u32,
        height: u32,
    ) -> Self {
        Self::InvalidWindow {
            file_name: file_name.into(),
            window,
            width,
            height,
            points: Vec::new(),
        }
    }

    /// Attribute a tile-level failure to the points that depended on it.
    ///
    /// Variants that are not tile failures are returned unchanged.
    pub fn attribute(self, indices: Vec<usize>) -> Self {
        match self {
            Self::TileNotFound { file_name, .. } => Self::TileNotFound {
                file_name,
                points: indices,
            },
            Self::RasterRead {
                file_name, reason, ..
            } => Self::RasterRead {
                file_name,
                reason,
                points: indices,
            },
            Self::InvalidWindow {
                file_name,
                window,
                width,
                height,
                ..
            } => Self::InvalidWindow {
                file_name,
                window,
                width,
                height,
                points: indices,
            },
            other => other,
        }
    }

    /// Point indices blamed for this error, if any.
    pub fn points(&self) -> &[usize] {
        match self {
            Self::TileNotFound { points, .. }
            | Self::RasterRead { points, .. }
            | Self::InvalidWindow { points, .. } => points,
            _ => &[],
        }
    }
}

/// Result type alias using [`ElevationError`].
pub type Result<T> = std::result::Result<T, ElevationError>;
