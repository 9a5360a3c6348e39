//! Concurrent per-tile reads and scatter of samples back to points.

use std::sync::Arc;

use tokio::task::JoinSet;

use crate::aggregate::ImageAssociation;
use crate::cache::{PixelKey, ResultCache};
use crate::error::{ElevationError, Result};
use crate::raster::RasterSource;

/// Reads every tile of a batch once and turns the samples into elevations.
pub struct BatchResolver<S> {
    source: Arc<S>,
}

impl<S> Clone for BatchResolver<S> {
    fn clone(&self) -> Self {
        Self {
            source: Arc::clone(&self.source),
        }
    }
}

impl<S: RasterSource> BatchResolver<S> {
    pub fn new(source: Arc<S>) -> Self {
        Self { source }
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    /// Resolve the elevation of every point referenced by `associations`.
    ///
    /// Each tile is read on its own blocking task. The returned vector has
    /// `point_count` entries indexed like the batch; it is only produced
    /// once every tile has been read.
    ///
    /// # Errors
    ///
    /// The first tile to fail ends the batch. Its error lists every point
    /// index that depended on the tile, and the remaining tile tasks are
    /// abandoned. Dropping the returned future abandons them as well: tasks
    /// not yet started never run, while a window decode already in progress
    /// finishes in the background and its result is discarded.
    pub async fn resolve(
        &self,
        associations: Vec<ImageAssociation>,
        point_count: usize,
        cache: Arc<ResultCache<S::Handle>>,
    ) -> Result<Vec<f64>> {
        let mut tasks = JoinSet::new();
        for association in associations {
            let source = Arc::clone(&self.source);
            let cache = Arc::clone(&cache);
            tasks.spawn_blocking(move || read_tile(source.as_ref(), &association, &cache));
        }

        let mut elevations = vec![0.0; point_count];
        while let Some(joined) = tasks.join_next().await {
            let contributions = joined.map_err(|e| ElevationError::TaskFailed {
                reason: e.to_string(),
            })??;

            for (point, value) in contributions {
                if let Some(elevation) = elevations.get_mut(point) {
                    *elevation += value;
                }
            }
        }

        Ok(elevations)
    }
}

/// Read one tile's window and return weighted `(point, value)` contributions.
fn read_tile<S: RasterSource>(
    source: &S,
    association: &ImageAssociation,
    cache: &ResultCache<S::Handle>,
) -> Result<Vec<(usize, f64)>> {
    let file_name = association.file_name();
    let blame = |e: ElevationError| e.attribute(association.point_indices());

    let handle = cache
        .get_or_load(file_name, || source.open(file_name))
        .map_err(blame)?;

    let window = association.window();
    let samples = source.read_window(&handle, window).map_err(blame)?;

    let mut contributions = Vec::new();
    for request in association.pixels() {
        let pixel = request.pixel();
        let sample = cache
            .get_or_read(PixelKey::new(association.tile(), pixel), || {
                samples.get(pixel).ok_or_else(|| {
                    ElevationError::raster_read(
                        file_name,
                        format!("pixel {pixel:?} missing from window {window:?}"),
                    )
                })
            })
            .map_err(blame)?;

        for user in request.users() {
            contributions.push((user.point, user.weight() * sample));
        }
    }

    tracing::debug!(
        file = file_name,
        pixels = association.pixels().len(),
        width = window.width(),
        height = window.height(),
        "Read tile window"
    );

    Ok(contributions)
}
