//! GeoJSON elevation enrichment.
//!
//! Enable the `geojson` feature to use this module. Every position of the
//! input is resolved in a single batch, so a feature collection spread over
//! a few tiles reads each tile once.
//!
//! # Example
//!
//! ```ignore
//! use updown::{ElevationService, ResolveOptions};
//! use updown::geojson::add_elevations_to_geometry;
//! use geojson::Geometry;
//!
//! let service = ElevationService::new("/data/aster");
//!
//! let geometry: Geometry = r#"{"type": "Point", "coordinates": [25.5, 36.5]}"#
//!     .parse()
//!     .unwrap();
//!
//! let enriched = add_elevations_to_geometry(&service, geometry, ResolveOptions::default()).await?;
//! // Result: {"type": "Point", "coordinates": [25.5, 36.5, 314.0]}
//! ```

use geojson::{GeoJson, Geometry, Value};

use crate::coords::Point;
use crate::error::{ElevationError, Result};
use crate::raster::RasterSource;
use crate::service::{ElevationService, ResolveOptions};

/// Add elevations to all positions of a GeoJSON geometry.
///
/// Positions are `[lng, lat]` or `[lng, lat, z]`; the elevation becomes (or
/// replaces) the Z coordinate. All geometry types are supported, including
/// nested geometry collections.
///
/// # Errors
///
/// - [`ElevationError::InvalidGeometry`] if a position has fewer than 2 elements
/// - any error of [`ElevationService::resolve_batch`]
pub async fn add_elevations_to_geometry<S: RasterSource>(
    service: &ElevationService<S>,
    geometry: Geometry,
    options: ResolveOptions,
) -> Result<Geometry> {
    match add_elevations_to_geojson(service, GeoJson::Geometry(geometry), options).await? {
        GeoJson::Geometry(geometry) => Ok(geometry),
        _ => Err(ElevationError::InvalidGeometry {
            message: "geometry changed kind during enrichment".to_string(),
        }),
    }
}

/// Add elevations to every position of a geometry, feature or feature
/// collection. Features without a geometry are left as they are.
pub async fn add_elevations_to_geojson<S: RasterSource>(
    service: &ElevationService<S>,
    mut geojson: GeoJson,
    options: ResolveOptions,
) -> Result<GeoJson> {
    let mut points = Vec::new();
    visit_geojson(&mut geojson, &mut |position| {
        if position.len() < 2 {
            return Err(ElevationError::InvalidGeometry {
                message: "Coordinate must have at least 2 elements (lng, lat)".to_string(),
            });
        }
        points.push(Point::new(position[0], position[1]));
        Ok(())
    })?;

    let mut results = service.elevations(&points, options).await?.into_iter();

    visit_geojson(&mut geojson, &mut |position| {
        let result = results.next().ok_or_else(|| ElevationError::InvalidGeometry {
            message: "fewer elevations than positions".to_string(),
        })?;
        position.truncate(2);
        position.push(result.elev);
        Ok(())
    })?;

    Ok(geojson)
}

fn visit_geojson<F>(geojson: &mut GeoJson, visit: &mut F) -> Result<()>
where
    F: FnMut(&mut Vec<f64>) -> Result<()>,
{
    match geojson {
        GeoJson::Geometry(geometry) => visit_positions(&mut geometry.value, visit),
        GeoJson::Feature(feature) => match &mut feature.geometry {
            Some(geometry) => visit_positions(&mut geometry.value, visit),
            None => Ok(()),
        },
        GeoJson::FeatureCollection(collection) => {
            for feature in &mut collection.features {
                if let Some(geometry) = &mut feature.geometry {
                    visit_positions(&mut geometry.value, visit)?;
                }
            }
            Ok(())
        }
    }
}

/// Call `visit` on every position of `value`, in document order.
fn visit_positions<F>(value: &mut Value, visit: &mut F) -> Result<()>
where
    F: FnMut(&mut Vec<f64>) -> Result<()>,
{
    match value {
        Value::Point(position) => visit(position),
        Value::MultiPoint(positions) | Value::LineString(positions) => {
            positions.iter_mut().try_for_each(|p| visit(p))
        }
        Value::MultiLineString(lines) | Value::Polygon(lines) => {
            lines.iter_mut().flatten().try_for_each(|p| visit(p))
        }
        Value::MultiPolygon(polygons) => polygons
            .iter_mut()
            .flatten()
            .flatten()
            .try_for_each(|p| visit(p)),
        Value::GeometryCollection(geometries) => geometries
            .iter_mut()
            .try_for_each(|g| visit_positions(&mut g.value, visit)),
    }
}
