//! HTTP request handlers for the elevation service.

use std::sync::Arc;

use axum::{
    extract::{rejection::JsonRejection, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use updown::{ElevationError, ElevationResult, Point, ResolveOptions};
use utoipa::{IntoParams, ToSchema};

use crate::{results_file, AppState};

/// A longitude/latitude pair.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, ToSchema)]
pub struct Coordinate {
    /// Longitude in decimal degrees (-180 to 180).
    pub lng: f64,
    /// Latitude in decimal degrees (-90 to 90).
    pub lat: f64,
}

/// Per-request options of a batch query.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct RequestOptions {
    /// Bilinear interpolation between the four surrounding samples.
    #[serde(default)]
    pub interpolate: bool,
    /// Also write the results to `results.out` for diagnostics.
    #[serde(default)]
    pub write_results_to_file: bool,
}

/// Batch elevation request.
#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct UpsAndDownsRequest {
    /// Points to resolve, in order.
    pub coords_array: Vec<Coordinate>,
    /// Defaults to no interpolation and no results file.
    #[serde(default)]
    pub options: Option<RequestOptions>,
}

/// Elevation of one requested point.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct PointElevation {
    pub lng: f64,
    pub lat: f64,
    /// Elevation in meters, rounded to one decimal place.
    pub elev: f64,
}

impl From<ElevationResult> for PointElevation {
    fn from(result: ElevationResult) -> Self {
        Self {
            lng: result.lng,
            lat: result.lat,
            elev: result.elev,
        }
    }
}

/// What the batch touched.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct CacheSize {
    /// Distinct pixels sampled.
    pub pixels: u64,
    /// Distinct tiles read.
    pub images: u64,
}

/// Elevations of a batch with what it touched.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct UpsAndDownsResult {
    /// One entry per requested point, in request order.
    pub result: Vec<PointElevation>,
    pub cache_size: CacheSize,
}

/// Successful batch response: `{"result": {"result": [...], "cacheSize": {...}}}`.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct UpsAndDownsResponse {
    pub result: UpsAndDownsResult,
}

/// Query parameters for the single-point endpoint.
#[derive(Debug, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct ElevationQuery {
    /// Longitude in decimal degrees (-180 to 180).
    pub lng: f64,
    /// Latitude in decimal degrees (-90 to 90).
    pub lat: f64,
    /// Whether to use bilinear interpolation. Default is false.
    #[serde(default)]
    pub interpolate: bool,
}

/// Successful single-point response.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ElevationResponse {
    pub lng: f64,
    pub lat: f64,
    /// Elevation in meters, rounded to one decimal place.
    pub elev: f64,
    /// Whether interpolation was used.
    pub interpolated: bool,
}

/// Error response.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ErrorResponse {
    /// Error message.
    pub error: String,
    /// Indices of the request points the error is about.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub points: Option<Vec<usize>>,
}

/// Health check response.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct HealthResponse {
    /// Service status.
    pub status: String,
    /// Service version.
    pub version: String,
}

/// Cache statistics response.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct StatsResponse {
    /// `batch` or `process`.
    pub cache_scope: String,
    /// Number of tiles kept across batches.
    pub cached_tiles: u64,
    /// Maximum tiles kept across batches (0 with batch scope).
    pub cache_capacity: u64,
    /// Cache hit count.
    pub cache_hits: u64,
    /// Cache miss count.
    pub cache_misses: u64,
    /// Cache hit rate (0.0 to 1.0).
    pub hit_rate: f64,
}

/// Resolve elevations for a batch of points.
#[utoipa::path(
    post,
    path = "/ups-and-downs",
    tag = "elevation",
    request_body = UpsAndDownsRequest,
    responses(
        (status = 200, description = "Elevations in request order", body = UpsAndDownsResponse),
        (status = 400, description = "Malformed body or invalid coordinate", body = ErrorResponse),
        (status = 404, description = "Tile data unavailable", body = ErrorResponse),
        (status = 413, description = "Too many points", body = ErrorResponse),
        (status = 500, description = "Tile could not be read", body = ErrorResponse)
    )
)]
pub async fn ups_and_downs(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<UpsAndDownsRequest>, JsonRejection>,
) -> Response {
    let Json(request) = match payload {
        Ok(payload) => payload,
        Err(rejection) => {
            tracing::warn!(error = %rejection, "Rejected batch request");
            return error_body(StatusCode::BAD_REQUEST, rejection.body_text(), None);
        }
    };

    let options = request.options.unwrap_or_default();
    let count = request.coords_array.len();

    if count > state.config.max_points {
        tracing::warn!(
            points = count,
            max_points = state.config.max_points,
            "Batch too large"
        );
        return error_body(
            StatusCode::PAYLOAD_TOO_LARGE,
            format!(
                "POST request limit exceeded (limited to {} points)",
                state.config.max_points
            ),
            None,
        );
    }

    let points: Vec<Point> = request
        .coords_array
        .iter()
        .map(|c| Point::new(c.lng, c.lat))
        .collect();

    let resolve_options = ResolveOptions {
        interpolate: options.interpolate,
        ..ResolveOptions::default()
    };

    let batch = match state
        .elevation_service
        .resolve_batch(&points, resolve_options)
        .await
    {
        Ok(batch) => batch,
        Err(e) => return error_response(e),
    };

    if options.write_results_to_file {
        let dir = state.config.results_dir.clone();
        let results = batch.results.clone();
        let written =
            tokio::task::spawn_blocking(move || results_file::write_results(&dir, &options, &results))
                .await;
        match written {
            Ok(Ok(path)) => tracing::debug!(path = %path.display(), "Results written"),
            Ok(Err(e)) => tracing::warn!(error = %e, "Failed to write results file"),
            Err(e) => tracing::warn!(error = %e, "Results file task failed"),
        }
    }

    let response = UpsAndDownsResponse {
        result: UpsAndDownsResult {
            result: batch.results.into_iter().map(PointElevation::from).collect(),
            cache_size: CacheSize {
                pixels: batch.stats.pixels,
                images: batch.stats.tiles,
            },
        },
    };

    (StatusCode::OK, Json(response)).into_response()
}

/// Get elevation for a single point.
#[utoipa::path(
    get,
    path = "/elevation",
    tag = "elevation",
    params(ElevationQuery),
    responses(
        (status = 200, description = "Elevation found", body = ElevationResponse),
        (status = 400, description = "Invalid coordinates", body = ErrorResponse),
        (status = 404, description = "Tile data unavailable", body = ErrorResponse),
        (status = 500, description = "Tile could not be read", body = ErrorResponse)
    )
)]
pub async fn get_elevation(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ElevationQuery>,
) -> Response {
    tracing::debug!(
        lng = query.lng,
        lat = query.lat,
        interpolate = query.interpolate,
        "Elevation query"
    );

    let options = ResolveOptions {
        interpolate: query.interpolate,
        ..ResolveOptions::default()
    };

    match state
        .elevation_service
        .elevation(Point::new(query.lng, query.lat), options)
        .await
    {
        Ok(elev) => (
            StatusCode::OK,
            Json(ElevationResponse {
                lng: query.lng,
                lat: query.lat,
                elev,
                interpolated: query.interpolate,
            }),
        )
            .into_response(),
        Err(e) => error_response(e),
    }
}

/// Map a library error to a status code and error body.
fn error_response(e: ElevationError) -> Response {
    let status = match &e {
        ElevationError::InvalidCoordinate { .. } | ElevationError::InvalidGeometry { .. } => {
            StatusCode::BAD_REQUEST
        }
        ElevationError::TileNotFound { .. } => StatusCode::NOT_FOUND,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };

    let points = match &e {
        ElevationError::InvalidCoordinate { index, .. } => Some(vec![*index]),
        other if !other.points().is_empty() => Some(other.points().to_vec()),
        _ => None,
    };

    tracing::warn!(error = %e, status = status.as_u16(), "Elevation query failed");

    error_body(status, e.to_string(), points)
}

fn error_body(status: StatusCode, error: String, points: Option<Vec<usize>>) -> Response {
    (status, Json(ErrorResponse { error, points })).into_response()
}

/// Health check endpoint.
///
/// Returns service status and version.
#[utoipa::path(
    get,
    path = "/health",
    tag = "system",
    responses((status = 200, description = "Service is healthy", body = HealthResponse))
)]
pub async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

/// Get cache statistics.
///
/// Returns information about the tile cache.
#[utoipa::path(
    get,
    path = "/stats",
    tag = "system",
    responses((status = 200, description = "Cache statistics", body = StatsResponse))
)]
pub async fn get_stats(State(state): State<Arc<AppState>>) -> Json<StatsResponse> {
    let service = &state.elevation_service;
    let stats = service.cache_stats();

    Json(StatsResponse {
        cache_scope: match service.cache_scope() {
            updown::CacheScope::Batch => "batch",
            updown::CacheScope::Process => "process",
        }
        .to_string(),
        cached_tiles: stats.entry_count,
        cache_capacity: service.cache_capacity(),
        cache_hits: stats.hit_count,
        cache_misses: stats.miss_count,
        hit_rate: stats.hit_rate(),
    })
}
