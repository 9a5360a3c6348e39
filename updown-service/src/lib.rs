//! updown Service Library
//!
//! HTTP handlers, router and configuration for the batch elevation service.
//! This library is used by both the updown-service binary and integration tests.

pub mod config;
pub mod handlers;
pub mod results_file;

use std::sync::Arc;

use axum::{
    http::{header, HeaderName, Method},
    routing::{get, post},
    Router,
};
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use updown::ElevationService;

pub use config::{Preload, ServiceConfig};

/// Application state shared across handlers.
pub struct AppState {
    /// Elevation service for batch and single-point queries.
    pub elevation_service: ElevationService,
    /// HTTP-level settings.
    pub config: ServiceConfig,
}

/// Build the application router with CORS and request tracing.
pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/ups-and-downs", post(handlers::ups_and_downs))
        .route("/ups-and-downs/", post(handlers::ups_and_downs))
        .route("/elevation", get(handlers::get_elevation))
        .route("/health", get(handlers::health_check))
        .route("/stats", get(handlers::get_stats))
        .layer(TraceLayer::new_for_http())
        .layer(cors_layer())
        .with_state(state)
}

fn cors_layer() -> CorsLayer {
    CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PATCH,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([
            header::ORIGIN,
            HeaderName::from_static("x-requested-with"),
            header::CONTENT_TYPE,
            header::ACCEPT,
            header::AUTHORIZATION,
        ])
}

// Re-export commonly used types for convenience
pub use handlers::{
    Coordinate, ElevationQuery, ElevationResponse, ErrorResponse, HealthResponse, RequestOptions,
    StatsResponse, UpsAndDownsRequest, UpsAndDownsResponse, UpsAndDownsResult,
};
