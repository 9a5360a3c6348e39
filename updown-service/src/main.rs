//! updown Service - HTTP microservice for batched ASTER GDEM elevation queries.
//!
//! ## Environment Variables
//!
//! | Variable | Description | Default |
//! |----------|-------------|---------|
//! | `UPDOWN_DATA_DIR` | Directory containing `_dem.tif` tiles or their `.zip` archives | Current directory |
//! | `UPDOWN_CACHE_SCOPE` | `batch` or `process` | `batch` |
//! | `UPDOWN_CACHE_SIZE` | Maximum tiles kept with process scope | 16 |
//! | `UPDOWN_PORT` | HTTP server port | 8080 |
//! | `UPDOWN_MAX_POINTS` | Largest accepted batch | 10000 |
//! | `UPDOWN_RESULTS_DIR` | Where `results.out` is written | `./results` |
//! | `UPDOWN_PRELOAD` | `all` or `min_lng,min_lat,max_lng,max_lat[;...]` | unset |
//! | `RUST_LOG` | Log level (e.g., "info", "debug") | "info" |
//!
//! ## Endpoints
//!
//! - `POST /ups-and-downs` - Batch elevation query
//! - `GET /elevation?lng=X&lat=Y` - Single-point elevation
//! - `GET /health` - Health check
//! - `GET /stats` - Cache statistics
//! - `GET /docs` - OpenAPI documentation (Swagger UI)

use std::net::SocketAddr;
use std::sync::Arc;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use updown::ElevationServiceBuilder;
use updown_service::{handlers, router, AppState, ServiceConfig};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

/// OpenAPI documentation for the updown service.
#[derive(OpenApi)]
#[openapi(
    info(
        title = "updown Elevation Service",
        version = "0.1.0",
        description = "Batched elevation lookups over ASTER GDEM tiles.",
        license(name = "MIT", url = "https://opensource.org/licenses/MIT")
    ),
    paths(
        handlers::ups_and_downs,
        handlers::get_elevation,
        handlers::health_check,
        handlers::get_stats,
    ),
    components(
        schemas(
            handlers::Coordinate,
            handlers::RequestOptions,
            handlers::UpsAndDownsRequest,
            handlers::UpsAndDownsResponse,
            handlers::UpsAndDownsResult,
            handlers::PointElevation,
            handlers::CacheSize,
            handlers::ElevationResponse,
            handlers::ErrorResponse,
            handlers::HealthResponse,
            handlers::StatsResponse,
        )
    ),
    tags(
        (name = "elevation", description = "Elevation query endpoints"),
        (name = "system", description = "System and health endpoints")
    )
)]
struct ApiDoc;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "updown_service=info,updown=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = ServiceConfig::from_env();

    // The library handles UPDOWN_DATA_DIR, UPDOWN_CACHE_SCOPE, UPDOWN_CACHE_SIZE
    let elevation_service = match ElevationServiceBuilder::from_env() {
        Ok(builder) => builder.build(),
        Err(e) => {
            tracing::warn!(error = %e, "Falling back to the current directory");
            ElevationServiceBuilder::new(".").build()
        }
    };

    tracing::info!(
        data_dir = %elevation_service.data_dir().display(),
        cache_scope = ?elevation_service.cache_scope(),
        cache_capacity = elevation_service.cache_capacity(),
        max_points = config.max_points,
        port = config.port,
        "Starting updown service"
    );

    if let Some(preload) = &config.preload {
        let bounds = preload.bounds();
        tracing::info!(
            bounds = ?bounds.map(|b| b.len()),
            "Preloading tiles into cache"
        );
        let stats = elevation_service.preload(bounds);
        tracing::info!(
            tiles_loaded = stats.tiles_loaded,
            tiles_already_cached = stats.tiles_already_cached,
            tiles_failed = stats.tiles_failed,
            tiles_matched = stats.tiles_matched,
            elapsed_ms = stats.elapsed_ms,
            "Preload complete"
        );
    }

    let port = config.port;
    let state = Arc::new(AppState {
        elevation_service,
        config,
    });

    let app = router(state)
        .merge(SwaggerUi::new("/docs").url("/api-docs/openapi.json", ApiDoc::openapi()));

    // Start server
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = tokio::net::TcpListener::bind(addr).await?;

    tracing::info!("Listening on http://{}", addr);

    axum::serve(listener, app).await?;

    Ok(())
}
