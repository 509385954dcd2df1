//! Router configuration for the STAC tiler.
//!
//! This module defines the HTTP routes and applies middleware for CORS and
//! request tracing.
//!
//! # Route Structure
//!
//! ```text
//! /health                              - Health check
//! /stac/tiles/{z}/{x}/{y}[.{ext}]      - Tile endpoint
//! /stac/tilejson.json                  - TileJSON
//! /stac/info                           - Per-asset metadata
//! /stac/index.html                     - Map viewer
//! ```
//!
//! # Example
//!
//! ```ignore
//! use stac_tiler::server::{create_router, RouterConfig};
//! use stac_tiler::tile::TileService;
//! use stac_tiler::raster::DatasetRegistry;
//!
//! // Create the tile service
//! let tile_service = TileService::new(DatasetRegistry::new(access));
//!
//! // Configure and create router
//! let config = RouterConfig::new()
//!     .with_cors_origins(vec!["https://example.com".to_string()]);
//!
//! let router = create_router(tile_service, item, config);
//!
//! // Run the server
//! let listener = tokio::net::TcpListener::bind("127.0.0.1:8080").await?;
//! axum::serve(listener, router).await?;
//! ```

use std::time::Duration;

use axum::{routing::get, Router};
use http::header::CONTENT_TYPE;
use http::Method;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use super::handlers::{
    health_handler, info_handler, tile_handler, tilejson_handler, viewer_handler, AppState,
};
use crate::raster::RasterAccess;
use crate::stac::StacItem;
use crate::tile::TileService;

// =============================================================================
// Router Configuration
// =============================================================================

/// Configuration for the HTTP router.
#[derive(Debug, Clone)]
pub struct RouterConfig {
    /// Allowed CORS origins (None = allow any origin)
    pub cors_origins: Option<Vec<String>>,

    /// Cache-Control max-age in seconds
    pub cache_max_age: u32,

    /// Whether to enable request tracing
    pub enable_tracing: bool,
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self::new()
    }
}

impl RouterConfig {
    /// Create a new router configuration.
    ///
    /// By default:
    /// - CORS allows any origin
    /// - Cache max-age is 1 hour (3600 seconds)
    /// - Tracing is enabled
    pub fn new() -> Self {
        Self {
            cors_origins: None,
            cache_max_age: 3600,
            enable_tracing: true,
        }
    }

    /// Set specific allowed CORS origins.
    ///
    /// Pass an empty vec to disallow all cross-origin requests.
    pub fn with_cors_origins(mut self, origins: Vec<String>) -> Self {
        self.cors_origins = Some(origins);
        self
    }

    /// Allow any CORS origin.
    pub fn with_cors_any_origin(mut self) -> Self {
        self.cors_origins = None;
        self
    }

    /// Set the Cache-Control max-age in seconds.
    pub fn with_cache_max_age(mut self, seconds: u32) -> Self {
        self.cache_max_age = seconds;
        self
    }

    /// Enable or disable request tracing.
    pub fn with_tracing(mut self, enabled: bool) -> Self {
        self.enable_tracing = enabled;
        self
    }
}

// =============================================================================
// Router Builder
// =============================================================================

/// Create the main application router serving one STAC item.
///
/// # Arguments
///
/// * `tile_service` - The tile service for handling tile requests
/// * `item` - The STAC item whose assets are served
/// * `config` - Router configuration
pub fn create_router<A>(tile_service: TileService<A>, item: StacItem, config: RouterConfig) -> Router
where
    A: RasterAccess + 'static,
{
    let app_state = AppState::with_cache_max_age(tile_service, item, config.cache_max_age);
    let cors = build_cors_layer(&config);

    // Uses {filename} to capture both "{y}" and "{y}.{ext}"
    let stac_routes = Router::new()
        .route("/tiles/{z}/{x}/{filename}", get(tile_handler::<A>))
        .route("/tilejson.json", get(tilejson_handler::<A>))
        .route("/info", get(info_handler::<A>))
        .route("/index.html", get(viewer_handler::<A>))
        .with_state(app_state);

    let router = Router::new()
        .route("/health", get(health_handler))
        .nest("/stac", stac_routes)
        .layer(cors);

    if config.enable_tracing {
        router.layer(TraceLayer::new_for_http())
    } else {
        router
    }
}

/// Build the CORS layer based on configuration.
fn build_cors_layer(config: &RouterConfig) -> CorsLayer {
    let cors = CorsLayer::new()
        .allow_methods([Method::GET, Method::HEAD, Method::OPTIONS])
        .allow_headers([CONTENT_TYPE])
        .max_age(Duration::from_secs(86400)); // 24 hours

    match &config.cors_origins {
        None => cors.allow_origin(Any),
        Some(origins) if origins.is_empty() => cors,
        Some(origins) => {
            let parsed_origins: Vec<_> = origins.iter().filter_map(|o| o.parse().ok()).collect();
            cors.allow_origin(parsed_origins)
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
