//! HTTP server layer for the STAC tiler.
//!
//! This module provides the HTTP API for serving tiles of one STAC item.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                         HTTP Layer                              │
//! │         GET /stac/tiles/{z}/{x}/{y}.png                         │
//! │                                                                 │
//! │  ┌─────────────┐  ┌─────────────┐  ┌─────────────────────────┐  │
//! │  │  handlers   │  │   viewer    │  │        routes           │  │
//! │  │ (requests)  │  │ (Leaflet)   │  │  (router config)        │  │
//! │  └─────────────┘  └─────────────┘  └─────────────────────────┘  │
//! └─────────────────────────────────────────────────────────────────┘
//! ```

pub mod handlers;
pub mod routes;
mod viewer;

pub use handlers::{
    health_handler, info_handler, tile_handler, tilejson_handler, viewer_handler, AppState,
    ErrorResponse, HealthResponse, InfoQueryParams, InfoResponse, TileJson, TilePathParams,
    TileQueryParams, TILEJSON_VERSION,
};
pub use routes::{create_router, RouterConfig};
