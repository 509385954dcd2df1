//! HTTP request handlers for the STAC tile API.
//!
//! This module contains the Axum handlers for serving tiles, TileJSON,
//! asset info, the viewer page and health checks.
//!
//! # Endpoints
//!
//! - `GET /stac/tiles/{z}/{x}/{y}[.{ext}]` - Serve a tile
//! - `GET /stac/tilejson.json` - TileJSON document
//! - `GET /stac/info` - Per-asset metadata
//! - `GET /stac/index.html` - Map viewer
//! - `GET /health` - Health check endpoint

use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::{header, HeaderMap, StatusCode},
    response::{Html, IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use tracing::{debug, error, warn};

use crate::error::{IoError, RasterError, StacError, TileError};
use crate::geo::TileIndex;
use crate::raster::RasterAccess;
use crate::stac::StacItem;
use crate::tile::{
    parse_asset_list, parse_indexes, parse_rescale, AssetInfoMap, ColorFormula, Colormap,
    ImageFormat, RenderOptions, ResamplingMethod, TileService,
};

use super::viewer::generate_viewer_html;

/// TileJSON specification version produced by [`tilejson_handler`].
pub const TILEJSON_VERSION: &str = "2.1.0";

// =============================================================================
// Application State
// =============================================================================

/// Shared application state: the served item and the tile service.
///
/// This is passed to all handlers via Axum's State extractor.
pub struct AppState<A: RasterAccess> {
    /// The tile service for processing tile requests
    pub tile_service: Arc<TileService<A>>,

    /// The STAC item being served
    pub item: Arc<StacItem>,

    /// Cache-Control max-age in seconds (defaults to 1 hour)
    pub cache_max_age: u32,
}

impl<A: RasterAccess> AppState<A> {
    /// Create a new application state with the given tile service.
    pub fn new(tile_service: TileService<A>, item: StacItem) -> Self {
        Self::with_cache_max_age(tile_service, item, 3600)
    }

    /// Create a new application state with custom cache max-age.
    pub fn with_cache_max_age(tile_service: TileService<A>, item: StacItem, cache_max_age: u32) -> Self {
        Self {
            tile_service: Arc::new(tile_service),
            item: Arc::new(item),
            cache_max_age,
        }
    }
}

impl<A: RasterAccess> Clone for AppState<A> {
    fn clone(&self) -> Self {
        Self {
            tile_service: Arc::clone(&self.tile_service),
            item: Arc::clone(&self.item),
            cache_max_age: self.cache_max_age,
        }
    }
}

// =============================================================================
// Request Parameters
// =============================================================================

/// Path parameters for tile requests.
///
/// Extracted from: `/stac/tiles/{z}/{x}/{filename}`
/// where filename is `{y}` or `{y}.{ext}`
#[derive(Debug, Deserialize)]
pub struct TilePathParams {
    pub z: i64,
    pub x: i64,

    /// Tile Y coordinate with optional extension (e.g., "1" or "1.png")
    pub filename: String,
}

impl TilePathParams {
    /// Split the filename into the Y coordinate and optional format.
    pub fn y_and_format(&self) -> Result<(i64, Option<ImageFormat>), TileError> {
        let (y, ext) = match self.filename.split_once('.') {
            Some((y, ext)) => (y, Some(ext)),
            None => (self.filename.as_str(), None),
        };
        let y = y.parse::<i64>().map_err(|_| {
            TileError::configuration("y", format!("'{}' is not a tile row", self.filename))
        })?;
        let format = ext.map(str::parse::<ImageFormat>).transpose()?;
        Ok((y, format))
    }
}

/// Query parameters for tile requests.
///
/// Values are kept as strings and parsed by [`TileQueryParams::to_options`]
/// so malformed values produce the tile error taxonomy.
#[derive(Debug, Default, Deserialize)]
pub struct TileQueryParams {
    /// Output scale (1-3, default 2)
    #[serde(default)]
    pub scale: Option<String>,

    /// Comma-separated asset names
    #[serde(default)]
    pub assets: Option<String>,

    /// Comma-separated 1-based band indexes
    #[serde(default)]
    pub indexes: Option<String>,

    /// Comma-separated `min,max` pairs
    #[serde(default)]
    pub rescale: Option<String>,

    #[serde(default)]
    pub color_formula: Option<String>,

    #[serde(default)]
    pub color_map: Option<String>,

    #[serde(default)]
    pub resampling_method: Option<String>,
}

impl TileQueryParams {
    /// Parse into render options.
    pub fn to_options(&self) -> Result<RenderOptions, TileError> {
        let mut options = RenderOptions::default();

        if let Some(scale) = non_empty(&self.scale) {
            options.scale = scale.parse::<i64>().map_err(|_| {
                TileError::configuration("scale", format!("'{}' is not an integer", scale))
            })?;
        }
        if let Some(assets) = non_empty(&self.assets) {
            options.assets = parse_asset_list(assets);
        }
        if let Some(indexes) = non_empty(&self.indexes) {
            options.indexes = Some(parse_indexes(indexes)?);
        }
        if let Some(rescale) = non_empty(&self.rescale) {
            options.rescale = Some(parse_rescale(rescale)?);
        }
        if let Some(formula) = non_empty(&self.color_formula) {
            options.color_formula = Some(ColorFormula::parse(formula)?);
        }
        if let Some(name) = non_empty(&self.color_map) {
            options.color_map = Some(Colormap::by_name(name)?);
        }
        if let Some(method) = non_empty(&self.resampling_method) {
            options.resampling = method.parse::<ResamplingMethod>()?;
        }

        options.validate()?;
        Ok(options)
    }
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}

/// Query parameters for the info endpoint.
#[derive(Debug, Default, Deserialize)]
pub struct InfoQueryParams {
    #[serde(default)]
    pub assets: Option<String>,
}

// =============================================================================
// Response Types
// =============================================================================

/// JSON error response returned for all error conditions.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    /// Error type identifier (e.g., "not_found", "invalid_request")
    pub error: String,

    /// Human-readable error message
    pub message: String,

    /// HTTP status code (included for convenience)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<u16>,
}

impl ErrorResponse {
    /// Create a new error response.
    pub fn new(error: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            message: message.into(),
            status: None,
        }
    }

    /// Create a new error response with status code.
    pub fn with_status(
        error: impl Into<String>,
        message: impl Into<String>,
        status: StatusCode,
    ) -> Self {
        Self {
            error: error.into(),
            message: message.into(),
            status: Some(status.as_u16()),
        }
    }
}

/// Health check response.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    /// Service status
    pub status: String,

    /// Service version
    pub version: String,
}

/// TileJSON document.
#[derive(Debug, Serialize)]
pub struct TileJson {
    pub tilejson: &'static str,
    pub name: String,
    pub version: &'static str,
    pub scheme: &'static str,
    pub tiles: Vec<String>,
    pub minzoom: u8,
    pub maxzoom: u8,
    pub bounds: [f64; 4],
    pub center: [f64; 3],
}

/// Response from the info endpoint.
#[derive(Debug, Serialize)]
pub struct InfoResponse {
    pub id: String,
    pub bounds: [f64; 4],
    pub separate: bool,
    pub assets: AssetInfoMap,
}

// =============================================================================
// Error Mapping
// =============================================================================

/// Build a JSON error response, logging by severity:
/// - 5xx at ERROR
/// - 404 at DEBUG
/// - other 4xx at WARN
fn error_response(status: StatusCode, error_type: &str, message: String) -> Response {
    if status.is_server_error() {
        error!(
            error_type = error_type,
            status = status.as_u16(),
            "Server error: {}",
            message
        );
    } else if status == StatusCode::NOT_FOUND {
        debug!(
            error_type = error_type,
            status = status.as_u16(),
            "Resource not found: {}",
            message
        );
    } else {
        warn!(
            error_type = error_type,
            status = status.as_u16(),
            "Client error: {}",
            message
        );
    }

    let error_response = ErrorResponse::with_status(error_type, message, status);
    (status, Json(error_response)).into_response()
}

/// Status and error type for a storage error.
fn io_status(err: &IoError) -> (StatusCode, &'static str) {
    match err {
        IoError::NotFound(_) => (StatusCode::NOT_FOUND, "not_found"),
        IoError::InvalidLocation(_) => (StatusCode::BAD_REQUEST, "invalid_location"),
        IoError::Connection(_) | IoError::Http(_) => (StatusCode::BAD_GATEWAY, "upstream_error"),
        IoError::S3(_) | IoError::Local(_) | IoError::RangeOutOfBounds { .. } => {
            (StatusCode::INTERNAL_SERVER_ERROR, "storage_error")
        }
    }
}

/// Convert TileError to HTTP response.
impl IntoResponse for TileError {
    fn into_response(self) -> Response {
        let (status, error_type) = match &self {
            TileError::InvalidTileIndex { .. } => (StatusCode::BAD_REQUEST, "invalid_tile_index"),
            TileError::InvalidScale { .. } => (StatusCode::BAD_REQUEST, "invalid_scale"),
            TileError::UnknownAsset { .. } => (StatusCode::NOT_FOUND, "unknown_asset"),
            TileError::IneligibleAsset { .. } => (StatusCode::BAD_REQUEST, "ineligible_asset"),
            TileError::Configuration { .. } => (StatusCode::BAD_REQUEST, "invalid_option"),
            TileError::AssetRead { source, .. } => match source {
                RasterError::Io(io_err) => match io_status(io_err) {
                    (StatusCode::NOT_FOUND, _) => (StatusCode::NOT_FOUND, "asset_not_found"),
                    _ => (StatusCode::BAD_GATEWAY, "asset_read_error"),
                },
                _ => (StatusCode::BAD_GATEWAY, "asset_read_error"),
            },
            TileError::Encoding { .. } => (StatusCode::INTERNAL_SERVER_ERROR, "encoding_error"),
            TileError::Task(_) => (StatusCode::INTERNAL_SERVER_ERROR, "internal_error"),
        };

        error_response(status, error_type, self.to_string())
    }
}

/// Convert StacError to HTTP response.
impl IntoResponse for StacError {
    fn into_response(self) -> Response {
        let (status, error_type) = match &self {
            StacError::SourceUnavailable { source, .. } => io_status(source),
            StacError::Parse { .. } | StacError::MissingField { .. } => {
                (StatusCode::UNPROCESSABLE_ENTITY, "invalid_item")
            }
        };
        error_response(status, error_type, self.to_string())
    }
}

// =============================================================================
// Handlers
// =============================================================================

/// Handle tile requests.
///
/// # Endpoint
///
/// `GET /stac/tiles/{z}/{x}/{y}[.{ext}]` with `ext` in png, jpg, jpeg, webp.
///
/// # Query Parameters
///
/// - `scale`: 1-3 (default: 2, i.e. 512x512 tiles)
/// - `assets`: comma-separated asset names (default: every eligible asset)
/// - `indexes`: comma-separated 1-based band indexes
/// - `rescale`: comma-separated `min,max` pairs
/// - `color_formula`: e.g. `gamma RGB 1.5, sigmoidal RGB 10 0.3`
/// - `color_map`: colormap name
/// - `resampling_method`: nearest, bilinear, cubic, cubic_spline, lanczos
///
/// # Response
///
/// - `200 OK`: encoded tile with `Content-Type` of the chosen format
/// - `400 Bad Request`: invalid tile index or option
/// - `404 Not Found`: unknown asset
/// - `502 Bad Gateway`: an asset could not be read
/// - `500 Internal Server Error`: encoding failure
pub async fn tile_handler<A: RasterAccess + 'static>(
    State(state): State<AppState<A>>,
    Path(params): Path<TilePathParams>,
    Query(query): Query<TileQueryParams>,
) -> Result<Response, TileError> {
    let (y, format) = params.y_and_format()?;
    let tile = TileIndex::new(params.z, params.x, y)?;

    let mut options = query.to_options()?;
    options.format = format;

    let response = state
        .tile_service
        .render_tile(&state.item, tile, &options)
        .await?;

    Ok((
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, response.format.content_type().to_string()),
            (
                header::CACHE_CONTROL,
                format!("public, max-age={}", state.cache_max_age),
            ),
        ],
        response.data,
    )
        .into_response())
}

/// Handle TileJSON requests.
///
/// # Endpoint
///
/// `GET /stac/tilejson.json`
///
/// # Query Parameters
///
/// - `tile_format`: extension appended to the tile URL template
/// - `minzoom`, `maxzoom`: override the advertised zoom range
///
/// Every other parameter is forwarded to the tile URL template. Bounds,
/// center and zoom range come from [`TileService::tile_info`], which also
/// rejects unknown or ineligible assets before a template is handed out.
pub async fn tilejson_handler<A: RasterAccess + 'static>(
    State(state): State<AppState<A>>,
    Query(params): Query<Vec<(String, String)>>,
    headers: HeaderMap,
) -> Result<Json<TileJson>, TileError> {
    let mut tile_format = None;
    let (mut minzoom, mut maxzoom) = state.tile_service.zoom_range();
    let mut options = RenderOptions::default();
    let mut forwarded = Vec::new();

    for (key, value) in &params {
        match key.as_str() {
            "tile_format" => tile_format = Some(value.parse::<ImageFormat>()?),
            "minzoom" => minzoom = parse_zoom("minzoom", value)?,
            "maxzoom" => maxzoom = parse_zoom("maxzoom", value)?,
            "assets" => {
                options = options.with_assets(parse_asset_list(value));
                forwarded.push((key.clone(), value.clone()));
            }
            _ => forwarded.push((key.clone(), value.clone())),
        }
    }
    if minzoom > maxzoom {
        return Err(TileError::configuration(
            "minzoom",
            format!("minzoom {} is greater than maxzoom {}", minzoom, maxzoom),
        ));
    }

    let extension = tile_format
        .map(|f| format!(".{}", f.extension()))
        .unwrap_or_default();
    let tiles = format!(
        "{}/stac/tiles/{{z}}/{{x}}/{{y}}{}{}",
        base_url(&headers),
        extension,
        encode_query(&forwarded)
    );

    let info = state
        .tile_service
        .tile_info(&state.item, &options)
        .await?
        .with_zoom_range(minzoom, maxzoom);

    Ok(Json(TileJson {
        tilejson: TILEJSON_VERSION,
        name: state.item.id.clone(),
        version: "1.0.0",
        scheme: "xyz",
        tiles: vec![tiles],
        minzoom: info.minzoom,
        maxzoom: info.maxzoom,
        bounds: info.bounds,
        center: info.center,
    }))
}

fn parse_zoom(option: &'static str, value: &str) -> Result<u8, TileError> {
    value
        .trim()
        .parse::<u8>()
        .ok()
        .filter(|z| *z <= crate::geo::MAX_ZOOM)
        .ok_or_else(|| TileError::configuration(option, format!("'{}' is not a zoom level", value)))
}

/// Handle info requests.
///
/// # Endpoint
///
/// `GET /stac/info?assets=a,b`
///
/// Assets whose metadata cannot be read are reported with an `error` entry.
pub async fn info_handler<A: RasterAccess + 'static>(
    State(state): State<AppState<A>>,
    Query(query): Query<InfoQueryParams>,
) -> Result<Json<InfoResponse>, TileError> {
    let options = RenderOptions::default().with_assets(
        non_empty(&query.assets)
            .map(parse_asset_list)
            .unwrap_or_default(),
    );
    let assets = state.tile_service.describe(&state.item, &options).await?;

    Ok(Json(InfoResponse {
        id: state.item.id.clone(),
        bounds: state.item.bbox.as_array(),
        separate: state.tile_service.mode().is_separate(),
        assets,
    }))
}

/// Handle viewer requests - serves an HTML map consuming the TileJSON.
///
/// # Endpoint
///
/// `GET /stac/index.html`
///
/// Query parameters are passed through to the TileJSON request.
pub async fn viewer_handler<A: RasterAccess + 'static>(
    State(state): State<AppState<A>>,
    Query(params): Query<Vec<(String, String)>>,
    headers: HeaderMap,
) -> Html<String> {
    let tilejson_url = format!(
        "{}/stac/tilejson.json{}",
        base_url(&headers),
        encode_query(&params)
    );
    Html(generate_viewer_html(&state.item.id, &tilejson_url))
}

/// Handle health check requests.
///
/// # Endpoint
///
/// `GET /health`
///
/// # Response
///
/// `200 OK` with JSON body:
/// ```json
/// {
///   "status": "healthy",
///   "version": "0.1.0"
/// }
/// ```
pub async fn health_handler() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

/// `?k=v&...` with percent-encoded pairs, or an empty string.
fn encode_query(pairs: &[(String, String)]) -> String {
    if pairs.is_empty() {
        return String::new();
    }
    let encoded: Vec<String> = pairs
        .iter()
        .map(|(k, v)| format!("{}={}", urlencoding::encode(k), urlencoding::encode(v)))
        .collect();
    format!("?{}", encoded.join("&"))
}

/// Base URL of the request, honouring `X-Forwarded-Proto` behind proxies.
fn base_url(headers: &HeaderMap) -> String {
    let host = headers
        .get(header::HOST)
        .and_then(|h| h.to_str().ok())
        .unwrap_or("localhost:8080");
    let proto = headers
        .get("x-forwarded-proto")
        .and_then(|h| h.to_str().ok())
        .unwrap_or("http");
    format!("{}://{}", proto, host)
}
