use thiserror::Error;

use crate::geo::TileIndex;

/// I/O errors that can occur when fetching items or assets from storage
#[derive(Debug, Clone, Error)]
pub enum IoError {
    /// Error from S3 or S3-compatible storage
    #[error("S3 error: {0}")]
    S3(String),

    /// Non-success response or transport failure from an HTTP(S) server
    #[error("HTTP error: {0}")]
    Http(String),

    /// Network or connection error
    #[error("Connection error: {0}")]
    Connection(String),

    /// Local filesystem error
    #[error("Filesystem error: {0}")]
    Local(String),

    /// Object not found
    #[error("Object not found: {0}")]
    NotFound(String),

    /// The location string could not be interpreted
    #[error("Invalid location: {0}")]
    InvalidLocation(String),

    /// Requested range extends beyond the object
    #[error("Range out of bounds: offset {offset} + {requested} bytes exceeds object size {size}")]
    RangeOutOfBounds {
        offset: u64,
        requested: u64,
        size: u64,
    },
}

/// Errors raised while loading a STAC item document
#[derive(Debug, Clone, Error)]
pub enum StacError {
    /// The item could not be fetched
    #[error("STAC item unavailable at {location}: {source}")]
    SourceUnavailable {
        location: String,
        #[source]
        source: IoError,
    },

    /// The document is not a valid STAC item
    #[error("Failed to parse STAC item at {location}: {reason}")]
    Parse { location: String, reason: String },

    /// A required member of the item document is absent
    #[error("STAC item is missing required field '{field}'")]
    MissingField { field: &'static str },
}

/// Errors raised by the raster access layer
#[derive(Debug, Clone, Error)]
pub enum RasterError {
    /// I/O error while fetching the raster
    #[error("I/O error: {0}")]
    Io(#[from] IoError),

    /// The raster bytes could not be decoded
    #[error("Decode error: {0}")]
    Decode(String),

    /// Raster is missing (or has unusable) georeferencing tags
    #[error("Georeferencing error: {0}")]
    Georeference(String),

    /// The raster CRS cannot be handled
    #[error("Unsupported CRS: {0}")]
    UnsupportedCrs(String),

    /// A band index outside the raster's band range was requested
    #[error("Band {band} out of range (raster has {count} bands)")]
    BandOutOfRange { band: usize, count: usize },

    /// An overview the raster does not have was requested
    #[error("Overview {overview} out of range (raster has {count} overviews)")]
    OverviewOutOfRange { overview: usize, count: usize },

    /// A pixel window outside the raster was requested
    #[error("Window {col_off},{row_off} {width}x{height} outside raster of {raster_width}x{raster_height}")]
    WindowOutOfBounds {
        col_off: usize,
        row_off: usize,
        width: usize,
        height: usize,
        raster_width: usize,
        raster_height: usize,
    },
}

/// Errors surfaced by the tile pipeline
#[derive(Debug, Clone, Error)]
pub enum TileError {
    /// Tile index outside the tiling scheme
    #[error("Invalid tile index {z}/{x}/{y}")]
    InvalidTileIndex { z: i64, x: i64, y: i64 },

    /// Tile scale factor outside 1..=3
    #[error("Invalid scale {scale} (must be between 1 and 3)")]
    InvalidScale { scale: i64 },

    /// Requested asset is not present in the item
    #[error("Unknown asset: {asset}")]
    UnknownAsset { asset: String },

    /// Requested asset exists but is excluded or not a raster
    #[error("Asset {asset} is not eligible (media type: {media_type})")]
    IneligibleAsset { asset: String, media_type: String },

    /// Reading an asset failed, while rendering `tile` when there is one
    #[error("Failed to read asset {asset}{}: {source}", tile_context(.tile))]
    AssetRead {
        asset: String,
        tile: Option<TileIndex>,
        #[source]
        source: RasterError,
    },

    /// Invalid combination of rendering options
    #[error("Invalid {option}: {message}")]
    Configuration {
        option: &'static str,
        message: String,
    },

    /// The final image could not be encoded
    #[error("Failed to encode {format}: {message}")]
    Encoding {
        format: &'static str,
        message: String,
    },

    /// A worker task panicked or was cancelled
    #[error("Worker task failed: {0}")]
    Task(String),
}

fn tile_context(tile: &Option<TileIndex>) -> String {
    match tile {
        Some(tile) => format!(" for tile {}", tile),
        None => String::new(),
    }
}

impl TileError {
    /// Build a configuration error for the given option.
    pub fn configuration(option: &'static str, message: impl Into<String>) -> Self {
        TileError::Configuration {
            option,
            message: message.into(),
        }
    }

    /// Whether this error is caused by client input rather than a server fault.
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            TileError::InvalidTileIndex { .. }
                | TileError::InvalidScale { .. }
                | TileError::UnknownAsset { .. }
                | TileError::IneligibleAsset { .. }
                | TileError::Configuration { .. }
        )
    }
}
