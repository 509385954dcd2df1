//! Geometry: slippy-map tiling and coordinate reprojection.

pub mod projection;
pub mod tiling;

pub use projection::{transform_bounds, Crs, Reprojector, EPSG_WEB_MERCATOR, EPSG_WGS84};
pub use tiling::{
    mercator_to_lon_lat, output_size, tile_bounds, BoundingBox, TileIndex, DEFAULT_SCALE,
    MAX_SCALE, MAX_ZOOM, MIN_SCALE, TILE_SIZE,
};
