//! Slippy-map tiling in Web Mercator (EPSG:3857).
//!
//! The projected world extent is a square of side `2 * ORIGIN_SHIFT` metres,
//! subdivided into `2^z x 2^z` tiles with the origin at the top-left corner.

use serde::Serialize;

use crate::error::TileError;

/// Half the side of the Web Mercator square, in metres.
pub const ORIGIN_SHIFT: f64 = 20_037_508.342_789_244;

/// Side of a tile at scale 1, in pixels.
pub const TILE_SIZE: u32 = 256;

/// Largest zoom level accepted by [`TileIndex::new`].
pub const MAX_ZOOM: u8 = 30;

/// Allowed range for the tile scale factor.
pub const MIN_SCALE: u32 = 1;
pub const MAX_SCALE: u32 = 3;

/// Default tile scale factor (512x512 tiles).
pub const DEFAULT_SCALE: u32 = 2;

/// Latitude limit of the Web Mercator square.
pub const MAX_LATITUDE: f64 = 85.051_128_779_806_59;

/// A validated tile address.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct TileIndex {
    pub z: u8,
    pub x: u32,
    pub y: u32,
}

impl TileIndex {
    /// Validate a tile address against the `2^z` grid.
    pub fn new(z: i64, x: i64, y: i64) -> Result<Self, TileError> {
        let invalid = TileError::InvalidTileIndex { z, x, y };
        if !(0..=MAX_ZOOM as i64).contains(&z) {
            return Err(invalid);
        }
        let n = 1i64 << z;
        if !(0..n).contains(&x) || !(0..n).contains(&y) {
            return Err(invalid);
        }
        Ok(Self {
            z: z as u8,
            x: x as u32,
            y: y as u32,
        })
    }

    /// Number of tiles along each axis at this zoom.
    pub fn tiles_per_axis(&self) -> u32 {
        1u32 << self.z
    }
}

impl std::fmt::Display for TileIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}/{}", self.z, self.x, self.y)
    }
}

/// Axis-aligned bounding box (west, south, east, north) in some CRS.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoundingBox {
    pub minx: f64,
    pub miny: f64,
    pub maxx: f64,
    pub maxy: f64,
}

impl BoundingBox {
    pub fn new(minx: f64, miny: f64, maxx: f64, maxy: f64) -> Self {
        Self {
            minx,
            miny,
            maxx,
            maxy,
        }
    }

    pub fn width(&self) -> f64 {
        self.maxx - self.minx
    }

    pub fn height(&self) -> f64 {
        self.maxy - self.miny
    }

    /// Whether the two boxes overlap with a non-empty area.
    pub fn intersects(&self, other: &BoundingBox) -> bool {
        self.minx < other.maxx
            && other.minx < self.maxx
            && self.miny < other.maxy
            && other.miny < self.maxy
    }

    /// Whether `other` lies entirely inside this box.
    pub fn contains(&self, other: &BoundingBox) -> bool {
        other.minx >= self.minx
            && other.maxx <= self.maxx
            && other.miny >= self.miny
            && other.maxy <= self.maxy
    }

    pub fn as_array(&self) -> [f64; 4] {
        [self.minx, self.miny, self.maxx, self.maxy]
    }
}

/// The full projected Web Mercator extent.
#[cfg(test)]
pub(crate) fn world_extent() -> BoundingBox {
    BoundingBox::new(-ORIGIN_SHIFT, -ORIGIN_SHIFT, ORIGIN_SHIFT, ORIGIN_SHIFT)
}

/// Web Mercator envelope of a tile.
pub fn tile_bounds(tile: &TileIndex) -> BoundingBox {
    let size = 2.0 * ORIGIN_SHIFT / tile.tiles_per_axis() as f64;
    let minx = -ORIGIN_SHIFT + tile.x as f64 * size;
    let maxy = ORIGIN_SHIFT - tile.y as f64 * size;
    BoundingBox::new(minx, maxy - size, minx + size, maxy)
}

/// Geographic (lon/lat) envelope of a tile.
#[cfg(test)]
pub(crate) fn tile_bounds_geographic(tile: &TileIndex) -> BoundingBox {
    let merc = tile_bounds(tile);
    let (west, south) = mercator_to_lon_lat(merc.minx, merc.miny);
    let (east, north) = mercator_to_lon_lat(merc.maxx, merc.maxy);
    BoundingBox::new(west, south, east, north)
}

/// Output tile size `(width, height)` for a scale factor.
pub fn output_size(scale: i64) -> Result<(usize, usize), TileError> {
    if !(MIN_SCALE as i64..=MAX_SCALE as i64).contains(&scale) {
        return Err(TileError::InvalidScale { scale });
    }
    let side = (TILE_SIZE as i64 * scale) as usize;
    Ok((side, side))
}

/// Spherical Mercator forward projection (degrees to metres).
#[cfg(test)]
pub(crate) fn lon_lat_to_mercator(lon: f64, lat: f64) -> (f64, f64) {
    let lat = lat.clamp(-MAX_LATITUDE, MAX_LATITUDE);
    let x = lon.to_radians() * ORIGIN_SHIFT / std::f64::consts::PI;
    let y = (std::f64::consts::FRAC_PI_4 + lat.to_radians() / 2.0).tan().ln() * ORIGIN_SHIFT
        / std::f64::consts::PI;
    (x, y)
}

/// Spherical Mercator inverse projection (metres to degrees).
pub fn mercator_to_lon_lat(x: f64, y: f64) -> (f64, f64) {
    let lon = (x / ORIGIN_SHIFT * 180.0).clamp(-180.0, 180.0);
    let lat = (2.0 * (y / ORIGIN_SHIFT * std::f64::consts::PI).exp().atan()
        - std::f64::consts::FRAC_PI_2)
        .to_degrees();
    (lon, lat)
}
