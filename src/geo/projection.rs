//! Coordinate reference systems and point reprojection.
//!
//! Tiles are addressed in Web Mercator while assets may be stored in any CRS.
//! WGS84 and Web Mercator are handled in closed form; every other EPSG code
//! goes through proj4rs with definitions from `crs-definitions`.

use proj4rs::proj::Proj;
use proj4rs::transform::transform;

use super::tiling::{mercator_to_lon_lat, BoundingBox};
use crate::error::RasterError;

/// EPSG code of WGS84 geographic coordinates.
pub const EPSG_WGS84: u16 = 4326;

/// EPSG code of Web Mercator.
pub const EPSG_WEB_MERCATOR: u16 = 3857;

/// A coordinate reference system identified by EPSG code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Crs {
    Wgs84,
    WebMercator,
    Epsg(u16),
}

impl Crs {
    pub fn from_epsg(code: u16) -> Self {
        match code {
            EPSG_WGS84 => Crs::Wgs84,
            EPSG_WEB_MERCATOR | 3785 => Crs::WebMercator,
            other => Crs::Epsg(other),
        }
    }

    pub fn epsg(&self) -> u16 {
        match self {
            Crs::Wgs84 => EPSG_WGS84,
            Crs::WebMercator => EPSG_WEB_MERCATOR,
            Crs::Epsg(code) => *code,
        }
    }

    /// Whether coordinates in this CRS are degrees of longitude/latitude.
    pub fn is_geographic(&self) -> bool {
        match self {
            Crs::Wgs84 => true,
            Crs::WebMercator => false,
            Crs::Epsg(code) => proj_string(*code)
                .map(|p| p.contains("+proj=longlat"))
                .unwrap_or(false),
        }
    }
}

impl std::fmt::Display for Crs {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "EPSG:{}", self.epsg())
    }
}

fn proj_string(code: u16) -> Option<&'static str> {
    crs_definitions::from_code(code).map(|def| def.proj4)
}

fn load_proj(code: u16) -> Result<Proj, RasterError> {
    let definition = proj_string(code)
        .ok_or_else(|| RasterError::UnsupportedCrs(format!("EPSG:{code} has no definition")))?;
    Proj::from_proj_string(definition)
        .map_err(|e| RasterError::UnsupportedCrs(format!("EPSG:{code}: {e:?}")))
}

enum Strategy {
    Identity,
    MercatorToGeographic,
    Proj {
        source: Proj,
        target: Proj,
        // Input is Web Mercator, unprojected in closed form before proj4rs
        from_mercator: bool,
        source_geographic: bool,
        target_geographic: bool,
    },
}

/// Point transformer between two CRSs.
pub struct Reprojector {
    strategy: Strategy,
}

impl Reprojector {
    /// Transformer from Web Mercator tile coordinates into `target`.
    pub fn from_mercator(target: Crs) -> Result<Self, RasterError> {
        let strategy = match target {
            Crs::WebMercator => Strategy::Identity,
            Crs::Wgs84 => Strategy::MercatorToGeographic,
            Crs::Epsg(code) => Strategy::Proj {
                source: load_proj(EPSG_WGS84)?,
                target: load_proj(code)?,
                from_mercator: true,
                source_geographic: true,
                target_geographic: target.is_geographic(),
            },
        };
        Ok(Self { strategy })
    }

    /// Transformer from `source` into WGS84 longitude/latitude.
    pub fn to_geographic(source: Crs) -> Result<Self, RasterError> {
        let strategy = match source {
            Crs::Wgs84 => Strategy::Identity,
            Crs::WebMercator => Strategy::MercatorToGeographic,
            Crs::Epsg(code) => Strategy::Proj {
                source: load_proj(code)?,
                target: load_proj(EPSG_WGS84)?,
                from_mercator: false,
                source_geographic: source.is_geographic(),
                target_geographic: true,
            },
        };
        Ok(Self { strategy })
    }

    /// Transform a single point. Returns `None` where the projection is undefined.
    pub fn transform(&self, x: f64, y: f64) -> Option<(f64, f64)> {
        match &self.strategy {
            Strategy::Identity => Some((x, y)),
            Strategy::MercatorToGeographic => Some(mercator_to_lon_lat(x, y)),
            Strategy::Proj {
                source,
                target,
                from_mercator,
                source_geographic,
                target_geographic,
            } => {
                let (x, y) = if *from_mercator {
                    mercator_to_lon_lat(x, y)
                } else {
                    (x, y)
                };
                // proj4rs works in radians for geographic systems
                let mut point = if *source_geographic {
                    (x.to_radians(), y.to_radians(), 0.0)
                } else {
                    (x, y, 0.0)
                };
                transform(source, target, &mut point).ok()?;
                let out = if *target_geographic {
                    (point.0.to_degrees(), point.1.to_degrees())
                } else {
                    (point.0, point.1)
                };
                (out.0.is_finite() && out.1.is_finite()).then_some(out)
            }
        }
    }
}

/// Reproject a bounding box by sampling its edges.
pub fn transform_bounds(
    reprojector: &Reprojector,
    bounds: &BoundingBox,
    samples: usize,
) -> Option<BoundingBox> {
    let samples = samples.max(2);
    let mut minx = f64::INFINITY;
    let mut miny = f64::INFINITY;
    let mut maxx = f64::NEG_INFINITY;
    let mut maxy = f64::NEG_INFINITY;
    for i in 0..samples {
        let t = i as f64 / (samples - 1) as f64;
        let x = bounds.minx + t * bounds.width();
        let y = bounds.miny + t * bounds.height();
        for (px, py) in [
            (x, bounds.miny),
            (x, bounds.maxy),
            (bounds.minx, y),
            (bounds.maxx, y),
        ] {
            if let Some((tx, ty)) = reprojector.transform(px, py) {
                minx = minx.min(tx);
                miny = miny.min(ty);
                maxx = maxx.max(tx);
                maxy = maxy.max(ty);
            }
        }
    }
    (minx.is_finite() && maxx.is_finite()).then(|| BoundingBox::new(minx, miny, maxx, maxy))
}
