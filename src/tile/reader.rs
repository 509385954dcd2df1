//! Window reader: resampled pixel extraction for one asset.
//!
//! Every output pixel centre is projected from Web Mercator into the asset's
//! pixel grid. The minimal source window covering those positions (plus the
//! kernel footprint) is read once, then each output pixel is interpolated
//! from the valid source pixels around it.
//!
//! ```text
//!  output grid (Mercator)        source grid (native CRS)
//!  ┌──┬──┬──┬──┐                 ┌───┬───┬───┬───┬───┐
//!  │  │  │  │  │   reproject     │   │┌──┼───┼──┐│   │
//!  ├──┼──┼──┼──┤  ───────────►   ├───┼┼──┼───┼──┼┼───┤
//!  │  │  │  │  │                 │   │└──┼───┼──┘│   │  <- window read
//!  └──┴──┴──┴──┘                 └───┴───┴───┴───┴───┘
//! ```

use std::str::FromStr;

use tracing::debug;

use super::block::{PixelBlock, ValidityMask};
use crate::error::{RasterError, TileError};
use crate::geo::{BoundingBox, Reprojector};
use crate::raster::{PixelWindow, RasterDataset, RasterMetadata, RasterRegion};

/// Upper bound on kernel stretching when the output is coarser than the source.
const MAX_KERNEL_SCALE: f64 = 4.0;

/// Slack on overview selection so a level matching the output resolution
/// exactly is not lost to rounding.
const OVERVIEW_TOLERANCE: f64 = 1.01;

// =============================================================================
// Resampling methods
// =============================================================================

/// Interpolation used to compute output pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ResamplingMethod {
    Nearest,
    #[default]
    Bilinear,
    Cubic,
    CubicSpline,
    Lanczos,
}

impl ResamplingMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResamplingMethod::Nearest => "nearest",
            ResamplingMethod::Bilinear => "bilinear",
            ResamplingMethod::Cubic => "cubic",
            ResamplingMethod::CubicSpline => "cubic_spline",
            ResamplingMethod::Lanczos => "lanczos",
        }
    }

    /// Kernel support radius in source pixels.
    fn radius(&self) -> f64 {
        match self {
            ResamplingMethod::Nearest => 0.5,
            ResamplingMethod::Bilinear => 1.0,
            ResamplingMethod::Cubic | ResamplingMethod::CubicSpline => 2.0,
            ResamplingMethod::Lanczos => 3.0,
        }
    }

    /// Kernel weight at distance `x` (in kernel units).
    fn weight(&self, x: f64) -> f64 {
        let ax = x.abs();
        match self {
            ResamplingMethod::Nearest => {
                if ax < 0.5 {
                    1.0
                } else {
                    0.0
                }
            }
            ResamplingMethod::Bilinear => (1.0 - ax).max(0.0),
            ResamplingMethod::Cubic => {
                // Keys cubic convolution, a = -0.5
                let a = -0.5;
                if ax <= 1.0 {
                    (a + 2.0) * ax.powi(3) - (a + 3.0) * ax.powi(2) + 1.0
                } else if ax < 2.0 {
                    a * ax.powi(3) - 5.0 * a * ax.powi(2) + 8.0 * a * ax - 4.0 * a
                } else {
                    0.0
                }
            }
            ResamplingMethod::CubicSpline => {
                if ax < 1.0 {
                    (4.0 - 6.0 * ax.powi(2) + 3.0 * ax.powi(3)) / 6.0
                } else if ax < 2.0 {
                    (2.0 - ax).powi(3) / 6.0
                } else {
                    0.0
                }
            }
            ResamplingMethod::Lanczos => {
                if ax < 1e-12 {
                    1.0
                } else if ax < 3.0 {
                    let px = std::f64::consts::PI * ax;
                    3.0 * px.sin() * (px / 3.0).sin() / (px * px)
                } else {
                    0.0
                }
            }
        }
    }
}

impl FromStr for ResamplingMethod {
    type Err = TileError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "nearest" => Ok(ResamplingMethod::Nearest),
            "bilinear" => Ok(ResamplingMethod::Bilinear),
            "cubic" => Ok(ResamplingMethod::Cubic),
            "cubic_spline" => Ok(ResamplingMethod::CubicSpline),
            "lanczos" => Ok(ResamplingMethod::Lanczos),
            other => Err(TileError::configuration(
                "resampling_method",
                format!(
                    "unknown method '{}' (expected nearest, bilinear, cubic, cubic_spline or lanczos)",
                    other
                ),
            )),
        }
    }
}

// =============================================================================
// Window reading
// =============================================================================

/// Source pixel validity over the region read.
struct SourceMask<'a> {
    region: &'a RasterRegion,
    data_bands: usize,
    nodata: Option<f64>,
    alpha: Option<usize>,
}

impl SourceMask<'_> {
    /// Validity at window-relative `(col, row)`.
    fn is_valid(&self, col: usize, row: usize) -> bool {
        if let Some(alpha) = self.alpha {
            if self.region.get(alpha, col, row) == 0.0 {
                return false;
            }
        }
        match self.nodata {
            Some(nodata) => !(0..self.data_bands).all(|b| {
                let v = self.region.get(b, col, row);
                v == nodata || (nodata.is_nan() && v.is_nan())
            }),
            None => true,
        }
    }
}

/// Pixel-space bounding box of the output pixel centres that fall inside
/// a raster.
#[derive(Debug, Clone, Copy)]
struct Footprint {
    min_col: f64,
    max_col: f64,
    min_row: f64,
    max_row: f64,
}

impl Footprint {
    fn of(positions: &[Option<(f64, f64)>], width: usize, height: usize) -> Option<Self> {
        let (raster_w, raster_h) = (width as f64, height as f64);
        let mut footprint = Footprint {
            min_col: f64::INFINITY,
            max_col: f64::NEG_INFINITY,
            min_row: f64::INFINITY,
            max_row: f64::NEG_INFINITY,
        };
        for (col, row) in positions.iter().flatten() {
            if *col >= 0.0 && *col < raster_w && *row >= 0.0 && *row < raster_h {
                footprint.min_col = footprint.min_col.min(*col);
                footprint.max_col = footprint.max_col.max(*col);
                footprint.min_row = footprint.min_row.min(*row);
                footprint.max_row = footprint.max_row.max(*row);
            }
        }
        footprint.min_col.is_finite().then_some(footprint)
    }
}

/// Coarsest overview with at least one pixel per output pixel, or `None`
/// for the full resolution image.
///
/// `positions` are the output pixel centres in the full resolution grid.
fn select_overview<D: RasterDataset + ?Sized>(
    dataset: &D,
    positions: &[Option<(f64, f64)>],
    width: usize,
    height: usize,
) -> Option<usize> {
    let overviews = dataset.overviews();
    if overviews.is_empty() {
        return None;
    }

    // Full resolution pixels per output pixel, from the whole output grid
    // so partial coverage does not bias the estimate
    let mut cols = (f64::INFINITY, f64::NEG_INFINITY);
    let mut rows = (f64::INFINITY, f64::NEG_INFINITY);
    for (col, row) in positions.iter().flatten() {
        cols = (cols.0.min(*col), cols.1.max(*col));
        rows = (rows.0.min(*row), rows.1.max(*row));
    }
    let per_col = (cols.1 - cols.0) / width.saturating_sub(1).max(1) as f64;
    let per_row = (rows.1 - rows.0) / height.saturating_sub(1).max(1) as f64;
    let decimation = per_col.min(per_row);
    if !decimation.is_finite() {
        return None;
    }

    let meta = dataset.metadata();
    overviews
        .iter()
        .enumerate()
        .filter(|(_, overview)| meta.decimation(overview) <= decimation * OVERVIEW_TOLERANCE)
        .max_by(|a, b| meta.decimation(a.1).total_cmp(&meta.decimation(b.1)))
        .map(|(index, _)| index)
}

/// Read `indexes` (0-based) of `dataset` resampled onto the `width x height`
/// grid covering `bounds` (Web Mercator).
///
/// Reads come from the coarsest overview that still resolves the output
/// grid, so low zooms touch few source pixels. When `bounds` misses the
/// dataset, the block is zero-filled with an all-invalid mask and nothing is
/// read.
///
/// # Errors
/// Propagates CRS and read failures from the dataset.
pub fn read_window<D: RasterDataset + ?Sized>(
    dataset: &D,
    bounds: &BoundingBox,
    width: usize,
    height: usize,
    indexes: &[usize],
    resampling: ResamplingMethod,
) -> Result<(PixelBlock, ValidityMask), RasterError> {
    let full = dataset.metadata();
    let reprojector = Reprojector::from_mercator(full.crs)?;

    // Native CRS position of each output pixel centre
    let step_x = bounds.width() / width as f64;
    let step_y = bounds.height() / height as f64;
    let mut points: Vec<Option<(f64, f64)>> = Vec::with_capacity(width * height);
    for j in 0..height {
        let y = bounds.maxy - (j as f64 + 0.5) * step_y;
        for i in 0..width {
            let x = bounds.minx + (i as f64 + 0.5) * step_x;
            points.push(reprojector.transform(x, y));
        }
    }

    let to_grid = |meta: &RasterMetadata| -> Vec<Option<(f64, f64)>> {
        points
            .iter()
            .map(|p| p.map(|(x, y)| meta.transform.to_pixel(x, y)))
            .collect()
    };

    let mut positions = to_grid(full);
    let overview = select_overview(dataset, &positions, width, height);
    let meta = match overview {
        Some(index) => {
            let meta = &dataset.overviews()[index];
            positions = to_grid(meta);
            meta
        }
        None => full,
    };

    let Some(footprint) = Footprint::of(&positions, meta.width, meta.height) else {
        debug!("Tile bounds miss the raster, returning an empty block");
        return Ok((
            PixelBlock::zeros(indexes.len(), width, height),
            ValidityMask::all_invalid(width, height),
        ));
    };

    let (raster_w, raster_h) = (meta.width as f64, meta.height as f64);
    let inside = |col: f64, row: f64| col >= 0.0 && col < raster_w && row >= 0.0 && row < raster_h;

    // Stretch the kernel when several source pixels fall in one output pixel
    let scale_x =
        ((footprint.max_col - footprint.min_col) / width as f64).clamp(1.0, MAX_KERNEL_SCALE);
    let scale_y =
        ((footprint.max_row - footprint.min_row) / height as f64).clamp(1.0, MAX_KERNEL_SCALE);
    let reach_x = resampling.radius() * scale_x;
    let reach_y = resampling.radius() * scale_y;

    let col_start = (footprint.min_col - reach_x).floor().max(0.0) as usize;
    let row_start = (footprint.min_row - reach_y).floor().max(0.0) as usize;
    let col_end = ((footprint.max_col + reach_x).ceil() as usize + 1).min(meta.width);
    let row_end = ((footprint.max_row + reach_y).ceil() as usize + 1).min(meta.height);
    let window = PixelWindow::new(
        col_start,
        row_start,
        col_end - col_start,
        row_end - row_start,
    );

    let mut bands = indexes.to_vec();
    let alpha = meta.alpha_band.map(|alpha_band| {
        bands.push(alpha_band);
        bands.len() - 1
    });

    debug!(
        window = ?window,
        overview = ?overview,
        bands = ?indexes,
        resampling = resampling.as_str(),
        "Reading source window"
    );
    let region = match overview {
        Some(index) => dataset.read_overview_region(index, &window, &bands)?,
        None => dataset.read_region(&window, &bands)?,
    };
    let mask = SourceMask {
        region: &region,
        data_bands: indexes.len(),
        nodata: meta.nodata,
        alpha,
    };

    let plane = width * height;
    let mut data = vec![0.0; indexes.len() * plane];
    let mut valid = vec![false; plane];
    let mut taps: Vec<(usize, usize, f64)> = Vec::new();

    for (p, position) in positions.iter().enumerate() {
        let Some((col, row)) = *position else {
            continue;
        };
        if !inside(col, row) {
            continue;
        }

        // Window-relative nearest source pixel decides validity
        let near_col = col.floor() as usize - window.col_off;
        let near_row = row.floor() as usize - window.row_off;
        if !mask.is_valid(near_col, near_row) {
            continue;
        }
        valid[p] = true;

        if resampling == ResamplingMethod::Nearest {
            for b in 0..indexes.len() {
                data[b * plane + p] = region.get(b, near_col, near_row);
            }
            continue;
        }

        // Kernel centred on the position, in pixel-centre coordinates
        let u = col - 0.5 - window.col_off as f64;
        let v = row - 0.5 - window.row_off as f64;
        taps.clear();
        let mut total = 0.0;
        let c0 = (u - reach_x).floor().max(0.0) as usize;
        let c1 = ((u + reach_x).ceil().max(0.0) as usize).min(window.width - 1);
        let r0 = (v - reach_y).floor().max(0.0) as usize;
        let r1 = ((v + reach_y).ceil().max(0.0) as usize).min(window.height - 1);
        for r in r0..=r1 {
            let wy = resampling.weight((r as f64 - v) / scale_y);
            if wy == 0.0 {
                continue;
            }
            for c in c0..=c1 {
                let wx = resampling.weight((c as f64 - u) / scale_x);
                if wx == 0.0 || !mask.is_valid(c, r) {
                    continue;
                }
                taps.push((c, r, wx * wy));
                total += wx * wy;
            }
        }

        for b in 0..indexes.len() {
            data[b * plane + p] = if total.abs() > 1e-12 {
                taps.iter()
                    .map(|(c, r, w)| region.get(b, *c, *r) * w)
                    .sum::<f64>()
                    / total
            } else {
                region.get(b, near_col, near_row)
            };
        }
    }

    Ok((
        PixelBlock::new(indexes.len(), width, height, data),
        ValidityMask::new(width, height, valid),
    ))
}
