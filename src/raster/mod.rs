//! Raster access layer.
//!
//! The tile pipeline only needs two things from a raster asset: its
//! georeferenced metadata and the ability to read a pixel window of selected
//! bands. Both are expressed by the [`RasterDataset`] trait; [`RasterAccess`]
//! opens datasets from asset hrefs.
//!
//! ```text
//! ┌────────────────────┐  open(href)   ┌──────────────────┐
//! │ DatasetRegistry<A> │ ────────────► │ A: RasterAccess  │
//! │  (LRU + in-flight) │ ◄──────────── │  GeoTiffAccess   │
//! └────────────────────┘  A::Dataset   │  MemoryAccess    │
//!                                      └──────────────────┘
//! ```

mod geotiff;
mod memory;
mod registry;

pub use geotiff::{GeoTiffAccess, GeoTiffDataset};
pub use memory::{MemoryAccess, MemoryDataset};
pub use registry::{DatasetRegistry, DEFAULT_DATASET_CACHE_CAPACITY};

use async_trait::async_trait;
use serde::Serialize;

use crate::error::RasterError;
use crate::geo::{BoundingBox, Crs};

// =============================================================================
// Metadata
// =============================================================================

/// Sample type of a raster's bands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DataType {
    UInt8,
    Int8,
    UInt16,
    Int16,
    UInt32,
    Int32,
    Float32,
    Float64,
}

impl DataType {
    pub fn as_str(&self) -> &'static str {
        match self {
            DataType::UInt8 => "uint8",
            DataType::Int8 => "int8",
            DataType::UInt16 => "uint16",
            DataType::Int16 => "int16",
            DataType::UInt32 => "uint32",
            DataType::Int32 => "int32",
            DataType::Float32 => "float32",
            DataType::Float64 => "float64",
        }
    }
}

impl std::fmt::Display for DataType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// North-up affine transform from pixel to CRS coordinates.
///
/// `x = origin_x + col * res_x`, `y = origin_y - row * res_y`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GeoTransform {
    pub origin_x: f64,
    pub origin_y: f64,
    pub res_x: f64,
    pub res_y: f64,
}

impl GeoTransform {
    pub fn new(origin_x: f64, origin_y: f64, res_x: f64, res_y: f64) -> Self {
        Self {
            origin_x,
            origin_y,
            res_x,
            res_y,
        }
    }

    /// Check that both pixel sizes are finite and positive.
    ///
    /// # Errors
    /// `Georeference` otherwise; south-up rasters carry a negative `res_y`.
    pub fn validate(&self) -> Result<(), RasterError> {
        let positive = |r: f64| r.is_finite() && r > 0.0;
        if !positive(self.res_x) || !positive(self.res_y) {
            return Err(RasterError::Georeference(format!(
                "non-positive pixel size {}x{}",
                self.res_x, self.res_y
            )));
        }
        Ok(())
    }

    /// Fractional pixel coordinates `(col, row)` of a CRS point.
    pub fn to_pixel(&self, x: f64, y: f64) -> (f64, f64) {
        ((x - self.origin_x) / self.res_x, (self.origin_y - y) / self.res_y)
    }

    /// CRS coordinates of fractional pixel coordinates.
    pub fn to_world(&self, col: f64, row: f64) -> (f64, f64) {
        (
            self.origin_x + col * self.res_x,
            self.origin_y - row * self.res_y,
        )
    }
}

/// Georeferenced description of a raster.
#[derive(Debug, Clone, PartialEq)]
pub struct RasterMetadata {
    pub width: usize,
    pub height: usize,
    pub band_count: usize,
    pub data_type: DataType,
    pub transform: GeoTransform,
    pub crs: Crs,

    /// Value marking missing samples, applied to every band.
    pub nodata: Option<f64>,

    /// 0-based index of an alpha band, if the raster carries one.
    pub alpha_band: Option<usize>,
}

impl RasterMetadata {
    /// Extent of the raster in its native CRS.
    pub fn bounds(&self) -> BoundingBox {
        let (minx, maxy) = self.transform.to_world(0.0, 0.0);
        let (maxx, miny) = self
            .transform
            .to_world(self.width as f64, self.height as f64);
        BoundingBox::new(minx, miny, maxx, maxy)
    }

    /// Number of bands excluding the alpha band.
    pub fn data_band_count(&self) -> usize {
        match self.alpha_band {
            Some(_) => self.band_count.saturating_sub(1),
            None => self.band_count,
        }
    }

    /// 0-based indexes of the data bands, in order.
    pub fn data_bands(&self) -> Vec<usize> {
        (0..self.band_count)
            .filter(|b| Some(*b) != self.alpha_band)
            .collect()
    }

    /// Metadata of a `width x height` overview covering the same extent.
    pub fn overview(&self, width: usize, height: usize) -> RasterMetadata {
        let t = self.transform;
        RasterMetadata {
            width,
            height,
            transform: GeoTransform::new(
                t.origin_x,
                t.origin_y,
                t.res_x * self.width as f64 / width.max(1) as f64,
                t.res_y * self.height as f64 / height.max(1) as f64,
            ),
            ..self.clone()
        }
    }

    /// Source pixels per overview pixel along x.
    pub fn decimation(&self, overview: &RasterMetadata) -> f64 {
        self.width as f64 / overview.width.max(1) as f64
    }
}

// =============================================================================
// Windows
// =============================================================================

/// A rectangle of whole pixels inside a raster.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PixelWindow {
    pub col_off: usize,
    pub row_off: usize,
    pub width: usize,
    pub height: usize,
}

impl PixelWindow {
    pub fn new(col_off: usize, row_off: usize, width: usize, height: usize) -> Self {
        Self {
            col_off,
            row_off,
            width,
            height,
        }
    }

    /// Check that the window lies inside a `raster_width x raster_height` raster.
    pub fn check_within(&self, raster_width: usize, raster_height: usize) -> Result<(), RasterError> {
        if self.width == 0
            || self.height == 0
            || self.col_off + self.width > raster_width
            || self.row_off + self.height > raster_height
        {
            return Err(RasterError::WindowOutOfBounds {
                col_off: self.col_off,
                row_off: self.row_off,
                width: self.width,
                height: self.height,
                raster_width,
                raster_height,
            });
        }
        Ok(())
    }
}

/// Samples read from a window, band-major (`band * height * width + row * width + col`).
#[derive(Debug, Clone, PartialEq)]
pub struct RasterRegion {
    pub window: PixelWindow,
    pub band_count: usize,
    pub data: Vec<f64>,
}

impl RasterRegion {
    /// Sample at window-relative `(col, row)` of the `band`-th read band.
    #[inline]
    pub fn get(&self, band: usize, col: usize, row: usize) -> f64 {
        self.data[(band * self.window.height + row) * self.window.width + col]
    }
}

/// Validate the request of a `read_region` call against the metadata.
pub(crate) fn check_read(
    metadata: &RasterMetadata,
    window: &PixelWindow,
    bands: &[usize],
) -> Result<(), RasterError> {
    window.check_within(metadata.width, metadata.height)?;
    if let Some(&band) = bands.iter().find(|b| **b >= metadata.band_count) {
        return Err(RasterError::BandOutOfRange {
            band,
            count: metadata.band_count,
        });
    }
    Ok(())
}

// =============================================================================
// Traits
// =============================================================================

/// An opened raster.
///
/// Reads are synchronous and may block on I/O; callers run them on blocking
/// threads.
pub trait RasterDataset: Send + Sync {
    /// Metadata of the full resolution image.
    fn metadata(&self) -> &RasterMetadata;

    /// Reduced-resolution versions of the image, finest first.
    ///
    /// Overviews share the extent, bands, CRS and nodata of the full image.
    fn overviews(&self) -> &[RasterMetadata] {
        &[]
    }

    /// Read the given 0-based bands over a pixel window.
    ///
    /// # Errors
    /// `WindowOutOfBounds` or `BandOutOfRange` for requests outside the raster.
    fn read_region(&self, window: &PixelWindow, bands: &[usize])
        -> Result<RasterRegion, RasterError>;

    /// Read from the `overview`-th entry of [`overviews`](Self::overviews),
    /// with the window in that overview's pixel grid.
    ///
    /// # Errors
    /// `OverviewOutOfRange` for a missing overview, otherwise as `read_region`.
    fn read_overview_region(
        &self,
        overview: usize,
        window: &PixelWindow,
        bands: &[usize],
    ) -> Result<RasterRegion, RasterError> {
        let _ = (window, bands);
        Err(RasterError::OverviewOutOfRange {
            overview,
            count: self.overviews().len(),
        })
    }
}

/// Capability to open a raster asset from its href.
#[async_trait]
pub trait RasterAccess: Send + Sync {
    /// The dataset type this access opens.
    type Dataset: RasterDataset + 'static;

    /// Open the raster at `href`.
    async fn open(&self, href: &str) -> Result<Self::Dataset, RasterError>;
}
