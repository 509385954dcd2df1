//! In-memory rasters.
//!
//! Useful for embedding the tiler over data already in memory and for tests.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;

use super::{
    check_read, DataType, GeoTransform, PixelWindow, RasterAccess, RasterDataset, RasterMetadata,
    RasterRegion,
};
use crate::error::{IoError, RasterError};
use crate::geo::Crs;

/// A raster held in memory as `f64` samples, band-major.
#[derive(Debug, Clone)]
pub struct MemoryDataset {
    metadata: RasterMetadata,
    data: Arc<Vec<f64>>,
    overviews: Vec<RasterMetadata>,
    overview_data: Vec<Arc<Vec<f64>>>,
}

impl MemoryDataset {
    /// Create a dataset from band-major samples.
    ///
    /// # Errors
    /// `Decode` if `data.len()` is not `band_count * width * height`,
    /// `Georeference` if the transform has a non-positive pixel size.
    pub fn new(
        width: usize,
        height: usize,
        band_count: usize,
        data_type: DataType,
        transform: GeoTransform,
        crs: Crs,
        data: Vec<f64>,
    ) -> Result<Self, RasterError> {
        transform.validate()?;
        if data.len() != width * height * band_count {
            return Err(RasterError::Decode(format!(
                "expected {} samples for {}x{}x{}, got {}",
                width * height * band_count,
                band_count,
                height,
                width,
                data.len()
            )));
        }
        Ok(Self {
            metadata: RasterMetadata {
                width,
                height,
                band_count,
                data_type,
                transform,
                crs,
                nodata: None,
                alpha_band: None,
            },
            data: Arc::new(data),
            overviews: Vec::new(),
            overview_data: Vec::new(),
        })
    }

    /// A dataset where every band is filled with a constant.
    ///
    /// # Panics
    /// If the transform has a non-positive pixel size.
    pub fn filled(
        width: usize,
        height: usize,
        band_values: &[f64],
        transform: GeoTransform,
        crs: Crs,
    ) -> Self {
        assert!(
            transform.validate().is_ok(),
            "pixel sizes must be positive, got {}x{}",
            transform.res_x,
            transform.res_y
        );
        let data = band_values
            .iter()
            .flat_map(|v| std::iter::repeat(*v).take(width * height))
            .collect();
        Self {
            metadata: RasterMetadata {
                width,
                height,
                band_count: band_values.len(),
                data_type: DataType::UInt8,
                transform,
                crs,
                nodata: None,
                alpha_band: None,
            },
            data: Arc::new(data),
            overviews: Vec::new(),
            overview_data: Vec::new(),
        }
    }

    pub fn with_nodata(mut self, nodata: f64) -> Self {
        self.metadata.nodata = Some(nodata);
        self
    }

    pub fn with_alpha_band(mut self, band: usize) -> Self {
        self.metadata.alpha_band = Some(band);
        self
    }

    pub fn with_data_type(mut self, data_type: DataType) -> Self {
        self.metadata.data_type = data_type;
        self
    }

    /// Add a `width x height` overview from band-major samples.
    ///
    /// Overviews must be added finest first.
    ///
    /// # Errors
    /// `Decode` if `data.len()` is not `band_count * width * height`.
    pub fn with_overview(
        mut self,
        width: usize,
        height: usize,
        data: Vec<f64>,
    ) -> Result<Self, RasterError> {
        let expected = width * height * self.metadata.band_count;
        if data.len() != expected {
            return Err(RasterError::Decode(format!(
                "expected {} overview samples, got {}",
                expected,
                data.len()
            )));
        }
        self.overviews.push(self.metadata.overview(width, height));
        self.overview_data.push(Arc::new(data));
        Ok(self)
    }
}

/// Copy `bands` over `window` out of band-major `data`.
fn copy_region(
    metadata: &RasterMetadata,
    data: &[f64],
    window: &PixelWindow,
    bands: &[usize],
) -> Result<RasterRegion, RasterError> {
    check_read(metadata, window, bands)?;

    let plane = metadata.width * metadata.height;
    let mut out = Vec::with_capacity(bands.len() * window.width * window.height);
    for &band in bands {
        for row in window.row_off..window.row_off + window.height {
            let start = band * plane + row * metadata.width + window.col_off;
            out.extend_from_slice(&data[start..start + window.width]);
        }
    }

    Ok(RasterRegion {
        window: *window,
        band_count: bands.len(),
        data: out,
    })
}

impl RasterDataset for MemoryDataset {
    fn metadata(&self) -> &RasterMetadata {
        &self.metadata
    }

    fn overviews(&self) -> &[RasterMetadata] {
        &self.overviews
    }

    fn read_region(
        &self,
        window: &PixelWindow,
        bands: &[usize],
    ) -> Result<RasterRegion, RasterError> {
        copy_region(&self.metadata, &self.data, window, bands)
    }

    fn read_overview_region(
        &self,
        overview: usize,
        window: &PixelWindow,
        bands: &[usize],
    ) -> Result<RasterRegion, RasterError> {
        match (self.overviews.get(overview), self.overview_data.get(overview)) {
            (Some(metadata), Some(data)) => copy_region(metadata, data, window, bands),
            _ => Err(RasterError::OverviewOutOfRange {
                overview,
                count: self.overviews.len(),
            }),
        }
    }
}

/// Raster access over a fixed set of in-memory datasets keyed by href.
#[derive(Default)]
pub struct MemoryAccess {
    datasets: HashMap<String, Result<MemoryDataset, RasterError>>,
    open_count: AtomicUsize,
}

impl MemoryAccess {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a dataset under `href`.
    pub fn with_dataset(mut self, href: impl Into<String>, dataset: MemoryDataset) -> Self {
        self.datasets.insert(href.into(), Ok(dataset));
        self
    }

    /// Make opening `href` fail with `error`.
    pub fn with_failure(mut self, href: impl Into<String>, error: RasterError) -> Self {
        self.datasets.insert(href.into(), Err(error));
        self
    }

    /// Number of `open` calls served so far.
    pub fn open_count(&self) -> usize {
        self.open_count.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl RasterAccess for MemoryAccess {
    type Dataset = MemoryDataset;

    async fn open(&self, href: &str) -> Result<MemoryDataset, RasterError> {
        self.open_count.fetch_add(1, Ordering::SeqCst);
        match self.datasets.get(href) {
            Some(result) => result.clone(),
            None => Err(RasterError::Io(IoError::NotFound(href.to_string()))),
        }
    }
}
