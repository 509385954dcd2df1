//! Tile Service for orchestrating tile rendering.
//!
//! The TileService is the main entry point for tile and info requests. It
//! orchestrates:
//! - Option validation
//! - Asset resolution
//! - Dataset access via the registry
//! - Per-asset window reads, compositing and post-processing
//! - Encoding
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                         TileService                             │
//! │  ┌─────────────────────────────────────────────────────────┐    │
//! │  │                    render_tile()                        │    │
//! │  │  1. Validate options   4. Read windows (per asset)      │    │
//! │  │  2. Resolve assets     5. Compose + post-process        │    │
//! │  │  3. Open datasets      6. Encode                        │    │
//! │  └─────────────────────────────────────────────────────────┘    │
//! │           │                    │                    │           │
//! │           ▼                    ▼                    ▼           │
//! │    ┌───────────┐      ┌────────────────┐    ┌──────────────┐    │
//! │    │ resolver  │      │DatasetRegistry │    │   encoder    │    │
//! │    └───────────┘      └────────────────┘    └──────────────┘    │
//! └─────────────────────────────────────────────────────────────────┘
//! ```

use std::sync::Arc;

use bytes::Bytes;
use futures::stream::{self, StreamExt, TryStreamExt};
use serde::Serialize;
use tracing::debug;

use crate::error::TileError;
use crate::geo::{tile_bounds, TileIndex};
use crate::raster::{DatasetRegistry, RasterAccess, RasterDataset};
use crate::stac::{AssetDescriptor, StacItem};

use super::block::{DisplayBlock, ValidityMask};
use super::composite::{compose, CompositeMode};
use super::encoder::{default_format, encode, EncoderProfiles, ImageFormat};
use super::info::{aggregate_info, AssetInfoMap};
use super::options::RenderOptions;
use super::postprocess::{postprocess, validate_rescale};
use super::reader::read_window;
use super::resolver::resolve;

/// Default number of assets read concurrently per request.
pub const DEFAULT_WORKERS: usize = 4;

/// Default minimum zoom advertised in TileJSON.
pub const DEFAULT_MIN_ZOOM: u8 = 0;

/// Default maximum zoom advertised in TileJSON.
pub const DEFAULT_MAX_ZOOM: u8 = 22;

// =============================================================================
// Responses
// =============================================================================

/// An encoded tile.
#[derive(Debug, Clone)]
pub struct TileResponse {
    /// The encoded image
    pub data: Bytes,

    /// Container the image was encoded with
    pub format: ImageFormat,

    /// Whether any pixel of the tile had data
    pub has_data: bool,
}

/// Bounds, center and zoom range of an item, plus per-asset metadata.
#[derive(Debug, Clone, Serialize)]
pub struct TileInfo {
    /// Item bbox `[west, south, east, north]`.
    pub bounds: [f64; 4],
    /// `[lon, lat, zoom]`
    pub center: [f64; 3],
    pub minzoom: u8,
    pub maxzoom: u8,
    pub assets: AssetInfoMap,
}

impl TileInfo {
    /// Advertise another zoom range; the center zoom follows `minzoom`.
    pub fn with_zoom_range(mut self, minzoom: u8, maxzoom: u8) -> Self {
        self.minzoom = minzoom;
        self.maxzoom = maxzoom;
        self.center[2] = f64::from(minzoom);
        self
    }
}

// =============================================================================
// Tile Service
// =============================================================================

/// Service rendering tiles from the assets of a STAC item.
///
/// # Type Parameters
///
/// * `A` - The raster access used to open asset hrefs
///
/// # Example
///
/// ```ignore
/// use stac_tiler::geo::TileIndex;
/// use stac_tiler::raster::{DatasetRegistry, GeoTiffAccess};
/// use stac_tiler::tile::{RenderOptions, TileService};
///
/// let service = TileService::new(DatasetRegistry::new(access));
/// let tile = TileIndex::new(2, 2, 1)?;
/// let response = service.render_tile(&item, tile, &RenderOptions::default()).await?;
/// println!("{} bytes of {}", response.data.len(), response.format);
/// ```
pub struct TileService<A: RasterAccess> {
    /// Shared registry of opened datasets
    registry: Arc<DatasetRegistry<A>>,

    /// Asset names never rendered
    exclude: Vec<String>,

    /// How bands of several assets are combined
    mode: CompositeMode,

    /// Concurrent per-asset reads
    workers: usize,

    /// Encoder settings
    profiles: EncoderProfiles,

    /// Zoom range advertised by `tile_info`
    minzoom: u8,
    maxzoom: u8,
}

impl<A: RasterAccess> TileService<A> {
    /// Create a service with default settings.
    pub fn new(registry: DatasetRegistry<A>) -> Self {
        Self::with_shared_registry(Arc::new(registry))
    }

    /// Create a service with a shared registry.
    pub fn with_shared_registry(registry: Arc<DatasetRegistry<A>>) -> Self {
        Self {
            registry,
            exclude: Vec::new(),
            mode: CompositeMode::default(),
            workers: DEFAULT_WORKERS,
            profiles: EncoderProfiles::default(),
            minzoom: DEFAULT_MIN_ZOOM,
            maxzoom: DEFAULT_MAX_ZOOM,
        }
    }

    pub fn with_exclude(mut self, exclude: Vec<String>) -> Self {
        self.exclude = exclude;
        self
    }

    pub fn with_mode(mut self, mode: CompositeMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers.max(1);
        self
    }

    pub fn with_profiles(mut self, profiles: EncoderProfiles) -> Self {
        self.profiles = profiles;
        self
    }

    pub fn with_zoom_range(mut self, minzoom: u8, maxzoom: u8) -> Self {
        self.minzoom = minzoom;
        self.maxzoom = maxzoom;
        self
    }

    pub fn registry(&self) -> &Arc<DatasetRegistry<A>> {
        &self.registry
    }

    pub fn mode(&self) -> CompositeMode {
        self.mode
    }

    pub fn zoom_range(&self) -> (u8, u8) {
        (self.minzoom, self.maxzoom)
    }

    /// Resolve asset names against the item, honouring the exclusion list.
    pub fn resolve_assets<'a>(
        &self,
        item: &'a StacItem,
        names: &[String],
    ) -> Result<Vec<&'a AssetDescriptor>, TileError> {
        resolve(item, names, &self.exclude)
    }

    /// Render and encode one tile.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - An option is malformed or does not fit the data
    /// - A requested asset is unknown or ineligible
    /// - Any resolved asset cannot be opened or read
    /// - The result cannot be encoded in the requested format
    pub async fn render_tile(
        &self,
        item: &StacItem,
        tile: TileIndex,
        options: &RenderOptions,
    ) -> Result<TileResponse, TileError> {
        let (block, mask) = self.render_block(item, tile, options).await?;
        let has_data = !mask.is_empty();
        let format = options
            .format
            .unwrap_or_else(|| default_format(&block, &mask));
        let profiles = self.profiles;

        let data = tokio::task::spawn_blocking(move || encode(&block, &mask, format, &profiles))
            .await
            .map_err(|e| TileError::Task(e.to_string()))??;

        debug!(
            tile = %tile,
            format = %format,
            bytes = data.len(),
            has_data,
            "Encoded tile"
        );

        Ok(TileResponse {
            data,
            format,
            has_data,
        })
    }

    /// Render a tile to display bands and mask, without encoding.
    pub async fn render_block(
        &self,
        item: &StacItem,
        tile: TileIndex,
        options: &RenderOptions,
    ) -> Result<(DisplayBlock, ValidityMask), TileError> {
        options.validate()?;
        let (width, height) = options.output_size()?;

        let assets = self.resolve_assets(item, &options.assets)?;
        if assets.is_empty() {
            return Err(TileError::configuration(
                "assets",
                format!("item '{}' has no eligible assets", item.id),
            ));
        }

        // Open every dataset; the first failure aborts the tile
        let datasets = stream::iter(assets.iter().map(|asset| async move {
            self.registry
                .get(&asset.href)
                .await
                .map_err(|source| TileError::AssetRead {
                    asset: asset.name.clone(),
                    tile: Some(tile),
                    source,
                })
        }).collect::<Vec<_>>())
        .buffered(self.workers)
        .try_collect::<Vec<_>>()
        .await?;

        let indexes = options.indexes.as_deref();
        let bands = datasets
            .iter()
            .map(|dataset| self.mode.read_bands(indexes, dataset.metadata()))
            .collect::<Result<Vec<_>, _>>()?;
        self.check_output_bands(&bands, options)?;

        let bounds = tile_bounds(&tile);
        let resampling = options.resampling;
        let reads = stream::iter(assets.iter().zip(datasets).zip(bands).map(
            |((asset, dataset), bands)| {
                let name = asset.name.clone();
                async move {
                    debug!(asset = %name, tile = %tile, bands = ?bands, "Reading asset window");
                    tokio::task::spawn_blocking(move || {
                        read_window(&*dataset, &bounds, width, height, &bands, resampling)
                    })
                    .await
                    .map_err(|e| TileError::Task(e.to_string()))?
                    .map_err(|source| TileError::AssetRead {
                        asset: name,
                        tile: Some(tile),
                        source,
                    })
                }
            },
        ).collect::<Vec<_>>())
        .buffered(self.workers)
        .try_collect::<Vec<_>>()
        .await?;

        let (block, mask) = compose(reads, self.mode, indexes)?;

        let rescale = options.rescale.clone();
        let formula = options.color_formula.clone();
        let colormap = options.color_map.clone();
        tokio::task::spawn_blocking(move || {
            let display = postprocess(
                &block,
                &mask,
                rescale.as_deref(),
                formula.as_ref(),
                colormap.as_ref(),
            )?;
            Ok::<_, TileError>((display, mask))
        })
        .await
        .map_err(|e| TileError::Task(e.to_string()))?
    }

    /// Reject rescale/colormap options that cannot fit the composited bands
    /// before any pixel is read.
    fn check_output_bands(
        &self,
        bands: &[Vec<usize>],
        options: &RenderOptions,
    ) -> Result<(), TileError> {
        let stacked: usize = bands.iter().map(Vec::len).sum();
        let output = match (self.mode, &options.indexes) {
            (CompositeMode::Separate, Some(indexes)) => {
                if let Some(index) = indexes.iter().find(|i| **i > stacked) {
                    return Err(TileError::configuration(
                        "indexes",
                        format!("band {} out of range (1..={})", index, stacked),
                    ));
                }
                indexes.len()
            }
            _ => stacked,
        };

        if let Some(rescale) = &options.rescale {
            validate_rescale(rescale, output)?;
        }
        if options.color_map.is_some() && output != 1 {
            return Err(TileError::configuration(
                "color_map",
                format!("colormaps apply to single-band data, got {} bands", output),
            ));
        }
        Ok(())
    }

    /// Bounds, center, zoom range and per-asset metadata for TileJSON.
    pub async fn tile_info(
        &self,
        item: &StacItem,
        options: &RenderOptions,
    ) -> Result<TileInfo, TileError> {
        let assets = self.describe(item, options).await?;
        let bbox = item.bbox;
        Ok(TileInfo {
            bounds: bbox.as_array(),
            center: [(bbox.minx + bbox.maxx) / 2.0, (bbox.miny + bbox.maxy) / 2.0, 0.0],
            minzoom: 0,
            maxzoom: 0,
            assets,
        }
        .with_zoom_range(self.minzoom, self.maxzoom))
    }

    /// Per-asset metadata of the resolved assets.
    ///
    /// Assets whose metadata cannot be read are reported in place.
    pub async fn describe(
        &self,
        item: &StacItem,
        options: &RenderOptions,
    ) -> Result<AssetInfoMap, TileError> {
        let assets = self.resolve_assets(item, &options.assets)?;
        Ok(aggregate_info(&self.registry, &assets, self.workers).await)
    }
}
