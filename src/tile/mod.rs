//! Tile rendering pipeline.
//!
//! This module turns a STAC item and a tile address into an encoded image.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────┐
//! │              HTTP Handlers              │
//! └────────────────────┬────────────────────┘
//!                      │
//!                      ▼
//! ┌─────────────────────────────────────────┐
//! │              Tile Service               │
//! │  resolver ─► reader ─► composite        │
//! │     (per asset, bounded fan-out)        │
//! │         ─► postprocess ─► encoder       │
//! └────────────────────┬────────────────────┘
//!                      │
//!                      ▼
//! ┌─────────────────────────────────────────┐
//! │            DatasetRegistry              │
//! └─────────────────────────────────────────┘
//! ```
//!
//! # Components
//!
//! - [`TileService`]: Entry point for tile, TileJSON and info requests
//! - [`RenderOptions`]: Per-request options (assets, indexes, rescale, ...)
//! - [`resolve`]: Picks the assets backing a request
//! - [`read_window`]: Resampled, masked window read of one asset
//! - [`compose`]: Stacks per-asset bands, ANDs their masks
//! - [`postprocess`]: Rescale, color formula, colormap
//! - [`encode`]: PNG / JPEG / WebP output
//! - [`aggregate_info`]: Per-asset metadata for the info endpoints

mod block;
mod colormap;
mod composite;
mod encoder;
mod formula;
mod info;
mod options;
mod postprocess;
mod reader;
mod resolver;
mod service;

pub use block::{DisplayBlock, PixelBlock, ValidityMask};
pub use colormap::{Colormap, COLORMAP_NAMES};
pub use composite::{compose, CompositeMode};
pub use encoder::{
    clamp_quality, default_format, encode, is_valid_quality, EncoderProfiles, ImageFormat,
    DEFAULT_JPEG_QUALITY, MAX_JPEG_QUALITY, MIN_JPEG_QUALITY,
};
pub use formula::{ColorFormula, Operation};
pub use info::{aggregate_info, AssetInfo, AssetInfoMap, NodataType};
pub use options::{parse_asset_list, parse_indexes, parse_rescale, RenderOptions};
pub use postprocess::{postprocess, rescale, validate_rescale};
pub use reader::{read_window, ResamplingMethod};
pub use resolver::{eligible_assets, resolve};
pub use service::{
    TileInfo, TileResponse, TileService, DEFAULT_MAX_ZOOM, DEFAULT_MIN_ZOOM, DEFAULT_WORKERS,
};
