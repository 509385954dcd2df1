//! # STAC Tiler
//!
//! A dynamic map tile server for the raster assets of a single STAC item.
//!
//! Given a STAC item document (local path, `http(s)://` URL or `s3://`
//! location), this library renders Web Mercator tiles on demand by reading
//! the item's GeoTIFF / COG assets, compositing their bands, applying
//! rescaling, color formulas and colormaps, and encoding PNG, JPEG or WebP.
//!
//! ## Features
//!
//! - **Asset compositing**: Merged (per-asset band selection) or separate (one band stack across assets) modes
//! - **Validity masks**: Nodata and alpha bands become transparent pixels, ANDed across assets
//! - **Post-processing**: Linear rescale, rio-color style formulas and named colormaps
//! - **TileJSON and info endpoints**: Bounds, zoom range and per-asset metadata
//! - **Built-in web viewer**: Leaflet page driven by the TileJSON document
//!
//! ## Architecture
//!
//! The library is organized into several modules:
//!
//! - [`io`] - Location parsing, item fetches and cached range reads (HTTP, S3, local)
//! - [`stac`] - STAC item model and loader
//! - [`geo`] - Slippy-map tiling and reprojection
//! - [`raster`] - Raster dataset access and the dataset registry
//! - [`tile`] - Tile pipeline: reading, compositing, post-processing and encoding
//! - [`server`] - Axum-based HTTP server and routes
//! - [`config`] - CLI and configuration types
//!
//! ## Example
//!
//! ```rust,no_run
//! use stac_tiler::{
//!     create_router, DatasetRegistry, GeoTiffAccess, ItemLoader, ObjectFetcher, RouterConfig,
//!     StacLoader, TileService,
//! };
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let fetcher = ObjectFetcher::without_s3();
//!     let item = ItemLoader::new(fetcher.clone()).load("item.json").await?;
//!
//!     let service = TileService::new(DatasetRegistry::new(GeoTiffAccess::new(fetcher)));
//!     let router = create_router(service, item, RouterConfig::new());
//!
//!     let listener = tokio::net::TcpListener::bind("127.0.0.1:8080").await?;
//!     axum::serve(listener, router).await?;
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod error;
pub mod geo;
pub mod io;
pub mod raster;
pub mod server;
pub mod stac;
pub mod tile;

// Re-export commonly used types
pub use config::{Cli, Command, InfoConfig, ServeConfig, SourceConfig};
pub use error::{IoError, RasterError, StacError, TileError};
pub use geo::{BoundingBox, Crs, TileIndex};
pub use io::{create_s3_client, Location, ObjectFetcher};
pub use raster::{
    DatasetRegistry, GeoTiffAccess, MemoryAccess, RasterAccess, RasterDataset, RasterMetadata,
};
pub use server::{
    create_router, health_handler, info_handler, tile_handler, tilejson_handler, AppState,
    ErrorResponse, HealthResponse, RouterConfig, TileJson,
};
pub use stac::{AssetDescriptor, ItemLoader, MediaType, StacItem, StacLoader};
pub use tile::{
    AssetInfo, AssetInfoMap, ColorFormula, Colormap, CompositeMode, EncoderProfiles, ImageFormat,
    RenderOptions, ResamplingMethod, TileResponse, TileService,
};
