//! Test utilities for integration tests.
//!
//! This module provides in-memory items and datasets, a GeoTIFF writer for
//! filesystem round trips, and helpers for driving the router.

use std::io::Cursor;
use std::path::PathBuf;

use axum::body::Body;
use axum::http::{Request, Response, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use tiff::encoder::colortype::Gray8;
use tiff::encoder::TiffEncoder;
use tiff::tags::Tag;
use tower::ServiceExt;

use stac_tiler::geo::{BoundingBox, Crs};
use stac_tiler::raster::{DatasetRegistry, GeoTransform, MemoryAccess, MemoryDataset};
use stac_tiler::stac::{AssetDescriptor, StacItem};
use stac_tiler::tile::TileService;
use stac_tiler::{create_router, RouterConfig};

pub const COG: &str = "image/tiff; application=geotiff; profile=cloud-optimized";
pub const PNG: &str = "image/png";

// =============================================================================
// Items and Datasets
// =============================================================================

/// An item with bbox [-10,-10,10,10] and the given `(name, href, media type)` assets.
pub fn item(assets: &[(&str, &str, Option<&str>)]) -> StacItem {
    StacItem {
        id: "test-item".to_string(),
        bbox: BoundingBox::new(-10.0, -10.0, 10.0, 10.0),
        assets: assets
            .iter()
            .map(|(name, href, media)| AssetDescriptor::new(*name, *href, *media))
            .collect(),
    }
}

/// A constant-valued dataset covering the Web Mercator latitude range.
///
/// 360x170 pixels of one degree each.
pub fn world_dataset(bands: &[f64]) -> MemoryDataset {
    MemoryDataset::filled(
        360,
        170,
        bands,
        GeoTransform::new(-180.0, 85.0, 1.0, 1.0),
        Crs::Wgs84,
    )
}

/// A constant-valued dataset covering exactly [-10,-10,10,10].
pub fn local_dataset(bands: &[f64]) -> MemoryDataset {
    MemoryDataset::filled(
        200,
        200,
        bands,
        GeoTransform::new(-10.0, 10.0, 0.1, 0.1),
        Crs::Wgs84,
    )
}

/// A router serving `item` from `access` with default settings.
pub fn router(access: MemoryAccess, item: StacItem) -> Router {
    router_with(TileService::new(DatasetRegistry::new(access)), item)
}

pub fn router_with(service: TileService<MemoryAccess>, item: StacItem) -> Router {
    create_router(service, item, RouterConfig::new().with_tracing(false))
}

// =============================================================================
// Request Helpers
// =============================================================================

pub async fn get(router: Router, uri: &str) -> Response<Body> {
    let request = Request::builder()
        .uri(uri)
        .header("host", "tiles.test")
        .body(Body::empty())
        .unwrap();
    router.oneshot(request).await.unwrap()
}

pub async fn body_bytes(response: Response<Body>) -> Vec<u8> {
    response
        .into_body()
        .collect()
        .await
        .unwrap()
        .to_bytes()
        .to_vec()
}

pub async fn body_json(response: Response<Body>) -> serde_json::Value {
    serde_json::from_slice(&body_bytes(response).await).unwrap()
}

/// Assert the status and return the JSON error `error` field.
pub async fn error_type(response: Response<Body>, status: StatusCode) -> String {
    assert_eq!(response.status(), status);
    let json = body_json(response).await;
    json["error"].as_str().unwrap().to_string()
}

pub fn content_type(response: &Response<Body>) -> &str {
    response
        .headers()
        .get("content-type")
        .unwrap()
        .to_str()
        .unwrap()
}

// =============================================================================
// Image Checks
// =============================================================================

pub fn is_valid_jpeg(data: &[u8]) -> bool {
    data.len() >= 4 && data[0..2] == [0xFF, 0xD8] && data[data.len() - 2..] == [0xFF, 0xD9]
}

pub fn is_valid_png(data: &[u8]) -> bool {
    data.starts_with(&[0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A])
}

pub fn decode(data: &[u8]) -> image::DynamicImage {
    image::load_from_memory(data).unwrap()
}

// =============================================================================
// GeoTIFF Files
// =============================================================================

const MODEL_PIXEL_SCALE: u16 = 33550;
const MODEL_TIEPOINT: u16 = 33922;
const GEO_KEY_DIRECTORY: u16 = 34735;
const GDAL_NODATA: u16 = 42113;

/// Encode a single-band u8 GeoTIFF in EPSG:4326.
pub fn geotiff_bytes(
    width: u32,
    height: u32,
    data: &[u8],
    origin: (f64, f64),
    res: f64,
    nodata: Option<&str>,
) -> Vec<u8> {
    let mut buffer = Cursor::new(Vec::new());
    let mut encoder = TiffEncoder::new(&mut buffer).unwrap();
    let mut image = encoder.new_image::<Gray8>(width, height).unwrap();
    {
        let dir = image.encoder();
        dir.write_tag(Tag::Unknown(MODEL_PIXEL_SCALE), &[res, res, 0.0][..])
            .unwrap();
        dir.write_tag(
            Tag::Unknown(MODEL_TIEPOINT),
            &[0.0, 0.0, 0.0, origin.0, origin.1, 0.0][..],
        )
        .unwrap();
        let keys: [u16; 12] = [1, 1, 0, 2, 1024, 0, 1, 2, 2048, 0, 1, 4326];
        dir.write_tag(Tag::Unknown(GEO_KEY_DIRECTORY), &keys[..])
            .unwrap();
        if let Some(nodata) = nodata {
            dir.write_tag(Tag::Unknown(GDAL_NODATA), nodata).unwrap();
        }
    }
    image.write_data(data).unwrap();
    buffer.into_inner()
}

/// A per-test scratch directory, removed on drop.
pub struct TempDir {
    path: PathBuf,
}

impl TempDir {
    pub fn new(name: &str) -> Self {
        let path = std::env::temp_dir().join(format!(
            "stac-tiler-it-{}-{}",
            name,
            std::process::id()
        ));
        std::fs::create_dir_all(&path).unwrap();
        Self { path }
    }

    pub fn path(&self) -> &PathBuf {
        &self.path
    }

    pub fn write(&self, name: &str, data: &[u8]) -> PathBuf {
        let path = self.path.join(name);
        std::fs::write(&path, data).unwrap();
        path
    }
}

impl Drop for TempDir {
    fn drop(&mut self) {
        std::fs::remove_dir_all(&self.path).ok();
    }
}
