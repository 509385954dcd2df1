//! Pipeline integration tests driving the tile service directly.
//!
//! Tests verify:
//! - Merged and separate compositing order and band counts
//! - Validity masks outside coverage and across assets
//! - Options validated against the composited band count
//! - Dataset reuse across requests
//! - Loading an item and GeoTIFF assets from the local filesystem

use stac_tiler::error::TileError;
use stac_tiler::geo::TileIndex;
use stac_tiler::io::ObjectFetcher;
use stac_tiler::raster::{DatasetRegistry, GeoTiffAccess, MemoryAccess};
use stac_tiler::stac::{ItemLoader, StacLoader};
use stac_tiler::tile::{
    ColorFormula, Colormap, CompositeMode, ImageFormat, RenderOptions, TileService,
};

use super::test_utils::{
    decode, geotiff_bytes, item, local_dataset, world_dataset, TempDir, COG, PNG,
};

fn two_asset_service(mode: CompositeMode) -> TileService<MemoryAccess> {
    let access = MemoryAccess::new()
        .with_dataset("a.tif", world_dataset(&[1.0]))
        .with_dataset("b.tif", world_dataset(&[2.0, 3.0]));
    TileService::new(DatasetRegistry::new(access)).with_mode(mode)
}

fn two_asset_item() -> stac_tiler::stac::StacItem {
    item(&[("a", "a.tif", Some(COG)), ("b", "b.tif", Some(COG))])
}

fn tile(z: i64, x: i64, y: i64) -> TileIndex {
    TileIndex::new(z, x, y).unwrap()
}

// =============================================================================
// Compositing
// =============================================================================

#[tokio::test]
async fn test_merged_composite_stacks_bands_in_asset_order() {
    let service = two_asset_service(CompositeMode::Merged);
    let options = RenderOptions::default().with_scale(1);

    let (block, mask) = service
        .render_block(&two_asset_item(), tile(2, 2, 1), &options)
        .await
        .unwrap();

    assert_eq!(block.bands(), 3);
    assert_eq!((block.width(), block.height()), (256, 256));
    assert!(block.band(0).iter().all(|v| *v == 1));
    assert!(block.band(1).iter().all(|v| *v == 2));
    assert!(block.band(2).iter().all(|v| *v == 3));
    assert!(mask.is_fully_valid());
}

#[tokio::test]
async fn test_merged_composite_follows_requested_asset_order() {
    let service = two_asset_service(CompositeMode::Merged);
    let options = RenderOptions::default()
        .with_scale(1)
        .with_assets(["b", "a"]);

    let (block, _) = service
        .render_block(&two_asset_item(), tile(2, 2, 1), &options)
        .await
        .unwrap();

    assert_eq!(block.bands(), 3);
    assert_eq!(block.band(0)[0], 2);
    assert_eq!(block.band(2)[0], 1);
}

#[tokio::test]
async fn test_merged_rescale_count_must_match_bands() {
    let service = two_asset_service(CompositeMode::Merged);
    let options = RenderOptions::default().with_rescale(vec![(0.0, 10.0), (0.0, 10.0)]);

    let result = service
        .render_block(&two_asset_item(), tile(2, 2, 1), &options)
        .await;

    assert!(matches!(
        result,
        Err(TileError::Configuration {
            option: "rescale",
            ..
        })
    ));
    // Checked before any window is read
    assert_eq!(service.registry().access().open_count(), 2);
}

#[tokio::test]
async fn test_merged_indexes_apply_per_asset() {
    let access = MemoryAccess::new()
        .with_dataset("a.tif", world_dataset(&[1.0, 4.0]))
        .with_dataset("b.tif", world_dataset(&[2.0, 3.0]));
    let service = TileService::new(DatasetRegistry::new(access));
    let options = RenderOptions::default().with_scale(1).with_indexes(vec![2]);

    let (block, _) = service
        .render_block(&two_asset_item(), tile(2, 2, 1), &options)
        .await
        .unwrap();

    assert_eq!(block.bands(), 2);
    assert_eq!(block.band(0)[0], 4);
    assert_eq!(block.band(1)[0], 3);

    // Band 2 is missing from a 1-band asset
    let service = two_asset_service(CompositeMode::Merged);
    let result = service
        .render_block(&two_asset_item(), tile(2, 2, 1), &options)
        .await;
    assert!(matches!(
        result,
        Err(TileError::Configuration {
            option: "indexes",
            ..
        })
    ));
}

#[tokio::test]
async fn test_separate_indexes_select_across_assets() {
    let service = two_asset_service(CompositeMode::Separate);
    let options = RenderOptions::default()
        .with_scale(1)
        .with_indexes(vec![3, 1]);

    let (block, _) = service
        .render_block(&two_asset_item(), tile(2, 2, 1), &options)
        .await
        .unwrap();

    assert_eq!(block.bands(), 2);
    assert_eq!(block.band(0)[0], 3);
    assert_eq!(block.band(1)[0], 1);

    let out_of_range = RenderOptions::default().with_indexes(vec![4]);
    let result = service
        .render_block(&two_asset_item(), tile(2, 2, 1), &out_of_range)
        .await;
    assert!(matches!(
        result,
        Err(TileError::Configuration {
            option: "indexes",
            ..
        })
    ));
}

#[tokio::test]
async fn test_mask_is_intersection_of_asset_masks() {
    // Asset a covers the world, asset b only [-10,-10,10,10]
    let access = MemoryAccess::new()
        .with_dataset("a.tif", world_dataset(&[1.0]))
        .with_dataset("b.tif", local_dataset(&[2.0]));
    let service = TileService::new(DatasetRegistry::new(access));
    let options = RenderOptions::default().with_scale(1);

    // Zoom 3 tile (4,3) spans lon 0..45, lat 0..~41
    let (_, mask) = service
        .render_block(&two_asset_item(), tile(3, 4, 3), &options)
        .await
        .unwrap();

    assert!(!mask.is_fully_valid());
    assert!(!mask.is_empty());
    // Bottom-left corner near (0, 0) is covered by both
    assert!(mask.is_valid(0, 255));
    // Top-right corner near (45, 41) is outside asset b
    assert!(!mask.is_valid(255, 0));
}

// =============================================================================
// Coverage and Post-processing
// =============================================================================

#[tokio::test]
async fn test_tile_outside_item_is_empty_not_an_error() {
    let access = MemoryAccess::new().with_dataset("data.tif", local_dataset(&[100.0, 50.0, 25.0]));
    let service = TileService::new(DatasetRegistry::new(access));
    let item = item(&[("data", "data.tif", Some(COG))]);

    let (block, mask) = service
        .render_block(&item, tile(4, 0, 0), &RenderOptions::default())
        .await
        .unwrap();
    assert!(mask.is_empty());
    assert_eq!((mask.width(), mask.height()), (512, 512));
    assert!(block.data().iter().all(|v| *v == 0));

    let response = service
        .render_tile(&item, tile(4, 0, 0), &RenderOptions::default())
        .await
        .unwrap();
    assert!(!response.has_data);
    assert_eq!(response.format, ImageFormat::Png);
}

#[tokio::test]
async fn test_fully_covered_tile_defaults_to_jpeg() {
    let access = MemoryAccess::new().with_dataset("rgb.tif", world_dataset(&[10.0, 20.0, 30.0]));
    let service = TileService::new(DatasetRegistry::new(access));
    let item = item(&[("visual", "rgb.tif", Some(COG))]);

    let response = service
        .render_tile(&item, tile(2, 2, 1), &RenderOptions::default())
        .await
        .unwrap();

    assert!(response.has_data);
    assert_eq!(response.format, ImageFormat::Jpeg);
    let image = decode(&response.data);
    assert_eq!((image.width(), image.height()), (512, 512));
}

#[tokio::test]
async fn test_colormap_needs_single_band() {
    let access = MemoryAccess::new()
        .with_dataset("rgb.tif", world_dataset(&[10.0, 20.0, 30.0]))
        .with_dataset("ndvi.tif", world_dataset(&[200.0]));
    let service = TileService::new(DatasetRegistry::new(access));
    let item = item(&[
        ("visual", "rgb.tif", Some(COG)),
        ("ndvi", "ndvi.tif", Some(COG)),
    ]);
    let viridis = Colormap::by_name("viridis").unwrap();

    let rgb = RenderOptions::default()
        .with_assets(["visual"])
        .with_color_map(viridis.clone());
    let result = service.render_block(&item, tile(2, 2, 1), &rgb).await;
    assert!(matches!(
        result,
        Err(TileError::Configuration {
            option: "color_map",
            ..
        })
    ));

    let single = RenderOptions::default()
        .with_scale(1)
        .with_assets(["ndvi"])
        .with_color_map(viridis);
    let (block, _) = service
        .render_block(&item, tile(2, 2, 1), &single)
        .await
        .unwrap();
    assert!(matches!(block.bands(), 3 | 4));
}

#[tokio::test]
async fn test_rescale_then_formula() {
    let access = MemoryAccess::new().with_dataset("data.tif", world_dataset(&[500.0]));
    let service = TileService::new(DatasetRegistry::new(access));
    let item = item(&[("data", "data.tif", Some(COG))]);

    let rescaled = RenderOptions::default()
        .with_scale(1)
        .with_rescale(vec![(0.0, 1000.0)]);
    let (block, _) = service
        .render_block(&item, tile(2, 2, 1), &rescaled)
        .await
        .unwrap();
    assert_eq!(block.band(0)[0], 128);

    let brightened = rescaled.with_color_formula(ColorFormula::parse("gamma R 2").unwrap());
    let (block, _) = service
        .render_block(&item, tile(2, 2, 1), &brightened)
        .await
        .unwrap();
    assert!(block.band(0)[0] > 128);
}

#[tokio::test]
async fn test_datasets_are_opened_once_across_tiles() {
    let service = two_asset_service(CompositeMode::Merged);
    let item = two_asset_item();
    let options = RenderOptions::default().with_scale(1);

    for (x, y) in [(2, 1), (2, 2), (1, 1)] {
        service
            .render_block(&item, tile(2, x, y), &options)
            .await
            .unwrap();
    }

    assert_eq!(service.registry().access().open_count(), 2);
}

#[tokio::test]
async fn test_describe_skips_excluded_assets() {
    let access = MemoryAccess::new()
        .with_dataset("a.tif", world_dataset(&[1.0]))
        .with_dataset("b.tif", world_dataset(&[2.0, 3.0]));
    let service = TileService::new(DatasetRegistry::new(access)).with_exclude(vec!["b".to_string()]);
    let item = item(&[
        ("a", "a.tif", Some(COG)),
        ("b", "b.tif", Some(COG)),
        ("thumbnail", "thumb.png", Some(PNG)),
    ]);

    let info = service
        .tile_info(&item, &RenderOptions::default())
        .await
        .unwrap();
    assert_eq!(info.assets.names().collect::<Vec<_>>(), vec!["a"]);
    assert_eq!(info.bounds, [-10.0, -10.0, 10.0, 10.0]);

    let excluded = RenderOptions::default().with_assets(["b"]);
    assert!(matches!(
        service.describe(&item, &excluded).await,
        Err(TileError::IneligibleAsset { .. })
    ));
}

// =============================================================================
// Filesystem Round Trip
// =============================================================================

#[tokio::test]
async fn test_local_item_with_geotiff_asset() {
    let dir = TempDir::new("roundtrip");

    // 36x17 pixels of 10 degrees covering lon -180..180, lat 85..-85.
    // The top row is nodata.
    let mut data = vec![50u8; 36 * 17];
    data[..36].iter_mut().for_each(|v| *v = 0);
    dir.write(
        "data.tif",
        &geotiff_bytes(36, 17, &data, (-180.0, 85.0), 10.0, Some("0")),
    );
    let item_path = dir.write(
        "item.json",
        br#"{
            "type": "Feature",
            "stac_version": "1.0.0",
            "id": "roundtrip",
            "bbox": [-180, -85, 180, 85],
            "assets": {
                "data": {"href": "data.tif", "type": "image/tiff; application=geotiff"},
                "thumbnail": {"href": "thumb.png", "type": "image/png"}
            }
        }"#,
    );
    assert!(dir.path().join("data.tif").exists());

    let fetcher = ObjectFetcher::without_s3();
    let item = ItemLoader::new(fetcher.clone())
        .load(item_path.to_str().unwrap())
        .await
        .unwrap();
    assert_eq!(item.id, "roundtrip");
    assert_eq!(item.assets.len(), 2);

    let service = TileService::new(DatasetRegistry::new(GeoTiffAccess::new(fetcher)))
        .with_exclude(vec!["thumbnail".to_string()]);
    let options = RenderOptions::default().with_scale(1);

    // Fully inside the valid rows
    let (block, mask) = service
        .render_block(&item, tile(2, 2, 1), &options)
        .await
        .unwrap();
    assert_eq!(block.bands(), 1);
    assert!(mask.is_fully_valid());
    assert!(block.band(0).iter().all(|v| *v == 50));

    // Reaches the nodata row at the top of the world
    let (_, mask) = service
        .render_block(&item, tile(1, 0, 0), &options)
        .await
        .unwrap();
    assert!(!mask.is_valid(0, 0));
    assert!(mask.is_valid(255, 255));

    let info = service.describe(&item, &options).await.unwrap();
    let asset = info.get("data").unwrap().as_ref().unwrap();
    assert_eq!((asset.width, asset.height, asset.band_count), (36, 17, 1));
    assert_eq!(asset.nodata_value, Some(0.0));
}
