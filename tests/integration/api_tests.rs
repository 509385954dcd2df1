//! API integration tests for tile retrieval, metadata endpoints and error handling.
//!
//! Tests verify:
//! - Tile rendering with default and explicit formats
//! - Error cases (unknown asset, ineligible asset, bad options, unreadable asset)
//! - TileJSON, info, viewer and health endpoints
//! - HTTP response codes and headers

use axum::http::StatusCode;
use image::GenericImageView;

use stac_tiler::error::{IoError, RasterError};
use stac_tiler::raster::{DatasetRegistry, MemoryAccess};
use stac_tiler::tile::{CompositeMode, RenderOptions, TileService};

use super::test_utils::{
    body_bytes, body_json, content_type, decode, error_type, get, is_valid_jpeg, is_valid_png,
    item, local_dataset, router, router_with, world_dataset, COG, PNG,
};

fn rgb_router() -> axum::Router {
    let access = MemoryAccess::new().with_dataset("rgb.tif", world_dataset(&[10.0, 20.0, 30.0]));
    router(
        access,
        item(&[
            ("visual", "rgb.tif", Some(COG)),
            ("thumbnail", "thumb.png", Some(PNG)),
        ]),
    )
}

// =============================================================================
// Tile Retrieval
// =============================================================================

#[tokio::test]
async fn test_tile_defaults_to_jpeg_when_fully_covered() {
    let response = get(rgb_router(), "/stac/tiles/2/2/1").await;

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(content_type(&response), "image/jpeg");
    assert_eq!(
        response.headers().get("cache-control").unwrap(),
        "public, max-age=3600"
    );

    let body = body_bytes(response).await;
    assert!(is_valid_jpeg(&body), "Response should be a valid JPEG");
    assert_eq!(decode(&body).dimensions(), (512, 512));
}

#[tokio::test]
async fn test_tile_scale_and_explicit_format() {
    let response = get(rgb_router(), "/stac/tiles/2/2/1.png?scale=1").await;

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(content_type(&response), "image/png");

    let body = body_bytes(response).await;
    assert!(is_valid_png(&body));
    let image = decode(&body).to_rgba8();
    assert_eq!(image.dimensions(), (256, 256));
    assert_eq!(image.get_pixel(128, 128).0, [10, 20, 30, 255]);
}

#[tokio::test]
async fn test_tile_webp() {
    let response = get(rgb_router(), "/stac/tiles/2/2/1.webp").await;

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(content_type(&response), "image/webp");
    let body = body_bytes(response).await;
    assert_eq!(&body[0..4], b"RIFF");
    assert_eq!(&body[8..12], b"WEBP");
}

#[tokio::test]
async fn test_tile_outside_coverage_is_transparent() {
    let access = MemoryAccess::new().with_dataset("data.tif", local_dataset(&[100.0]));
    let router = router(access, item(&[("data", "data.tif", Some(COG))]));

    let response = get(router, "/stac/tiles/5/0/0").await;

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(content_type(&response), "image/png");

    let image = decode(&body_bytes(response).await).to_luma_alpha8();
    assert!(image.pixels().all(|p| p.0 == [0, 0]));
}

#[tokio::test]
async fn test_tile_with_rescale_and_colormap() {
    let access = MemoryAccess::new().with_dataset("ndvi.tif", world_dataset(&[0.5]));
    let router = router(access, item(&[("ndvi", "ndvi.tif", Some(COG))]));

    let response = get(
        router,
        "/stac/tiles/2/2/1.png?rescale=0,1&color_map=viridis&scale=1",
    )
    .await;

    assert_eq!(response.status(), StatusCode::OK);
    let image = decode(&body_bytes(response).await).to_rgba8();
    let pixel = image.get_pixel(10, 10).0;
    assert_eq!(pixel[3], 255);
    assert_ne!(pixel[0..3], [128, 128, 128]);
}

#[tokio::test]
async fn test_tile_with_color_formula() {
    let router = rgb_router();
    let plain = body_bytes(get(router.clone(), "/stac/tiles/2/2/1.png?scale=1").await).await;
    let brightened = get(
        router,
        "/stac/tiles/2/2/1.png?scale=1&color_formula=gamma%20RGB%202.0",
    )
    .await;

    assert_eq!(brightened.status(), StatusCode::OK);
    let plain = decode(&plain).to_rgba8();
    let brightened = decode(&body_bytes(brightened).await).to_rgba8();
    assert!(brightened.get_pixel(0, 0).0[0] > plain.get_pixel(0, 0).0[0]);
}

// =============================================================================
// Error Handling
// =============================================================================

#[tokio::test]
async fn test_unknown_asset_returns_404() {
    let response = get(rgb_router(), "/stac/tiles/2/2/1?assets=missing").await;
    assert_eq!(
        error_type(response, StatusCode::NOT_FOUND).await,
        "unknown_asset"
    );
}

#[tokio::test]
async fn test_excluded_or_non_raster_asset_returns_400() {
    let response = get(rgb_router(), "/stac/tiles/2/2/1?assets=thumbnail").await;
    assert_eq!(
        error_type(response, StatusCode::BAD_REQUEST).await,
        "ineligible_asset"
    );
}

#[tokio::test]
async fn test_invalid_tile_index_returns_400() {
    let response = get(rgb_router(), "/stac/tiles/2/4/0").await;
    assert_eq!(
        error_type(response, StatusCode::BAD_REQUEST).await,
        "invalid_tile_index"
    );
}

#[tokio::test]
async fn test_invalid_scale_returns_400() {
    let response = get(rgb_router(), "/stac/tiles/2/2/1?scale=4").await;
    assert_eq!(
        error_type(response, StatusCode::BAD_REQUEST).await,
        "invalid_scale"
    );
}

#[tokio::test]
async fn test_unsupported_extension_returns_400() {
    let response = get(rgb_router(), "/stac/tiles/2/2/1.gif").await;
    assert_eq!(
        error_type(response, StatusCode::BAD_REQUEST).await,
        "invalid_option"
    );
}

#[tokio::test]
async fn test_bad_options_return_400() {
    for query in [
        "rescale=0,100,5",
        "rescale=0,0",
        "indexes=0",
        "color_map=rainbow-unicorn",
        "color_formula=invert%20RGB",
        "resampling_method=magic",
        // 3-band composite with a colormap
        "color_map=viridis",
        // 2 ranges for 3 bands
        "rescale=0,10,0,10",
    ] {
        let response = get(rgb_router(), &format!("/stac/tiles/2/2/1?{}", query)).await;
        assert_eq!(
            error_type(response, StatusCode::BAD_REQUEST).await,
            "invalid_option",
            "query: {}",
            query
        );
    }
}

#[tokio::test]
async fn test_missing_asset_object_returns_404() {
    let router = router(MemoryAccess::new(), item(&[("data", "gone.tif", Some(COG))]));
    let response = get(router, "/stac/tiles/2/2/1").await;
    assert_eq!(
        error_type(response, StatusCode::NOT_FOUND).await,
        "asset_not_found"
    );
}

#[tokio::test]
async fn test_unreadable_asset_returns_502() {
    let access = MemoryAccess::new()
        .with_dataset("good.tif", world_dataset(&[1.0]))
        .with_failure("bad.tif", RasterError::Decode("truncated strip".to_string()));
    let router = router(
        access,
        item(&[
            ("good", "good.tif", Some(COG)),
            ("bad", "bad.tif", Some(COG)),
        ]),
    );

    let response = get(router, "/stac/tiles/2/2/1").await;
    assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
    let json = body_json(response).await;
    assert_eq!(json["error"], "asset_read_error");
    assert_eq!(
        json["message"],
        "Failed to read asset bad for tile 2/2/1: Decode error: truncated strip"
    );
}

#[tokio::test]
async fn test_upstream_connection_failure_returns_502() {
    let access = MemoryAccess::new().with_failure(
        "remote.tif",
        RasterError::Io(IoError::Connection("connection reset".to_string())),
    );
    let router = router(access, item(&[("remote", "remote.tif", Some(COG))]));

    let response = get(router, "/stac/tiles/2/2/1").await;
    assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
}

// =============================================================================
// Metadata Endpoints
// =============================================================================

#[tokio::test]
async fn test_tilejson() {
    let response = get(
        rgb_router(),
        "/stac/tilejson.json?assets=visual&tile_format=png&rescale=0,255&minzoom=3",
    )
    .await;

    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;

    assert_eq!(json["tilejson"], "2.1.0");
    assert_eq!(json["name"], "test-item");
    assert_eq!(json["minzoom"], 3);
    assert_eq!(json["maxzoom"], 22);
    assert_eq!(json["bounds"], serde_json::json!([-10.0, -10.0, 10.0, 10.0]));
    assert_eq!(json["center"], serde_json::json!([0.0, 0.0, 3.0]));
    assert_eq!(
        json["tiles"][0],
        "http://tiles.test/stac/tiles/{z}/{x}/{y}.png?assets=visual&rescale=0%2C255"
    );
}

#[tokio::test]
async fn test_tilejson_rejects_unknown_asset_and_bad_zoom() {
    let response = get(rgb_router(), "/stac/tilejson.json?assets=nope").await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let response = get(rgb_router(), "/stac/tilejson.json?minzoom=10&maxzoom=5").await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let response = get(rgb_router(), "/stac/tilejson.json?tile_format=bmp").await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_tilejson_matches_tile_info() {
    let make_item = || item(&[("visual", "rgb.tif", Some(COG))]);
    let service = || {
        let access =
            MemoryAccess::new().with_dataset("rgb.tif", world_dataset(&[1.0, 2.0, 3.0]));
        TileService::new(DatasetRegistry::new(access)).with_zoom_range(2, 14)
    };
    let expected = service()
        .tile_info(&make_item(), &RenderOptions::default())
        .await
        .unwrap();

    let json = body_json(get(router_with(service(), make_item()), "/stac/tilejson.json").await).await;
    assert_eq!(json["bounds"], serde_json::json!(expected.bounds));
    assert_eq!(json["center"], serde_json::json!(expected.center));
    assert_eq!(json["minzoom"], expected.minzoom);
    assert_eq!(json["maxzoom"], expected.maxzoom);

    // A zoom override moves the center zoom with it
    let json = body_json(
        get(router_with(service(), make_item()), "/stac/tilejson.json?minzoom=6").await,
    )
    .await;
    assert_eq!(json["bounds"], serde_json::json!(expected.bounds));
    assert_eq!(
        json["center"],
        serde_json::json!(expected.with_zoom_range(6, 14).center)
    );
}

#[tokio::test]
async fn test_tilejson_uses_service_zoom_range() {
    let access = MemoryAccess::new().with_dataset("rgb.tif", world_dataset(&[1.0, 2.0, 3.0]));
    let service = TileService::new(DatasetRegistry::new(access)).with_zoom_range(4, 12);
    let router = router_with(service, item(&[("visual", "rgb.tif", Some(COG))]));

    let json = body_json(get(router, "/stac/tilejson.json").await).await;
    assert_eq!(json["minzoom"], 4);
    assert_eq!(json["maxzoom"], 12);
    assert_eq!(json["tiles"][0], "http://tiles.test/stac/tiles/{z}/{x}/{y}");
}

#[tokio::test]
async fn test_info_reports_each_asset() {
    let access = MemoryAccess::new()
        .with_dataset("rgb.tif", world_dataset(&[10.0, 20.0, 30.0]))
        .with_dataset("dem.tif", local_dataset(&[5.0]).with_nodata(-9999.0));
    let router = router(
        access,
        item(&[
            ("visual", "rgb.tif", Some(COG)),
            ("dem", "dem.tif", Some(COG)),
            ("broken", "missing.tif", Some(COG)),
            ("thumbnail", "thumb.png", Some(PNG)),
        ]),
    );

    let response = get(router, "/stac/info").await;
    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;

    assert_eq!(json["id"], "test-item");
    assert_eq!(json["separate"], false);

    let assets = json["assets"].as_object().unwrap();
    let names: Vec<&String> = assets.keys().collect();
    assert_eq!(names, ["visual", "dem", "broken"]);

    assert_eq!(assets["visual"]["band_count"], 3);
    assert_eq!(assets["visual"]["dtype"], "uint8");
    assert_eq!(assets["visual"]["width"], 360);
    assert_eq!(assets["dem"]["nodata_value"], -9999.0);
    assert!(assets["broken"]["error"].is_string());
}

#[tokio::test]
async fn test_info_with_asset_selection() {
    let router = rgb_router();

    let json = body_json(get(router.clone(), "/stac/info?assets=visual").await).await;
    assert_eq!(json["assets"].as_object().unwrap().len(), 1);

    let response = get(router, "/stac/info?assets=thumbnail").await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_info_reports_separate_mode() {
    let access = MemoryAccess::new().with_dataset("rgb.tif", world_dataset(&[1.0, 2.0, 3.0]));
    let service =
        TileService::new(DatasetRegistry::new(access)).with_mode(CompositeMode::Separate);
    let router = router_with(service, item(&[("visual", "rgb.tif", Some(COG))]));

    let json = body_json(get(router, "/stac/info").await).await;
    assert_eq!(json["separate"], true);
}

#[tokio::test]
async fn test_viewer_page() {
    let response = get(rgb_router(), "/stac/index.html?assets=visual").await;

    assert_eq!(response.status(), StatusCode::OK);
    assert!(content_type(&response).starts_with("text/html"));
    let html = String::from_utf8(body_bytes(response).await).unwrap();
    assert!(html.contains("test-item"));
    assert!(html.contains("http://tiles.test/stac/tilejson.json?assets=visual"));
}

#[tokio::test]
async fn test_health() {
    let response = get(rgb_router(), "/health").await;

    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert_eq!(json["status"], "healthy");
    assert!(json["version"].is_string());
}

#[tokio::test]
async fn test_unknown_route_returns_404() {
    let response = get(rgb_router(), "/tiles/2/2/1").await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}
