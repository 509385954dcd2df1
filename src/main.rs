//! STAC Tiler - dynamic map tiles from the raster assets of a STAC item.
//!
//! This binary loads the item, starts the HTTP server and configures all components.

use clap::Parser;
use std::process::ExitCode;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use stac_tiler::{
    config::{Cli, Command, InfoConfig, ServeConfig, SourceConfig},
    create_s3_client,
    raster::{DatasetRegistry, GeoTiffAccess},
    server::{create_router, RouterConfig},
    stac::{ItemLoader, StacItem, StacLoader},
    tile::{CompositeMode, EncoderProfiles, RenderOptions, TileService},
    ObjectFetcher,
};

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    match cli.command {
        Command::Serve(config) => run_serve(config).await,
        Command::Info(config) => run_info(config).await,
    }
}

// =============================================================================
// Serve Command
// =============================================================================

async fn run_serve(config: ServeConfig) -> ExitCode {
    init_logging(config.verbose);

    if let Err(e) = config.validate() {
        error!("Configuration error: {}", e);
        return ExitCode::FAILURE;
    }

    info!("STAC Tiler v{}", env!("CARGO_PKG_VERSION"));
    info!("Configuration:");
    info!("  Item: {}", config.stac_path);
    if let Some(ref endpoint) = config.source.s3_endpoint {
        info!("  S3 endpoint: {}", endpoint);
    }
    info!("  S3 region: {}", config.source.s3_region);
    info!("  Excluded assets: {}", config.source.exclude.join(", "));
    info!(
        "  Mode: {}",
        if config.source.separate { "separate" } else { "merged" }
    );
    info!("  Zoom: {}-{}", config.minzoom, config.maxzoom);
    info!(
        "  Workers: {}, cached datasets: {}",
        config.source.workers, config.cache_datasets
    );

    let fetcher = build_fetcher(&config.source).await;

    let item = match load_item(&fetcher, &config.stac_path).await {
        Some(item) => item,
        None => return ExitCode::FAILURE,
    };

    let registry = DatasetRegistry::with_capacity(GeoTiffAccess::new(fetcher), config.cache_datasets);
    let tile_service = build_tile_service(registry, &config.source)
        .with_profiles(EncoderProfiles::with_jpeg_quality(config.jpeg_quality))
        .with_zoom_range(config.minzoom, config.maxzoom);

    let router = create_router(tile_service, item, build_router_config(&config));

    let addr = config.bind_address();

    info!("");
    info!("────────────────────────────────────────────────────────────────");
    info!("  Server listening on: http://{}", addr);
    info!("");
    info!("  Try these endpoints:");
    info!("    curl http://{}/health", addr);
    info!("    curl http://{}/stac/info", addr);
    info!("    curl http://{}/stac/tilejson.json", addr);
    info!("");
    info!("  View the item in your browser:");
    info!("    open http://{}/stac/index.html", addr);
    info!("────────────────────────────────────────────────────────────────");
    info!("");

    let listener = match tokio::net::TcpListener::bind(&addr).await {
        Ok(listener) => listener,
        Err(e) => {
            error!("Failed to bind to {}: {}", addr, e);
            return ExitCode::FAILURE;
        }
    };

    if let Err(e) = axum::serve(listener, router).await {
        error!("Server error: {}", e);
        return ExitCode::FAILURE;
    }

    ExitCode::SUCCESS
}

/// Build RouterConfig from the application ServeConfig.
fn build_router_config(config: &ServeConfig) -> RouterConfig {
    let mut router_config = RouterConfig::new().with_cache_max_age(config.cache_max_age);

    if let Some(ref origins) = config.cors_origins {
        router_config = router_config.with_cors_origins(origins.clone());
    }

    router_config.with_tracing(!config.no_tracing)
}

// =============================================================================
// Info Command
// =============================================================================

async fn run_info(config: InfoConfig) -> ExitCode {
    if config.verbose {
        init_logging(true);
    }

    if config.source.workers == 0 {
        eprintln!("Error: workers must be greater than 0");
        return ExitCode::FAILURE;
    }

    let fetcher = build_fetcher(&config.source).await;
    let item = match load_item(&fetcher, &config.stac_path).await {
        Some(item) => item,
        None => return ExitCode::FAILURE,
    };

    let tile_service = build_tile_service(
        DatasetRegistry::new(GeoTiffAccess::new(fetcher)),
        &config.source,
    );
    let options = RenderOptions::default().with_assets(config.assets);

    let assets = match tile_service.describe(&item, &options).await {
        Ok(assets) => assets,
        Err(e) => {
            eprintln!("Error: {}", e);
            return ExitCode::FAILURE;
        }
    };

    let json = serde_json::json!({
        "id": item.id,
        "bounds": item.bbox.as_array(),
        "assets": assets,
    });
    match serde_json::to_string_pretty(&json) {
        Ok(text) => {
            println!("{}", text);
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("Error: {}", e);
            ExitCode::FAILURE
        }
    }
}

// =============================================================================
// Shared Setup
// =============================================================================

async fn build_fetcher(source: &SourceConfig) -> ObjectFetcher {
    let s3_client = create_s3_client(source.s3_endpoint.as_deref(), &source.s3_region).await;
    ObjectFetcher::new(reqwest::Client::new(), Some(s3_client))
}

async fn load_item(fetcher: &ObjectFetcher, stac_path: &str) -> Option<StacItem> {
    match ItemLoader::new(fetcher.clone()).load(stac_path).await {
        Ok(item) => Some(item),
        Err(e) => {
            error!("Failed to load STAC item: {}", e);
            eprintln!("Error: {}", e);
            None
        }
    }
}

fn build_tile_service(
    registry: DatasetRegistry<GeoTiffAccess>,
    source: &SourceConfig,
) -> TileService<GeoTiffAccess> {
    let mode = if source.separate {
        CompositeMode::Separate
    } else {
        CompositeMode::Merged
    };

    TileService::new(registry)
        .with_exclude(source.exclude.clone())
        .with_mode(mode)
        .with_workers(source.workers)
}

/// Initialize the tracing/logging subsystem.
fn init_logging(verbose: bool) {
    let env_filter = if verbose {
        "stac_tiler=debug,tower_http=debug"
    } else {
        "stac_tiler=info,tower_http=info"
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| env_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}
