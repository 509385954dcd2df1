//! Configuration management for the STAC tiler.
//!
//! This module provides a flexible configuration system that supports:
//! - Command-line arguments via clap
//! - Environment variables with `STAC_TILER_` prefix
//! - Sensible defaults for all optional settings
//!
//! # Example
//!
//! ```ignore
//! use clap::Parser;
//! use stac_tiler::config::{Cli, Command};
//!
//! match Cli::parse().command {
//!     Command::Serve(config) => println!("Serving {} on {}", config.stac_path, config.bind_address()),
//!     Command::Info(config) => println!("Describing {}", config.stac_path),
//! }
//! ```
//!
//! # Environment Variables
//!
//! - `STAC_TILER_HOST` - Server bind address (default: 127.0.0.1)
//! - `STAC_TILER_PORT` - Server port (default: 8080)
//! - `STAC_TILER_EXCLUDE` - Asset names never served (default: thumbnail)
//! - `STAC_TILER_SEPARATE` - Address bands across assets (default: false)
//! - `STAC_TILER_MINZOOM` / `STAC_TILER_MAXZOOM` - Advertised zoom range (default: 0-22)
//! - `STAC_TILER_WORKERS` - Concurrent asset reads per request (default: 4)
//! - `STAC_TILER_JPEG_QUALITY` - JPEG quality (default: 85)
//! - `STAC_TILER_CACHE_DATASETS` - Opened datasets kept in memory (default: 32)
//! - `STAC_TILER_CACHE_MAX_AGE` - HTTP cache max-age seconds (default: 3600)
//! - `STAC_TILER_CORS_ORIGINS` - Allowed CORS origins, comma-separated
//! - `STAC_TILER_S3_ENDPOINT` - Custom S3 endpoint for S3-compatible services
//! - `STAC_TILER_S3_REGION` - AWS region (default: us-east-1)

use clap::{Args, Parser, Subcommand};

use crate::geo::MAX_ZOOM;
use crate::raster::DEFAULT_DATASET_CACHE_CAPACITY;
use crate::tile::{
    is_valid_quality, DEFAULT_JPEG_QUALITY, DEFAULT_MAX_ZOOM, DEFAULT_MIN_ZOOM, DEFAULT_WORKERS,
};

// =============================================================================
// Default Values
// =============================================================================

/// Default server host.
pub const DEFAULT_HOST: &str = "127.0.0.1";

/// Default server port.
pub const DEFAULT_PORT: u16 = 8080;

/// Default AWS region.
pub const DEFAULT_REGION: &str = "us-east-1";

/// Asset excluded unless overridden.
pub const DEFAULT_EXCLUDE: &str = "thumbnail";

/// Default HTTP cache max-age in seconds (1 hour).
pub const DEFAULT_CACHE_MAX_AGE: u32 = 3600;

// =============================================================================
// CLI Arguments
// =============================================================================

/// STAC Tiler - dynamic map tiles from the raster assets of a STAC item.
#[derive(Parser, Debug, Clone)]
#[command(name = "stac-tiler")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Serve tiles for a STAC item over HTTP.
    Serve(ServeConfig),

    /// Print per-asset metadata of a STAC item as JSON.
    Info(InfoConfig),
}

/// Options shared by every command that loads an item.
#[derive(Args, Debug, Clone)]
pub struct SourceConfig {
    /// Custom S3 endpoint URL for S3-compatible services (MinIO, etc.).
    #[arg(long, env = "STAC_TILER_S3_ENDPOINT")]
    pub s3_endpoint: Option<String>,

    /// AWS region for S3.
    #[arg(long, default_value = DEFAULT_REGION, env = "STAC_TILER_S3_REGION")]
    pub s3_region: String,

    /// Asset names never served (repeatable).
    #[arg(long, default_value = DEFAULT_EXCLUDE, env = "STAC_TILER_EXCLUDE", value_delimiter = ',')]
    pub exclude: Vec<String>,

    /// Treat bands of all assets as one stack addressed by `indexes`.
    #[arg(long, default_value_t = false, env = "STAC_TILER_SEPARATE")]
    pub separate: bool,

    /// Concurrent asset reads per request.
    #[arg(long, default_value_t = DEFAULT_WORKERS, env = "STAC_TILER_WORKERS")]
    pub workers: usize,
}

#[derive(Args, Debug, Clone)]
pub struct ServeConfig {
    /// STAC item location: http(s) URL, s3://bucket/key or local path.
    pub stac_path: String,

    // =========================================================================
    // Server Configuration
    // =========================================================================
    /// Host address to bind the server to.
    #[arg(long, default_value = DEFAULT_HOST, env = "STAC_TILER_HOST")]
    pub host: String,

    /// Port to listen on.
    #[arg(short, long, default_value_t = DEFAULT_PORT, env = "STAC_TILER_PORT")]
    pub port: u16,

    #[command(flatten)]
    pub source: SourceConfig,

    // =========================================================================
    // Tile Configuration
    // =========================================================================
    /// Minimum zoom advertised in TileJSON.
    #[arg(long, default_value_t = DEFAULT_MIN_ZOOM, env = "STAC_TILER_MINZOOM")]
    pub minzoom: u8,

    /// Maximum zoom advertised in TileJSON.
    #[arg(long, default_value_t = DEFAULT_MAX_ZOOM, env = "STAC_TILER_MAXZOOM")]
    pub maxzoom: u8,

    /// JPEG quality for tile encoding (1-100).
    #[arg(long, default_value_t = DEFAULT_JPEG_QUALITY, env = "STAC_TILER_JPEG_QUALITY")]
    pub jpeg_quality: u8,

    // =========================================================================
    // Cache Configuration
    // =========================================================================
    /// Maximum number of opened datasets to keep in memory.
    #[arg(long, default_value_t = DEFAULT_DATASET_CACHE_CAPACITY, env = "STAC_TILER_CACHE_DATASETS")]
    pub cache_datasets: usize,

    /// HTTP Cache-Control max-age in seconds.
    #[arg(long, default_value_t = DEFAULT_CACHE_MAX_AGE, env = "STAC_TILER_CACHE_MAX_AGE")]
    pub cache_max_age: u32,

    // =========================================================================
    // CORS Configuration
    // =========================================================================
    /// Allowed CORS origins (comma-separated).
    ///
    /// If not specified, allows any origin.
    #[arg(long, env = "STAC_TILER_CORS_ORIGINS", value_delimiter = ',')]
    pub cors_origins: Option<Vec<String>>,

    // =========================================================================
    // Logging Configuration
    // =========================================================================
    /// Enable verbose logging (debug level).
    #[arg(short, long, default_value_t = false)]
    pub verbose: bool,

    /// Disable request tracing.
    #[arg(long, default_value_t = false)]
    pub no_tracing: bool,
}

impl ServeConfig {
    /// Validate the configuration and return an error message if invalid.
    pub fn validate(&self) -> Result<(), String> {
        if self.stac_path.trim().is_empty() {
            return Err("A STAC item location is required".to_string());
        }

        if self.minzoom > self.maxzoom {
            return Err(format!(
                "minzoom ({}) must not exceed maxzoom ({})",
                self.minzoom, self.maxzoom
            ));
        }
        if self.maxzoom > MAX_ZOOM {
            return Err(format!("maxzoom must be at most {}", MAX_ZOOM));
        }

        if self.source.workers == 0 {
            return Err("workers must be greater than 0".to_string());
        }

        if self.cache_datasets == 0 {
            return Err("cache_datasets must be greater than 0".to_string());
        }

        if !is_valid_quality(self.jpeg_quality) {
            return Err("jpeg_quality must be between 1 and 100".to_string());
        }

        Ok(())
    }

    /// Get the server bind address as "host:port".
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

#[derive(Args, Debug, Clone)]
pub struct InfoConfig {
    /// STAC item location: http(s) URL, s3://bucket/key or local path.
    pub stac_path: String,

    /// Comma-separated assets to describe (default: every eligible asset).
    #[arg(long, value_delimiter = ',')]
    pub assets: Vec<String>,

    #[command(flatten)]
    pub source: SourceConfig,

    /// Enable verbose logging (debug level).
    #[arg(short, long, default_value_t = false)]
    pub verbose: bool,
}

// =============================================================================
// Tests
// =============================================================================
