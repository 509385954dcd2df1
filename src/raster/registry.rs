//! Dataset Registry for sharing opened rasters across requests.
//!
//! The registry provides:
//! - LRU caching of opened datasets to avoid re-fetching and re-decoding
//! - Singleflight pattern to prevent duplicate opens for the same href
//!
//! # Example
//!
//! ```ignore
//! use stac_tiler::io::ObjectFetcher;
//! use stac_tiler::raster::{DatasetRegistry, GeoTiffAccess};
//!
//! let registry = DatasetRegistry::new(GeoTiffAccess::new(ObjectFetcher::without_s3()));
//!
//! // Opens and caches on first access
//! let dataset = registry.get("https://example.com/B04.tif").await?;
//! ```

use std::num::NonZeroUsize;
use std::sync::Arc;

use lru::LruCache;
use tokio::sync::RwLock;
use tracing::debug;

use super::RasterAccess;
use crate::error::RasterError;
use crate::io::SingleFlight;

/// Default capacity for the dataset cache (number of datasets).
pub const DEFAULT_DATASET_CACHE_CAPACITY: usize = 32;

type OpenResult<D> = Result<Arc<D>, RasterError>;

/// Registry of opened datasets keyed by href.
pub struct DatasetRegistry<A: RasterAccess> {
    /// The access used to open datasets
    access: A,

    /// Opened datasets indexed by href
    cache: RwLock<LruCache<String, Arc<A::Dataset>>>,

    /// In-flight opens for singleflight pattern
    opens: SingleFlight<String, OpenResult<A::Dataset>>,
}

impl<A: RasterAccess> DatasetRegistry<A> {
    /// Create a registry with the default capacity.
    pub fn new(access: A) -> Self {
        Self::with_capacity(access, DEFAULT_DATASET_CACHE_CAPACITY)
    }

    /// Create a registry holding at most `capacity` datasets (minimum 1).
    pub fn with_capacity(access: A, capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            access,
            cache: RwLock::new(LruCache::new(capacity)),
            opens: SingleFlight::new(),
        }
    }

    /// The underlying raster access.
    pub fn access(&self) -> &A {
        &self.access
    }

    /// Get a dataset, opening it if not already cached.
    ///
    /// Concurrent calls for the same href share a single open. Failed opens
    /// are not cached. Dropping the caller that performs the open hands it
    /// to one of the callers waiting on it.
    pub async fn get(&self, href: &str) -> Result<Arc<A::Dataset>, RasterError> {
        if let Some(dataset) = self.cached(href).await {
            return Ok(dataset);
        }

        self.opens
            .run(&href.to_string(), move || async move {
                // A flight that landed after the check above filled the cache
                if let Some(dataset) = self.cached(href).await {
                    return Ok(dataset);
                }

                debug!(href = %href, "Opening dataset");
                let dataset = Arc::new(self.access.open(href).await?);
                self.cache
                    .write()
                    .await
                    .put(href.to_string(), dataset.clone());
                Ok(dataset)
            })
            .await
    }

    async fn cached(&self, href: &str) -> Option<Arc<A::Dataset>> {
        self.cache.write().await.get(href).cloned()
    }

    #[cfg(test)]
    async fn cached_count(&self) -> usize {
        self.cache.read().await.len()
    }
}
