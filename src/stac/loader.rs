//! Loading STAC item documents from HTTP(S), S3 or the local filesystem.

use async_trait::async_trait;
use tracing::{debug, info};

use super::item::StacItem;
use crate::error::StacError;
use crate::io::{Location, ObjectFetcher};

/// Capability to load a STAC item from a location string.
#[async_trait]
pub trait StacLoader: Send + Sync {
    /// Load and parse the item at `source`.
    ///
    /// # Errors
    /// `SourceUnavailable` when the document cannot be fetched, `Parse` or
    /// `MissingField` when it is not a usable item.
    async fn load(&self, source: &str) -> Result<StacItem, StacError>;
}

/// Loader backed by an [`ObjectFetcher`].
#[derive(Clone)]
pub struct ItemLoader {
    fetcher: ObjectFetcher,
}

impl ItemLoader {
    pub fn new(fetcher: ObjectFetcher) -> Self {
        Self { fetcher }
    }
}

#[async_trait]
impl StacLoader for ItemLoader {
    async fn load(&self, source: &str) -> Result<StacItem, StacError> {
        let location = Location::parse(source).map_err(|e| StacError::SourceUnavailable {
            location: source.to_string(),
            source: e,
        })?;

        debug!(location = %location, "Loading STAC item");
        let document =
            self.fetcher
                .fetch(&location)
                .await
                .map_err(|e| StacError::SourceUnavailable {
                    location: location.to_string(),
                    source: e,
                })?;

        let item = StacItem::from_json(&document, &location)?;
        info!(
            id = %item.id,
            assets = item.assets.len(),
            "Loaded STAC item"
        );
        Ok(item)
    }
}
