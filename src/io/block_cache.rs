use std::num::NonZeroUsize;
use std::sync::Arc;

use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use lru::LruCache;
use tokio::sync::RwLock;

use super::range_reader::check_range;
use super::{RangeReader, SingleFlight};
use crate::error::IoError;

/// Default block size: 64KB
///
/// COG headers and overview tiles sit in the first few blocks; tiles of the
/// full resolution image are usually a block or two each.
pub const DEFAULT_BLOCK_SIZE: usize = 64 * 1024;

/// Default cache capacity in number of blocks (16MB).
pub const DEFAULT_BLOCK_CAPACITY: usize = 256;

/// Block-based caching layer that wraps any RangeReader.
///
/// TIFF decoding issues many small reads at scattered offsets. The cache
/// turns them into fewer, block-aligned reads of the underlying object:
/// - Fixed-size blocks with LRU eviction
/// - Singleflight: concurrent requests for the same block share one fetch
/// - Reads spanning several blocks are stitched together
pub struct BlockCache<R: ?Sized> {
    inner: Arc<R>,
    block_size: usize,
    cache: RwLock<LruCache<u64, Bytes>>,
    fetches: SingleFlight<u64, Result<Bytes, IoError>>,
}

impl<R: RangeReader + ?Sized> BlockCache<R> {
    /// Wrap `inner` with the default block size and capacity.
    pub fn new(inner: Arc<R>) -> Self {
        Self::with_capacity(inner, DEFAULT_BLOCK_SIZE, DEFAULT_BLOCK_CAPACITY)
    }

    /// Wrap `inner`, keeping at most `capacity` blocks of `block_size` bytes.
    pub fn with_capacity(inner: Arc<R>, block_size: usize, capacity: usize) -> Self {
        Self {
            inner,
            block_size: block_size.max(1),
            cache: RwLock::new(LruCache::new(
                NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN),
            )),
            fetches: SingleFlight::new(),
        }
    }

    async fn get_block(&self, block_idx: u64) -> Result<Bytes, IoError> {
        if let Some(data) = self.cache.write().await.get(&block_idx) {
            return Ok(data.clone());
        }

        self.fetches
            .run(&block_idx, move || async move {
                if let Some(data) = self.cache.write().await.get(&block_idx) {
                    return Ok(data.clone());
                }
                let data = self.fetch_block_from_source(block_idx).await?;
                self.cache.write().await.put(block_idx, data.clone());
                Ok(data)
            })
            .await
    }

    async fn fetch_block_from_source(&self, block_idx: u64) -> Result<Bytes, IoError> {
        let offset = block_idx * self.block_size as u64;
        let size = self.inner.size();

        // The last block may be short
        let remaining = size.saturating_sub(offset);
        if remaining == 0 {
            return Err(IoError::RangeOutOfBounds {
                offset,
                requested: self.block_size as u64,
                size,
            });
        }

        let len = std::cmp::min(self.block_size as u64, remaining) as usize;
        self.inner.read_exact_at(offset, len).await
    }

    #[inline]
    fn block_for_offset(&self, offset: u64) -> u64 {
        offset / self.block_size as u64
    }

    #[inline]
    fn offset_within_block(&self, offset: u64) -> usize {
        (offset % self.block_size as u64) as usize
    }
}

#[async_trait]
impl<R: RangeReader + ?Sized> RangeReader for BlockCache<R> {
    async fn read_exact_at(&self, offset: u64, len: usize) -> Result<Bytes, IoError> {
        check_range(offset, len, self.inner.size())?;
        if len == 0 {
            return Ok(Bytes::new());
        }

        let start_block = self.block_for_offset(offset);
        let end_block = self.block_for_offset(offset + len as u64 - 1);

        if start_block == end_block {
            let block = self.get_block(start_block).await?;
            let block_offset = self.offset_within_block(offset);
            return Ok(block.slice(block_offset..block_offset + len));
        }

        let mut result = BytesMut::with_capacity(len);
        let mut remaining = len;
        let mut current_offset = offset;
        for block_idx in start_block..=end_block {
            let block = self.get_block(block_idx).await?;
            let block_offset = self.offset_within_block(current_offset);
            let bytes_in_block = std::cmp::min(block.len() - block_offset, remaining);

            result.extend_from_slice(&block[block_offset..block_offset + bytes_in_block]);

            remaining -= bytes_in_block;
            current_offset += bytes_in_block as u64;
        }

        Ok(result.freeze())
    }

    fn size(&self) -> u64 {
        self.inner.size()
    }

    fn identifier(&self) -> &str {
        self.inner.identifier()
    }
}
