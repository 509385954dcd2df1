//! Band compositing across assets.

use super::block::{PixelBlock, ValidityMask};
use crate::error::TileError;
use crate::raster::RasterMetadata;

/// How the bands of several assets are combined.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CompositeMode {
    /// `indexes` select bands within every asset; results are stacked.
    #[default]
    Merged,
    /// All bands of all assets are stacked; `indexes` select from the stack.
    Separate,
}

impl CompositeMode {
    pub fn is_separate(&self) -> bool {
        matches!(self, CompositeMode::Separate)
    }

    /// 0-based bands to read from one asset.
    ///
    /// `indexes` are 1-based. In merged mode they apply to the asset itself;
    /// in separate mode every data band is read.
    ///
    /// # Errors
    /// `Configuration` on `indexes` when an index exceeds the asset's bands.
    pub fn read_bands(
        &self,
        indexes: Option<&[usize]>,
        metadata: &RasterMetadata,
    ) -> Result<Vec<usize>, TileError> {
        let data_bands = metadata.data_bands();
        match (self, indexes) {
            (CompositeMode::Merged, Some(indexes)) => indexes
                .iter()
                .map(|index| {
                    index
                        .checked_sub(1)
                        .and_then(|i| data_bands.get(i).copied())
                        .ok_or_else(|| {
                            TileError::configuration(
                                "indexes",
                                format!(
                                    "band {} out of range (asset has {} bands)",
                                    index,
                                    data_bands.len()
                                ),
                            )
                        })
                })
                .collect(),
            _ => Ok(data_bands),
        }
    }
}

/// Combine per-asset reads, in resolver order, into one block.
///
/// Bands are concatenated in the order of `reads`. The mask is the
/// element-wise AND of all read masks. In separate mode, 1-based `indexes`
/// then select from the concatenated stack.
///
/// # Errors
/// `Configuration` when `reads` is empty or an index is out of range.
pub fn compose(
    reads: Vec<(PixelBlock, ValidityMask)>,
    mode: CompositeMode,
    indexes: Option<&[usize]>,
) -> Result<(PixelBlock, ValidityMask), TileError> {
    let mut reads = reads.into_iter();
    let (first_block, mut mask) = reads
        .next()
        .ok_or_else(|| TileError::configuration("assets", "no assets to render"))?;

    let mut blocks = vec![first_block];
    for (block, read_mask) in reads {
        mask.and_assign(&read_mask);
        blocks.push(block);
    }

    let Some(stacked) = PixelBlock::concat(&blocks) else {
        return Err(TileError::configuration("assets", "no assets to render"));
    };

    let block = match (mode, indexes) {
        (CompositeMode::Separate, Some(indexes)) => {
            let bands = indexes
                .iter()
                .map(|index| {
                    index.checked_sub(1).ok_or_else(|| {
                        TileError::configuration("indexes", "indexes are 1-based")
                    })
                })
                .collect::<Result<Vec<_>, _>>()?;
            stacked.select(&bands)?
        }
        _ => stacked,
    };

    Ok((block, mask))
}
