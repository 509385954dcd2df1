//! Conversion of composited samples into display-ready 8-bit bands.
//!
//! Steps run in a fixed order, each optional:
//!
//! 1. rescale (`f64` -> `u8`; plain clamping when no range is given)
//! 2. color formula
//! 3. colormap (single band only)
//!
//! The validity mask is not modified; invalid pixels are written as 0.

use super::block::{DisplayBlock, PixelBlock, ValidityMask};
use super::colormap::Colormap;
use super::formula::ColorFormula;
use crate::error::TileError;

/// Check that `rescale` pairs fit a block of `bands` bands.
///
/// One pair is broadcast to every band; otherwise one pair per band is required.
///
/// # Errors
/// `Configuration` on `rescale` for a count mismatch or an empty range.
pub fn validate_rescale(rescale: &[(f64, f64)], bands: usize) -> Result<(), TileError> {
    if rescale.len() != 1 && rescale.len() != bands {
        return Err(TileError::configuration(
            "rescale",
            format!(
                "expected 1 or {} min,max pairs, got {}",
                bands,
                rescale.len()
            ),
        ));
    }
    if let Some((min, max)) = rescale.iter().find(|(min, max)| min == max) {
        return Err(TileError::configuration(
            "rescale",
            format!("empty range {},{}", min, max),
        ));
    }
    Ok(())
}

/// Map samples to 0..=255.
///
/// With a range, `round((clamp(v, min, max) - min) / (max - min) * 255)`.
/// Without one, values are clamped into 0..=255 and rounded.
pub fn rescale(
    block: &PixelBlock,
    mask: &ValidityMask,
    ranges: Option<&[(f64, f64)]>,
) -> Result<DisplayBlock, TileError> {
    if let Some(ranges) = ranges {
        validate_rescale(ranges, block.bands())?;
    }

    let valid = mask.as_slice();
    let mut data = Vec::with_capacity(block.data().len());
    for band in 0..block.bands() {
        let range = ranges.map(|r| if r.len() == 1 { r[0] } else { r[band] });
        for (value, is_valid) in block.band(band).iter().zip(valid) {
            if !*is_valid || value.is_nan() {
                data.push(0);
                continue;
            }
            let scaled = match range {
                Some((min, max)) => {
                    let (lo, hi) = if min <= max { (min, max) } else { (max, min) };
                    (value.clamp(lo, hi) - min) / (max - min) * 255.0
                }
                None => *value,
            };
            data.push(scaled.round().clamp(0.0, 255.0) as u8);
        }
    }

    Ok(DisplayBlock::new(
        block.bands(),
        block.width(),
        block.height(),
        data,
    ))
}

/// Run the full post-processing chain.
pub fn postprocess(
    block: &PixelBlock,
    mask: &ValidityMask,
    ranges: Option<&[(f64, f64)]>,
    formula: Option<&ColorFormula>,
    colormap: Option<&Colormap>,
) -> Result<DisplayBlock, TileError> {
    let mut display = rescale(block, mask, ranges)?;

    if let Some(formula) = formula {
        formula.apply(&mut display)?;
    }

    match colormap {
        Some(colormap) => colormap.apply(&display),
        None => Ok(display),
    }
}
