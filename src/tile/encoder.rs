//! Tile image encoder.
//!
//! This module serializes display blocks into PNG, JPEG or WebP.
//!
//! # Design Decisions
//!
//! - **Mask as alpha**: PNG and WebP carry the validity mask in an alpha
//!   channel. JPEG has no alpha, so masked pixels are encoded as they are.
//!
//! - **Band layouts**: 1 band is grayscale, 3 bands RGB, 4 bands RGBA (the
//!   fourth band is combined with the mask). Other band counts cannot be
//!   encoded.
//!
//! - **Default format**: opaque tiles default to JPEG, tiles with any masked
//!   pixel to PNG.

use std::str::FromStr;

use bytes::Bytes;
use image::codecs::jpeg::JpegEncoder;
use image::codecs::png::{CompressionType, FilterType, PngEncoder};
use image::codecs::webp::WebPEncoder;
use image::{ExtendedColorType, ImageEncoder};
use serde::Serialize;

use super::block::{DisplayBlock, ValidityMask};
use crate::error::TileError;

/// Default JPEG quality (1-100).
pub const DEFAULT_JPEG_QUALITY: u8 = 85;

/// Minimum allowed JPEG quality.
pub const MIN_JPEG_QUALITY: u8 = 1;

/// Maximum allowed JPEG quality.
pub const MAX_JPEG_QUALITY: u8 = 100;

// =============================================================================
// Formats
// =============================================================================

/// Output image container.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ImageFormat {
    Png,
    Jpeg,
    Webp,
}

impl ImageFormat {
    /// MIME type for the `Content-Type` header.
    pub fn content_type(&self) -> &'static str {
        match self {
            ImageFormat::Png => "image/png",
            ImageFormat::Jpeg => "image/jpeg",
            ImageFormat::Webp => "image/webp",
        }
    }

    /// Canonical file extension.
    pub fn extension(&self) -> &'static str {
        match self {
            ImageFormat::Png => "png",
            ImageFormat::Jpeg => "jpg",
            ImageFormat::Webp => "webp",
        }
    }

    fn name(&self) -> &'static str {
        match self {
            ImageFormat::Png => "png",
            ImageFormat::Jpeg => "jpeg",
            ImageFormat::Webp => "webp",
        }
    }
}

impl FromStr for ImageFormat {
    type Err = TileError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "png" => Ok(ImageFormat::Png),
            "jpg" | "jpeg" => Ok(ImageFormat::Jpeg),
            "webp" => Ok(ImageFormat::Webp),
            other => Err(TileError::configuration(
                "format",
                format!("unsupported image format '{}' (expected png, jpg or webp)", other),
            )),
        }
    }
}

impl std::fmt::Display for ImageFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.extension())
    }
}

/// Fixed per-format encoder settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EncoderProfiles {
    pub jpeg_quality: u8,
}

impl Default for EncoderProfiles {
    fn default() -> Self {
        Self {
            jpeg_quality: DEFAULT_JPEG_QUALITY,
        }
    }
}

impl EncoderProfiles {
    pub fn with_jpeg_quality(quality: u8) -> Self {
        Self {
            jpeg_quality: clamp_quality(quality),
        }
    }
}

// =============================================================================
// Encoding
// =============================================================================

/// Format used when the request does not name one.
///
/// JPEG when every pixel is valid and the block is grayscale or RGB,
/// PNG otherwise. An all-invalid mask is not fully valid.
pub fn default_format(block: &DisplayBlock, mask: &ValidityMask) -> ImageFormat {
    if mask.is_fully_valid() && matches!(block.bands(), 1 | 3) {
        ImageFormat::Jpeg
    } else {
        ImageFormat::Png
    }
}

/// Encode a display block and its mask.
///
/// # Errors
/// `Encoding` for band counts the format cannot hold, or codec failures.
pub fn encode(
    block: &DisplayBlock,
    mask: &ValidityMask,
    format: ImageFormat,
    profiles: &EncoderProfiles,
) -> Result<Bytes, TileError> {
    let encoding_error = |message: String| TileError::Encoding {
        format: format.name(),
        message,
    };

    let (width, height) = (block.width() as u32, block.height() as u32);
    let (pixels, color) = pixel_layout(block, mask, format).ok_or_else(|| {
        encoding_error(format!(
            "cannot encode {} band(s) as {}",
            block.bands(),
            format.name()
        ))
    })?;

    let mut output = Vec::new();
    let result = match format {
        ImageFormat::Png => PngEncoder::new_with_quality(
            &mut output,
            CompressionType::Default,
            FilterType::Adaptive,
        )
        .write_image(&pixels, width, height, color),
        ImageFormat::Jpeg => JpegEncoder::new_with_quality(&mut output, profiles.jpeg_quality)
            .write_image(&pixels, width, height, color),
        ImageFormat::Webp => {
            WebPEncoder::new_lossless(&mut output).write_image(&pixels, width, height, color)
        }
    };
    result.map_err(|e| encoding_error(e.to_string()))?;

    Ok(Bytes::from(output))
}

/// Interleaved pixels and their color type, or `None` when unsupported.
fn pixel_layout(
    block: &DisplayBlock,
    mask: &ValidityMask,
    format: ImageFormat,
) -> Option<(Vec<u8>, ExtendedColorType)> {
    let with_alpha = format != ImageFormat::Jpeg;
    match (block.bands(), with_alpha) {
        (1, false) => Some((block.band(0).to_vec(), ExtendedColorType::L8)),
        (3, false) => Some((block.interleaved(), ExtendedColorType::Rgb8)),
        (1, true) => Some((
            interleave_with_alpha(block, 1, &mask.to_alpha()),
            ExtendedColorType::La8,
        )),
        (3, true) => Some((
            interleave_with_alpha(block, 3, &mask.to_alpha()),
            ExtendedColorType::Rgba8,
        )),
        (4, true) => {
            let alpha: Vec<u8> = block
                .band(3)
                .iter()
                .zip(mask.as_slice())
                .map(|(a, valid)| if *valid { *a } else { 0 })
                .collect();
            Some((
                interleave_with_alpha(block, 3, &alpha),
                ExtendedColorType::Rgba8,
            ))
        }
        _ => None,
    }
}

/// Interleave the first `bands` bands followed by `alpha`.
fn interleave_with_alpha(block: &DisplayBlock, bands: usize, alpha: &[u8]) -> Vec<u8> {
    let plane = block.width() * block.height();
    let mut out = Vec::with_capacity(plane * (bands + 1));
    for (i, a) in alpha.iter().enumerate().take(plane) {
        for band in 0..bands {
            out.push(block.band(band)[i]);
        }
        out.push(*a);
    }
    out
}

// =============================================================================
// Utility Functions
// =============================================================================

/// Validate JPEG quality parameter.
///
/// Returns `true` if quality is in the valid range (1-100).
#[inline]
pub fn is_valid_quality(quality: u8) -> bool {
    (MIN_JPEG_QUALITY..=MAX_JPEG_QUALITY).contains(&quality)
}

/// Clamp quality to valid range.
///
/// Values below 1 become 1, values above 100 become 100.
#[inline]
pub fn clamp_quality(quality: u8) -> u8 {
    quality.clamp(MIN_JPEG_QUALITY, MAX_JPEG_QUALITY)
}

// =============================================================================
// Tests
// =============================================================================
