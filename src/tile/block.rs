//! Pixel containers passed between pipeline stages.

use crate::error::TileError;

/// Per-pixel validity of a tile, row-major.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidityMask {
    width: usize,
    height: usize,
    valid: Vec<bool>,
}

impl ValidityMask {
    pub fn new(width: usize, height: usize, valid: Vec<bool>) -> Self {
        debug_assert_eq!(valid.len(), width * height);
        Self {
            width,
            height,
            valid,
        }
    }

    pub fn all_valid(width: usize, height: usize) -> Self {
        Self::new(width, height, vec![true; width * height])
    }

    pub fn all_invalid(width: usize, height: usize) -> Self {
        Self::new(width, height, vec![false; width * height])
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    #[inline]
    pub fn is_valid(&self, col: usize, row: usize) -> bool {
        self.valid[row * self.width + col]
    }

    pub fn as_slice(&self) -> &[bool] {
        &self.valid
    }

    /// Whether every pixel is valid.
    pub fn is_fully_valid(&self) -> bool {
        self.valid.iter().all(|v| *v)
    }

    /// Whether no pixel is valid.
    pub fn is_empty(&self) -> bool {
        !self.valid.iter().any(|v| *v)
    }

    /// Element-wise AND with another mask of the same size.
    pub fn and_assign(&mut self, other: &ValidityMask) {
        debug_assert_eq!((self.width, self.height), (other.width, other.height));
        for (a, b) in self.valid.iter_mut().zip(&other.valid) {
            *a &= *b;
        }
    }

    /// The mask as 0/255 alpha values.
    pub fn to_alpha(&self) -> Vec<u8> {
        self.valid.iter().map(|v| if *v { 255 } else { 0 }).collect()
    }
}

/// Numeric samples of a tile, band-major (`band * height * width + row * width + col`).
#[derive(Debug, Clone, PartialEq)]
pub struct PixelBlock {
    bands: usize,
    width: usize,
    height: usize,
    data: Vec<f64>,
}

impl PixelBlock {
    pub fn new(bands: usize, width: usize, height: usize, data: Vec<f64>) -> Self {
        debug_assert_eq!(data.len(), bands * width * height);
        Self {
            bands,
            width,
            height,
            data,
        }
    }

    /// A zero-filled block.
    pub fn zeros(bands: usize, width: usize, height: usize) -> Self {
        Self::new(bands, width, height, vec![0.0; bands * width * height])
    }

    pub fn bands(&self) -> usize {
        self.bands
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    pub fn data(&self) -> &[f64] {
        &self.data
    }

    /// Samples of one band.
    pub fn band(&self, band: usize) -> &[f64] {
        let plane = self.width * self.height;
        &self.data[band * plane..(band + 1) * plane]
    }

    #[inline]
    pub fn get(&self, band: usize, col: usize, row: usize) -> f64 {
        self.data[(band * self.height + row) * self.width + col]
    }

    /// Concatenate blocks of equal size along the band axis.
    pub fn concat(blocks: &[PixelBlock]) -> Option<PixelBlock> {
        let first = blocks.first()?;
        let (width, height) = (first.width, first.height);
        let mut data = Vec::with_capacity(blocks.iter().map(|b| b.data.len()).sum());
        for block in blocks {
            debug_assert_eq!((block.width, block.height), (width, height));
            data.extend_from_slice(&block.data);
        }
        Some(PixelBlock::new(
            blocks.iter().map(|b| b.bands).sum(),
            width,
            height,
            data,
        ))
    }

    /// Keep the given 0-based bands, in the given order.
    ///
    /// # Errors
    /// `Configuration` on `indexes` if a band is out of range.
    pub fn select(&self, bands: &[usize]) -> Result<PixelBlock, TileError> {
        let plane = self.width * self.height;
        let mut data = Vec::with_capacity(bands.len() * plane);
        for &band in bands {
            if band >= self.bands {
                return Err(TileError::configuration(
                    "indexes",
                    format!("band {} out of range (1..={})", band + 1, self.bands),
                ));
            }
            data.extend_from_slice(self.band(band));
        }
        Ok(PixelBlock::new(bands.len(), self.width, self.height, data))
    }
}

/// 8-bit display samples of a tile, band-major.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DisplayBlock {
    bands: usize,
    width: usize,
    height: usize,
    data: Vec<u8>,
}

impl DisplayBlock {
    pub fn new(bands: usize, width: usize, height: usize, data: Vec<u8>) -> Self {
        debug_assert_eq!(data.len(), bands * width * height);
        Self {
            bands,
            width,
            height,
            data,
        }
    }

    pub fn bands(&self) -> usize {
        self.bands
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn band(&self, band: usize) -> &[u8] {
        let plane = self.width * self.height;
        &self.data[band * plane..(band + 1) * plane]
    }

    pub fn band_mut(&mut self, band: usize) -> &mut [u8] {
        let plane = self.width * self.height;
        &mut self.data[band * plane..(band + 1) * plane]
    }

    /// Samples interleaved per pixel (`RGBRGB...`), as image encoders expect.
    pub fn interleaved(&self) -> Vec<u8> {
        let plane = self.width * self.height;
        let mut out = Vec::with_capacity(self.data.len());
        for i in 0..plane {
            for band in 0..self.bands {
                out.push(self.data[band * plane + i]);
            }
        }
        out
    }
}
