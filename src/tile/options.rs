//! Per-request rendering options.

use super::colormap::Colormap;
use super::encoder::ImageFormat;
use super::formula::ColorFormula;
use super::reader::ResamplingMethod;
use crate::error::TileError;
use crate::geo::{output_size, DEFAULT_SCALE};

/// Everything a tile request may customise.
///
/// String inputs are parsed up front, so a constructed value only holds
/// well-formed options. Checks that depend on the data (band counts) run
/// during rendering.
#[derive(Debug, Clone)]
pub struct RenderOptions {
    /// Assets to render, in order; empty means every eligible asset.
    pub assets: Vec<String>,
    /// 1-based band indexes.
    pub indexes: Option<Vec<usize>>,
    /// `(min, max)` pairs, one for all bands or one per band.
    pub rescale: Option<Vec<(f64, f64)>>,
    pub color_formula: Option<ColorFormula>,
    pub color_map: Option<Colormap>,
    pub resampling: ResamplingMethod,
    /// Explicit output format; chosen from the mask when absent.
    pub format: Option<ImageFormat>,
    /// Output size multiplier (tiles are `256 * scale` pixels).
    pub scale: i64,
}

impl Default for RenderOptions {
    fn default() -> Self {
        Self {
            assets: Vec::new(),
            indexes: None,
            rescale: None,
            color_formula: None,
            color_map: None,
            resampling: ResamplingMethod::default(),
            format: None,
            scale: i64::from(DEFAULT_SCALE),
        }
    }
}

impl RenderOptions {
    pub fn with_assets<I, S>(mut self, assets: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.assets = assets.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_indexes(mut self, indexes: Vec<usize>) -> Self {
        self.indexes = Some(indexes);
        self
    }

    pub fn with_rescale(mut self, rescale: Vec<(f64, f64)>) -> Self {
        self.rescale = Some(rescale);
        self
    }

    pub fn with_color_formula(mut self, formula: ColorFormula) -> Self {
        self.color_formula = Some(formula);
        self
    }

    pub fn with_color_map(mut self, colormap: Colormap) -> Self {
        self.color_map = Some(colormap);
        self
    }

    pub fn with_resampling(mut self, resampling: ResamplingMethod) -> Self {
        self.resampling = resampling;
        self
    }

    pub fn with_format(mut self, format: ImageFormat) -> Self {
        self.format = Some(format);
        self
    }

    pub fn with_scale(mut self, scale: i64) -> Self {
        self.scale = scale;
        self
    }

    /// Output tile dimensions.
    pub fn output_size(&self) -> Result<(usize, usize), TileError> {
        output_size(self.scale)
    }

    /// Checks that need no data: scale range, index base, empty lists.
    pub fn validate(&self) -> Result<(), TileError> {
        self.output_size()?;

        if let Some(indexes) = &self.indexes {
            if indexes.is_empty() {
                return Err(TileError::configuration("indexes", "no band indexes given"));
            }
            if indexes.contains(&0) {
                return Err(TileError::configuration("indexes", "indexes are 1-based"));
            }
        }

        if let Some(rescale) = &self.rescale {
            if rescale.is_empty() {
                return Err(TileError::configuration("rescale", "no ranges given"));
            }
            if let Some((min, max)) = rescale.iter().find(|(min, max)| min == max) {
                return Err(TileError::configuration(
                    "rescale",
                    format!("empty range {},{}", min, max),
                ));
            }
        }

        Ok(())
    }
}

// =============================================================================
// Query-string helpers
// =============================================================================

/// Split a comma-separated asset list, dropping blanks.
pub fn parse_asset_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
        .collect()
}

/// Parse a comma-separated list of 1-based band indexes.
pub fn parse_indexes(value: &str) -> Result<Vec<usize>, TileError> {
    value
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| match s.parse::<usize>() {
            Ok(index) if index > 0 => Ok(index),
            _ => Err(TileError::configuration(
                "indexes",
                format!("'{}' is not a positive band index", s),
            )),
        })
        .collect()
}

/// Parse `min,max[,min,max...]` into range pairs.
pub fn parse_rescale(value: &str) -> Result<Vec<(f64, f64)>, TileError> {
    let numbers = value
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| {
            s.parse::<f64>()
                .ok()
                .filter(|v| v.is_finite())
                .ok_or_else(|| {
                    TileError::configuration("rescale", format!("'{}' is not a number", s))
                })
        })
        .collect::<Result<Vec<_>, _>>()?;

    if numbers.is_empty() || numbers.len() % 2 != 0 {
        return Err(TileError::configuration(
            "rescale",
            format!("expected min,max pairs, got {} value(s)", numbers.len()),
        ));
    }

    Ok(numbers.chunks(2).map(|pair| (pair[0], pair[1])).collect())
}
