//! Named colormaps for single-band data.
//!
//! Interpolated ramps are defined by a few RGB stops and expanded into a
//! 256-entry table; discrete maps list RGBA colors for specific values.

use super::block::DisplayBlock;
use crate::error::TileError;

/// A 256-entry lookup table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Colormap {
    /// RGB output
    Rgb(Box<[[u8; 3]; 256]>),
    /// RGBA output
    Rgba(Box<[[u8; 4]; 256]>),
}

const VIRIDIS: &[[u8; 3]] = &[
    [68, 1, 84],
    [72, 40, 120],
    [62, 74, 137],
    [49, 104, 142],
    [38, 130, 142],
    [31, 158, 137],
    [53, 183, 121],
    [109, 205, 89],
    [180, 222, 44],
    [253, 231, 37],
];

const MAGMA: &[[u8; 3]] = &[
    [0, 0, 4],
    [28, 16, 68],
    [79, 18, 123],
    [129, 37, 129],
    [181, 54, 122],
    [229, 80, 100],
    [251, 135, 97],
    [254, 194, 135],
    [252, 253, 191],
];

const GREYS: &[[u8; 3]] = &[[0, 0, 0], [255, 255, 255]];

const RDYLGN: &[[u8; 3]] = &[
    [165, 0, 38],
    [215, 48, 39],
    [244, 109, 67],
    [253, 174, 97],
    [254, 224, 139],
    [255, 255, 191],
    [217, 239, 139],
    [166, 217, 106],
    [102, 189, 99],
    [26, 152, 80],
    [0, 104, 55],
];

const TERRAIN: &[[u8; 3]] = &[
    [51, 51, 153],
    [0, 153, 255],
    [0, 204, 102],
    [255, 255, 153],
    [128, 92, 84],
    [255, 255, 255],
];

/// NLCD-style land cover classes.
const LANDCOVER: &[(u8, [u8; 4])] = &[
    (11, [70, 107, 159, 255]),
    (12, [209, 222, 248, 255]),
    (21, [222, 197, 197, 255]),
    (22, [217, 146, 130, 255]),
    (23, [235, 0, 0, 255]),
    (24, [171, 0, 0, 255]),
    (31, [179, 172, 159, 255]),
    (41, [104, 171, 95, 255]),
    (42, [28, 95, 44, 255]),
    (43, [181, 197, 143, 255]),
    (52, [204, 184, 121, 255]),
    (71, [223, 223, 194, 255]),
    (81, [220, 217, 57, 255]),
    (82, [171, 108, 40, 255]),
    (90, [184, 217, 235, 255]),
    (95, [108, 159, 184, 255]),
];

/// Names accepted by [`Colormap::by_name`].
pub const COLORMAP_NAMES: &[&str] = &["viridis", "magma", "greys", "rdylgn", "terrain", "landcover"];

impl Colormap {
    /// Look up a colormap by (case-insensitive) name.
    ///
    /// # Errors
    /// `Configuration` on `color_map` for unknown names.
    pub fn by_name(name: &str) -> Result<Self, TileError> {
        match name.trim().to_ascii_lowercase().as_str() {
            "viridis" => Ok(Self::ramp(VIRIDIS)),
            "magma" => Ok(Self::ramp(MAGMA)),
            "greys" => Ok(Self::ramp(GREYS)),
            "rdylgn" => Ok(Self::ramp(RDYLGN)),
            "terrain" => Ok(Self::ramp(TERRAIN)),
            "landcover" => Ok(Self::discrete(LANDCOVER)),
            other => Err(TileError::configuration(
                "color_map",
                format!(
                    "unknown colormap '{}' (available: {})",
                    other,
                    COLORMAP_NAMES.join(", ")
                ),
            )),
        }
    }

    /// Linear interpolation between evenly spaced stops.
    fn ramp(stops: &[[u8; 3]]) -> Self {
        let mut table = Box::new([[0u8; 3]; 256]);
        let segments = (stops.len() - 1) as f64;
        for (value, entry) in table.iter_mut().enumerate() {
            let position = value as f64 / 255.0 * segments;
            let lower = (position.floor() as usize).min(stops.len() - 2);
            let t = position - lower as f64;
            for (channel, out) in entry.iter_mut().enumerate() {
                let a = f64::from(stops[lower][channel]);
                let b = f64::from(stops[lower + 1][channel]);
                *out = (a + (b - a) * t).round() as u8;
            }
        }
        Colormap::Rgb(table)
    }

    /// Listed values get their color; every other value is transparent.
    fn discrete(entries: &[(u8, [u8; 4])]) -> Self {
        let mut table = Box::new([[0u8; 4]; 256]);
        for (value, color) in entries {
            table[*value as usize] = *color;
        }
        Colormap::Rgba(table)
    }

    /// Number of bands produced.
    pub fn output_bands(&self) -> usize {
        match self {
            Colormap::Rgb(_) => 3,
            Colormap::Rgba(_) => 4,
        }
    }

    /// Map a single-band block through the table.
    ///
    /// # Errors
    /// `Configuration` on `color_map` unless the block has exactly one band.
    pub fn apply(&self, block: &DisplayBlock) -> Result<DisplayBlock, TileError> {
        if block.bands() != 1 {
            return Err(TileError::configuration(
                "color_map",
                format!(
                    "colormaps apply to single-band data, got {} bands",
                    block.bands()
                ),
            ));
        }

        let bands = self.output_bands();
        let plane = block.width() * block.height();
        let mut data = vec![0u8; bands * plane];
        for (i, value) in block.band(0).iter().enumerate() {
            let color: &[u8] = match self {
                Colormap::Rgb(table) => &table[*value as usize],
                Colormap::Rgba(table) => &table[*value as usize],
            };
            for (band, channel) in color.iter().enumerate() {
                data[band * plane + i] = *channel;
            }
        }
        Ok(DisplayBlock::new(bands, block.width(), block.height(), data))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_all_names_resolve() {
        for name in COLORMAP_NAMES {
            assert!(Colormap::by_name(name).is_ok(), "{name}");
        }
        assert!(Colormap::by_name("Viridis").is_ok());
        assert!(matches!(
            Colormap::by_name("jet"),
            Err(TileError::Configuration {
                option: "color_map",
                ..
            })
        ));
    }

    #[test]
    fn test_ramp_end_points() {
        let Colormap::Rgb(table) = Colormap::by_name("viridis").unwrap() else {
            panic!("viridis is an RGB ramp");
        };
        assert_eq!(table[0], [68, 1, 84]);
        assert_eq!(table[255], [253, 231, 37]);

        let Colormap::Rgb(greys) = Colormap::by_name("greys").unwrap() else {
            panic!("greys is an RGB ramp");
        };
        assert_eq!(greys[128], [128, 128, 128]);
    }

    #[test]
    fn test_apply_single_band() {
        let block = DisplayBlock::new(1, 2, 1, vec![0, 255]);

        let rgb = Colormap::by_name("greys").unwrap().apply(&block).unwrap();
        assert_eq!(rgb.bands(), 3);
        assert_eq!(rgb.data(), &[0, 255, 0, 255, 0, 255]);

        let block = DisplayBlock::new(1, 2, 1, vec![0, 11]);
        let rgba = Colormap::by_name("landcover").unwrap().apply(&block).unwrap();
        assert_eq!(rgba.bands(), 4);
        assert_eq!(rgba.band(3), &[0, 255]);
        assert_eq!(rgba.band(0), &[0, 70]);
    }

    #[test]
    fn test_multi_band_rejected() {
        let block = DisplayBlock::new(3, 1, 1, vec![1, 2, 3]);
        assert!(matches!(
            Colormap::by_name("viridis").unwrap().apply(&block),
            Err(TileError::Configuration {
                option: "color_map",
                ..
            })
        ));
    }
}
