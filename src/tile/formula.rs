//! Color formulas: band-wise radiometric operations on display data.
//!
//! A formula is a sequence of operations, separated by commas or spaces:
//!
//! ```text
//! gamma RGB 1.8, sigmoidal RGB 10 0.15, saturation 1.3
//! gamma 1 2.0
//! ```
//!
//! Bands are named positionally: `R`, `G`, `B` or the digits `1`-`9`.
//! Values are normalised to `0..=1` while operations run.

use super::block::DisplayBlock;
use crate::error::TileError;

const OPTION: &str = "color_formula";

/// One operation of a color formula.
#[derive(Debug, Clone, PartialEq)]
pub enum Operation {
    /// `v ^ (1 / value)`
    Gamma { bands: Vec<usize>, value: f64 },
    /// Sigmoidal contrast stretch around `bias`.
    Sigmoidal {
        bands: Vec<usize>,
        contrast: f64,
        bias: f64,
    },
    /// Move the first three bands towards (or away from) their luminance.
    Saturation { proportion: f64 },
}

/// A parsed color formula.
#[derive(Debug, Clone, PartialEq)]
pub struct ColorFormula {
    operations: Vec<Operation>,
}

impl ColorFormula {
    /// Parse a formula.
    ///
    /// # Errors
    /// `Configuration` on `color_formula` for unknown operations, malformed
    /// band lists or missing numbers.
    pub fn parse(formula: &str) -> Result<Self, TileError> {
        let mut tokens = formula
            .split(|c: char| c == ',' || c.is_whitespace())
            .filter(|t| !t.is_empty());

        let mut operations = Vec::new();
        while let Some(token) = tokens.next() {
            let operation = match token.to_ascii_lowercase().as_str() {
                "gamma" => {
                    let bands = parse_bands(tokens.next())?;
                    let value = parse_number(tokens.next(), "gamma value")?;
                    if value <= 0.0 {
                        return Err(TileError::configuration(
                            OPTION,
                            format!("gamma must be positive, got {}", value),
                        ));
                    }
                    Operation::Gamma { bands, value }
                }
                "sigmoidal" => {
                    let bands = parse_bands(tokens.next())?;
                    let contrast = parse_number(tokens.next(), "sigmoidal contrast")?;
                    let bias = parse_number(tokens.next(), "sigmoidal bias")?;
                    if !(0.0..=1.0).contains(&bias) {
                        return Err(TileError::configuration(
                            OPTION,
                            format!("sigmoidal bias must be within 0..1, got {}", bias),
                        ));
                    }
                    Operation::Sigmoidal {
                        bands,
                        contrast,
                        bias,
                    }
                }
                "saturation" => Operation::Saturation {
                    proportion: parse_number(tokens.next(), "saturation proportion")?,
                },
                other => {
                    return Err(TileError::configuration(
                        OPTION,
                        format!("unknown operation '{}'", other),
                    ))
                }
            };
            operations.push(operation);
        }

        if operations.is_empty() {
            return Err(TileError::configuration(OPTION, "empty formula"));
        }
        Ok(Self { operations })
    }

    pub fn operations(&self) -> &[Operation] {
        &self.operations
    }

    /// Apply the formula in place.
    ///
    /// # Errors
    /// `Configuration` on `color_formula` when an operation references a band
    /// the block does not have.
    pub fn apply(&self, block: &mut DisplayBlock) -> Result<(), TileError> {
        let band_count = block.bands();
        let check = |band: usize| {
            if band >= band_count {
                Err(TileError::configuration(
                    OPTION,
                    format!("band {} out of range (1..={})", band + 1, band_count),
                ))
            } else {
                Ok(())
            }
        };

        // Validate everything before touching the data
        for operation in &self.operations {
            match operation {
                Operation::Gamma { bands, .. } | Operation::Sigmoidal { bands, .. } => {
                    bands.iter().try_for_each(|b| check(*b))?
                }
                Operation::Saturation { .. } => check(2)?,
            }
        }

        for operation in &self.operations {
            match operation {
                Operation::Gamma { bands, value } => {
                    for band in bands {
                        map_band(block, *band, |v| v.powf(1.0 / value));
                    }
                }
                Operation::Sigmoidal {
                    bands,
                    contrast,
                    bias,
                } => {
                    for band in bands {
                        map_band(block, *band, |v| sigmoidal(v, *contrast, *bias));
                    }
                }
                Operation::Saturation { proportion } => saturate(block, *proportion),
            }
        }
        Ok(())
    }
}

fn parse_bands(token: Option<&str>) -> Result<Vec<usize>, TileError> {
    let token =
        token.ok_or_else(|| TileError::configuration(OPTION, "missing band list"))?;
    token
        .chars()
        .map(|c| match c.to_ascii_uppercase() {
            'R' => Ok(0),
            'G' => Ok(1),
            'B' => Ok(2),
            d @ '1'..='9' => Ok(d as usize - '1' as usize),
            _ => Err(TileError::configuration(
                OPTION,
                format!("invalid band list '{}'", token),
            )),
        })
        .collect()
}

fn parse_number(token: Option<&str>, what: &str) -> Result<f64, TileError> {
    let token = token.ok_or_else(|| TileError::configuration(OPTION, format!("missing {}", what)))?;
    token
        .parse::<f64>()
        .ok()
        .filter(|v| v.is_finite())
        .ok_or_else(|| TileError::configuration(OPTION, format!("invalid {} '{}'", what, token)))
}

fn to_unit(v: u8) -> f64 {
    f64::from(v) / 255.0
}

fn from_unit(v: f64) -> u8 {
    (v.clamp(0.0, 1.0) * 255.0).round() as u8
}

fn map_band(block: &mut DisplayBlock, band: usize, f: impl Fn(f64) -> f64) {
    for v in block.band_mut(band) {
        *v = from_unit(f(to_unit(*v)));
    }
}

fn sigmoidal(x: f64, contrast: f64, bias: f64) -> f64 {
    let (alpha, beta) = (bias, contrast);
    if beta == 0.0 {
        return x;
    }
    let logistic = |t: f64| 1.0 / (1.0 + t.exp());
    if beta > 0.0 {
        let numerator = logistic(beta * (alpha - x)) - logistic(beta * alpha);
        let denominator = logistic(beta * (alpha - 1.0)) - logistic(beta * alpha);
        numerator / denominator
    } else {
        // Inverse of the stretch above
        let base = logistic(beta * alpha);
        let top = logistic(beta * alpha - beta);
        (beta * alpha - (1.0 / (x * top - x * base + base) - 1.0).ln()) / beta
    }
}

fn saturate(block: &mut DisplayBlock, proportion: f64) {
    let plane = block.width() * block.height();
    for i in 0..plane {
        let r = to_unit(block.band(0)[i]);
        let g = to_unit(block.band(1)[i]);
        let b = to_unit(block.band(2)[i]);
        let luma = 0.2126 * r + 0.7152 * g + 0.0722 * b;
        for (band, value) in [r, g, b].into_iter().enumerate() {
            block.band_mut(band)[i] = from_unit(luma + proportion * (value - luma));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rgb(r: u8, g: u8, b: u8) -> DisplayBlock {
        DisplayBlock::new(3, 1, 1, vec![r, g, b])
    }

    #[test]
    fn test_parse_operations() {
        let formula = ColorFormula::parse("gamma RGB 1.5, sigmoidal rgb 10 0.5 saturation 1.2")
            .unwrap();
        assert_eq!(
            formula.operations(),
            &[
                Operation::Gamma {
                    bands: vec![0, 1, 2],
                    value: 1.5
                },
                Operation::Sigmoidal {
                    bands: vec![0, 1, 2],
                    contrast: 10.0,
                    bias: 0.5
                },
                Operation::Saturation { proportion: 1.2 },
            ]
        );
        assert_eq!(
            ColorFormula::parse("gamma 13 2").unwrap().operations(),
            &[Operation::Gamma {
                bands: vec![0, 2],
                value: 2.0
            }]
        );
    }

    #[test]
    fn test_parse_errors() {
        for bad in ["", "blur RGB 2", "gamma", "gamma RGB", "gamma RXB 2", "gamma R 0", "sigmoidal R 10 2"] {
            assert!(
                matches!(
                    ColorFormula::parse(bad),
                    Err(TileError::Configuration {
                        option: "color_formula",
                        ..
                    })
                ),
                "{bad}"
            );
        }
    }

    #[test]
    fn test_gamma() {
        let mut block = rgb(0, 64, 255);
        ColorFormula::parse("gamma G 2").unwrap().apply(&mut block).unwrap();
        // sqrt(64/255) * 255 = 127.75
        assert_eq!(block.data(), &[0, 128, 255]);
    }

    #[test]
    fn test_sigmoidal_fixes_end_points() {
        let mut block = DisplayBlock::new(1, 3, 1, vec![0, 128, 255]);
        ColorFormula::parse("sigmoidal 1 10 0.5")
            .unwrap()
            .apply(&mut block)
            .unwrap();
        assert_eq!(block.data()[0], 0);
        assert_eq!(block.data()[2], 255);
        assert!((i32::from(block.data()[1]) - 128).abs() <= 1);
    }

    #[test]
    fn test_negative_sigmoidal_inverts_positive() {
        let x = 0.3;
        let y = sigmoidal(x, 5.0, 0.4);
        assert!((sigmoidal(y, -5.0, 0.4) - x).abs() < 1e-9);
    }

    #[test]
    fn test_saturation() {
        let mut gray = rgb(100, 100, 100);
        ColorFormula::parse("saturation 2").unwrap().apply(&mut gray).unwrap();
        assert_eq!(gray.data(), &[100, 100, 100]);

        let mut color = rgb(200, 100, 50);
        ColorFormula::parse("saturation 0").unwrap().apply(&mut color).unwrap();
        let data = color.data();
        assert_eq!(data[0], data[1]);
        assert_eq!(data[1], data[2]);
    }

    #[test]
    fn test_band_out_of_range() {
        let mut single = DisplayBlock::new(1, 1, 1, vec![10]);
        assert!(matches!(
            ColorFormula::parse("gamma B 2").unwrap().apply(&mut single),
            Err(TileError::Configuration {
                option: "color_formula",
                ..
            })
        ));
        assert!(ColorFormula::parse("saturation 1.5")
            .unwrap()
            .apply(&mut single)
            .is_err());
        // Nothing was modified
        assert_eq!(single.data(), &[10]);
    }
}
