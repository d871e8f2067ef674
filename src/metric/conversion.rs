//! Raw sample to display value conversion.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Conversion errors. Recorded on the metric, never raised past the dispatcher.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConversionError {
    #[error("conversion factor is 0 with exponent {0}")]
    ZeroFactor(u32),
    #[error("value is not finite: {0}")]
    NonFinite(f64),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ConversionMode {
    Multiply,
    #[default]
    Divide,
    Identity,
}

/// How a raw sample becomes a display value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Conversion {
    pub factor: u32,
    pub exponent: u32,
    pub mode: ConversionMode,
    pub decimal_places: u32,
}

impl Default for Conversion {
    fn default() -> Self {
        Self {
            factor: 1,
            exponent: 0,
            mode: ConversionMode::Divide,
            decimal_places: 0,
        }
    }
}

impl Conversion {
    pub fn new(factor: u32, exponent: u32, mode: ConversionMode, decimal_places: u32) -> Self {
        Self {
            factor,
            exponent,
            mode,
            decimal_places,
        }
    }

    pub fn identity(decimal_places: u32) -> Self {
        Self::new(1, 0, ConversionMode::Identity, decimal_places)
    }

    /// Apply the conversion to a raw sample.
    pub fn apply(&self, raw: f64) -> Result<f64, ConversionError> {
        if !raw.is_finite() {
            return Err(ConversionError::NonFinite(raw));
        }

        let scale = (self.factor as f64).powi(self.exponent as i32);
        let value = match self.mode {
            ConversionMode::Multiply => raw * scale,
            ConversionMode::Divide => {
                if self.factor == 0 && self.exponent > 0 {
                    return Err(ConversionError::ZeroFactor(self.exponent));
                }
                raw / scale
            }
            ConversionMode::Identity => raw,
        };

        let rounded = round_to(value, self.decimal_places);
        if !rounded.is_finite() {
            return Err(ConversionError::NonFinite(rounded));
        }
        Ok(rounded)
    }
}

/// Most decimal places an f64 can still round meaningfully.
pub const MAX_DECIMAL_PLACES: u32 = 15;

/// Round to `places` decimal places, ties to even.
///
/// Anything past [`MAX_DECIMAL_PLACES`] is already at full precision and is
/// returned as is.
pub fn round_to(value: f64, places: u32) -> f64 {
    if places == 0 {
        return value.round_ties_even();
    }
    if places > MAX_DECIMAL_PLACES {
        return value;
    }
    let scale = 10f64.powi(places as i32);
    (value * scale).round_ties_even() / scale
}
