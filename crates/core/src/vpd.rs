//! Vapor-pressure deficit: target bands and derivation from temperature and
//! relative humidity.

use serde::{Deserialize, Serialize};

/// Acceptable VPD range for a phase, in kPa. Both bounds are inclusive.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct VpdBand {
    pub min: f64,
    pub max: f64,
}

/// Where a reading sits relative to a [`VpdBand`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum BandDeviation {
    Below,
    Within,
    Above,
}

impl VpdBand {
    pub const fn new(min: f64, max: f64) -> Self {
        Self { min, max }
    }

    pub fn contains(&self, value: f64) -> bool {
        (self.min..=self.max).contains(&value)
    }

    /// Returns `None` for a non-finite reading.
    pub fn deviation(&self, value: f64) -> Option<BandDeviation> {
        if !value.is_finite() {
            return None;
        }
        Some(if self.contains(value) {
            BandDeviation::Within
        } else if value < self.min {
            BandDeviation::Below
        } else {
            BandDeviation::Above
        })
    }
}

/// Saturation vapor pressure in kPa (Tetens equation).
pub fn saturation_vapor_pressure(temp_c: f64) -> f64 {
    0.6108 * ((17.27 * temp_c) / (temp_c + 237.3)).exp()
}

/// Leaf-agnostic air VPD in kPa. Humidity is clamped to 0..=100 % so the
/// result is never negative.
pub fn vapor_pressure_deficit(temp_c: f64, relative_humidity: f64) -> f64 {
    let rh = relative_humidity.clamp(0.0, 100.0);
    (saturation_vapor_pressure(temp_c) * (1.0 - rh / 100.0)).max(0.0)
}
