//! Maps raw sensor values onto bar/gauge fractions for display, with the
//! phase's target band highlighted where one exists.

use serde::Serialize;

use crate::phase::{Phase, PhaseCatalog};
use crate::vpd::VpdBand;

/// Display range of the VPD bar, in kPa.
pub const VPD_DISPLAY_MIN: f64 = 0.0;
pub const VPD_DISPLAY_MAX: f64 = 3.0;

const TEMPERATURE_LOW_C: f64 = 18.0;
const TEMPERATURE_HIGH_C: f64 = 28.0;
const HUMIDITY_LOW_PCT: f64 = 40.0;
const HUMIDITY_HIGH_PCT: f64 = 70.0;

const _: () = assert!(TEMPERATURE_LOW_C < TEMPERATURE_HIGH_C);
const _: () = assert!(HUMIDITY_LOW_PCT < HUMIDITY_HIGH_PCT);

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct BandFraction {
    pub min_fraction: f64,
    pub max_fraction: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct GaugeReading {
    pub value_fraction: f64,
    pub target_band_fraction: Option<BandFraction>,
}

/// `(value - min) / (max - min)` clamped to `0..=1`. A zero-width range
/// or a NaN reading maps to 0.
pub fn map_value(value: f64, min: f64, max: f64) -> f64 {
    if max == min {
        return 0.0;
    }
    let fraction = (value - min) / (max - min);
    if fraction.is_nan() {
        0.0
    } else {
        fraction.clamp(0.0, 1.0)
    }
}

pub fn map_band(band: Option<VpdBand>, min: f64, max: f64) -> Option<BandFraction> {
    band.map(|b| BandFraction {
        min_fraction: map_value(b.min, min, max),
        max_fraction: map_value(b.max, min, max),
    })
}

pub fn map_reading(value: f64, min: f64, max: f64, band: Option<VpdBand>) -> GaugeReading {
    GaugeReading {
        value_fraction: map_value(value, min, max),
        target_band_fraction: map_band(band, min, max),
    }
}

/// VPD bar over 0–3 kPa with the phase's band highlighted. A missing
/// reading renders as an empty bar.
pub fn vpd_gauge(value: Option<f64>, phase: &Phase, catalog: &PhaseCatalog) -> GaugeReading {
    map_reading(
        value.unwrap_or(VPD_DISPLAY_MIN),
        VPD_DISPLAY_MIN,
        VPD_DISPLAY_MAX,
        catalog.target_vpd_band(phase),
    )
}

// ---------------------------------------------------------------------------
// Segmented status bars
// ---------------------------------------------------------------------------

/// Level of a four-segment status bar.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum StatusLevel {
    Inactive,
    Low,
    Ok,
    High,
}

impl StatusLevel {
    pub fn segments(self) -> u8 {
        match self {
            Self::Inactive => 0,
            Self::Low => 1,
            Self::Ok => 3,
            Self::High => 4,
        }
    }
}

fn level(value: Option<f64>, low: f64, high: f64) -> StatusLevel {
    match value {
        Some(v) if v.is_finite() => {
            if v < low {
                StatusLevel::Low
            } else if v > high {
                StatusLevel::High
            } else {
                StatusLevel::Ok
            }
        }
        _ => StatusLevel::Inactive,
    }
}

pub fn temperature_level(celsius: Option<f64>) -> StatusLevel {
    level(celsius, TEMPERATURE_LOW_C, TEMPERATURE_HIGH_C)
}

pub fn humidity_level(percent: Option<f64>) -> StatusLevel {
    level(percent, HUMIDITY_LOW_PCT, HUMIDITY_HIGH_PCT)
}
