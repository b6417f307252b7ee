//! Light-schedule and target-band logic for a grow box dashboard.
//!
//! - [`phase`]: the phase catalog (light hours, VPD bands, custom phases)
//! - [`schedule`]: expected light state, countdown and mismatch detection
//! - [`gauge`]: display fractions for bars and gauges
//! - [`vpd`]: VPD bands and derivation from temperature/humidity
//!
//! Every operation is a pure function of its arguments; callers supply the
//! current instant.

pub mod error;
pub mod gauge;
pub mod phase;
pub mod schedule;
pub mod vpd;

pub use error::{CatalogError, ScheduleError};
pub use gauge::{GaugeReading, StatusLevel};
pub use phase::{CustomPhase, Phase, PhaseCatalog};
pub use schedule::{
    DeviceSchedule, LightState, LightWindow, NextEvent, ScheduleEngine, ScheduleStatus,
};
pub use vpd::{BandDeviation, VpdBand};
