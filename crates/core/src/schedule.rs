//! Phase-driven light schedule: derives whether the grow light should be on
//! right now, when it next changes, and whether the live switch disagrees.
//!
//! The window for "today" starts at `light_start_hour:00` in the offset of
//! the supplied `now` and lasts for the phase's light duration:
//!
//! ```text
//!   start_hour = 22, duration = 10h
//!
//!   00:00      08:00                    22:00      24:00
//!     |##########|                        |##########|
//!     ^ window opened yesterday 22:00     ^ today's window opens
//! ```
//!
//! When the hour of `now` is still before the start hour, today's start
//! event has not fired yet, so the window is taken from yesterday. Only the
//! hour component is compared.
//!
//! Nothing here reads a clock, logs, or keeps state between calls.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use time::{Duration, OffsetDateTime, Time};

use crate::error::ScheduleError;
use crate::phase::{Phase, PhaseCatalog};

/// Start hour used when a device has none configured.
pub const DEFAULT_LIGHT_START_HOUR: i64 = 18;

/// Light hours for a phase the catalog does not know and that carries no
/// override.
pub const FALLBACK_DURATION_HOURS: f64 = 12.0;

const HOURS_PER_DAY: f64 = 24.0;
const SECONDS_PER_HOUR: f64 = 3600.0;

// ---------------------------------------------------------------------------
// Inputs
// ---------------------------------------------------------------------------

/// Live state of the light switch as reported by the sensor.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LightState {
    On,
    Off,
    #[default]
    Unknown,
}

impl LightState {
    pub fn known(self) -> Option<bool> {
        match self {
            Self::On => Some(true),
            Self::Off => Some(false),
            Self::Unknown => None,
        }
    }
}

/// Per-device schedule configuration. Missing fields fall back to the
/// documented defaults when read through the accessor methods.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DeviceSchedule {
    #[serde(default)]
    pub light_start_hour: Option<i64>,
    #[serde(default)]
    pub current_phase: Option<Phase>,
    /// Light hours per phase, overriding the catalog default.
    #[serde(default)]
    pub phase_hours: BTreeMap<Phase, f64>,
}

impl DeviceSchedule {
    pub fn start_hour(&self) -> i64 {
        self.light_start_hour.unwrap_or(DEFAULT_LIGHT_START_HOUR)
    }

    pub fn phase(&self) -> Phase {
        self.current_phase.clone().unwrap_or_default()
    }

    pub fn duration_override(&self, phase: &Phase) -> Option<f64> {
        self.phase_hours.get(phase).copied()
    }
}

// ---------------------------------------------------------------------------
// Outputs
// ---------------------------------------------------------------------------

/// The `[start, end)` interval the light is expected to be on for the
/// current 24h cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct LightWindow {
    #[serde(with = "time::serde::rfc3339")]
    pub start: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub end: OffsetDateTime,
}

impl LightWindow {
    pub fn contains(&self, t: OffsetDateTime) -> bool {
        self.start <= t && t < self.end
    }

    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum NextEvent {
    #[serde(rename = "off-in")]
    OffIn,
    #[serde(rename = "on-in")]
    OnIn,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScheduleStatus {
    pub expected_on: bool,
    /// `None` when the sensor is unavailable.
    pub actual_on: Option<bool>,
    pub mismatch: bool,
    pub ms_until_transition: i64,
    pub next_event: NextEvent,
    pub countdown: String,
    /// Resolved light hours after clamping to `0..=24`.
    pub duration_hours: f64,
    pub window: LightWindow,
}

// ---------------------------------------------------------------------------
// Engine
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default)]
pub struct ScheduleEngine {
    catalog: PhaseCatalog,
}

impl ScheduleEngine {
    pub fn new(catalog: PhaseCatalog) -> Self {
        Self { catalog }
    }

    pub fn catalog(&self) -> &PhaseCatalog {
        &self.catalog
    }

    /// Light hours for `phase`: a finite override wins, then the catalog,
    /// then [`FALLBACK_DURATION_HOURS`]. The result is clamped to `0..=24`.
    pub fn resolve_duration_hours(&self, phase: &Phase, duration_override: Option<f64>) -> f64 {
        let hours = duration_override
            .filter(|h| h.is_finite())
            .or_else(|| {
                self.catalog
                    .default_duration_hours(phase)
                    .ok()
                    .filter(|h| h.is_finite())
            })
            .unwrap_or(FALLBACK_DURATION_HOURS);
        hours.clamp(0.0, HOURS_PER_DAY)
    }

    /// Window covering `now` for a light starting at `start_hour` (taken
    /// modulo 24) and running `duration_hours`.
    pub fn light_window(
        &self,
        now: OffsetDateTime,
        start_hour: i64,
        duration_hours: f64,
    ) -> Result<LightWindow, ScheduleError> {
        let hour = start_hour.rem_euclid(24) as u8;
        let start_of_window = Time::from_hms(hour, 0, 0)
            .map_err(|e| ScheduleError::InvalidInput(format!("start hour {start_hour}: {e}")))?;

        let mut start = now.replace_time(start_of_window);
        if now.hour() < hour {
            start = shift(start, -Duration::DAY)?;
        }

        let hours = if duration_hours.is_finite() {
            duration_hours.clamp(0.0, HOURS_PER_DAY)
        } else {
            0.0
        };
        let end = shift(start, Duration::seconds_f64(hours * SECONDS_PER_HOUR))?;

        Ok(LightWindow { start, end })
    }

    pub fn evaluate(
        &self,
        now: OffsetDateTime,
        start_hour: i64,
        phase: &Phase,
        duration_override: Option<f64>,
        actual: LightState,
    ) -> Result<ScheduleStatus, ScheduleError> {
        let duration_hours = self.resolve_duration_hours(phase, duration_override);
        let window = self.light_window(now, start_hour, duration_hours)?;
        let expected_on = window.contains(now);

        // Outside the window the next start is always a day after the
        // (possibly shifted) start: the window never lies in the future.
        // A 24h window reports `OffIn` counting down to its end, which is
        // also the start of the next always-on window.
        let (transition, next_event) = if expected_on {
            (window.end, NextEvent::OffIn)
        } else {
            (shift(window.start, Duration::DAY)?, NextEvent::OnIn)
        };
        let ms_until_transition = (transition - now).whole_milliseconds() as i64;

        let actual_on = actual.known();
        let mismatch = actual_on.is_some_and(|on| on != expected_on);

        Ok(ScheduleStatus {
            expected_on,
            actual_on,
            mismatch,
            ms_until_transition,
            next_event,
            countdown: format_countdown(ms_until_transition),
            duration_hours,
            window,
        })
    }

    /// Evaluate with the start hour, current phase and that phase's
    /// override taken from `device`.
    pub fn evaluate_device(
        &self,
        device: &DeviceSchedule,
        now: OffsetDateTime,
        actual: LightState,
    ) -> Result<ScheduleStatus, ScheduleError> {
        let phase = device.phase();
        self.evaluate(
            now,
            device.start_hour(),
            &phase,
            device.duration_override(&phase),
            actual,
        )
    }
}

fn shift(t: OffsetDateTime, by: Duration) -> Result<OffsetDateTime, ScheduleError> {
    t.checked_add(by)
        .ok_or_else(|| ScheduleError::InvalidInput(format!("{t} shifted by {by} is out of range")))
}

/// `"4h 03m"`, truncated to whole minutes. Negative input reads as zero.
pub fn format_countdown(ms: i64) -> String {
    let minutes = ms.max(0) / 60_000;
    format!("{}h {:02}m", minutes / 60, minutes % 60)
}

// ===========================================================================
// Tests
// ===========================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::phase::CustomPhase;
    use time::macros::datetime;

    const HOUR_MS: i64 = 3_600_000;

    fn engine() -> ScheduleEngine {
        ScheduleEngine::default()
    }

    fn on_with(now: OffsetDateTime, start_hour: i64, hours: f64) -> ScheduleStatus {
        engine()
            .evaluate(now, start_hour, &Phase::Vegetative, Some(hours), LightState::Unknown)
            .unwrap()
    }

    // -- Duration resolution ----------------------------------------------

    #[test]
    fn override_wins_over_catalog() {
        assert_eq!(engine().resolve_duration_hours(&Phase::Flowering, Some(10.5)), 10.5);
    }

    #[test]
    fn catalog_default_without_override() {
        assert_eq!(engine().resolve_duration_hours(&Phase::Flowering, None), 12.0);
        assert_eq!(engine().resolve_duration_hours(&Phase::Seedling, None), 18.0);
    }

    #[test]
    fn unknown_phase_falls_back_to_twelve_hours() {
        let p = Phase::Custom("mystery".into());
        assert_eq!(engine().resolve_duration_hours(&p, None), FALLBACK_DURATION_HOURS);
    }

    #[test]
    fn unknown_phase_with_override_uses_override() {
        let p = Phase::Custom("mystery".into());
        assert_eq!(engine().resolve_duration_hours(&p, Some(6.0)), 6.0);
    }

    #[test]
    fn non_finite_override_counts_as_absent() {
        assert_eq!(engine().resolve_duration_hours(&Phase::Flowering, Some(f64::NAN)), 12.0);
        assert_eq!(
            engine().resolve_duration_hours(&Phase::Flowering, Some(f64::INFINITY)),
            12.0
        );
    }

    #[test]
    fn out_of_range_durations_are_clamped() {
        assert_eq!(engine().resolve_duration_hours(&Phase::Flowering, Some(-3.0)), 0.0);
        assert_eq!(engine().resolve_duration_hours(&Phase::Flowering, Some(30.0)), 24.0);
    }

    #[test]
    fn custom_phase_uses_catalog_hours() {
        let cat = PhaseCatalog::with_custom([CustomPhase {
            name: "Flush".into(),
            hours: 9.0,
        }])
        .unwrap();
        let engine = ScheduleEngine::new(cat);
        assert_eq!(engine.resolve_duration_hours(&Phase::Custom("Flush".into()), None), 9.0);
    }

    // -- Window construction ----------------------------------------------

    #[test]
    fn window_today_when_start_hour_reached() {
        let w = engine()
            .light_window(datetime!(2024-05-10 20:00 UTC), 12, 12.0)
            .unwrap();
        assert_eq!(w.start, datetime!(2024-05-10 12:00 UTC));
        assert_eq!(w.end, datetime!(2024-05-11 00:00 UTC));
    }

    #[test]
    fn window_from_yesterday_before_start_hour() {
        let w = engine()
            .light_window(datetime!(2024-05-10 02:00 UTC), 22, 10.0)
            .unwrap();
        assert_eq!(w.start, datetime!(2024-05-09 22:00 UTC));
        assert_eq!(w.end, datetime!(2024-05-10 08:00 UTC));
    }

    #[test]
    fn window_uses_offset_of_now() {
        let w = engine()
            .light_window(datetime!(2024-05-10 07:30 +02:00), 6, 18.0)
            .unwrap();
        assert_eq!(w.start, datetime!(2024-05-10 06:00 +02:00));
        assert_eq!(w.end, datetime!(2024-05-11 00:00 +02:00));
    }

    #[test]
    fn start_hour_wraps_modulo_24() {
        let now = datetime!(2024-05-10 20:00 UTC);
        assert_eq!(
            engine().light_window(now, 36, 12.0).unwrap(),
            engine().light_window(now, 12, 12.0).unwrap()
        );
        assert_eq!(
            engine().light_window(now, -2, 4.0).unwrap(),
            engine().light_window(now, 22, 4.0).unwrap()
        );
    }

    #[test]
    fn fractional_duration_window() {
        let w = engine()
            .light_window(datetime!(2024-05-10 09:00 UTC), 8, 1.5)
            .unwrap();
        assert_eq!(w.end, datetime!(2024-05-10 09:30 UTC));
    }

    #[test]
    fn zero_duration_window_is_empty() {
        let w = engine()
            .light_window(datetime!(2024-05-10 09:00 UTC), 6, 0.0)
            .unwrap();
        assert!(w.is_empty());
    }

    #[test]
    fn window_out_of_range_is_invalid_input() {
        let now = time::PrimitiveDateTime::new(time::Date::MIN, time::macros::time!(01:00))
            .assume_utc();
        let err = engine().light_window(now, 5, 12.0).unwrap_err();
        assert!(matches!(err, ScheduleError::InvalidInput(_)));
    }

    // -- Expected state / countdown -------------------------------------

    #[test]
    fn midnight_wrap_early_morning_is_on() {
        let s = on_with(datetime!(2024-05-10 02:00 UTC), 22, 10.0);
        assert!(s.expected_on);
        assert_eq!(s.next_event, NextEvent::OffIn);
        assert_eq!(s.ms_until_transition, 6 * HOUR_MS);
    }

    #[test]
    fn midnight_wrap_late_evening_is_on() {
        // 23:00 lies inside the window that opened at 22:00 the same day.
        let s = on_with(datetime!(2024-05-10 23:00 UTC), 22, 10.0);
        assert!(s.expected_on);
        assert_eq!(s.next_event, NextEvent::OffIn);
        assert_eq!(s.ms_until_transition, 9 * HOUR_MS);
    }

    #[test]
    fn one_hour_before_start_is_off() {
        let s = on_with(datetime!(2024-05-10 21:00 UTC), 22, 10.0);
        assert!(!s.expected_on);
        assert_eq!(s.next_event, NextEvent::OnIn);
        assert_eq!(s.ms_until_transition, HOUR_MS);
        assert_eq!(s.countdown, "1h 00m");
    }

    #[test]
    fn after_window_closes_next_start_is_tomorrow() {
        let s = on_with(datetime!(2024-05-10 15:00 UTC), 6, 8.0);
        assert!(!s.expected_on);
        assert_eq!(s.next_event, NextEvent::OnIn);
        assert_eq!(s.ms_until_transition, 15 * HOUR_MS);
    }

    #[test]
    fn end_is_exclusive() {
        let s = on_with(datetime!(2024-05-10 14:00 UTC), 6, 8.0);
        assert!(!s.expected_on);
    }

    #[test]
    fn start_is_inclusive() {
        let s = on_with(datetime!(2024-05-10 06:00 UTC), 6, 8.0);
        assert!(s.expected_on);
        assert_eq!(s.ms_until_transition, 8 * HOUR_MS);
    }

    #[test]
    fn zero_duration_never_on() {
        let mut now = datetime!(2024-05-10 00:00 UTC);
        for _ in 0..(24 * 4) {
            let s = on_with(now, 6, 0.0);
            assert!(!s.expected_on, "on at {now}");
            assert_eq!(s.next_event, NextEvent::OnIn);
            now += Duration::minutes(15);
        }
    }

    #[test]
    fn drying_phase_never_on() {
        let s = engine()
            .evaluate(
                datetime!(2024-05-10 12:00 UTC),
                6,
                &Phase::Drying,
                None,
                LightState::Off,
            )
            .unwrap();
        assert!(!s.expected_on);
        assert!(!s.mismatch);
    }

    #[test]
    fn full_day_always_on() {
        let mut now = datetime!(2024-05-10 00:00 UTC);
        for _ in 0..(24 * 4) {
            assert!(on_with(now, 6, 24.0).expected_on, "off at {now}");
            assert!(on_with(now, 6, 40.0).expected_on, "off at {now}");
            now += Duration::minutes(15);
        }
    }

    #[test]
    fn saturated_day_counts_down_to_cycle_boundary() {
        let s = on_with(datetime!(2024-05-10 10:00 UTC), 6, 40.0);
        assert!(s.expected_on);
        assert_eq!(s.duration_hours, 24.0);
        assert_eq!(s.next_event, NextEvent::OffIn);
        assert_eq!(s.window.end, datetime!(2024-05-11 06:00 UTC));
        assert_eq!(s.ms_until_transition, 20 * HOUR_MS);

        // At the boundary the next window opens immediately: no off period.
        let at_end = on_with(s.window.end, 6, 40.0);
        assert!(at_end.expected_on);
        assert_eq!(at_end.window.start, s.window.end);
        assert_eq!(at_end.ms_until_transition, 24 * HOUR_MS);
    }

    #[test]
    fn hour_only_wrap_comparison_at_boundary() {
        // 17:59:59 is still "before 18", so the window is yesterday's and
        // has closed; 18:00:00 opens today's window.
        let before = on_with(datetime!(2024-05-10 17:59:59 UTC), 18, 6.0);
        assert!(!before.expected_on);
        assert_eq!(before.window.start, datetime!(2024-05-09 18:00 UTC));
        assert_eq!(before.ms_until_transition, 1_000);

        let at = on_with(datetime!(2024-05-10 18:00 UTC), 18, 6.0);
        assert!(at.expected_on);
        assert_eq!(at.window.start, datetime!(2024-05-10 18:00 UTC));

        let within_hour = on_with(datetime!(2024-05-10 18:45 UTC), 18, 6.0);
        assert_eq!(within_hour.window.start, datetime!(2024-05-10 18:00 UTC));
    }

    #[test]
    fn flowering_scenario() {
        let engine = engine();
        let s = engine
            .evaluate(
                datetime!(2024-05-10 20:00 +01:00),
                12,
                &Phase::Flowering,
                None,
                LightState::On,
            )
            .unwrap();
        assert_eq!(s.duration_hours, 12.0);
        assert_eq!(s.window.start, datetime!(2024-05-10 12:00 +01:00));
        assert_eq!(s.window.end, datetime!(2024-05-11 00:00 +01:00));
        assert!(s.expected_on);
        assert_eq!(s.ms_until_transition, 4 * HOUR_MS);
        assert_eq!(s.countdown, "4h 00m");
        assert!(!s.mismatch);
        assert_eq!(
            engine.catalog().target_vpd_band(&Phase::Flowering),
            Some(crate::vpd::VpdBand::new(1.2, 1.6))
        );
    }

    // -- Mismatch ---------------------------------------------------------

    #[test]
    fn expected_on_actual_off_is_mismatch() {
        let s = engine()
            .evaluate(
                datetime!(2024-05-10 20:00 UTC),
                12,
                &Phase::Flowering,
                None,
                LightState::Off,
            )
            .unwrap();
        assert!(s.expected_on);
        assert_eq!(s.actual_on, Some(false));
        assert!(s.mismatch);
    }

    #[test]
    fn expected_off_actual_on_is_mismatch() {
        let s = engine()
            .evaluate(
                datetime!(2024-05-10 08:00 UTC),
                12,
                &Phase::Flowering,
                None,
                LightState::On,
            )
            .unwrap();
        assert!(!s.expected_on);
        assert!(s.mismatch);
    }

    #[test]
    fn unknown_actual_never_mismatches() {
        for now in [datetime!(2024-05-10 08:00 UTC), datetime!(2024-05-10 20:00 UTC)] {
            let s = engine()
                .evaluate(now, 12, &Phase::Flowering, None, LightState::Unknown)
                .unwrap();
            assert_eq!(s.actual_on, None);
            assert!(!s.mismatch);
        }
    }

    // -- Purity -----------------------------------------------------------

    #[test]
    fn identical_inputs_identical_status() {
        let now = datetime!(2024-05-10 03:17:42.123 +05:30);
        let a = engine()
            .evaluate(now, 22, &Phase::Vegetative, Some(7.25), LightState::On)
            .unwrap();
        let b = engine()
            .evaluate(now, 22, &Phase::Vegetative, Some(7.25), LightState::On)
            .unwrap();
        assert_eq!(a, b);
    }

    // -- DeviceSchedule ---------------------------------------------------

    #[test]
    fn device_defaults() {
        let d = DeviceSchedule::default();
        assert_eq!(d.start_hour(), 18);
        assert_eq!(d.phase(), Phase::Vegetative);
        assert_eq!(d.duration_override(&Phase::Vegetative), None);
    }

    #[test]
    fn evaluate_device_uses_current_phase_override() {
        let mut d = DeviceSchedule {
            light_start_hour: Some(6),
            current_phase: Some(Phase::Flowering),
            ..Default::default()
        };
        d.phase_hours.insert(Phase::Flowering, 10.0);
        d.phase_hours.insert(Phase::Vegetative, 20.0);

        let s = engine()
            .evaluate_device(&d, datetime!(2024-05-10 15:00 UTC), LightState::Unknown)
            .unwrap();
        assert_eq!(s.duration_hours, 10.0);
        assert!(s.expected_on);
        assert_eq!(s.ms_until_transition, HOUR_MS);
    }

    #[test]
    fn device_schedule_deserializes_with_defaults() {
        let d: DeviceSchedule =
            serde_json::from_str(r#"{"phase_hours":{"Flowering":11}}"#).unwrap();
        assert_eq!(d.start_hour(), DEFAULT_LIGHT_START_HOUR);
        assert_eq!(d.duration_override(&Phase::Flowering), Some(11.0));
    }

    // -- Countdown formatting ---------------------------------------------

    #[test]
    fn countdown_formats_hours_and_minutes() {
        assert_eq!(format_countdown(4 * HOUR_MS + 3 * 60_000 + 59_999), "4h 03m");
        assert_eq!(format_countdown(59_999), "0h 00m");
        assert_eq!(format_countdown(30 * HOUR_MS), "30h 00m");
    }

    #[test]
    fn countdown_negative_is_zero() {
        assert_eq!(format_countdown(-5), "0h 00m");
    }

    #[test]
    fn status_serializes_labels() {
        let s = on_with(datetime!(2024-05-10 02:00 UTC), 22, 10.0);
        let json = serde_json::to_value(&s).unwrap();
        assert_eq!(json["next_event"], "off-in");
        assert_eq!(json["actual_on"], serde_json::Value::Null);
        assert_eq!(json["window"]["start"], "2024-05-09T22:00:00Z");
    }
}
