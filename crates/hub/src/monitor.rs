//! Schedule monitor: re-evaluates every device on a fixed cadence and
//! reports when the expected light state flips, when the live light
//! disagrees with the schedule, and when VPD leaves the phase's band.
//!
//! The monitor only observes. It never switches the light.
//!
//! ## Per-device findings
//!
//! ```text
//!  tick N-1 observation ──┐
//!                         ├──▶ transitions() ──▶ log + event ring buffer
//!  tick N   observation ──┘
//! ```

use std::collections::HashMap;
use std::fmt;
use std::time::Duration;

use growbox_core::BandDeviation;
use time::OffsetDateTime;
use tracing::{info, warn};

use crate::state::{DeviceStatus, SharedState};
use crate::zone::LocalZone;

// ---------------------------------------------------------------------------
// Per-device observation
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Observation {
    /// `None` when the schedule could not be evaluated.
    pub(crate) expected_on: Option<bool>,
    pub(crate) mismatch: bool,
    pub(crate) vpd_deviation: Option<BandDeviation>,
}

impl Observation {
    pub(crate) fn of(status: &DeviceStatus) -> Self {
        Self {
            expected_on: status.schedule.as_ref().map(|s| s.expected_on),
            mismatch: status.schedule.as_ref().is_some_and(|s| s.mismatch),
            vpd_deviation: status.vpd_deviation,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Finding {
    ScheduleFlipped { expected_on: bool },
    MismatchStarted { expected_on: bool },
    MismatchCleared,
    VpdOutOfBand(BandDeviation),
    VpdBackInBand,
    EvaluationFailed,
}

impl Finding {
    fn is_warning(&self) -> bool {
        matches!(
            self,
            Self::MismatchStarted { .. } | Self::VpdOutOfBand(_) | Self::EvaluationFailed
        )
    }
}

impl fmt::Display for Finding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let on_off = |on: bool| if on { "ON" } else { "OFF" };
        match self {
            Self::ScheduleFlipped { expected_on } => {
                write!(f, "schedule expects light {}", on_off(*expected_on))
            }
            Self::MismatchStarted { expected_on } => write!(
                f,
                "light mismatch: expected {}, sensor reports {}",
                on_off(*expected_on),
                on_off(!*expected_on)
            ),
            Self::MismatchCleared => f.write_str("light matches schedule again"),
            Self::VpdOutOfBand(BandDeviation::Below) => f.write_str("VPD below target band"),
            Self::VpdOutOfBand(BandDeviation::Above) => f.write_str("VPD above target band"),
            Self::VpdOutOfBand(BandDeviation::Within) | Self::VpdBackInBand => {
                f.write_str("VPD back in target band")
            }
            Self::EvaluationFailed => f.write_str("schedule evaluation failed"),
        }
    }
}

fn out_of_band(d: Option<BandDeviation>) -> Option<BandDeviation> {
    d.filter(|d| *d != BandDeviation::Within)
}

/// Findings between two consecutive observations of a device. The first
/// observation only reports conditions that are already bad.
pub(crate) fn transitions(prev: Option<&Observation>, next: &Observation) -> Vec<Finding> {
    let mut findings = Vec::new();

    let Some(expected_on) = next.expected_on else {
        if prev.map_or(true, |p| p.expected_on.is_some()) {
            findings.push(Finding::EvaluationFailed);
        }
        return findings;
    };

    // ── Schedule ────────────────────────────────────────────────
    if let Some(p) = prev {
        if p.expected_on.is_some_and(|was| was != expected_on) {
            findings.push(Finding::ScheduleFlipped { expected_on });
        }
    }

    // ── Mismatch ────────────────────────────────────────────────
    let was_mismatch = prev.is_some_and(|p| p.mismatch);
    if next.mismatch && !was_mismatch {
        findings.push(Finding::MismatchStarted { expected_on });
    } else if !next.mismatch && was_mismatch {
        findings.push(Finding::MismatchCleared);
    }

    // ── VPD band ────────────────────────────────────────────────
    let was_out = prev.and_then(|p| out_of_band(p.vpd_deviation));
    let now_out = out_of_band(next.vpd_deviation);
    match (was_out, now_out) {
        (_, Some(d)) if was_out != now_out => findings.push(Finding::VpdOutOfBand(d)),
        (Some(_), None) if next.vpd_deviation == Some(BandDeviation::Within) => {
            findings.push(Finding::VpdBackInBand)
        }
        _ => {}
    }

    findings
}

// ---------------------------------------------------------------------------
// Entry point
// ---------------------------------------------------------------------------

/// Run the monitor loop. Intended to be `tokio::spawn`-ed from main.
pub async fn run(shared: SharedState, zone: LocalZone, interval_sec: u64) {
    let mut observations: HashMap<String, Observation> = HashMap::new();
    let mut ticker = tokio::time::interval(Duration::from_secs(interval_sec));

    info!(interval_sec, %zone, "monitor started");
    {
        let mut st = shared.write().await;
        st.record_monitor(format!(
            "monitor started (interval: {interval_sec}s, zone: {zone})"
        ));
    }

    loop {
        ticker.tick().await;
        tick(&shared, zone.now(), &mut observations).await;
    }
}

/// Evaluate every device once at `now`, log findings, and remember the
/// observations for the next tick.
pub(crate) async fn tick(
    shared: &SharedState,
    now: OffsetDateTime,
    observations: &mut HashMap<String, Observation>,
) {
    let statuses = {
        let st = shared.read().await;
        st.device_statuses(now)
    };

    let mut events: Vec<String> = Vec::new();
    for (device_id, status) in &statuses {
        let next = Observation::of(status);
        for finding in transitions(observations.get(device_id), &next) {
            if finding.is_warning() {
                warn!(
                    device = %device_id,
                    phase = %status.phase,
                    error = status.schedule_error.as_deref().unwrap_or(""),
                    "monitor: {finding}"
                );
            } else {
                info!(device = %device_id, phase = %status.phase, "monitor: {finding}");
            }
            events.push(format!("{device_id}: {finding}"));
        }
        observations.insert(device_id.clone(), next);
    }

    if !events.is_empty() {
        let mut st = shared.write().await;
        for detail in events {
            st.record_monitor(detail);
        }
    }
}

// ===========================================================================
// Tests
// ===========================================================================
