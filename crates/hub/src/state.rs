use growbox_core::gauge::{humidity_level, temperature_level, vpd_gauge};
use growbox_core::vpd::vapor_pressure_deficit;
use growbox_core::{
    BandDeviation, DeviceSchedule, GaugeReading, LightState, Phase, ScheduleEngine,
    ScheduleStatus, StatusLevel, VpdBand,
};
use serde::Serialize;
use std::collections::{BTreeMap, VecDeque};
use std::sync::Arc;
use std::time::Instant;
use time::OffsetDateTime;
use tokio::sync::RwLock;

use crate::config::DeviceConfig;

/// Maximum number of events retained in the ring buffer.
const MAX_EVENTS: usize = 200;

// ---------------------------------------------------------------------------
// Public type alias
// ---------------------------------------------------------------------------

pub type SharedState = Arc<RwLock<SystemState>>;

// ---------------------------------------------------------------------------
// Core types
// ---------------------------------------------------------------------------

pub struct SystemState {
    pub started_at: Instant,
    pub mqtt_connected: bool,
    pub devices: BTreeMap<String, DeviceState>,
    pub events: VecDeque<SystemEvent>,
}

pub struct DeviceState {
    pub name: String,
    pub schedule: DeviceSchedule,
    pub engine: ScheduleEngine,
    pub phase_since: OffsetDateTime,
    pub light: LightState,
    pub light_changed: Option<OffsetDateTime>,
    pub climate: Option<ClimateReading>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClimateReading {
    pub ts: i64,
    pub temperature: Option<f64>,
    pub humidity: Option<f64>,
    pub vpd: Option<f64>,
}

impl ClimateReading {
    /// Reported VPD, or derived from temperature and humidity when the
    /// sensor doesn't report one.
    pub fn effective_vpd(&self) -> Option<f64> {
        self.vpd.filter(|v| v.is_finite()).or_else(|| {
            match (self.temperature, self.humidity) {
                (Some(t), Some(rh)) if t.is_finite() && rh.is_finite() => {
                    Some(vapor_pressure_deficit(t, rh))
                }
                _ => None,
            }
        })
    }
}

#[derive(Clone, Serialize)]
pub struct SystemEvent {
    #[serde(with = "time::serde::rfc3339")]
    pub ts: OffsetDateTime,
    pub kind: EventKind,
    pub detail: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum EventKind {
    Reading,
    Light,
    Phase,
    Monitor,
    Error,
    System,
}

/// Outcome of a phase change request.
#[derive(Debug, Clone, PartialEq)]
pub enum PhaseChange {
    Changed { from: Phase, to: Phase },
    Unchanged(Phase),
    UnknownDevice,
    UnknownPhase(String),
}

// ---------------------------------------------------------------------------
// JSON response (what the API returns)
// ---------------------------------------------------------------------------

#[derive(Serialize)]
pub struct StatusResponse {
    pub uptime_secs: u64,
    pub mqtt_connected: bool,
    #[serde(with = "time::serde::rfc3339")]
    pub now: OffsetDateTime,
    pub devices: BTreeMap<String, DeviceStatus>,
    pub events: Vec<SystemEvent>,
}

#[derive(Debug, Clone, Serialize)]
pub struct DeviceStatus {
    pub name: String,
    pub phase: Phase,
    pub phase_name: String,
    pub days_in_phase: i64,
    pub light: LightState,
    #[serde(with = "time::serde::rfc3339::option")]
    pub light_changed: Option<OffsetDateTime>,
    pub schedule: Option<ScheduleStatus>,
    pub schedule_error: Option<String>,
    pub climate: Option<ClimateReading>,
    pub vpd: Option<f64>,
    pub vpd_band: Option<VpdBand>,
    pub vpd_deviation: Option<BandDeviation>,
    pub vpd_gauge: GaugeReading,
    pub temperature_level: StatusLevel,
    pub humidity_level: StatusLevel,
}

/// One entry of a device's phase selector.
#[derive(Debug, Clone, Serialize)]
pub struct PhaseOption {
    pub id: Phase,
    pub name: String,
    pub hours: f64,
    pub vpd_band: Option<VpdBand>,
    pub selected: bool,
}

// ---------------------------------------------------------------------------
// Construction & mutation
// ---------------------------------------------------------------------------

impl SystemState {
    pub fn new(devices: Vec<DeviceConfig>, now: OffsetDateTime) -> Self {
        let devices = devices
            .into_iter()
            .map(|d| {
                (
                    d.device_id,
                    DeviceState {
                        name: d.name,
                        schedule: d.schedule,
                        engine: ScheduleEngine::new(d.catalog),
                        phase_since: d
                            .phase_started
                            .map_or(now, |date| date.midnight().assume_offset(now.offset())),
                        light: LightState::Unknown,
                        light_changed: None,
                        climate: None,
                    },
                )
            })
            .collect();

        Self {
            started_at: Instant::now(),
            mqtt_connected: false,
            devices,
            events: VecDeque::with_capacity(MAX_EVENTS),
        }
    }

    /// Record a climate reading. Returns `false` for an unconfigured device.
    pub fn record_climate(&mut self, device_id: &str, reading: ClimateReading) -> bool {
        let Some(device) = self.devices.get_mut(device_id) else {
            return false;
        };

        let show = |v: Option<f64>| v.map_or_else(|| "-".to_string(), |v| format!("{v:.1}"));
        let detail = format!(
            "{device_id}: temperature={} humidity={} vpd={}",
            show(reading.temperature),
            show(reading.humidity),
            reading
                .effective_vpd()
                .map_or_else(|| "-".to_string(), |v| format!("{v:.2}")),
        );
        device.climate = Some(reading);

        self.push_event(EventKind::Reading, detail);
        true
    }

    /// Record the light state reported by a device. Only an actual change
    /// is logged as an event. Returns `false` for an unconfigured device.
    pub fn record_light(&mut self, device_id: &str, light: LightState) -> bool {
        let Some(device) = self.devices.get_mut(device_id) else {
            return false;
        };
        if device.light == light {
            return true;
        }
        device.light = light;
        device.light_changed = Some(OffsetDateTime::now_utc());

        let state_str = match light {
            LightState::On => "ON",
            LightState::Off => "OFF",
            LightState::Unknown => "unknown",
        };
        self.push_event(EventKind::Light, format!("{device_id} light {state_str}"));
        true
    }

    /// Switch a device to another phase. Re-selecting the current phase
    /// keeps its start date.
    pub fn set_phase(&mut self, device_id: &str, raw: &str, now: OffsetDateTime) -> PhaseChange {
        let Some(device) = self.devices.get_mut(device_id) else {
            return PhaseChange::UnknownDevice;
        };
        let phase = match Phase::parse(raw) {
            Some(p) if device.engine.catalog().is_known(&p) => p,
            _ => return PhaseChange::UnknownPhase(raw.trim().to_string()),
        };

        let from = device.schedule.phase();
        if from == phase {
            return PhaseChange::Unchanged(phase);
        }
        device.schedule.current_phase = Some(phase.clone());
        device.phase_since = now;

        self.push_event(
            EventKind::Phase,
            format!("{device_id}: phase {from} -> {phase}"),
        );
        PhaseChange::Changed { from, to: phase }
    }

    /// Record a schedule monitor finding.
    pub fn record_monitor(&mut self, detail: String) {
        self.push_event(EventKind::Monitor, detail);
    }

    /// Record an error event.
    pub fn record_error(&mut self, detail: String) {
        self.push_event(EventKind::Error, detail);
    }

    /// Record a generic system event.
    pub fn record_system(&mut self, detail: String) {
        self.push_event(EventKind::System, detail);
    }

    /// Selectable phases for a device, or `None` if it isn't configured.
    pub fn phase_options(&self, device_id: &str) -> Option<Vec<PhaseOption>> {
        let device = self.devices.get(device_id)?;
        let catalog = device.engine.catalog();
        let current = device.schedule.phase();

        Some(
            catalog
                .phases()
                .into_iter()
                .map(|p| PhaseOption {
                    name: catalog.display_name(&p).to_string(),
                    hours: device
                        .engine
                        .resolve_duration_hours(&p, device.schedule.duration_override(&p)),
                    vpd_band: catalog.target_vpd_band(&p),
                    selected: p == current,
                    id: p,
                })
                .collect(),
        )
    }

    /// Evaluate every device against `now`.
    pub fn device_statuses(&self, now: OffsetDateTime) -> BTreeMap<String, DeviceStatus> {
        self.devices
            .iter()
            .map(|(id, d)| (id.clone(), d.status(now)))
            .collect()
    }

    /// Build the JSON-serialisable status snapshot.
    pub fn to_status(&self, now: OffsetDateTime) -> StatusResponse {
        StatusResponse {
            uptime_secs: self.started_at.elapsed().as_secs(),
            mqtt_connected: self.mqtt_connected,
            now,
            devices: self.device_statuses(now),
            events: self.events.iter().rev().cloned().collect(),
        }
    }

    fn push_event(&mut self, kind: EventKind, detail: String) {
        if self.events.len() >= MAX_EVENTS {
            self.events.pop_front();
        }
        self.events.push_back(SystemEvent {
            ts: OffsetDateTime::now_utc(),
            kind,
            detail,
        });
    }
}

impl DeviceState {
    pub fn status(&self, now: OffsetDateTime) -> DeviceStatus {
        let catalog = self.engine.catalog();
        let phase = self.schedule.phase();

        let (schedule, schedule_error) =
            match self.engine.evaluate_device(&self.schedule, now, self.light) {
                Ok(s) => (Some(s), None),
                Err(e) => (None, Some(e.to_string())),
            };

        let vpd = self.climate.as_ref().and_then(ClimateReading::effective_vpd);
        let vpd_band = catalog.target_vpd_band(&phase);
        let vpd_deviation = vpd.zip(vpd_band).and_then(|(v, b)| b.deviation(v));
        let temperature = self.climate.as_ref().and_then(|c| c.temperature);
        let humidity = self.climate.as_ref().and_then(|c| c.humidity);

        DeviceStatus {
            name: self.name.clone(),
            phase_name: catalog.display_name(&phase).to_string(),
            days_in_phase: (now - self.phase_since).whole_days().max(0),
            light: self.light,
            light_changed: self.light_changed,
            schedule,
            schedule_error,
            climate: self.climate.clone(),
            vpd,
            vpd_band,
            vpd_deviation,
            vpd_gauge: vpd_gauge(vpd, &phase, catalog),
            temperature_level: temperature_level(temperature),
            humidity_level: humidity_level(humidity),
            phase,
        }
    }
}

// ===========================================================================
// Tests
// ===========================================================================
