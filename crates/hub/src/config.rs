//! TOML config file loading and validation for grow box devices.
//!
//! Structural problems (ids, names, custom phase slots, zone settings) fail
//! the load. Schedule values the engine can absorb (odd start hours,
//! out-of-range durations, unknown phases) only produce warnings.

use anyhow::{anyhow, bail, Context, Result};
use chrono_tz::Tz;
use growbox_core::{CustomPhase, DeviceSchedule, Phase, PhaseCatalog};
use serde::Deserialize;
use std::collections::{BTreeMap, HashSet};
use time::macros::format_description;
use time::{Date, UtcOffset};

use crate::zone::LocalZone;

/// Default cadence of the schedule monitor.
const DEFAULT_MONITOR_INTERVAL_SEC: u64 = 60;

// ---------------------------------------------------------------------------
// Config file structures
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub hub: HubSection,
    #[serde(default)]
    pub devices: Vec<DeviceEntry>,
}

#[derive(Debug, Default, Deserialize)]
pub struct HubSection {
    /// IANA zone such as `"Europe/Berlin"`.
    pub timezone: Option<String>,
    /// Fixed UTC offset such as `"+02:00"`, for hosts without zone rules.
    pub utc_offset: Option<String>,
    pub monitor_interval_sec: Option<u64>,
}

#[derive(Debug, Deserialize)]
pub struct DeviceEntry {
    pub device_id: String,
    pub name: String,
    pub light_start_hour: Option<i64>,
    pub current_phase: Option<String>,
    /// `YYYY-MM-DD` the current phase began.
    pub phase_started: Option<String>,
    #[serde(default)]
    pub phase_hours: BTreeMap<String, f64>,
    #[serde(default)]
    pub custom_phases: Vec<CustomPhase>,
}

/// A validated device, ready for the engine.
#[derive(Debug, Clone)]
pub struct DeviceConfig {
    pub device_id: String,
    pub name: String,
    pub schedule: DeviceSchedule,
    pub catalog: PhaseCatalog,
    pub phase_started: Option<Date>,
}

// ---------------------------------------------------------------------------
// Validation
// ---------------------------------------------------------------------------

impl Config {
    /// Validate all config entries. Returns `Ok(())` or an error describing
    /// every violation found (not just the first one).
    pub fn validate(&self) -> Result<()> {
        let mut errors: Vec<String> = Vec::new();

        self.validate_hub(&mut errors);
        self.validate_devices(&mut errors);

        if errors.is_empty() {
            Ok(())
        } else {
            bail!(
                "config validation failed ({} error{}):\n  - {}",
                errors.len(),
                if errors.len() == 1 { "" } else { "s" },
                errors.join("\n  - ")
            );
        }
    }

    fn validate_hub(&self, errors: &mut Vec<String>) {
        if let Err(e) = self.hub.zone() {
            errors.push(format!("hub: {e:#}"));
        }
        if self.hub.monitor_interval_sec == Some(0) {
            errors.push("hub: monitor_interval_sec must be positive".to_string());
        }
    }

    fn validate_devices(&self, errors: &mut Vec<String>) {
        let mut seen_ids: HashSet<&str> = HashSet::new();

        for (i, d) in self.devices.iter().enumerate() {
            let ctx = || {
                if d.device_id.is_empty() {
                    format!("devices[{i}]")
                } else {
                    format!("device '{}'", d.device_id)
                }
            };

            // ── Identity ────────────────────────────────────────
            if d.device_id.trim().is_empty() {
                errors.push(format!("{}: device_id is empty", ctx()));
            } else if d.device_id.contains(['/', '+', '#']) {
                errors.push(format!(
                    "{}: device_id must not contain '/', '+' or '#'",
                    ctx()
                ));
            } else if !seen_ids.insert(d.device_id.as_str()) {
                errors.push(format!("{}: duplicate device_id", ctx()));
            }

            if d.name.trim().is_empty() {
                errors.push(format!("{}: name is empty", ctx()));
            }

            // ── Phases ──────────────────────────────────────────
            if let Err(e) = PhaseCatalog::with_custom(d.custom_phases.iter().cloned()) {
                errors.push(format!("{}: {e}", ctx()));
            }
            if let Err(e) = d.phase_started() {
                errors.push(format!("{}: {e:#}", ctx()));
            }
        }
    }

    /// Schedule values the engine tolerates but that are probably typos.
    pub fn warnings(&self) -> Vec<String> {
        let mut warnings = Vec::new();

        for d in &self.devices {
            let ctx = format!("device '{}'", d.device_id);

            if let Some(h) = d.light_start_hour {
                if !(0..=23).contains(&h) {
                    warnings.push(format!(
                        "{ctx}: light_start_hour {h} outside [0, 23], using {}",
                        h.rem_euclid(24)
                    ));
                }
            }

            let catalog = PhaseCatalog::with_custom(d.custom_phases.iter().cloned())
                .unwrap_or_default();

            for c in catalog.custom_phases() {
                if !valid_hours(c.hours) {
                    warnings.push(format!(
                        "{ctx}: custom phase '{}' hours {} outside [0, 24]",
                        c.name, c.hours
                    ));
                }
            }

            for (key, hours) in &d.phase_hours {
                match Phase::parse(key) {
                    Some(p) if catalog.is_known(&p) => {}
                    _ => warnings.push(format!("{ctx}: phase_hours has unknown phase '{key}'")),
                }
                if !valid_hours(*hours) {
                    warnings.push(format!("{ctx}: phase_hours.{key} {hours} outside [0, 24]"));
                }
            }

            if let Some(raw) = &d.current_phase {
                match Phase::parse(raw) {
                    Some(p) if catalog.is_known(&p) => {}
                    Some(_) => warnings.push(format!(
                        "{ctx}: current_phase '{}' is not a known phase",
                        raw.trim()
                    )),
                    None => warnings.push(format!("{ctx}: current_phase is empty, using default")),
                }
            }
        }

        warnings
    }

    /// Convert the validated entries into engine-ready device configs.
    /// Schedule values are passed through as written.
    pub fn device_configs(&self) -> Result<Vec<DeviceConfig>> {
        self.devices
            .iter()
            .map(|d| {
                let catalog = PhaseCatalog::with_custom(d.custom_phases.iter().cloned())
                    .with_context(|| format!("device '{}'", d.device_id))?;
                let phase_hours = d
                    .phase_hours
                    .iter()
                    .filter_map(|(k, h)| Phase::parse(k).map(|p| (p, *h)))
                    .collect();
                Ok(DeviceConfig {
                    device_id: d.device_id.clone(),
                    name: d.name.clone(),
                    schedule: DeviceSchedule {
                        light_start_hour: d.light_start_hour,
                        current_phase: d.current_phase.as_deref().and_then(Phase::parse),
                        phase_hours,
                    },
                    catalog,
                    phase_started: d
                        .phase_started()
                        .with_context(|| format!("device '{}'", d.device_id))?,
                })
            })
            .collect()
    }
}

fn valid_hours(hours: f64) -> bool {
    (0.0..=24.0).contains(&hours)
}

impl DeviceEntry {
    pub fn phase_started(&self) -> Result<Option<Date>> {
        let Some(raw) = &self.phase_started else {
            return Ok(None);
        };
        let format = format_description!("[year]-[month]-[day]");
        let date = Date::parse(raw.trim(), &format)
            .with_context(|| format!("phase_started '{raw}' is not of the form YYYY-MM-DD"))?;
        Ok(Some(date))
    }
}

impl HubSection {
    /// Zone schedules are evaluated in. `None` means the host's zone.
    pub fn zone(&self) -> Result<Option<LocalZone>> {
        match (&self.timezone, &self.utc_offset) {
            (Some(_), Some(_)) => bail!("set either timezone or utc_offset, not both"),
            (Some(name), None) => {
                let tz: Tz = name
                    .trim()
                    .parse()
                    .map_err(|e| anyhow!("unknown timezone '{name}': {e}"))?;
                Ok(Some(LocalZone::Named(tz)))
            }
            (None, Some(raw)) => {
                let format = format_description!("[offset_hour sign:mandatory]:[offset_minute]");
                let offset = UtcOffset::parse(raw.trim(), &format)
                    .with_context(|| format!("utc_offset '{raw}' is not of the form +HH:MM"))?;
                Ok(Some(LocalZone::Fixed(offset)))
            }
            (None, None) => Ok(None),
        }
    }

    pub fn monitor_interval_sec(&self) -> u64 {
        self.monitor_interval_sec
            .unwrap_or(DEFAULT_MONITOR_INTERVAL_SEC)
    }
}

// ---------------------------------------------------------------------------
// Load
// ---------------------------------------------------------------------------

/// Read, parse, and validate a TOML config file. Warnings are logged.
pub fn load(path: &str) -> Result<Config> {
    let contents =
        std::fs::read_to_string(path).with_context(|| format!("failed to read config: {path}"))?;
    let config: Config =
        toml::from_str(&contents).with_context(|| format!("failed to parse config: {path}"))?;
    config
        .validate()
        .with_context(|| format!("invalid config: {path}"))?;

    for warning in config.warnings() {
        tracing::warn!(%path, "config: {warning}");
    }
    tracing::info!(devices = config.devices.len(), %path, "config loaded");

    Ok(config)
}

// ===========================================================================
// Tests
// ===========================================================================
