use growbox_core::LightState;
use serde::Deserialize;

// ---------------------------------------------------------------------------
// MQTT message types
// ---------------------------------------------------------------------------

/// Climate telemetry. Any reading may be missing while a sensor is offline.
#[derive(Debug, Deserialize)]
pub(crate) struct ClimateMsg {
    pub(crate) ts: i64,
    pub(crate) temperature: Option<f64>,
    pub(crate) humidity: Option<f64>,
    pub(crate) vpd: Option<f64>,
}

// ---------------------------------------------------------------------------
// Topic / payload helpers
// ---------------------------------------------------------------------------

fn device_in_topic<'a>(topic: &'a str, prefix: &str, suffix: &str) -> Option<&'a str> {
    let parts: Vec<&str> = topic.split('/').collect();
    if parts.len() == 3 && parts[0] == prefix && parts[2] == suffix && !parts[1].is_empty() {
        Some(parts[1])
    } else {
        None
    }
}

/// Extract device_id from "tele/<device_id>/climate".
pub(crate) fn extract_climate_device(topic: &str) -> Option<&str> {
    device_in_topic(topic, "tele", "climate")
}

/// Extract device_id from "stat/<device_id>/light".
pub(crate) fn extract_light_device(topic: &str) -> Option<&str> {
    device_in_topic(topic, "stat", "light")
}

/// Parse a light state payload (case-insensitive, trims whitespace).
/// `unavailable`, `unknown` and an empty payload mean the sensor can't tell.
pub(crate) fn parse_light_state(payload: &[u8]) -> Result<LightState, String> {
    let s = String::from_utf8_lossy(payload).trim().to_uppercase();
    match s.as_str() {
        "ON" => Ok(LightState::On),
        "OFF" => Ok(LightState::Off),
        "" | "UNAVAILABLE" | "UNKNOWN" => Ok(LightState::Unknown),
        _ => Err(format!("unknown light state '{s}'")),
    }
}

// ===========================================================================
// Tests
// ===========================================================================
