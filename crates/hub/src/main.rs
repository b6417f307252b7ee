mod config;
mod monitor;
mod mqtt;
mod state;
mod web;
mod zone;

use anyhow::{Context, Result};
use rumqttc::{AsyncClient, Event, MqttOptions, Packet, QoS};
use std::{env, sync::Arc, time::Duration};
use tokio::sync::RwLock;
use tokio::time::sleep;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use mqtt::{extract_climate_device, extract_light_device, parse_light_state, ClimateMsg};
use state::{ClimateReading, SharedState, SystemState};
use web::AppState;
use zone::LocalZone;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    // ── Config file ─────────────────────────────────────────────────
    let config_path = env::var("CONFIG_PATH").unwrap_or_else(|_| "config.toml".to_string());
    let cfg = config::load(&config_path)?;
    if cfg.devices.is_empty() {
        warn!(path = %config_path, "no devices configured");
    }
    let zone = cfg.hub.zone()?.unwrap_or(LocalZone::System);
    info!(%zone, "schedules evaluated in local time");

    // ── Env config ──────────────────────────────────────────────────
    let broker = env::var("MQTT_HOST").unwrap_or_else(|_| "127.0.0.1".to_string());
    let port: u16 = env::var("MQTT_PORT")
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(1883);

    // ── Shared state (ephemeral, for the HTTP API) ──────────────────
    let devices = cfg.device_configs()?;
    let shared: SharedState = Arc::new(RwLock::new(SystemState::new(devices, zone.now())));
    {
        let mut st = shared.write().await;
        st.record_system("hub started".to_string());
    }

    // ── Web server ──────────────────────────────────────────────────
    let web_state = AppState {
        shared: Arc::clone(&shared),
        zone,
    };
    tokio::spawn(async move {
        if let Err(e) = web::serve(web_state).await {
            error!("web server stopped: {e:#}");
        }
    });

    // ── Schedule monitor ────────────────────────────────────────────
    let monitor_state = Arc::clone(&shared);
    let interval_sec = cfg.hub.monitor_interval_sec();
    tokio::spawn(async move {
        monitor::run(monitor_state, zone, interval_sec).await;
    });

    // ── MQTT ────────────────────────────────────────────────────────
    let client_id = "growbox-hub";
    let mut mqttoptions = MqttOptions::new(client_id, broker, port);
    mqttoptions.set_keep_alive(Duration::from_secs(30));

    let (client, mut eventloop) = AsyncClient::new(mqttoptions, 20);

    client
        .subscribe("tele/+/climate", QoS::AtLeastOnce)
        .await
        .context("failed to queue climate subscription")?;
    client
        .subscribe("stat/+/light", QoS::AtLeastOnce)
        .await
        .context("failed to queue light subscription")?;
    info!("hub subscribed to tele/+/climate and stat/+/light");

    loop {
        match eventloop.poll().await {
            Ok(Event::Incoming(Packet::Publish(p))) => {
                handle_publish(&shared, &p.topic, &p.payload).await;
            }
            Ok(Event::Incoming(Packet::ConnAck(_))) => {
                info!("mqtt connected");
                let mut st = shared.write().await;
                st.mqtt_connected = true;
                st.record_system("mqtt connected".to_string());
            }
            Ok(Event::Incoming(Packet::Disconnect)) => {
                warn!("mqtt disconnected");
                let mut st = shared.write().await;
                st.mqtt_connected = false;
                st.record_system("mqtt disconnected".to_string());
            }
            Ok(_) => {}
            Err(e) => {
                error!("mqtt error: {e}. reconnecting...");
                let mut st = shared.write().await;
                st.mqtt_connected = false;
                st.record_error(format!("mqtt error: {e}"));
                drop(st);

                sleep(Duration::from_secs(2)).await;
            }
        }
    }
}

async fn handle_publish(shared: &SharedState, topic: &str, payload: &[u8]) {
    if let Some(device_id) = extract_climate_device(topic) {
        match serde_json::from_slice::<ClimateMsg>(payload) {
            Ok(msg) => {
                info!(
                    device = %device_id,
                    ts = msg.ts,
                    temperature = ?msg.temperature,
                    humidity = ?msg.humidity,
                    vpd = ?msg.vpd,
                    "climate telemetry"
                );
                let reading = ClimateReading {
                    ts: msg.ts,
                    temperature: msg.temperature,
                    humidity: msg.humidity,
                    vpd: msg.vpd,
                };
                let mut st = shared.write().await;
                if !st.record_climate(device_id, reading) {
                    warn!(device = %device_id, "climate for unconfigured device, skipping");
                }
            }
            Err(e) => {
                warn!(%topic, "bad climate json: {e}");
                let mut st = shared.write().await;
                st.record_error(format!("bad climate json on {topic}: {e}"));
            }
        }
    } else if let Some(device_id) = extract_light_device(topic) {
        match parse_light_state(payload) {
            Ok(light) => {
                let mut st = shared.write().await;
                if !st.record_light(device_id, light) {
                    warn!(device = %device_id, "light state for unconfigured device, skipping");
                }
            }
            Err(msg) => {
                warn!(device = %device_id, "{msg} (use ON/OFF)");
                let mut st = shared.write().await;
                st.record_error(msg);
            }
        }
    } else {
        warn!(%topic, "unhandled topic");
    }
}

// ===========================================================================
// Tests
// ===========================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DeviceConfig;
    use crate::state::EventKind;
    use growbox_core::{DeviceSchedule, LightState, PhaseCatalog};
    use time::OffsetDateTime;

    fn test_shared() -> SharedState {
        let device = DeviceConfig {
            device_id: "tent-1".into(),
            name: "Tent 1".into(),
            schedule: DeviceSchedule::default(),
            catalog: PhaseCatalog::builtin(),
            phase_started: None,
        };
        Arc::new(RwLock::new(SystemState::new(
            vec![device],
            OffsetDateTime::now_utc(),
        )))
    }

    // -- handle_publish ---------------------------------------------------

    #[tokio::test]
    async fn climate_publish_updates_device() {
        let shared = test_shared();
        handle_publish(
            &shared,
            "tele/tent-1/climate",
            br#"{"ts":1700000000,"temperature":23.5,"humidity":58}"#,
        )
        .await;

        let st = shared.read().await;
        let climate = st.devices["tent-1"].climate.as_ref().unwrap();
        assert_eq!(climate.temperature, Some(23.5));
        assert_eq!(climate.humidity, Some(58.0));
    }

    #[tokio::test]
    async fn bad_climate_json_records_error() {
        let shared = test_shared();
        handle_publish(&shared, "tele/tent-1/climate", b"not json").await;

        let st = shared.read().await;
        assert!(st.devices["tent-1"].climate.is_none());
        assert_eq!(st.events.back().unwrap().kind, EventKind::Error);
    }

    #[tokio::test]
    async fn light_publish_updates_device() {
        let shared = test_shared();
        handle_publish(&shared, "stat/tent-1/light", b"on").await;
        assert_eq!(shared.read().await.devices["tent-1"].light, LightState::On);

        handle_publish(&shared, "stat/tent-1/light", b"unavailable").await;
        assert_eq!(shared.read().await.devices["tent-1"].light, LightState::Unknown);
    }

    #[tokio::test]
    async fn bad_light_payload_records_error() {
        let shared = test_shared();
        handle_publish(&shared, "stat/tent-1/light", b"DIM").await;

        let st = shared.read().await;
        assert_eq!(st.devices["tent-1"].light, LightState::Unknown);
        assert_eq!(st.events.back().unwrap().kind, EventKind::Error);
    }

    #[tokio::test]
    async fn unconfigured_device_is_ignored() {
        let shared = test_shared();
        handle_publish(&shared, "stat/tent-9/light", b"ON").await;
        assert!(shared.read().await.events.is_empty());
    }
}
