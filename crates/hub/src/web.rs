use anyhow::{Context, Result};
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use axum::routing::{get, post};
use axum::Router;
use serde::Deserialize;
use serde_json::json;
use std::env;
use std::net::SocketAddr;
use time::OffsetDateTime;
use tokio::net::TcpListener;
use tracing::info;

use crate::state::{PhaseChange, SharedState};
use crate::zone::LocalZone;

#[derive(Clone)]
pub struct AppState {
    pub shared: SharedState,
    /// Zone the light schedules are evaluated in.
    pub zone: LocalZone,
}

impl AppState {
    fn now(&self) -> OffsetDateTime {
        self.zone.now()
    }
}

#[derive(Deserialize)]
struct SetPhaseRequest {
    phase: String,
}

// ---------------------------------------------------------------------------
// Routes
// ---------------------------------------------------------------------------

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/api/status", get(api_status))
        .route("/api/devices/{id}/phases", get(api_phases))
        .route("/api/devices/{id}/phase", post(api_set_phase))
        .with_state(state)
}

async fn api_status(State(state): State<AppState>) -> impl IntoResponse {
    let now = state.now();
    let st = state.shared.read().await;
    Json(st.to_status(now))
}

async fn api_phases(State(state): State<AppState>, Path(id): Path<String>) -> Response {
    let st = state.shared.read().await;
    match st.phase_options(&id) {
        Some(options) => Json(options).into_response(),
        None => not_found(&id),
    }
}

async fn api_set_phase(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(req): Json<SetPhaseRequest>,
) -> Response {
    let now = state.now();
    let mut st = state.shared.write().await;
    match st.set_phase(&id, &req.phase, now) {
        PhaseChange::Changed { from, to } => {
            info!(device = %id, %from, %to, "phase changed");
            Json(json!({ "device_id": id, "phase": to, "changed": true })).into_response()
        }
        PhaseChange::Unchanged(phase) => {
            Json(json!({ "device_id": id, "phase": phase, "changed": false })).into_response()
        }
        PhaseChange::UnknownDevice => not_found(&id),
        PhaseChange::UnknownPhase(phase) => (
            StatusCode::UNPROCESSABLE_ENTITY,
            Json(json!({ "error": format!("unknown phase '{phase}'") })),
        )
            .into_response(),
    }
}

fn not_found(id: &str) -> Response {
    (
        StatusCode::NOT_FOUND,
        Json(json!({ "error": format!("unknown device '{id}'") })),
    )
        .into_response()
}

// ---------------------------------------------------------------------------
// Server entry-point
// ---------------------------------------------------------------------------

pub async fn serve(state: AppState) -> Result<()> {
    let port: u16 = env::var("WEB_PORT")
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(8080);

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind web port {port}"))?;

    info!(%addr, "http api listening");

    axum::serve(listener, router(state))
        .await
        .context("web server error")
}

// ===========================================================================
// Tests
// ===========================================================================
