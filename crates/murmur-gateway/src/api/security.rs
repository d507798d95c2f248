//! Read-only security surface plus the cache-clear control.

use axum::{extract::State, http::StatusCode, Json};

use crate::app_state::AppState;
use crate::attest::{SecurityEvent, SecurityStats};

pub async fn stats(State(state): State<AppState>) -> Json<SecurityStats> {
    Json(state.attestation().security_stats())
}

pub async fn events(State(state): State<AppState>) -> Json<Vec<SecurityEvent>> {
    Json(state.attestation().security_events())
}

/// Drops cached tokens; the next privileged write fetches a fresh one.
pub async fn clear_cache(State(state): State<AppState>) -> StatusCode {
    state.attestation().clear_cache();
    StatusCode::NO_CONTENT
}
