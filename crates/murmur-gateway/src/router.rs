//! Axum router wiring.

use axum::{
    routing::{get, post},
    Router,
};

use crate::{api, app_state::AppState, ops};

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route(
            "/v1/channels/:channel/messages",
            get(api::messages::list_messages).post(api::messages::send_message),
        )
        .route("/v1/channels/:channel/feed", get(api::feed::channel_feed))
        .route("/v1/messages/:id/report", post(api::messages::report_message))
        .route("/v1/sessions/:session/rate", get(api::messages::session_rate))
        .route("/v1/security/stats", get(api::security::stats))
        .route("/v1/security/events", get(api::security::events))
        .route("/v1/security/cache/clear", post(api::security::clear_cache))
        .route("/healthz", get(ops::healthz))
        .route("/metrics", get(ops::metrics))
        .with_state(state)
}
