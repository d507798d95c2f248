//! Message send, history, report and per-session rate view.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};

use murmur_core::record::MessageRecord;

use super::ApiError;
use crate::app_state::AppState;
use crate::pipeline::{Draft, Reported};

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SendBody {
    /// Opaque client session (one per tab); owns the rate-limit state.
    pub session: String,
    pub username: String,
    pub content: String,
    #[serde(default)]
    pub reply_to: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct SendReply {
    pub id: String,
    pub content: String,
    pub expire_at_ms: u64,
}

pub async fn send_message(
    State(state): State<AppState>,
    Path(channel): Path<String>,
    Json(body): Json<SendBody>,
) -> Result<(StatusCode, Json<SendReply>), ApiError> {
    let slot = state.sessions().slot(&body.session)?;
    // Held for the whole attempt: one session is evaluated strictly in order.
    let mut limit = slot.lock().await;

    let sent = state
        .composer()
        .send(
            &mut limit,
            Draft {
                channel,
                username: body.username,
                content: body.content,
                reply_to: body.reply_to,
            },
        )
        .await?;

    Ok((
        StatusCode::CREATED,
        Json(SendReply {
            id: sent.id,
            content: sent.content,
            expire_at_ms: sent.expire_at_ms,
        }),
    ))
}

pub async fn list_messages(
    State(state): State<AppState>,
    Path(channel): Path<String>,
) -> Result<Json<Vec<MessageRecord>>, ApiError> {
    Ok(Json(state.composer().history(&channel).await?))
}

#[derive(Debug, Serialize)]
pub struct ReportReply {
    pub report_count: u64,
    pub reported: bool,
}

pub async fn report_message(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<ReportReply>, ApiError> {
    let Reported {
        report_count,
        reported,
    } = state.composer().report(&id).await?;
    Ok(Json(ReportReply {
        report_count,
        reported,
    }))
}

#[derive(Debug, Serialize)]
pub struct SessionRate {
    pub in_cooldown: bool,
    pub retry_after_secs: u64,
    pub count_in_window: u32,
}

/// Lets a client disable its input while the session is cooling down.
pub async fn session_rate(
    State(state): State<AppState>,
    Path(session): Path<String>,
) -> Result<Json<SessionRate>, ApiError> {
    let slot = state.sessions().slot(&session)?;
    let limit = *slot.lock().await;
    let now = state.composer().now_ms();
    Ok(Json(SessionRate {
        in_cooldown: limit.in_cooldown(now),
        retry_after_secs: limit.remaining_cooldown_secs(now),
        count_in_window: limit.count_in_window,
    }))
}
