//! HTTP API handlers and the error body they share.
//!
//! Every failure is rendered as `{code, reason, msg}` with a status derived
//! from the stable client code. Rate-limit rejections additionally carry
//! `retry_after_secs` and a `Retry-After` header.

pub mod feed;
pub mod messages;
pub mod security;

use axum::{
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;

use murmur_core::error::{ClientCode, MurmurError};

/// Wrapper that lets handlers return `Result<_, ApiError>` and use `?`.
#[derive(Debug)]
pub struct ApiError(pub MurmurError);

impl From<MurmurError> for ApiError {
    fn from(e: MurmurError) -> Self {
        Self(e)
    }
}

pub fn status_for(code: ClientCode) -> StatusCode {
    match code {
        ClientCode::BadRequest | ClientCode::UnsupportedVersion => StatusCode::BAD_REQUEST,
        ClientCode::ContentRejected => StatusCode::UNPROCESSABLE_ENTITY,
        ClientCode::RateLimited => StatusCode::TOO_MANY_REQUESTS,
        ClientCode::AttestationFailed => StatusCode::FORBIDDEN,
        ClientCode::StorageFailed => StatusCode::BAD_GATEWAY,
        ClientCode::NotFound => StatusCode::NOT_FOUND,
        ClientCode::Internal => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let code = self.0.client_code();
        let mut body = json!({
            "code": code.as_str(),
            "reason": self.0.reason(),
            "msg": self.0.to_string(),
        });

        let retry_after = match &self.0 {
            MurmurError::RateLimited { retry_after_secs } => Some(*retry_after_secs),
            _ => None,
        };
        if let Some(secs) = retry_after {
            body["retry_after_secs"] = json!(secs);
        }

        let mut resp = (status_for(code), Json(body)).into_response();
        if let Some(secs) = retry_after {
            resp.headers_mut()
                .insert(header::RETRY_AFTER, HeaderValue::from(secs));
        }
        resp
    }
}
