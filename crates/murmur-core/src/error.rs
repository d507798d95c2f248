//! Shared error type across murmur crates.

use serde::Serialize;
use thiserror::Error;

/// Client-facing error codes (stable API).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientCode {
    /// Malformed request or configuration.
    BadRequest,
    /// Draft rejected by the content admission validator.
    ContentRejected,
    /// Submission rate exceeded; retry after the cooldown.
    RateLimited,
    /// Attestation token missing, malformed or not obtainable.
    AttestationFailed,
    /// The storage collaborator refused the write.
    StorageFailed,
    /// Referenced record does not exist.
    NotFound,
    /// Unsupported config/protocol version.
    UnsupportedVersion,
    /// Internal error.
    Internal,
}

impl ClientCode {
    /// String representation used in JSON responses.
    pub fn as_str(self) -> &'static str {
        match self {
            ClientCode::BadRequest => "BAD_REQUEST",
            ClientCode::ContentRejected => "CONTENT_REJECTED",
            ClientCode::RateLimited => "RATE_LIMITED",
            ClientCode::AttestationFailed => "ATTESTATION_FAILED",
            ClientCode::StorageFailed => "STORAGE_FAILED",
            ClientCode::NotFound => "NOT_FOUND",
            ClientCode::UnsupportedVersion => "UNSUPPORTED_VERSION",
            ClientCode::Internal => "INTERNAL",
        }
    }
}

/// Why the content admission validator refused a draft.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ContentErrorKind {
    TooShort,
    TooLong,
    TooManyLineBreaks,
    ExcessiveRepetition,
    ShortLineSpam,
    EmptyMessage,
    InvalidContent,
}

impl ContentErrorKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ContentErrorKind::TooShort => "too_short",
            ContentErrorKind::TooLong => "too_long",
            ContentErrorKind::TooManyLineBreaks => "too_many_line_breaks",
            ContentErrorKind::ExcessiveRepetition => "excessive_repetition",
            ContentErrorKind::ShortLineSpam => "short_line_spam",
            ContentErrorKind::EmptyMessage => "empty_message",
            ContentErrorKind::InvalidContent => "invalid_content",
        }
    }
}

impl std::fmt::Display for ContentErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Shared result type.
pub type Result<T> = std::result::Result<T, MurmurError>;

/// Unified error type used by core and gateway.
///
/// `Clone` is required: a coalesced token request hands the same failure to
/// every waiter.
#[derive(Debug, Clone, Error)]
pub enum MurmurError {
    #[error("{message}")]
    Content {
        kind: ContentErrorKind,
        message: String,
    },
    #[error("please wait {retry_after_secs} seconds before posting again")]
    RateLimited { retry_after_secs: u64 },
    #[error("attestation token request failed: {0}")]
    TokenRequestFailed(String),
    #[error("attestation token rejected: {0}")]
    TokenValidationFailed(String),
    #[error("attestation enforcement failed for {operation}: {reason}")]
    EnforcementFailed { operation: String, reason: String },
    #[error("failed to send, please retry")]
    Storage(String),
    #[error("not found: {0}")]
    NotFound(String),
    #[error("bad request: {0}")]
    BadRequest(String),
    #[error("unsupported config version")]
    UnsupportedVersion,
    #[error("internal: {0}")]
    Internal(String),
}

impl MurmurError {
    /// Map internal error to a stable client-facing code.
    pub fn client_code(&self) -> ClientCode {
        match self {
            MurmurError::Content { .. } => ClientCode::ContentRejected,
            MurmurError::RateLimited { .. } => ClientCode::RateLimited,
            MurmurError::TokenRequestFailed(_)
            | MurmurError::TokenValidationFailed(_)
            | MurmurError::EnforcementFailed { .. } => ClientCode::AttestationFailed,
            MurmurError::Storage(_) => ClientCode::StorageFailed,
            MurmurError::NotFound(_) => ClientCode::NotFound,
            MurmurError::BadRequest(_) => ClientCode::BadRequest,
            MurmurError::UnsupportedVersion => ClientCode::UnsupportedVersion,
            MurmurError::Internal(_) => ClientCode::Internal,
        }
    }

    /// Fine-grained snake_case reason shown next to the input.
    pub fn reason(&self) -> &'static str {
        match self {
            MurmurError::Content { kind, .. } => kind.as_str(),
            MurmurError::RateLimited { .. } => "rate_limited",
            MurmurError::TokenRequestFailed(_) => "token_request_failed",
            MurmurError::TokenValidationFailed(_) => "token_validation_failed",
            MurmurError::EnforcementFailed { .. } => "app_check_enforcement_failed",
            MurmurError::Storage(_) => "storage_failed",
            MurmurError::NotFound(_) => "not_found",
            MurmurError::BadRequest(_) => "bad_request",
            MurmurError::UnsupportedVersion => "unsupported_version",
            MurmurError::Internal(_) => "internal",
        }
    }

    /// Attestation failures are the only kind recorded as security events.
    pub fn is_attestation(&self) -> bool {
        self.client_code() == ClientCode::AttestationFailed
    }

    pub fn content_kind(&self) -> Option<ContentErrorKind> {
        match self {
            MurmurError::Content { kind, .. } => Some(*kind),
            _ => None,
        }
    }
}
