use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::auth_error::AuthError;
use crate::core::limiter::RateLimitError;
use crate::core::tts::UpstreamError;
use crate::store::StoreError;

/// JSON body returned for every error response
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorBody {
    /// Machine-readable error code
    pub error: String,
    /// Human-readable description
    pub message: String,
}

impl ErrorBody {
    pub fn new(error: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            message: message.into(),
        }
    }
}

/// Request validation failures (HTTP 400)
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ValidationError {
    #[error("text required")]
    EmptyText,

    #[error("text too long (max {max})")]
    TooLong { max: usize },

    #[error("unsupported format: {0}")]
    BadFormat(String),

    #[error("speed must be between {min} and {max}, got {value}")]
    BadSpeed { value: f32, min: f32, max: f32 },

    #[error("invalid JSON body: {0}")]
    MalformedBody(String),

    #[error("email required")]
    EmailRequired,

    #[error("provider_voice_name required in config")]
    ProviderVoiceRequired,
}

impl ValidationError {
    /// Stable error code. Text errors keep the phrasing existing clients match on.
    pub fn code(&self) -> String {
        match self {
            ValidationError::EmptyText => "text required".to_string(),
            ValidationError::TooLong { max } => format!("text too long (max {max})"),
            ValidationError::BadFormat(_) => "unsupported format".to_string(),
            ValidationError::BadSpeed { .. } => "speed out of range".to_string(),
            ValidationError::MalformedBody(_) => "invalid JSON body".to_string(),
            ValidationError::EmailRequired => "email required".to_string(),
            ValidationError::ProviderVoiceRequired => {
                "provider_voice_name required in config".to_string()
            }
        }
    }
}

/// Lookup failures (HTTP 404)
///
/// A private voice owned by someone else is reported exactly like a voice
/// that does not exist.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum NotFoundError {
    #[error("voice_id not found")]
    Voice,

    #[error("user not found")]
    User,
}

/// Top-level error for every HTTP-facing operation
#[derive(Debug, Error)]
pub enum AppError {
    #[error(transparent)]
    Auth(#[from] AuthError),

    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    NotFound(#[from] NotFoundError),

    #[error(transparent)]
    RateLimit(#[from] RateLimitError),

    #[error(transparent)]
    Upstream(#[from] UpstreamError),

    #[error("persistence error: {0}")]
    Persistence(#[from] StoreError),

    /// A background task panicked or was cancelled
    #[error("internal error: {0}")]
    Internal(String),
}

pub type AppResult<T> = Result<T, AppError>;

impl AppError {
    pub fn status(&self) -> StatusCode {
        match self {
            AppError::Auth(_) => StatusCode::UNAUTHORIZED,
            AppError::Validation(_) => StatusCode::BAD_REQUEST,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::RateLimit(_) => StatusCode::TOO_MANY_REQUESTS,
            AppError::Upstream(UpstreamError::Permanent { .. }) => StatusCode::BAD_GATEWAY,
            AppError::Upstream(_) => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::Persistence(_) | AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn body(&self) -> ErrorBody {
        match self {
            AppError::Auth(e) => ErrorBody::new(e.code(), e.to_string()),
            AppError::Validation(e) => ErrorBody::new(e.code(), e.to_string()),
            AppError::NotFound(e) => ErrorBody::new(e.to_string(), e.to_string()),
            AppError::RateLimit(e) => ErrorBody::new(e.code(), e.to_string()),
            AppError::Upstream(e) => ErrorBody::new("TTS generation failed", e.detail()),
            // Storage details stay in the logs
            AppError::Persistence(_) | AppError::Internal(_) => {
                ErrorBody::new("internal_error", "An unexpected error occurred")
            }
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        match self {
            AppError::Persistence(ref e) => {
                tracing::error!(error = %e, "Request failed on storage error");
            }
            AppError::Internal(ref detail) => {
                tracing::error!(error = %detail, "Request failed on internal error");
            }
            _ => {}
        }
        (self.status(), Json(self.body())).into_response()
    }
}
