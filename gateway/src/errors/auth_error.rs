use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use thiserror::Error;

use super::app_error::ErrorBody;

/// Error code shared by every credential failure so callers cannot tell a
/// revoked key from a mistyped one.
pub const INVALID_API_KEY_CODE: &str = "invalid_or_missing_api_key";

/// Authentication failures
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AuthError {
    /// No credential was supplied with the request
    #[error("API key required")]
    Missing,

    /// The credential does not match any identity
    #[error("Invalid API key")]
    Invalid,

    /// The credential belongs to a deactivated identity
    #[error("API key is inactive")]
    Inactive,

    /// Administrative endpoint called without a valid admin token
    #[error("admin token required")]
    AdminRequired,
}

pub type AuthResult<T> = Result<T, AuthError>;

impl AuthError {
    /// Machine-readable error code
    pub fn code(&self) -> &'static str {
        match self {
            AuthError::Missing | AuthError::Invalid | AuthError::Inactive => INVALID_API_KEY_CODE,
            AuthError::AdminRequired => "admin token required",
        }
    }
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let body = ErrorBody::new(self.code(), self.to_string());
        (StatusCode::UNAUTHORIZED, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_credential_errors_share_code() {
        assert_eq!(AuthError::Missing.code(), INVALID_API_KEY_CODE);
        assert_eq!(AuthError::Invalid.code(), INVALID_API_KEY_CODE);
        assert_eq!(AuthError::Inactive.code(), INVALID_API_KEY_CODE);
        assert_ne!(AuthError::AdminRequired.code(), INVALID_API_KEY_CODE);
    }

    #[test]
    fn test_auth_error_status() {
        let response = AuthError::Inactive.into_response();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }
}
