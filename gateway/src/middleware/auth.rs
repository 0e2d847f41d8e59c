use crate::errors::{AppError, AuthError};
use crate::state::AppState;
use axum::{
    extract::{Request, State},
    http::HeaderMap,
    middleware::Next,
    response::Response,
};
use std::sync::Arc;

pub const API_KEY_HEADER: &str = "x-api-key";
pub const ADMIN_TOKEN_HEADER: &str = "x-admin-token";

/// Extract the caller's credential from request headers
///
/// Sources, in order:
/// 1. `X-API-Key: <key>`
/// 2. `Authorization: Bearer <key>`
///
/// Returns `None` when neither header carries a non-empty value.
pub fn extract_credential(headers: &HeaderMap) -> Option<String> {
    if let Some(key) = headers
        .get(API_KEY_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
    {
        return Some(key.to_string());
    }

    headers
        .get(axum::http::header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

/// Authentication middleware for credential-protected routes
///
/// Resolves the credential to an active [`Identity`](crate::store::Identity)
/// and inserts it into request extensions. Handlers read it with
/// `Extension<Identity>`. Returns 401 for a missing, unknown or inactive key.
pub async fn auth_middleware(
    State(state): State<Arc<AppState>>,
    mut request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let credential = extract_credential(request.headers());
    let identity = match state.identities.authenticate(credential.as_deref()).await {
        Ok(identity) => identity,
        Err(e) => {
            tracing::warn!(
                method = %request.method(),
                path = %request.uri().path(),
                error = %e,
                "Authentication failed"
            );
            return Err(e);
        }
    };

    tracing::debug!(identity_id = %identity.id, "Authenticated");
    request.extensions_mut().insert(identity);
    Ok(next.run(request).await)
}

/// Guard for `/v1/admin/*`
///
/// Requires `X-Admin-Token` to match the configured token. Every request is
/// rejected when no admin token is configured.
pub async fn admin_middleware(
    State(state): State<Arc<AppState>>,
    request: Request,
    next: Next,
) -> Result<Response, AuthError> {
    let presented = request
        .headers()
        .get(ADMIN_TOKEN_HEADER)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default();

    if !state.config.verify_admin_token(presented) {
        tracing::warn!(path = %request.uri().path(), "Admin token rejected");
        return Err(AuthError::AdminRequired);
    }
    Ok(next.run(request).await)
}
