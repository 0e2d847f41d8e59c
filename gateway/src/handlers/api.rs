use axum::{
    Json,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use std::sync::Arc;

use crate::core::clock::format_rfc3339;
use crate::core::tts::AudioFormat;
use crate::errors::ErrorBody;
use crate::state::AppState;

pub const SERVICE_NAME: &str = "tts-gateway";

/// Health check response
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub ok: bool,
    pub service: &'static str,
    /// Current server time, RFC 3339
    pub time: String,
    pub formats: Vec<&'static str>,
    pub version: &'static str,
}

/// Health check handler. Never touches storage or the upstream.
pub async fn health_check(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        ok: true,
        service: SERVICE_NAME,
        time: format_rfc3339(state.clock.now()),
        formats: AudioFormat::ALL.iter().map(AudioFormat::as_str).collect(),
        version: env!("CARGO_PKG_VERSION"),
    })
}

/// Fallback for unknown routes
pub async fn not_found() -> Response {
    (
        StatusCode::NOT_FOUND,
        Json(ErrorBody::new("Not found", "Endpoint not found")),
    )
        .into_response()
}
