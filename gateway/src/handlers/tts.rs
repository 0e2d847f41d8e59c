use axum::{
    body::Bytes,
    extract::State,
    http::{HeaderMap, HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
};
use std::sync::Arc;

use crate::errors::{AppError, AppResult};
use crate::middleware::extract_credential;
use crate::state::AppState;

pub const REQUEST_ID_HEADER: &str = "x-request-id";
pub const GEN_DURATION_HEADER: &str = "x-gen-duration";

/// `POST /v1/tts`
///
/// Takes the raw body so that the credential is checked before any JSON is
/// parsed. Returns the audio bytes with `Content-Type` matching the chosen
/// format.
///
/// The pipeline runs on its own task: a client that disconnects mid-request
/// does not cancel the upstream call or the usage record that follows it.
pub async fn synthesize(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Bytes,
) -> AppResult<Response> {
    let credential = extract_credential(&headers);
    let client_request_id = headers
        .get(REQUEST_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);

    let outcome = tokio::spawn(async move {
        state
            .gateway
            .handle(credential, client_request_id, body)
            .await
    })
    .await
    .map_err(|e| AppError::Internal(format!("synthesis task failed: {e}")))??;

    let mut response = (StatusCode::OK, outcome.audio.clone()).into_response();
    let response_headers = response.headers_mut();
    response_headers.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static(outcome.content_type()),
    );
    response_headers.insert(header::CACHE_CONTROL, HeaderValue::from_static("no-store"));
    if let Ok(value) = HeaderValue::from_str(&outcome.request_id) {
        response_headers.insert(REQUEST_ID_HEADER, value);
    }
    response_headers.insert(
        GEN_DURATION_HEADER,
        HeaderValue::from(outcome.generation_ms),
    );

    Ok(response)
}
