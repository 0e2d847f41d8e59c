use axum::{
    Json,
    body::Bytes,
    extract::{Path, State},
};
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use std::sync::Arc;

use crate::errors::{AppResult, ValidationError};
use crate::state::AppState;

#[derive(Debug, Default, Deserialize)]
pub struct IssueKeyRequest {
    #[serde(default)]
    pub email: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct IssueKeyResponse {
    pub email: String,
    pub api_key: String,
    pub user_id: String,
}

#[derive(Debug, Deserialize)]
pub struct SetActiveRequest {
    pub active: bool,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SetActiveResponse {
    pub user_id: String,
    pub email: String,
    pub active: bool,
}

fn parse_json<T: DeserializeOwned>(body: &[u8]) -> Result<T, ValidationError> {
    serde_json::from_slice(body).map_err(|e| ValidationError::MalformedBody(e.to_string()))
}

/// Issue an API key for an email. Issuing again for the same email returns
/// the existing key.
pub async fn issue_key(
    State(state): State<Arc<AppState>>,
    body: Bytes,
) -> AppResult<Json<IssueKeyResponse>> {
    let request: IssueKeyRequest = if body.iter().all(u8::is_ascii_whitespace) {
        IssueKeyRequest::default()
    } else {
        parse_json(&body)?
    };

    let issued = state.identities.issue_credential(&request.email).await?;
    let identity = issued.identity;
    Ok(Json(IssueKeyResponse {
        email: identity.email.clone(),
        api_key: identity.credential.clone(),
        user_id: identity.id.clone(),
    }))
}

/// Activate or deactivate an identity
pub async fn set_active(
    State(state): State<Arc<AppState>>,
    Path(user_id): Path<String>,
    body: Bytes,
) -> AppResult<Json<SetActiveResponse>> {
    let request: SetActiveRequest = parse_json(&body)?;
    let identity = state.identities.set_active(&user_id, request.active).await?;
    Ok(Json(SetActiveResponse {
        user_id: identity.id.clone(),
        email: identity.email.clone(),
        active: identity.active,
    }))
}
