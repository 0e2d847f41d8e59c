use axum::{Extension, Json, body::Bytes, extract::State};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::core::clock::format_rfc3339;
use crate::core::voices::VoiceSpec;
use crate::errors::{AppResult, ValidationError};
use crate::state::AppState;
use crate::store::{Identity, VoiceProfile};

/// One entry of `GET /v1/voices`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Voice {
    pub voice_id: String,
    pub name: String,
    pub description: String,
    pub language: String,
    pub accent: String,
    pub is_public: bool,
    pub created_at: String,
}

impl From<VoiceProfile> for Voice {
    fn from(profile: VoiceProfile) -> Self {
        Self {
            voice_id: profile.id,
            name: profile.display_name,
            description: profile.description,
            language: profile.language,
            accent: profile.accent,
            is_public: profile.visibility.is_public(),
            created_at: format_rfc3339(profile.created_at),
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct VoicesResponse {
    pub voices: Vec<Voice>,
}

/// Body of `POST /v1/voices`
#[derive(Debug, Default, Deserialize)]
pub struct CreateVoiceRequest {
    pub name: Option<String>,
    pub voice_name: Option<String>,
    #[serde(default)]
    pub config: CreateVoiceConfig,
}

#[derive(Debug, Default, Deserialize)]
pub struct CreateVoiceConfig {
    pub provider_voice_name: Option<String>,
    /// Older clients send the provider voice under this key
    pub openai_voice: Option<String>,
    pub description: Option<String>,
    pub language: Option<String>,
    pub accent: Option<String>,
}

impl From<CreateVoiceRequest> for VoiceSpec {
    fn from(request: CreateVoiceRequest) -> Self {
        let config = request.config;
        VoiceSpec {
            display_name: request.name.or(request.voice_name),
            provider_voice_name: config
                .provider_voice_name
                .or(config.openai_voice)
                .unwrap_or_default(),
            description: config.description,
            language: config.language,
            accent: config.accent,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct CreateVoiceResponse {
    pub voice_id: String,
    pub name: String,
}

/// List public voices followed by the caller's private voices
pub async fn list_voices(
    State(state): State<Arc<AppState>>,
    Extension(identity): Extension<Identity>,
) -> AppResult<Json<VoicesResponse>> {
    let voices = state.voices.list(&identity.id).await?;
    Ok(Json(VoicesResponse {
        voices: voices.into_iter().map(Voice::from).collect(),
    }))
}

/// Create a private voice owned by the caller
pub async fn create_voice(
    State(state): State<Arc<AppState>>,
    Extension(identity): Extension<Identity>,
    body: Bytes,
) -> AppResult<Json<CreateVoiceResponse>> {
    let request: CreateVoiceRequest = if body.iter().all(u8::is_ascii_whitespace) {
        CreateVoiceRequest::default()
    } else {
        serde_json::from_slice(&body).map_err(|e| ValidationError::MalformedBody(e.to_string()))?
    };

    let profile = state.voices.create(&identity.id, request.into()).await?;
    Ok(Json(CreateVoiceResponse {
        voice_id: profile.id,
        name: profile.display_name,
    }))
}
