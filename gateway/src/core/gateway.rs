//! Per-request pipeline for `/v1/tts`.
//!
//! ```text
//! Received -> Authenticated -> Validated -> RateChecked -> Synthesizing -> Completed
//!     \______________\______________\____________\______________\______> Failed(reason)
//! ```
//!
//! Authentication always runs before the body is looked at, so an
//! unauthenticated caller learns nothing about its payload and never touches
//! the ledger.

use bytes::Bytes;
use serde::Deserialize;
use std::sync::Arc;
use std::time::Instant;
use tracing::{Instrument, debug, error, info, info_span, warn};
use uuid::Uuid;

use super::clock::SharedClock;
use super::identity::IdentityService;
use super::limiter::Admission;
use super::tts::{AudioFormat, Synthesizer, enhance};
use super::voices::{DEFAULT_LANGUAGE, DEFAULT_VOICE_ID, VoiceRegistry};
use crate::errors::{AppResult, ValidationError};
use crate::store::{AppendOutcome, NewUsage, SharedStore, UsageLedger};

pub const TTS_ENDPOINT: &str = "/v1/tts";
pub const MIN_SPEED: f32 = 0.5;
pub const MAX_SPEED: f32 = 1.5;
pub const DEFAULT_MAX_TEXT_LEN: usize = 5000;

/// Pipeline stages, recorded in traces
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestState {
    Received,
    Authenticated,
    Validated,
    RateChecked,
    Synthesizing,
    Completed,
    Failed,
}

impl RequestState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Received => "received",
            Self::Authenticated => "authenticated",
            Self::Validated => "validated",
            Self::RateChecked => "rate_checked",
            Self::Synthesizing => "synthesizing",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }
}

/// JSON body of `POST /v1/tts`
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TtsRequestBody {
    pub text: Option<String>,
    #[serde(alias = "voiceId")]
    pub voice_id: Option<String>,
    pub format: Option<String>,
    pub speed: Option<f32>,
    pub tone: Option<String>,
    pub lang: Option<String>,
}

/// Request defaults and validation bounds
#[derive(Debug, Clone)]
pub struct GatewayPolicy {
    pub max_text_len: usize,
    pub default_format: AudioFormat,
    /// Reject unknown formats instead of falling back to `default_format`
    pub strict_format: bool,
    pub default_voice_id: String,
    pub default_tone: String,
    pub default_lang: String,
    pub default_speed: f32,
}

impl Default for GatewayPolicy {
    fn default() -> Self {
        Self {
            max_text_len: DEFAULT_MAX_TEXT_LEN,
            default_format: AudioFormat::Mp3,
            strict_format: false,
            default_voice_id: DEFAULT_VOICE_ID.to_string(),
            default_tone: enhance::DEFAULT_TONE.to_string(),
            default_lang: DEFAULT_LANGUAGE.to_string(),
            default_speed: 1.0,
        }
    }
}

/// A body that passed validation
#[derive(Debug, Clone, PartialEq)]
pub struct ValidatedRequest {
    /// Trimmed caller text, before enhancement
    pub text: String,
    pub characters: u64,
    pub voice_id: String,
    pub format: AudioFormat,
    pub speed: f32,
    pub tone: String,
    pub lang: String,
}

/// Successful synthesis
#[derive(Debug, Clone)]
pub struct SynthesisOutcome {
    pub audio: Bytes,
    pub format: AudioFormat,
    pub request_id: String,
    pub generation_ms: u64,
    pub characters: u64,
}

impl SynthesisOutcome {
    pub fn content_type(&self) -> &'static str {
        self.format.mime_type()
    }
}

fn choose<'a>(value: &'a Option<String>, fallback: &'a str) -> &'a str {
    value
        .as_deref()
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .unwrap_or(fallback)
}

impl GatewayPolicy {
    pub fn validate(&self, body: &TtsRequestBody) -> Result<ValidatedRequest, ValidationError> {
        let text = body.text.as_deref().unwrap_or_default().trim();
        if text.is_empty() {
            return Err(ValidationError::EmptyText);
        }
        let characters = text.chars().count();
        if characters > self.max_text_len {
            return Err(ValidationError::TooLong {
                max: self.max_text_len,
            });
        }

        let format = match body.format.as_deref().map(str::trim).filter(|f| !f.is_empty()) {
            None => self.default_format,
            Some(raw) => match AudioFormat::parse(raw) {
                Some(format) => format,
                None if self.strict_format => {
                    return Err(ValidationError::BadFormat(raw.to_string()));
                }
                None => {
                    debug!(requested = raw, fallback = %self.default_format, "Unsupported format, using default");
                    self.default_format
                }
            },
        };

        let speed = body.speed.unwrap_or(self.default_speed);
        if !(MIN_SPEED..=MAX_SPEED).contains(&speed) {
            return Err(ValidationError::BadSpeed {
                value: speed,
                min: MIN_SPEED,
                max: MAX_SPEED,
            });
        }

        Ok(ValidatedRequest {
            text: text.to_string(),
            characters: characters as u64,
            voice_id: choose(&body.voice_id, &self.default_voice_id).to_string(),
            format,
            speed,
            tone: choose(&body.tone, &self.default_tone).to_string(),
            lang: choose(&body.lang, &self.default_lang).to_string(),
        })
    }
}

/// Parse a raw body. An empty body is treated as `{}`.
pub fn parse_body(raw: &[u8]) -> Result<TtsRequestBody, ValidationError> {
    if raw.iter().all(u8::is_ascii_whitespace) {
        return Ok(TtsRequestBody::default());
    }
    serde_json::from_slice(raw).map_err(|e| ValidationError::MalformedBody(e.to_string()))
}

pub struct Gateway {
    identities: IdentityService,
    voices: VoiceRegistry,
    admission: Admission,
    synthesizer: Arc<dyn Synthesizer>,
    ledger: SharedStore,
    clock: SharedClock,
    policy: GatewayPolicy,
}

impl Gateway {
    pub fn new(
        identities: IdentityService,
        voices: VoiceRegistry,
        admission: Admission,
        synthesizer: Arc<dyn Synthesizer>,
        ledger: SharedStore,
        clock: SharedClock,
        policy: GatewayPolicy,
    ) -> Self {
        Self {
            identities,
            voices,
            admission,
            synthesizer,
            ledger,
            clock,
            policy,
        }
    }

    pub fn admission(&self) -> &Admission {
        &self.admission
    }

    /// Run one synthesis request end to end
    pub async fn handle(
        &self,
        credential: Option<String>,
        client_request_id: Option<String>,
        body: Bytes,
    ) -> AppResult<SynthesisOutcome> {
        let request_id = Uuid::new_v4().to_string();
        let span = info_span!(
            "tts_request",
            request_id = %request_id,
            client_request_id = client_request_id.as_deref().unwrap_or(""),
            identity_id = tracing::field::Empty
        );
        let result = self
            .run(request_id, credential.as_deref(), &body)
            .instrument(span)
            .await;
        if let Err(ref e) = result {
            debug!(state = RequestState::Failed.as_str(), error = %e, "TTS request failed");
        }
        result
    }

    async fn run(
        &self,
        request_id: String,
        credential: Option<&str>,
        body: &[u8],
    ) -> AppResult<SynthesisOutcome> {
        let started = Instant::now();
        debug!(state = RequestState::Received.as_str());

        let identity = self.identities.authenticate(credential).await?;
        tracing::Span::current().record("identity_id", identity.id.as_str());
        debug!(state = RequestState::Authenticated.as_str());

        let request = self.policy.validate(&parse_body(body)?)?;
        debug!(
            state = RequestState::Validated.as_str(),
            characters = request.characters,
            format = %request.format,
            voice_id = %request.voice_id
        );

        let reservation = self
            .admission
            .admit(
                &identity.id,
                TTS_ENDPOINT,
                request.characters,
                self.clock.now(),
            )
            .await?;
        debug!(state = RequestState::RateChecked.as_str());

        let voice = self.voices.resolve(&request.voice_id, &identity.id).await?;
        let input = enhance::enhance_text(&request.text, &voice, &request.tone);

        debug!(state = RequestState::Synthesizing.as_str(), provider_voice = %voice.provider_voice_name);
        let audio = match self
            .synthesizer
            .synthesize(&input, &voice, request.format, request.speed)
            .await
        {
            Ok(audio) => audio,
            Err(e) => {
                error!(error = %e, "TTS generation failed");
                return Err(e.into());
            }
        };

        let entry = NewUsage {
            identity_id: identity.id.clone(),
            endpoint: TTS_ENDPOINT.to_string(),
            character_count: request.characters,
            request_id: request_id.clone(),
        };
        match self.ledger.append(entry).await {
            Ok(AppendOutcome::Recorded(_)) => {}
            Ok(AppendOutcome::Duplicate) => {
                warn!("Usage already recorded for this request id");
            }
            // Audio is already paid for upstream; accounting stays best-effort
            Err(e) => error!(error = %e, "Failed to record usage"),
        }
        reservation.commit();
        self.identities.touch(&identity.id).await;

        let generation_ms = started.elapsed().as_millis() as u64;
        info!(
            state = RequestState::Completed.as_str(),
            characters = request.characters,
            bytes = audio.len(),
            generation_ms,
            "TTS request completed"
        );

        Ok(SynthesisOutcome {
            audio,
            format: request.format,
            request_id,
            generation_ms,
            characters: request.characters,
        })
    }
}
