//! Upstream speech synthesis.
//!
//! A [`SpeechProvider`] performs exactly one HTTP attempt and classifies the
//! outcome. [`RetryingSynthesizer`] drives a provider through a
//! [`RetryPolicy`] and is what the gateway calls via the [`Synthesizer`] trait.

pub mod enhance;
pub mod openai;
mod retry;

use async_trait::async_trait;
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::store::VoiceProfile;

pub use openai::{OpenAISpeech, OpenAISpeechConfig};
pub use retry::{DEFAULT_RETRY_DELAYS_MS, RetryPolicy, RetryingSynthesizer};

/// Maximum length of provider error text carried in an [`UpstreamError`]
pub const MAX_ERROR_DETAIL_CHARS: usize = 300;

/// Audio container formats accepted on `/v1/tts`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AudioFormat {
    #[default]
    Mp3,
    Wav,
    Opus,
    Aac,
    Flac,
}

impl AudioFormat {
    pub const ALL: [AudioFormat; 5] = [
        AudioFormat::Mp3,
        AudioFormat::Wav,
        AudioFormat::Opus,
        AudioFormat::Aac,
        AudioFormat::Flac,
    ];

    /// API parameter value
    #[inline]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Mp3 => "mp3",
            Self::Wav => "wav",
            Self::Opus => "opus",
            Self::Aac => "aac",
            Self::Flac => "flac",
        }
    }

    #[inline]
    pub fn mime_type(&self) -> &'static str {
        match self {
            Self::Mp3 => "audio/mpeg",
            Self::Wav => "audio/wav",
            Self::Opus => "audio/ogg",
            Self::Aac => "audio/aac",
            Self::Flac => "audio/flac",
        }
    }

    /// Case-insensitive parse; `None` for anything outside [`AudioFormat::ALL`]
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "mp3" => Some(Self::Mp3),
            "wav" => Some(Self::Wav),
            "opus" => Some(Self::Opus),
            "aac" => Some(Self::Aac),
            "flac" => Some(Self::Flac),
            _ => None,
        }
    }
}

impl std::fmt::Display for AudioFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One synthesis request as sent upstream
#[derive(Debug, Clone, PartialEq)]
pub struct SpeechRequest {
    /// Provider voice name, e.g. `coral`
    pub voice: String,
    /// Final (possibly enhanced) input text
    pub input: String,
    pub format: AudioFormat,
    pub speed: f32,
}

impl SpeechRequest {
    pub fn for_voice(voice: &VoiceProfile, input: &str, format: AudioFormat, speed: f32) -> Self {
        Self {
            voice: voice.provider_voice_name.clone(),
            input: input.to_string(),
            format,
            speed,
        }
    }
}

/// Upstream failures
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum UpstreamError {
    /// Worth retrying: 408, 429, 5xx, timeouts, connection failures
    #[error("transient upstream failure: {detail}")]
    Transient { status: Option<u16>, detail: String },

    /// Retrying will not help: other 4xx, missing credentials
    #[error("upstream rejected request: {detail}")]
    Permanent { status: Option<u16>, detail: String },

    /// Every attempt failed transiently
    #[error("upstream failed after {attempts} attempts: {last}")]
    Exhausted { attempts: u32, last: String },
}

impl UpstreamError {
    pub fn is_transient(&self) -> bool {
        matches!(self, UpstreamError::Transient { .. })
    }

    /// Message safe to return to the caller
    pub fn detail(&self) -> String {
        match self {
            UpstreamError::Transient { detail, .. } | UpstreamError::Permanent { detail, .. } => {
                detail.clone()
            }
            UpstreamError::Exhausted { .. } => self.to_string(),
        }
    }

    /// Classify a non-success HTTP status
    pub fn from_status(status: u16, body: &str) -> Self {
        let detail = truncate_detail(&format!("HTTP {status}: {}", body.trim()));
        if is_transient_status(status) {
            UpstreamError::Transient {
                status: Some(status),
                detail,
            }
        } else {
            UpstreamError::Permanent {
                status: Some(status),
                detail,
            }
        }
    }
}

/// 408, 429 and every 5xx are transient
pub fn is_transient_status(status: u16) -> bool {
    status == 408 || status == 429 || (500..600).contains(&status)
}

pub(crate) fn truncate_detail(detail: &str) -> String {
    if detail.chars().count() <= MAX_ERROR_DETAIL_CHARS {
        return detail.to_string();
    }
    let mut out: String = detail.chars().take(MAX_ERROR_DETAIL_CHARS).collect();
    out.push_str("...");
    out
}

/// A single upstream attempt
#[async_trait]
pub trait SpeechProvider: Send + Sync {
    /// Perform one request. Must not retry internally.
    async fn attempt(&self, request: &SpeechRequest) -> Result<Bytes, UpstreamError>;

    /// Provider name for logs
    fn name(&self) -> &'static str;
}

/// What the gateway calls to turn text into audio
#[async_trait]
pub trait Synthesizer: Send + Sync {
    async fn synthesize(
        &self,
        text: &str,
        voice: &VoiceProfile,
        format: AudioFormat,
        speed: f32,
    ) -> Result<Bytes, UpstreamError>;
}
