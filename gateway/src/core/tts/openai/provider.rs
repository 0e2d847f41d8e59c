//! OpenAI speech provider.
//!
//! - Endpoint: `POST {base_url}/audio/speech`
//! - Body: `{model, voice, input, response_format, speed}`
//! - Auth: `Authorization: Bearer <key>`

use async_trait::async_trait;
use bytes::Bytes;
use serde_json::json;
use tracing::debug;

use super::config::OpenAISpeechConfig;
use crate::core::tts::{SpeechProvider, SpeechRequest, UpstreamError, truncate_detail};

pub struct OpenAISpeech {
    client: reqwest::Client,
    config: OpenAISpeechConfig,
}

impl OpenAISpeech {
    pub fn new(config: OpenAISpeechConfig) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder().timeout(config.timeout).build()?;
        Ok(Self { client, config })
    }

    pub fn config(&self) -> &OpenAISpeechConfig {
        &self.config
    }

    /// JSON body for one request
    pub fn request_body(&self, request: &SpeechRequest) -> serde_json::Value {
        json!({
            "model": self.config.model,
            "voice": request.voice,
            "input": request.input,
            "response_format": request.format.as_str(),
            "speed": request.speed,
        })
    }

    fn build_http_request(&self, api_key: &str, request: &SpeechRequest) -> reqwest::RequestBuilder {
        self.client
            .post(self.config.speech_url())
            .bearer_auth(api_key)
            .json(&self.request_body(request))
    }
}

fn classify_transport_error(err: &reqwest::Error) -> UpstreamError {
    // The error text carries the URL but never request headers
    let detail = truncate_detail(&err.to_string());
    if err.is_builder() {
        UpstreamError::Permanent {
            status: None,
            detail,
        }
    } else {
        UpstreamError::Transient {
            status: err.status().map(|s| s.as_u16()),
            detail,
        }
    }
}

#[async_trait]
impl SpeechProvider for OpenAISpeech {
    async fn attempt(&self, request: &SpeechRequest) -> Result<Bytes, UpstreamError> {
        let Some(api_key) = self.config.api_key() else {
            return Err(UpstreamError::Permanent {
                status: None,
                detail: "OpenAI API key not configured".to_string(),
            });
        };

        let response = self
            .build_http_request(api_key, request)
            .send()
            .await
            .map_err(|e| classify_transport_error(&e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            debug!(status = status.as_u16(), "OpenAI speech request failed");
            return Err(UpstreamError::from_status(status.as_u16(), &body));
        }

        response
            .bytes()
            .await
            .map_err(|e| classify_transport_error(&e))
    }

    fn name(&self) -> &'static str {
        "openai"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::tts::AudioFormat;

    fn provider(api_key: Option<&str>) -> OpenAISpeech {
        OpenAISpeech::new(OpenAISpeechConfig {
            api_key: api_key.map(|k| zeroize::Zeroizing::new(k.to_string())),
            // Nothing listens here; tests below never reach the network
            base_url: "http://127.0.0.1:9".to_string(),
            ..Default::default()
        })
        .unwrap()
    }

    fn request() -> SpeechRequest {
        SpeechRequest {
            voice: "coral".to_string(),
            input: "How far?".to_string(),
            format: AudioFormat::Wav,
            speed: 1.25,
        }
    }

    #[test]
    fn test_request_body_shape() {
        let body = provider(Some("sk-test")).request_body(&request());
        assert_eq!(body["model"], "gpt-4o-mini-tts");
        assert_eq!(body["voice"], "coral");
        assert_eq!(body["input"], "How far?");
        assert_eq!(body["response_format"], "wav");
        assert_eq!(body["speed"], 1.25);
    }

    #[test]
    fn test_http_request_targets_speech_endpoint() {
        let provider = provider(Some("sk-test"));
        let built = provider
            .build_http_request("sk-test", &request())
            .build()
            .unwrap();
        assert_eq!(built.method(), &reqwest::Method::POST);
        assert_eq!(built.url().as_str(), "http://127.0.0.1:9/audio/speech");
        assert_eq!(
            built.headers().get("authorization").unwrap(),
            "Bearer sk-test"
        );
    }

    #[tokio::test]
    async fn test_missing_key_is_permanent() {
        let err = provider(None).attempt(&request()).await.unwrap_err();
        assert!(matches!(err, UpstreamError::Permanent { status: None, .. }));
    }
}
