//! End-to-end synthesis against a mock OpenAI speech endpoint

mod common;

use std::sync::Arc;

use axum::http::{Method, StatusCode};
use serde_json::json;
use wiremock::matchers::{body_partial_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use common::{json_request, manual_clock, send, test_config};
use tts_gateway::{
    core::{OpenAISpeech, RetryingSynthesizer},
    routes,
    state::AppState,
    store::{MemoryStore, SharedStore},
};

struct Upstream {
    server: MockServer,
    app: axum::Router,
    state: Arc<AppState>,
    memory: Arc<MemoryStore>,
}

async fn upstream() -> Upstream {
    let server = MockServer::start().await;

    let mut config = test_config();
    config.openai_api_key = Some("sk-test".to_string());
    config.openai_base_url = format!("{}/v1", server.uri());
    config.upstream_retry_delays_ms = vec![5, 5, 5];

    let provider = OpenAISpeech::new(config.openai_config()).unwrap();
    let synthesizer = Arc::new(RetryingSynthesizer::new(provider, config.retry_policy()));

    let clock = manual_clock();
    let memory = Arc::new(MemoryStore::new(clock.clone()));
    let store: SharedStore = memory.clone();
    let state = AppState::with_parts(config, store, clock, synthesizer);
    state.voices.seed_defaults().await.unwrap();

    Upstream {
        server,
        app: routes::api::create_api_router(state.clone()),
        state,
        memory,
    }
}

impl Upstream {
    async fn key(&self) -> String {
        self.state
            .identities
            .issue_credential("ada@example.com")
            .await
            .unwrap()
            .identity
            .credential
    }
}

#[tokio::test]
async fn test_two_transient_failures_then_success() {
    let up = upstream().await;
    let key = up.key().await;

    Mock::given(method("POST"))
        .and(path("/v1/audio/speech"))
        .respond_with(ResponseTemplate::new(503).set_body_string("overloaded"))
        .up_to_n_times(2)
        .expect(2)
        .mount(&up.server)
        .await;
    Mock::given(method("POST"))
        .and(path("/v1/audio/speech"))
        .and(header("authorization", "Bearer sk-test"))
        .and(body_partial_json(json!({
            "model": "gpt-4o-mini-tts",
            "voice": "coral",
            "response_format": "wav"
        })))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(b"RIFF-audio".to_vec()))
        .expect(1)
        .mount(&up.server)
        .await;

    let response = send(
        &up.app,
        json_request(
            Method::POST,
            "/v1/tts",
            Some(&key),
            &json!({"text": "Good morning", "format": "wav"}),
        ),
    )
    .await;

    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.body.as_ref(), b"RIFF-audio");
    assert_eq!(response.header("content-type"), Some("audio/wav"));
    assert_eq!(up.server.received_requests().await.unwrap().len(), 3);
    assert_eq!(up.memory.usage_len(), 1);
}

#[tokio::test]
async fn test_all_transient_failures_exhaust_retries() {
    let up = upstream().await;
    let key = up.key().await;

    Mock::given(method("POST"))
        .and(path("/v1/audio/speech"))
        .respond_with(ResponseTemplate::new(503))
        .expect(4)
        .mount(&up.server)
        .await;

    let response = send(
        &up.app,
        json_request(Method::POST, "/v1/tts", Some(&key), &json!({"text": "hi"})),
    )
    .await;

    assert_eq!(response.status, StatusCode::INTERNAL_SERVER_ERROR);
    let body = response.json();
    assert_eq!(body["error"], "TTS generation failed");
    assert!(body["message"].as_str().unwrap().contains("4 attempts"));
    assert_eq!(up.memory.usage_len(), 0);
}

#[tokio::test]
async fn test_client_error_is_not_retried() {
    let up = upstream().await;
    let key = up.key().await;

    Mock::given(method("POST"))
        .and(path("/v1/audio/speech"))
        .respond_with(ResponseTemplate::new(400).set_body_string("unknown voice"))
        .expect(1)
        .mount(&up.server)
        .await;

    let response = send(
        &up.app,
        json_request(Method::POST, "/v1/tts", Some(&key), &json!({"text": "hi"})),
    )
    .await;

    assert_eq!(response.status, StatusCode::BAD_GATEWAY);
    let message = response.json()["message"].as_str().unwrap().to_string();
    assert!(message.contains("400"));
    assert!(message.contains("unknown voice"));
    assert_eq!(up.memory.usage_len(), 0);
}

#[tokio::test]
async fn test_rate_limited_upstream_is_retried() {
    let up = upstream().await;
    let key = up.key().await;

    Mock::given(method("POST"))
        .and(path("/v1/audio/speech"))
        .respond_with(ResponseTemplate::new(429))
        .up_to_n_times(1)
        .mount(&up.server)
        .await;
    Mock::given(method("POST"))
        .and(path("/v1/audio/speech"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(b"ok".to_vec()))
        .mount(&up.server)
        .await;

    let response = send(
        &up.app,
        json_request(Method::POST, "/v1/tts", Some(&key), &json!({"text": "hi"})),
    )
    .await;

    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(up.server.received_requests().await.unwrap().len(), 2);
}
