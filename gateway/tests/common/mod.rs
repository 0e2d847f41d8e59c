//! Shared fixtures for router-level tests
#![allow(dead_code)]

use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};

use async_trait::async_trait;
use axum::{
    Router,
    body::{Body, Bytes},
    http::{HeaderMap, Method, Request, StatusCode},
};
use http_body_util::BodyExt;
use parking_lot::Mutex;
use time::macros::datetime;
use tower::util::ServiceExt;

use tts_gateway::{
    ServerConfig,
    core::{AudioFormat, ManualClock, Synthesizer, UpstreamError},
    routes,
    state::AppState,
    store::{MemoryStore, SharedStore, VoiceProfile},
};

pub const ADMIN_TOKEN: &str = "admin-secret";
pub const FAKE_AUDIO: &[u8] = b"ID3-fake-audio";

/// Records every call and answers with a fixed outcome
pub struct MockSynthesizer {
    outcome: Mutex<Result<Bytes, UpstreamError>>,
    calls: AtomicU32,
    last_input: Mutex<Option<String>>,
}

impl MockSynthesizer {
    pub fn new() -> Self {
        Self {
            outcome: Mutex::new(Ok(Bytes::from_static(FAKE_AUDIO))),
            calls: AtomicU32::new(0),
            last_input: Mutex::new(None),
        }
    }

    pub fn fail_with(&self, error: UpstreamError) {
        *self.outcome.lock() = Err(error);
    }

    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn last_input(&self) -> Option<String> {
        self.last_input.lock().clone()
    }
}

#[async_trait]
impl Synthesizer for MockSynthesizer {
    async fn synthesize(
        &self,
        text: &str,
        _voice: &VoiceProfile,
        _format: AudioFormat,
        _speed: f32,
    ) -> Result<Bytes, UpstreamError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        *self.last_input.lock() = Some(text.to_string());
        self.outcome.lock().clone()
    }
}

pub struct Harness {
    pub app: Router,
    pub state: Arc<AppState>,
    pub memory: Arc<MemoryStore>,
    pub clock: Arc<ManualClock>,
    pub synth: Arc<MockSynthesizer>,
}

pub fn test_config() -> ServerConfig {
    let mut config = ServerConfig::default();
    config.db_path = ":memory:".into();
    config.admin_token = Some(ADMIN_TOKEN.to_string());
    config
}

pub fn manual_clock() -> Arc<ManualClock> {
    Arc::new(ManualClock::new(datetime!(2026-03-10 12:00:00 UTC)))
}

/// Router over an in-memory store with seeded voices and a mock synthesizer
pub async fn harness(configure: impl FnOnce(&mut ServerConfig)) -> Harness {
    let clock = manual_clock();
    let memory = Arc::new(MemoryStore::new(clock.clone()));
    let store: SharedStore = memory.clone();
    harness_with_store(configure, clock, memory, store).await
}

/// Same as [`harness`] but the state talks to `store`, which may wrap `memory`
pub async fn harness_with_store(
    configure: impl FnOnce(&mut ServerConfig),
    clock: Arc<ManualClock>,
    memory: Arc<MemoryStore>,
    store: SharedStore,
) -> Harness {
    let mut config = test_config();
    configure(&mut config);

    let synth = Arc::new(MockSynthesizer::new());
    let state = AppState::with_parts(config, store, clock.clone(), synth.clone());
    state.voices.seed_defaults().await.unwrap();

    Harness {
        app: routes::api::create_api_router(state.clone()),
        state,
        memory,
        clock,
        synth,
    }
}

impl Harness {
    pub async fn issue_key(&self, email: &str) -> String {
        self.state
            .identities
            .issue_credential(email)
            .await
            .unwrap()
            .identity
            .credential
    }

    pub async fn send(&self, request: Request<Body>) -> TestResponse {
        send(&self.app, request).await
    }

    pub async fn tts(&self, key: &str, body: serde_json::Value) -> TestResponse {
        self.send(json_request(Method::POST, "/v1/tts", Some(key), &body))
            .await
    }
}

pub struct TestResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl TestResponse {
    pub fn json(&self) -> serde_json::Value {
        serde_json::from_slice(&self.body).unwrap()
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }
}

pub async fn send(app: &Router, request: Request<Body>) -> TestResponse {
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let headers = response.headers().clone();
    let body = response.into_body().collect().await.unwrap().to_bytes();
    TestResponse {
        status,
        headers,
        body,
    }
}

pub fn json_request(
    method: Method,
    uri: &str,
    key: Option<&str>,
    body: &serde_json::Value,
) -> Request<Body> {
    let mut builder = Request::builder()
        .method(method)
        .uri(uri)
        .header("content-type", "application/json");
    if let Some(key) = key {
        builder = builder.header("x-api-key", key);
    }
    builder.body(Body::from(body.to_string())).unwrap()
}

pub fn get_request(uri: &str, key: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder().method(Method::GET).uri(uri);
    if let Some(key) = key {
        builder = builder.header("x-api-key", key);
    }
    builder.body(Body::empty()).unwrap()
}
