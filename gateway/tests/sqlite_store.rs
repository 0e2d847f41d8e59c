//! SQLite persistence across process restarts

mod common;

use std::sync::Arc;

use axum::http::{Method, StatusCode};
use serde_json::json;
use tempfile::TempDir;

use common::{MockSynthesizer, get_request, json_request, manual_clock, send, test_config};
use tts_gateway::{
    core::{IdentityService, VoiceRegistry, VoiceSpec},
    routes,
    state::AppState,
    store::{NewUsage, SharedStore, SqliteStore, UsageLedger},
};

#[tokio::test]
async fn test_identity_voice_and_usage_survive_reopen() {
    let dir = TempDir::new().unwrap();
    let db_path = dir.path().join("state").join("gateway.db");
    let clock = manual_clock();

    let (credential, voice_id) = {
        let store: SharedStore = Arc::new(SqliteStore::open(&db_path, clock.clone()).unwrap());
        let identities = IdentityService::new(store.clone());
        let voices = VoiceRegistry::new(store.clone());
        assert_eq!(voices.seed_defaults().await.unwrap(), 4);

        let issued = identities.issue_credential("ada@example.com").await.unwrap();
        let voice = voices
            .create(
                &issued.identity.id,
                VoiceSpec {
                    display_name: Some("Ada".to_string()),
                    provider_voice_name: "nova".to_string(),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        store
            .append(NewUsage {
                identity_id: issued.identity.id.clone(),
                endpoint: "/v1/tts".to_string(),
                character_count: 42,
                request_id: "req-1".to_string(),
            })
            .await
            .unwrap();
        (issued.identity.credential, voice.id)
    };

    let store: SharedStore = Arc::new(SqliteStore::open(&db_path, clock.clone()).unwrap());
    let voices = VoiceRegistry::new(store.clone());
    assert_eq!(voices.seed_defaults().await.unwrap(), 0);

    let mut config = test_config();
    config.db_path = db_path.clone();
    let state = AppState::with_parts(config, store, clock, Arc::new(MockSynthesizer::new()));
    let app = routes::api::create_api_router(state);

    let usage = send(&app, get_request("/v1/usage", Some(&credential))).await;
    assert_eq!(usage.status, StatusCode::OK);
    assert_eq!(usage.json()["total"]["characters"], 42);
    assert_eq!(usage.json()["total"]["requests"], 1);

    let listed = send(&app, get_request("/v1/voices", Some(&credential))).await.json();
    let ids: Vec<&str> = listed["voices"]
        .as_array()
        .unwrap()
        .iter()
        .filter_map(|v| v["voice_id"].as_str())
        .collect();
    assert_eq!(ids.len(), 5);
    assert_eq!(ids[4], voice_id);

    let response = send(
        &app,
        json_request(
            Method::POST,
            "/v1/tts",
            Some(&credential),
            &json!({"text": "still here", "voice_id": voice_id}),
        ),
    )
    .await;
    assert_eq!(response.status, StatusCode::OK);

    let usage = send(&app, get_request("/v1/usage", Some(&credential))).await.json();
    assert_eq!(usage["total"]["characters"], 52);
    assert_eq!(usage["total"]["requests"], 2);
}
