//! End-to-end tests for the HTTP API: upload, fetch, search, and the
//! delayed-call gate.

#![allow(clippy::panic, clippy::expect_used, clippy::unwrap_used)]

use std::sync::Arc;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use serde_json::{Value, json};
use tower::ServiceExt;

use radiocast_core::config::Config;
use radiocast_core::db::unix_millis;
use radiocast_core::encoding::base64_encode;
use radiocast_server::api::{AppState, build_router};
use radiocast_server::controller::Controller;
use radiocast_server::storage::Database;

/// System 1 carries no delay, system 5 holds calls for two minutes.
/// `reader-key` sees everything, `scoped-key` only system 1.
const CONFIG_JSON: &str = r#"{
    "server": { "ingest_keys": ["ingest-secret"] },
    "delay": { "default_minutes": 0 },
    "systems": [
        { "ref_id": 1, "talkgroups": [{ "ref_id": 10 }] },
        { "ref_id": 5, "delay": 2 }
    ],
    "users": [
        { "api_key": "reader-key", "name": "reader", "access": "*" },
        { "api_key": "scoped-key", "name": "scoped", "access": [{ "id": 1 }] }
    ]
}"#;

async fn app() -> axum::Router {
    let db = Database::open_in_memory().await.unwrap();
    let config: Arc<Config> = Arc::new(serde_json::from_str(CONFIG_JSON).unwrap());
    let controller = Arc::new(Controller::new(db, config));
    build_router(AppState { controller })
}

fn upload_body(key: &str, system: u32, talkgroup: u32, timestamp_ms: i64) -> String {
    json!({
        "key": key,
        "system": system,
        "talkgroup": talkgroup,
        "timestamp_ms": timestamp_ms,
        "audio": base64_encode(b"pcm-bytes"),
        "audio_mime": "audio/mpeg",
    })
    .to_string()
}

async fn post_json(app: &axum::Router, uri: &str, body: String) -> (StatusCode, Value) {
    let resp = app
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri(uri)
                .header("content-type", "application/json")
                .body(Body::from(body))
                .unwrap(),
        )
        .await
        .unwrap();
    let status = resp.status();
    let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX)
        .await
        .unwrap();
    let value = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, value)
}

async fn get(app: &axum::Router, uri: &str) -> (StatusCode, Value) {
    let resp = app
        .clone()
        .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
        .await
        .unwrap();
    let status = resp.status();
    let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX)
        .await
        .unwrap();
    let value = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, value)
}

/// Upload a call transmitted at the given instant and return its
/// assigned id.
async fn upload_at(app: &axum::Router, system: u32, talkgroup: u32, timestamp_ms: i64) -> i64 {
    let (status, body) = post_json(
        app,
        "/api/call-upload",
        upload_body("ingest-secret", system, talkgroup, timestamp_ms),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    body["id"].as_i64().unwrap()
}

/// Upload a freshly transmitted call and return its assigned id.
async fn upload(app: &axum::Router, system: u32, talkgroup: u32) -> i64 {
    upload_at(app, system, talkgroup, unix_millis()).await
}

#[tokio::test]
async fn upload_then_fetch_roundtrip() {
    let app = app().await;
    let id = upload(&app, 1, 10).await;

    let (status, body) = get(&app, &format!("/api/call/{id}?key=reader-key")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["id"].as_i64().unwrap(), id);
    assert_eq!(body["system"], 1);
    assert_eq!(body["talkgroup"], 10);
    assert_eq!(body["audio"], base64_encode(b"pcm-bytes"));
}

#[tokio::test]
async fn upload_rejects_unknown_ingest_key() {
    let app = app().await;
    let (status, _) = post_json(
        &app,
        "/api/call-upload",
        upload_body("wrong-secret", 1, 10, unix_millis()),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn upload_rejects_invalid_audio_encoding() {
    let app = app().await;
    let body = json!({
        "key": "ingest-secret",
        "system": 1,
        "talkgroup": 10,
        "timestamp_ms": unix_millis(),
        "audio": "not base64!!",
        "audio_mime": "audio/mpeg",
    })
    .to_string();
    let (status, _) = post_json(&app, "/api/call-upload", body).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn fetch_rejects_unknown_api_key() {
    let app = app().await;
    let id = upload(&app, 1, 10).await;

    let (status, _) = get(&app, &format!("/api/call/{id}?key=nope")).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn fetch_unknown_call_returns_404() {
    let app = app().await;
    let (status, _) = get(&app, "/api/call/9999?key=reader-key").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn delayed_call_returns_too_early() {
    let app = app().await;
    // System 5 holds fresh calls for two minutes.
    let id = upload(&app, 5, 200).await;

    let (status, body) = get(&app, &format!("/api/call/{id}?key=reader-key")).await;
    assert_eq!(status, StatusCode::TOO_EARLY);
    assert_eq!(body["status"], "delayed");
}

#[tokio::test]
async fn delayed_call_is_served_once_its_delay_has_elapsed() {
    let app = app().await;
    // Same delayed talkgroup as above, but transmitted three minutes
    // ago: the two-minute hold has already run out at ingest time.
    let id = upload_at(&app, 5, 200, unix_millis() - 3 * 60_000).await;

    let (status, body) = get(&app, &format!("/api/call/{id}?key=reader-key")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["id"].as_i64().unwrap(), id);
    assert_eq!(body["system"], 5);
    assert_eq!(body["talkgroup"], 200);
    assert_eq!(body["audio"], base64_encode(b"pcm-bytes"));

    // Released calls show up in the listing as well.
    let (status, body) = get(&app, "/api/calls?key=reader-key").await;
    assert_eq!(status, StatusCode::OK);
    let ids: Vec<i64> = body["calls"]
        .as_array()
        .unwrap()
        .iter()
        .map(|c| c["id"].as_i64().unwrap())
        .collect();
    assert_eq!(ids, vec![id]);
}

#[tokio::test]
async fn search_excludes_delayed_calls() {
    let app = app().await;
    let visible = upload(&app, 1, 10).await;
    let held = upload(&app, 5, 200).await;

    let (status, body) = get(&app, "/api/calls?key=reader-key").await;
    assert_eq!(status, StatusCode::OK);
    let ids: Vec<i64> = body["calls"]
        .as_array()
        .unwrap()
        .iter()
        .map(|c| c["id"].as_i64().unwrap())
        .collect();
    assert!(ids.contains(&visible));
    assert!(!ids.contains(&held));
}

#[tokio::test]
async fn search_filters_by_system() {
    let app = app().await;
    let in_one = upload(&app, 1, 10).await;
    let in_two = upload(&app, 2, 20).await;

    let (status, body) = get(&app, "/api/calls?key=reader-key&system=2").await;
    assert_eq!(status, StatusCode::OK);
    let ids: Vec<i64> = body["calls"]
        .as_array()
        .unwrap()
        .iter()
        .map(|c| c["id"].as_i64().unwrap())
        .collect();
    assert_eq!(ids, vec![in_two]);
    assert!(!ids.contains(&in_one));
}

#[tokio::test]
async fn scoped_key_cannot_see_other_systems() {
    let app = app().await;
    // System 2 is unconfigured, so it carries no delay.
    let id = upload(&app, 2, 20).await;

    let (status, _) = get(&app, &format!("/api/call/{id}?key=scoped-key")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = get(&app, &format!("/api/call/{id}?key=reader-key")).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn scoped_search_only_lists_visible_systems() {
    let app = app().await;
    let in_scope = upload(&app, 1, 10).await;
    let out_of_scope = upload(&app, 2, 20).await;

    let (status, body) = get(&app, "/api/calls?key=scoped-key").await;
    assert_eq!(status, StatusCode::OK);
    let ids: Vec<i64> = body["calls"]
        .as_array()
        .unwrap()
        .iter()
        .map(|c| c["id"].as_i64().unwrap())
        .collect();
    assert_eq!(ids, vec![in_scope]);
    assert!(!ids.contains(&out_of_scope));
}
