//! End-to-end announce flow through the real router.

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use ghostseed::core::config::Config;
use ghostseed::core::routes::build_router;
use ghostseed::core::state::AppState;
use ghostseed::session::entry::SessionEntry;
use ghostseed::session::identity::ProcessSession;
use ghostseed::session::registry::SessionState;
use ghostseed::torrent::rewrite::{rewrite_directory, rewrite_file};
use ghostseed::upstream::fetcher::BootstrapFetcher;
use ghostseed::utils::escape::url_encode;
use http_body_util::BodyExt;
use std::fs;
use std::sync::Arc;
use tower::ServiceExt;

const CACHED: &[u8] = b"d8:completei3e8:intervali1800e5:peers6:\x7f\x00\x00\x01\x1a\xe1e";

fn app() -> (Router, Arc<AppState>) {
    let config = Config::default();
    let fetcher = BootstrapFetcher::new(&config).unwrap();
    let identity = ProcessSession::generate(config.client.port);
    let state = Arc::new(AppState::new(config, fetcher, identity));

    (build_router(Arc::clone(&state)), state)
}

fn seed_cached(state: &Arc<AppState>, info_hash: [u8; 20]) {
    let mut entry = SessionEntry::new(
        info_hash,
        1_048_576,
        "http://t.example/ann".to_string(),
        512 * 1024,
        5120 * 1024,
    );
    entry.cached_peers = CACHED.to_vec();
    *state.registry.slot(info_hash).try_lock().unwrap() = SessionState::Cached(entry);
}

async fn get(app: &Router, uri: &str) -> (StatusCode, Vec<u8>) {
    let response = app
        .clone()
        .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
        .await
        .unwrap();

    let status = response.status();
    let body = response
        .into_body()
        .collect()
        .await
        .unwrap()
        .to_bytes()
        .to_vec();

    (status, body)
}

#[tokio::test]
async fn announce_serves_cached_response() {
    let (app, state) = app();
    let info_hash = [0x21u8; 20];
    seed_cached(&state, info_hash);

    let uri = format!("/announce?info_hash={}", url_encode(&info_hash));
    let (status, body) = get(&app, &uri).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, CACHED);

    // Every later announce repeats the exact same bytes
    let (_, again) = get(&app, &uri).await;
    assert_eq!(again, CACHED);
}

#[tokio::test]
async fn announce_without_info_hash_reports_failure_reason() {
    let (app, _state) = app();

    let (status, body) = get(&app, "/announce?event=started").await;

    assert_eq!(status, StatusCode::OK);
    assert!(body.starts_with(b"d14:failure reason"));
}

#[tokio::test]
async fn announce_unknown_torrent_gets_empty_body() {
    let (app, _state) = app();

    let uri = format!("/announce?info_hash={}", url_encode(&[0x33u8; 20]));
    let (status, body) = get(&app, &uri).await;

    assert_eq!(status, StatusCode::OK);
    assert!(body.is_empty());
}

#[tokio::test]
async fn health_counts_sessions() {
    let (app, state) = app();
    seed_cached(&state, [0x44u8; 20]);

    let (status, body) = get(&app, "/health").await;
    assert_eq!(status, StatusCode::OK);

    let health: serde_json::Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(health["status"], "ok");
    assert_eq!(health["sessions"], 1);
}

#[tokio::test]
async fn unknown_route_falls_back() {
    let (app, _state) = app();

    let (status, body) = get(&app, "/scrape").await;
    assert_eq!(status, StatusCode::OK);
    assert!(body.starts_with(b"d14:failure reason"));
}

#[tokio::test]
async fn rewritten_torrent_announces_through_the_router() {
    let dir = tempfile::tempdir().unwrap();

    // announce http://up.example/ann, single 2048-byte file
    let mut raw = Vec::new();
    raw.extend_from_slice(b"d8:announce21:http://up.example/ann");
    raw.extend_from_slice(b"4:infod6:lengthi2048e4:name4:file12:piece lengthi16384e6:pieces20:");
    raw.extend_from_slice(&[0xccu8; 20]);
    raw.extend_from_slice(b"ee");
    fs::write(dir.path().join("sample.torrent"), &raw).unwrap();

    let rewritten = rewrite_file(
        &dir.path().join("sample.torrent"),
        "http://127.0.0.1:1088/announce",
    )
    .unwrap();

    // The client announces to the URL embedded in the rewritten file.
    // With the upstream unreachable, the proxy answers an empty 200 and
    // leaves the slot absent so the next announce can retry.
    let (app, state) = app();
    let uri = format!(
        "/announce?info_hash={}&event=started&total_size={}&orig_tracker={}",
        url_encode(&rewritten.info_hash),
        rewritten.total_size,
        url_encode(b"http://127.0.0.1:1/ann"),
    );

    let (status, body) = get(&app, &uri).await;
    assert_eq!(status, StatusCode::OK);
    assert!(body.is_empty());

    let slot = state.registry.slot(rewritten.info_hash);
    assert_eq!(slot.try_lock().unwrap().name(), "absent");

    // A second pass over the directory leaves the rewritten file alone
    let summary = rewrite_directory(dir.path(), "http://127.0.0.1:1088/announce").unwrap();
    assert_eq!(summary.processed.len(), 0);
    assert_eq!(summary.skipped, 1);
}
