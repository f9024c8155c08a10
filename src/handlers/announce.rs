use crate::core::error::AnnounceError;
use crate::core::state::AppState;
use crate::session::entry::SessionEntry;
use crate::session::registry::SessionState;
use crate::validation::params::{AnnounceEvent, AnnounceQuery};
use axum::{
    extract::State,
    http::StatusCode,
    response::Response,
};
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

/// Main announce handler
///
/// The local BitTorrent client believes it is talking to its tracker.
/// In reality the first "started" announce per infohash is forwarded
/// upstream exactly once; everything after that is answered from the
/// cached response while the synthetic counters tick forward. Nothing
/// the client reports about its own transfer is read or forwarded.
#[instrument(skip(state, raw_query))]
pub async fn announce_handler(
    State(state): State<Arc<AppState>>,
    axum::extract::RawQuery(raw_query): axum::extract::RawQuery,
) -> Result<Response, AnnounceError> {
    let query_str = raw_query.ok_or_else(|| {
        warn!("Missing query string - browser access");
        AnnounceError::BrowserAccess
    })?;

    let params = AnnounceQuery::parse(&query_str).map_err(|e| {
        warn!(error = %e, "Announce parameter validation failed");
        AnnounceError::from(e)
    })?;

    let info_hash_hex = hex::encode(params.info_hash);
    debug!(info_hash = %info_hash_hex, event = ?params.event, "Processing announce");

    let slot = state.registry.slot(params.info_hash);
    let mut guard = slot.lock().await;

    // Existing session: answer from cache, advancing or transitioning
    if let Some(body) = guard.serve(params.event, state.config.fake.base_rate) {
        if let Some(entry) = guard.entry() {
            debug!(
                info_hash = %info_hash_hex,
                state = guard.name(),
                downloaded = entry.downloaded,
                left = entry.left,
                "Serving cached announce response"
            );
        }
        return Ok(peers_response(body));
    }

    // Unknown infohash: only a "started" announce may bootstrap
    if params.event != Some(AnnounceEvent::Started) {
        warn!(
            info_hash = %info_hash_hex,
            event = ?params.event,
            "Announce for unknown torrent without started event"
        );
        return Ok(peers_response(Vec::new()));
    }

    let total_size = params
        .total_size
        .ok_or_else(|| AnnounceError::MissingParameter("total_size".to_string()))?;
    let upstream = params
        .upstream
        .clone()
        .ok_or_else(|| AnnounceError::MissingParameter("orig_tracker".to_string()))?;

    // Claim the bootstrap. The slot lock stays held for the duration of
    // the upstream fetch: concurrent announces for this infohash queue
    // behind it and then find the cache, other infohashes are untouched.
    *guard = SessionState::Bootstrapping;

    let mut entry = SessionEntry::new(
        params.info_hash,
        total_size,
        upstream,
        state.config.fake.session_rate_floor,
        state.config.fake.session_rate_ceiling,
    );

    info!(
        info_hash = %info_hash_hex,
        total_size,
        upstream = %entry.upstream,
        max_rate = entry.max_rate,
        "Bootstrapping session against upstream tracker"
    );

    match state.fetcher.bootstrap(&entry, &state.identity).await {
        Ok(body) => {
            entry.cached_peers = body.clone();
            *guard = SessionState::Cached(entry);

            info!(
                info_hash = %info_hash_hex,
                response_bytes = body.len(),
                "Bootstrap succeeded, session cached"
            );

            // The upstream response already reflects zero progress, so
            // this first serve does not advance the counters.
            Ok(peers_response(body))
        }
        Err(e) => {
            *guard = SessionState::Absent;

            warn!(
                info_hash = %info_hash_hex,
                error = %e,
                "Bootstrap failed, serving empty response; client re-announce will retry"
            );

            Ok(peers_response(Vec::new()))
        }
    }
}

/// Wrap cached (or empty) response bytes in an HTTP response
fn peers_response(body: Vec<u8>) -> Response {
    Response::builder()
        .status(StatusCode::OK)
        .header("Content-Type", "text/plain")
        .body(body.into())
        .unwrap()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::config::Config;
    use crate::session::identity::ProcessSession;
    use crate::upstream::fetcher::BootstrapFetcher;
    use axum::extract::RawQuery;
    use flate2::write::GzEncoder;
    use flate2::Compression;
    use http_body_util::BodyExt;
    use std::io::Write;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    // [0x11; 20], percent-encoded
    const HASH: &str = "%11%11%11%11%11%11%11%11%11%11%11%11%11%11%11%11%11%11%11%11";

    fn test_state() -> Arc<AppState> {
        let config = Config::default();
        let fetcher = BootstrapFetcher::new(&config).unwrap();
        let identity = ProcessSession::generate(config.client.port);

        Arc::new(AppState::new(config, fetcher, identity))
    }

    async fn body_bytes(response: Response) -> Vec<u8> {
        response
            .into_body()
            .collect()
            .await
            .unwrap()
            .to_bytes()
            .to_vec()
    }

    async fn call(state: &Arc<AppState>, query: &str) -> Result<Response, AnnounceError> {
        announce_handler(State(Arc::clone(state)), RawQuery(Some(query.to_string()))).await
    }

    fn seed_cached(state: &Arc<AppState>, peers: &[u8]) {
        let slot = state.registry.slot([0x11u8; 20]);
        let mut entry = SessionEntry::new(
            [0x11u8; 20],
            4096,
            "http://t.example/ann".to_string(),
            512 * 1024,
            5120 * 1024,
        );
        entry.cached_peers = peers.to_vec();
        *slot.try_lock().unwrap() = SessionState::Cached(entry);
    }

    /// Minimal HTTP server answering one request with a gzip bencode body
    async fn fake_tracker(payload: &'static [u8]) -> u16 {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();

        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();

            let mut buf = [0u8; 4096];
            let _ = socket.read(&mut buf).await;

            let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
            encoder.write_all(payload).unwrap();
            let gz = encoder.finish().unwrap();

            let head = format!(
                "HTTP/1.1 200 OK\r\nContent-Type: text/plain\r\n\
                 Content-Length: {}\r\nConnection: close\r\n\r\n",
                gz.len()
            );
            socket.write_all(head.as_bytes()).await.unwrap();
            socket.write_all(&gz).await.unwrap();
        });

        port
    }

    /// Like `fake_tracker`, but keeps accepting and counts connections
    async fn counting_tracker(
        payload: &'static [u8],
        hits: Arc<std::sync::atomic::AtomicUsize>,
    ) -> u16 {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();

        tokio::spawn(async move {
            loop {
                let (mut socket, _) = match listener.accept().await {
                    Ok(conn) => conn,
                    Err(_) => break,
                };
                hits.fetch_add(1, std::sync::atomic::Ordering::SeqCst);

                let mut buf = [0u8; 4096];
                let _ = socket.read(&mut buf).await;

                let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
                encoder.write_all(payload).unwrap();
                let gz = encoder.finish().unwrap();

                let head = format!(
                    "HTTP/1.1 200 OK\r\nContent-Type: text/plain\r\n\
                     Content-Length: {}\r\nConnection: close\r\n\r\n",
                    gz.len()
                );
                socket.write_all(head.as_bytes()).await.unwrap();
                socket.write_all(&gz).await.unwrap();
            }
        });

        port
    }

    #[tokio::test]
    async fn test_missing_query_is_browser_access() {
        let state = test_state();

        let result = announce_handler(State(state), RawQuery(None)).await;
        assert!(matches!(result, Err(AnnounceError::BrowserAccess)));
    }

    #[tokio::test]
    async fn test_cached_session_is_served_and_advances() {
        let state = test_state();
        let peers = b"d8:completei5e10:incompletei3e8:intervali1800e5:peers6:\x01\x02\x03\x04\x1a\xe1e";
        seed_cached(&state, peers);

        let response = call(&state, &format!("info_hash={HASH}")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_bytes(response).await, peers);

        // Counters moved, but the body never changes
        let slot = state.registry.slot([0x11u8; 20]);
        let guard = slot.try_lock().unwrap();
        let entry = guard.entry().unwrap();
        assert!(entry.downloaded > 0);
        assert_eq!(entry.downloaded + entry.left, 4096);
    }

    #[tokio::test]
    async fn test_stopped_freezes_counters() {
        let state = test_state();
        seed_cached(&state, b"d8:intervali1800ee");

        call(&state, &format!("info_hash={HASH}")).await.unwrap();

        let after_tick = {
            let slot = state.registry.slot([0x11u8; 20]);
            let guard = slot.try_lock().unwrap();
            guard.entry().unwrap().downloaded
        };

        // "stopped" still gets the cached body, then stays frozen
        let response = call(&state, &format!("info_hash={HASH}&event=stopped"))
            .await
            .unwrap();
        assert_eq!(body_bytes(response).await, b"d8:intervali1800ee");

        call(&state, &format!("info_hash={HASH}&event=stopped"))
            .await
            .unwrap();

        let slot = state.registry.slot([0x11u8; 20]);
        let guard = slot.try_lock().unwrap();
        assert_eq!(guard.name(), "stopped");
        assert_eq!(guard.entry().unwrap().downloaded, after_tick);
    }

    #[tokio::test]
    async fn test_unknown_hash_without_started_gets_empty_body() {
        let state = test_state();

        let response = call(&state, &format!("info_hash={HASH}")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert!(body_bytes(response).await.is_empty());

        // No session was created
        let slot = state.registry.slot([0x11u8; 20]);
        assert_eq!(slot.try_lock().unwrap().name(), "absent");
    }

    #[tokio::test]
    async fn test_started_without_extension_params_is_rejected() {
        let state = test_state();

        let result = call(&state, &format!("info_hash={HASH}&event=started")).await;
        assert!(matches!(result, Err(AnnounceError::MissingParameter(_))));
    }

    #[tokio::test]
    async fn test_malformed_info_hash_is_rejected() {
        let state = test_state();

        let result = call(&state, "info_hash=tooshort").await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_bootstrap_failure_reverts_to_absent() {
        let state = test_state();

        // Port 1 refuses connections, so the upstream fetch fails fast
        let query = format!(
            "info_hash={HASH}&event=started&total_size=4096\
             &orig_tracker=http%3A%2F%2F127.0.0.1%3A1%2Fann"
        );
        let response = call(&state, &query).await.unwrap();
        assert!(body_bytes(response).await.is_empty());

        let slot = state.registry.slot([0x11u8; 20]);
        assert_eq!(slot.try_lock().unwrap().name(), "absent");
    }

    #[tokio::test]
    async fn test_bootstrap_success_caches_upstream_body() {
        let payload: &[u8] = b"d8:completei9e8:intervali1800e5:peers6:\x7f\x00\x00\x01\x1a\xe1e";
        let port = fake_tracker(payload).await;

        let state = test_state();
        let query = format!(
            "info_hash={HASH}&event=started&total_size=4096\
             &orig_tracker=http%3A%2F%2F127.0.0.1%3A{port}%2Fann"
        );

        let response = call(&state, &query).await.unwrap();
        assert_eq!(body_bytes(response).await, payload);

        // Follow-up announces answer from cache without touching upstream;
        // the listener above only accepts a single connection.
        let response = call(&state, &format!("info_hash={HASH}")).await.unwrap();
        assert_eq!(body_bytes(response).await, payload);

        let slot = state.registry.slot([0x11u8; 20]);
        let guard = slot.try_lock().unwrap();
        assert_eq!(guard.name(), "cached");
        assert!(guard.entry().unwrap().downloaded > 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_started_announces_fetch_upstream_once() {
        use std::sync::atomic::{AtomicUsize, Ordering};

        let payload: &[u8] = b"d8:intervali1800e5:peers6:\x7f\x00\x00\x01\x1a\xe1e";
        let hits = Arc::new(AtomicUsize::new(0));
        let port = counting_tracker(payload, Arc::clone(&hits)).await;

        let state = test_state();
        let query = format!(
            "info_hash={HASH}&event=started&total_size=4096\
             &orig_tracker=http%3A%2F%2F127.0.0.1%3A{port}%2Fann"
        );

        let mut handles = Vec::new();
        for _ in 0..4 {
            let state = Arc::clone(&state);
            let query = query.clone();

            handles.push(tokio::spawn(async move {
                let response = call(&state, &query).await.unwrap();
                body_bytes(response).await
            }));
        }

        // Every announce gets the same upstream bytes, losers included
        for handle in handles {
            assert_eq!(handle.await.unwrap(), payload);
        }

        // The slot lock held across the fetch means upstream saw one
        // connection no matter how the announces raced
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }
}
