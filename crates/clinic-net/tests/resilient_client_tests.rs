//! Retry, refresh and connectivity behavior of the resilient client.

use std::sync::Arc;
use std::time::Duration;

use clinic_net::mock::{MemoryCredentialStore, ScriptedTransport, StaticTokenSource};
use clinic_net::{
    ConnectivityFlag, Credential, ErrorKind, RawResponse, RequestEnvelope, ResilientHttpClient,
    TokenProvider, TransportError,
};
use serde_json::json;
use tokio::time::Instant;

struct Harness {
    client: Arc<ResilientHttpClient>,
    transport: Arc<ScriptedTransport>,
    source: Arc<StaticTokenSource>,
    store: Arc<MemoryCredentialStore>,
    connectivity: Arc<ConnectivityFlag>,
}

fn harness(transport: ScriptedTransport, source: StaticTokenSource) -> Harness {
    let transport = Arc::new(transport);
    let source = Arc::new(source);
    let store = Arc::new(MemoryCredentialStore::default());
    let connectivity = Arc::new(ConnectivityFlag::default());
    let tokens = Arc::new(TokenProvider::new(source.clone(), store.clone()));
    let client = Arc::new(ResilientHttpClient::new(
        "http://clinic.test/api",
        transport.clone(),
        tokens,
        connectivity.clone(),
    ));
    Harness {
        client,
        transport,
        source,
        store,
        connectivity,
    }
}

#[tokio::test(start_paused = true)]
async fn test_server_errors_retry_three_times_with_backoff() {
    let h = harness(
        ScriptedTransport::new().respond_times(503, json!({"error": "unavailable"}), 10),
        StaticTokenSource::new(Some("tok")),
    );

    let started = Instant::now();
    let err = h
        .client
        .send(&RequestEnvelope::get("/appointments"))
        .await
        .unwrap_err();

    assert_eq!(err.kind, ErrorKind::ServerError);
    assert_eq!(err.status_code, Some(503));
    assert_eq!(h.transport.attempts(), 4);
    // 2s + 4s + 8s
    assert_eq!(started.elapsed(), Duration::from_secs(14));

    let counts: Vec<_> = h
        .transport
        .requests()
        .iter()
        .map(|r| r.header("X-Retry-Count").unwrap_or_default().to_string())
        .collect();
    assert_eq!(counts, vec!["0", "1", "2", "3"]);
}

#[tokio::test(start_paused = true)]
async fn test_retries_share_request_id() {
    let h = harness(
        ScriptedTransport::new()
            .respond(500, json!(null))
            .respond(502, json!(null))
            .respond(200, json!({"ok": true})),
        StaticTokenSource::new(Some("tok")),
    );

    let body = h
        .client
        .send(&RequestEnvelope::patch("/appointments/a1/vitals").with_body(json!({"pulse": 72})))
        .await
        .unwrap();
    assert_eq!(body, json!({"ok": true}));

    let ids: Vec<_> = h
        .transport
        .requests()
        .iter()
        .map(|r| r.header("X-Request-Id").unwrap_or_default().to_string())
        .collect();
    assert_eq!(ids.len(), 3);
    assert!(ids.iter().all(|id| id == &ids[0]));
}

#[tokio::test(start_paused = true)]
async fn test_client_errors_are_never_retried() {
    for (status, kind) in [
        (400u16, ErrorKind::ValidationError),
        (403, ErrorKind::PermissionDenied),
        (404, ErrorKind::NotFound),
        (409, ErrorKind::ValidationError),
        (422, ErrorKind::ValidationError),
        (429, ErrorKind::Unknown),
    ] {
        let h = harness(
            ScriptedTransport::new().respond_times(status, json!({"error": "nope"}), 5),
            StaticTokenSource::new(Some("tok")),
        );
        let started = Instant::now();
        let err = h.client.send(&RequestEnvelope::get("/x")).await.unwrap_err();

        assert_eq!(err.kind, kind, "status {}", status);
        assert_eq!(err.status_code, Some(status));
        assert_eq!(h.transport.attempts(), 1, "status {} retried", status);
        assert_eq!(started.elapsed(), Duration::ZERO);
    }
}

#[tokio::test(start_paused = true)]
async fn test_offline_fails_without_attempt_or_delay() {
    let h = harness(
        ScriptedTransport::new().respond(200, json!({})),
        StaticTokenSource::new(Some("tok")),
    );
    h.connectivity.set_online(false);

    let started = Instant::now();
    let err = h.client.send(&RequestEnvelope::get("/x")).await.unwrap_err();

    assert_eq!(err.kind, ErrorKind::NetworkUnavailable);
    assert_eq!(h.transport.attempts(), 0);
    assert_eq!(started.elapsed(), Duration::ZERO);
    assert_eq!(h.source.fetch_count(), 0);
}

#[tokio::test]
async fn test_missing_token_sends_unauthenticated() {
    let h = harness(
        ScriptedTransport::new().respond(200, json!([])),
        StaticTokenSource::new(None),
    );

    h.client.send(&RequestEnvelope::get("/appointments")).await.unwrap();
    assert!(h.transport.requests()[0].bearer().is_none());
}

#[tokio::test]
async fn test_unauthorized_refreshes_once_and_retries() {
    let h = harness(
        ScriptedTransport::new()
            .respond(401, json!({"error": "Unauthorized"}))
            .respond(200, json!({"_id": "a1"})),
        StaticTokenSource::new(Some("old")).refreshing_to("new"),
    );

    let body = h.client.send(&RequestEnvelope::get("/appointments/a1")).await.unwrap();
    assert_eq!(body, json!({"_id": "a1"}));
    assert_eq!(h.source.refresh_count(), 1);

    let requests = h.transport.requests();
    assert_eq!(requests[0].bearer(), Some("old"));
    assert_eq!(requests[1].bearer(), Some("new"));
    // The refresh retry does not spend a retry slot
    assert_eq!(requests[1].header("X-Retry-Count"), Some("0"));
    assert_eq!(h.store.snapshot().map(|c| c.token), Some("new".to_string()));
}

#[tokio::test]
async fn test_unauthorized_twice_expires_session_and_clears_store() {
    let h = harness(
        ScriptedTransport::new().respond_times(401, json!({"error": "Unauthorized"}), 3),
        StaticTokenSource::new(Some("old")).refreshing_to("new"),
    );

    let err = h.client.send(&RequestEnvelope::get("/x")).await.unwrap_err();
    assert_eq!(err.kind, ErrorKind::SessionExpired);
    assert_eq!(err.message, "Session expired. Please login again.");
    assert_eq!(h.transport.attempts(), 2);
    assert!(h.store.snapshot().is_none());
}

#[tokio::test]
async fn test_refresh_failure_expires_session() {
    let transport = ScriptedTransport::new().respond(401, json!(null));
    let source = StaticTokenSource::new(None);
    let transport = Arc::new(transport);
    let store = Arc::new(MemoryCredentialStore::with(Credential::new("persisted")));
    let tokens = Arc::new(TokenProvider::new(Arc::new(source), store.clone()));
    let client = ResilientHttpClient::new(
        "http://clinic.test/api",
        transport.clone(),
        tokens,
        Arc::new(ConnectivityFlag::default()),
    );

    let err = client.send(&RequestEnvelope::get("/x")).await.unwrap_err();
    assert_eq!(err.kind, ErrorKind::SessionExpired);
    assert!(err.cause.is_some());
    assert_eq!(transport.attempts(), 1);
    // Stale cold-start token is never reused
    assert!(store.snapshot().is_none());
}

#[tokio::test(start_paused = true)]
async fn test_concurrent_unauthorized_share_one_refresh() {
    let transport = ScriptedTransport::new().with_handler(|req| {
        if req.bearer() == Some("new") {
            Ok(RawResponse::new(200, json!({"ok": true})))
        } else {
            Ok(RawResponse::new(401, json!({"error": "Unauthorized"})))
        }
    });
    let h = harness(
        transport,
        StaticTokenSource::new(Some("old"))
            .refreshing_to("new")
            .with_refresh_delay(Duration::from_millis(200)),
    );

    let mut handles = Vec::new();
    for i in 0..5 {
        let client = h.client.clone();
        handles.push(tokio::spawn(async move {
            client
                .send(&RequestEnvelope::get(format!("/appointments/a{}", i)))
                .await
        }));
    }
    for handle in handles {
        let body = handle.await.unwrap().unwrap();
        assert_eq!(body, json!({"ok": true}));
    }

    assert_eq!(h.source.refresh_count(), 1);
    let retried: Vec<_> = h
        .transport
        .requests()
        .into_iter()
        .filter(|r| r.bearer() == Some("new"))
        .collect();
    assert_eq!(retried.len(), 5);
}

#[tokio::test(start_paused = true)]
async fn test_timeouts_retry_like_server_errors() {
    let h = harness(
        ScriptedTransport::new()
            .stall(Duration::from_secs(45))
            .stall(Duration::from_secs(45))
            .stall(Duration::from_secs(45))
            .stall(Duration::from_secs(45)),
        StaticTokenSource::new(Some("tok")),
    );

    let started = Instant::now();
    let err = h.client.send(&RequestEnvelope::get("/x")).await.unwrap_err();

    assert_eq!(err.kind, ErrorKind::ServerError);
    assert_eq!(err.message, "Request timed out");
    assert_eq!(h.transport.attempts(), 4);
    // 4 × 30s deadline + 14s backoff
    assert_eq!(started.elapsed(), Duration::from_secs(134));
}

#[tokio::test(start_paused = true)]
async fn test_dropped_connection_recovers() {
    let h = harness(
        ScriptedTransport::new()
            .fail(TransportError::Connect("reset".into()))
            .respond(200, json!({"ok": true})),
        StaticTokenSource::new(Some("tok")),
    );

    let body = h.client.send(&RequestEnvelope::get("/x")).await.unwrap();
    assert_eq!(body, json!({"ok": true}));
    assert_eq!(h.transport.attempts(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_dropped_connection_exhausts_to_network_unavailable() {
    let mut transport = ScriptedTransport::new();
    for _ in 0..4 {
        transport = transport.fail(TransportError::Connect("unreachable".into()));
    }
    let h = harness(transport, StaticTokenSource::new(Some("tok")));

    let err = h.client.send(&RequestEnvelope::get("/x")).await.unwrap_err();
    assert_eq!(err.kind, ErrorKind::NetworkUnavailable);
    assert_eq!(h.transport.attempts(), 4);
}

#[tokio::test(start_paused = true)]
async fn test_going_offline_between_retries_stops_early() {
    let h = harness(
        ScriptedTransport::new().respond_times(500, json!(null), 4),
        StaticTokenSource::new(Some("tok")),
    );
    let connectivity = h.connectivity.clone();
    let client = h.client.clone();

    let task = tokio::spawn(async move { client.send(&RequestEnvelope::get("/x")).await });
    // First backoff is 2s; drop connectivity inside it
    tokio::time::sleep(Duration::from_secs(1)).await;
    connectivity.set_online(false);

    let err = task.await.unwrap().unwrap_err();
    assert_eq!(err.kind, ErrorKind::NetworkUnavailable);
    assert_eq!(h.transport.attempts(), 1);
}
