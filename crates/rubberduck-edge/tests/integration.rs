//! Edge forwarder against a live relay backed by the mock completion client.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use rubberduck_edge::{EdgeConfig, EdgeServer};
use rubberduck_relay::relay::error_marker;
use rubberduck_relay::testing::{MockCompletionClient, MockFailure};
use rubberduck_relay::{RelayConfig, RelayServer};
use serde_json::json;
use tokio::net::TcpListener;

async fn serve(app: Router) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(
            listener,
            app.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .await
        .unwrap();
    });
    format!("http://127.0.0.1:{}", addr.port())
}

async fn start_relay(config: RelayConfig, client: Arc<MockCompletionClient>) -> String {
    serve(RelayServer::new(config, client).router()).await
}

async fn start_edge(config: EdgeConfig) -> String {
    serve(EdgeServer::new(config).router().unwrap()).await
}

async fn post(base_url: &str, route: &str, body: serde_json::Value) -> reqwest::Response {
    reqwest::Client::new()
        .post(format!("{}{}", base_url, route))
        .json(&body)
        .send()
        .await
        .unwrap()
}

#[tokio::test]
async fn test_stream_passes_through_with_service_key() {
    let client = Arc::new(MockCompletionClient::new(&["Quack", ", ", "quack."]));
    let relay = start_relay(RelayConfig::default().with_service_key("s3cret"), client.clone()).await;
    let edge = start_edge(
        EdgeConfig::default()
            .with_server_url(relay)
            .with_service_key("s3cret"),
    )
    .await;

    let resp = post(&edge, "/api/debug", json!({"code": "x", "persona": "duck"})).await;
    assert_eq!(resp.status(), 200);
    assert_eq!(resp.headers()["content-type"], "text/plain; charset=utf-8");
    assert_eq!(resp.text().await.unwrap(), "Quack, quack.");
    assert_eq!(client.call_count(), 1);
}

#[tokio::test]
async fn test_generate_docs_route_is_forwarded() {
    let client = Arc::new(MockCompletionClient::new(&["/** doc */"]));
    let relay = start_relay(RelayConfig::default(), client.clone()).await;
    let edge = start_edge(EdgeConfig::default().with_server_url(relay)).await;

    let resp = post(&edge, "/api/generate-docs", json!({"code": "fn f() {}"})).await;
    assert_eq!(resp.status(), 200);
    assert_eq!(resp.text().await.unwrap(), "/** doc */");

    let (system, _) = client.last_request().unwrap();
    assert_eq!(system, rubberduck_types::Persona::DocWriter.system_prompt());
}

#[tokio::test]
async fn test_missing_service_key_passes_through_401() {
    let client = Arc::new(MockCompletionClient::new(&["never"]));
    let relay = start_relay(RelayConfig::default().with_service_key("s3cret"), client.clone()).await;
    let edge = start_edge(EdgeConfig::default().with_server_url(relay)).await;

    let resp = post(&edge, "/api/debug", json!({"code": "x"})).await;
    assert_eq!(resp.status(), 401);
    assert_eq!(client.call_count(), 0);
}

#[tokio::test]
async fn test_validation_errors_pass_through() {
    let client = Arc::new(MockCompletionClient::new(&["never"]));
    let relay = start_relay(RelayConfig::default(), client).await;
    let edge = start_edge(EdgeConfig::default().with_server_url(relay)).await;

    let resp = post(&edge, "/api/debug", json!({"code": "x", "persona": "pirate"})).await;
    assert_eq!(resp.status(), 400);
    let body: serde_json::Value = resp.json().await.unwrap();
    assert!(body["error"].as_str().unwrap().starts_with("invalid persona"));
}

#[tokio::test]
async fn test_rate_limit_translated_to_slow_down_message() {
    let client = Arc::new(MockCompletionClient::new(&["ok"]));
    let relay = start_relay(
        RelayConfig::default().with_rate_limit(1, Duration::from_secs(60)),
        client,
    )
    .await;
    let edge = start_edge(EdgeConfig::default().with_server_url(relay)).await;

    assert_eq!(post(&edge, "/api/debug", json!({"code": "x"})).await.status(), 200);

    let resp = post(&edge, "/api/debug", json!({"code": "x"})).await;
    assert_eq!(resp.status(), 429);
    assert!(resp.headers().contains_key("retry-after"));
    let body: serde_json::Value = resp.json().await.unwrap();
    assert_eq!(body["error"], "You are chatting too fast! Slow down.");
}

#[tokio::test]
async fn test_each_browser_gets_its_own_rate_limit() {
    let client = Arc::new(MockCompletionClient::new(&["ok"]));
    let relay = start_relay(RelayConfig::default().with_service_key("s3cret"), client.clone()).await;
    let edge = start_edge(
        EdgeConfig::default()
            .with_server_url(relay)
            .with_service_key("s3cret")
            .with_trust_proxy_headers(true),
    )
    .await;

    let send = |addr: &'static str| {
        reqwest::Client::new()
            .post(format!("{}/api/debug", edge))
            .header("x-forwarded-for", addr)
            .json(&json!({"code": "x"}))
            .send()
    };

    for i in 0..5 {
        let resp = send("198.51.100.1").await.unwrap();
        assert_eq!(resp.status(), 200, "request {} from browser A should pass", i + 1);
    }
    assert_eq!(send("198.51.100.1").await.unwrap().status(), 429);

    let resp = send("203.0.113.99").await.unwrap();
    assert_eq!(resp.status(), 200);
    assert_eq!(resp.text().await.unwrap(), "ok");
    assert_eq!(client.call_count(), 6);
}

#[tokio::test]
async fn test_chunks_arrive_before_upstream_finishes() {
    let chunks = vec!["tick "; 20];
    let client = Arc::new(
        MockCompletionClient::new(&chunks).with_chunk_delay(Duration::from_millis(50)),
    );
    let relay = start_relay(RelayConfig::default(), client.clone()).await;
    let edge = start_edge(EdgeConfig::default().with_server_url(relay)).await;

    let mut resp = post(&edge, "/api/debug", json!({"code": "x"})).await;
    assert_eq!(resp.status(), 200);
    let first = resp.chunk().await.unwrap().unwrap();
    assert!(!first.is_empty());
    assert!(client.chunks_sent() < 20);

    let mut total = first.len();
    while let Some(chunk) = resp.chunk().await.unwrap() {
        total += chunk.len();
    }
    assert_eq!(total, "tick ".len() * 20);
}

#[tokio::test]
async fn test_browser_disconnect_releases_upstream() {
    let chunks = vec!["tick "; 200];
    let client = Arc::new(
        MockCompletionClient::new(&chunks).with_chunk_delay(Duration::from_millis(20)),
    );
    let relay = start_relay(RelayConfig::default(), client.clone()).await;
    let edge = start_edge(EdgeConfig::default().with_server_url(relay)).await;

    let mut resp = post(&edge, "/api/debug", json!({"code": "x"})).await;
    assert_eq!(resp.status(), 200);
    assert!(resp.chunk().await.unwrap().is_some());
    drop(resp);

    client.wait_until_released().await;
    assert!(client.was_cancelled());
    assert!(client.chunks_sent() < 200);
}

#[tokio::test]
async fn test_mid_stream_marker_passes_through() {
    let client = Arc::new(
        MockCompletionClient::new(&["Par", "tial"])
            .then_fail(MockFailure::Upstream("connection reset".into())),
    );
    let relay = start_relay(RelayConfig::default(), client).await;
    let edge = start_edge(EdgeConfig::default().with_server_url(relay)).await;

    let resp = post(&edge, "/api/debug", json!({"code": "x"})).await;
    assert_eq!(resp.status(), 200);
    assert_eq!(
        resp.text().await.unwrap(),
        format!(
            "Partial{}",
            error_marker("upstream provider failed; response truncated")
        )
    );
}

#[tokio::test]
async fn test_cors_allows_only_configured_origin() {
    let edge = start_edge(
        EdgeConfig::default()
            .with_server_url("http://relay:3001")
            .with_allowed_origin("https://duck.example"),
    )
    .await;

    let preflight = |origin: &'static str| {
        reqwest::Client::new()
            .request(reqwest::Method::OPTIONS, format!("{}/api/debug", edge))
            .header("origin", origin)
            .header("access-control-request-method", "POST")
            .header("access-control-request-headers", "content-type")
            .send()
    };

    let resp = preflight("https://duck.example").await.unwrap();
    assert_eq!(
        resp.headers()["access-control-allow-origin"],
        "https://duck.example"
    );

    let resp = preflight("https://evil.example").await.unwrap();
    assert!(!resp.headers().contains_key("access-control-allow-origin"));
}

#[tokio::test]
async fn test_unreachable_relay_returns_502() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    drop(listener);

    let edge = start_edge(
        EdgeConfig::default().with_server_url(format!("http://127.0.0.1:{}", port)),
    )
    .await;

    let resp = post(&edge, "/api/debug", json!({"code": "x"})).await;
    assert_eq!(resp.status(), 502);
}

#[tokio::test]
async fn test_health() {
    let edge = start_edge(EdgeConfig::default().with_server_url("http://relay:3001/")).await;

    let body: serde_json::Value = reqwest::get(format!("{}/health", edge))
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(body["status"], "ok");
    assert_eq!(body["relay"], "http://relay:3001");
    assert!(body["uptime_secs"].is_u64());
}
