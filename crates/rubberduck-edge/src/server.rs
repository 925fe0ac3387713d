//! Edge HTTP server.
//!
//! Exposes:
//! - `POST /api/debug` -> relay `/debug`
//! - `POST /api/generate-docs` -> relay `/generate-docs`
//! - `GET /health`

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use axum::body::{Body, Bytes};
use axum::extract::{ConnectInfo, FromRequest, Request, State};
use axum::http::{header, HeaderMap, HeaderName, HeaderValue, Method, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use rubberduck_types::{CLIENT_ADDRESS_HEADER, SERVICE_KEY_HEADER};
use secrecy::ExposeSecret;
use serde::Serialize;
use tokio::net::TcpListener;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{debug, info, warn};

use crate::{EdgeConfig, EdgeError};

/// Response headers copied from the relay onto the forwarded response.
const FORWARDED_HEADERS: [HeaderName; 3] = [
    header::CONTENT_TYPE,
    header::CACHE_CONTROL,
    header::RETRY_AFTER,
];

struct EdgeState {
    config: EdgeConfig,
    client: reqwest::Client,
    start_time: Instant,
}

#[derive(Debug, Serialize)]
struct HealthResponse {
    status: &'static str,
    uptime_secs: u64,
    version: &'static str,
    relay: String,
}

pub struct EdgeServer {
    config: EdgeConfig,
}

impl EdgeServer {
    pub fn new(config: EdgeConfig) -> Self {
        Self { config }
    }

    pub fn router(&self) -> Result<Router> {
        // No total timeout: a response stream lives as long as the model keeps talking.
        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(self.config.connect_timeout_secs))
            .build()
            .context("failed to build relay client")?;

        let state = Arc::new(EdgeState {
            config: self.config.clone(),
            client,
            start_time: Instant::now(),
        });

        Ok(Router::new()
            .route("/api/debug", post(debug_handler))
            .route("/api/generate-docs", post(generate_docs_handler))
            .route("/health", get(health_handler))
            .with_state(state)
            .layer(cors_layer(self.config.allowed_origin.as_deref()))
            .layer(TraceLayer::new_for_http()))
    }

    pub async fn start(&self) -> Result<()> {
        let app = self.router()?;
        let addr = self.config.bind_addr();
        let listener = TcpListener::bind(&addr)
            .await
            .with_context(|| format!("failed to bind {}", addr))?;

        info!(
            addr = %addr,
            relay = self.config.server_url_trimmed(),
            "rubberduck-edge listening"
        );

        axum::serve(
            listener,
            app.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .await
        .context("server error")?;
        Ok(())
    }
}

fn cors_layer(allowed_origin: Option<&str>) -> CorsLayer {
    let Some(origin) = allowed_origin else {
        return CorsLayer::permissive();
    };

    let layer = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE]);

    match HeaderValue::from_str(origin) {
        Ok(value) => layer.allow_origin(value),
        Err(_) => {
            warn!(origin, "ALLOWED_ORIGIN is not a valid header value; cross-origin requests disabled");
            layer
        }
    }
}

async fn health_handler(State(state): State<Arc<EdgeState>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        uptime_secs: state.start_time.elapsed().as_secs(),
        version: env!("CARGO_PKG_VERSION"),
        relay: state.config.server_url_trimmed().to_string(),
    })
}

async fn debug_handler(State(state): State<Arc<EdgeState>>, request: Request) -> Response {
    forward(&state, "/debug", request).await
}

async fn generate_docs_handler(State(state): State<Arc<EdgeState>>, request: Request) -> Response {
    forward(&state, "/generate-docs", request).await
}

/// Address of the browser behind this request: the socket peer, or the first
/// `x-forwarded-for` hop when the edge itself sits behind a trusted proxy.
fn client_address(headers: &HeaderMap, peer: Option<SocketAddr>, trust_proxy_headers: bool) -> Option<String> {
    if trust_proxy_headers {
        let forwarded = headers
            .get("x-forwarded-for")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.split(',').next())
            .map(str::trim)
            .filter(|v| !v.is_empty());
        if let Some(addr) = forwarded {
            return Some(addr.to_string());
        }
    }
    peer.map(|addr| addr.ip().to_string())
}

/// Re-issue the request to the relay and pipe its response back unchanged,
/// except for a 429 which is rewritten into the user-facing slow-down message.
async fn forward(state: &EdgeState, route: &'static str, request: Request) -> Response {
    let peer = request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|info| info.0);
    let client = client_address(request.headers(), peer, state.config.trust_proxy_headers);

    let body = match Bytes::from_request(request, &()).await {
        Ok(body) => body,
        Err(rejection) => return rejection.into_response(),
    };

    let url = format!("{}{}", state.config.server_url_trimmed(), route);
    let mut upstream_request = state
        .client
        .post(&url)
        .header(header::CONTENT_TYPE, "application/json")
        .body(body);
    if let Some(key) = &state.config.service_key {
        upstream_request = upstream_request.header(SERVICE_KEY_HEADER, key.expose_secret());
    }
    if let Some(client) = &client {
        upstream_request = upstream_request.header(CLIENT_ADDRESS_HEADER, client.as_str());
    }

    let upstream = match upstream_request.send().await {
        Ok(upstream) => upstream,
        Err(e) => {
            warn!(route, error = %e, "relay unreachable");
            return EdgeError::RelayUnreachable(e.to_string()).into_response();
        }
    };

    let status = upstream.status();
    if status == StatusCode::TOO_MANY_REQUESTS {
        debug!(route, client = ?client, "relay rate limited request");
        return EdgeError::RateLimited {
            retry_after: upstream.headers().get(header::RETRY_AFTER).cloned(),
        }
        .into_response();
    }

    let mut headers = HeaderMap::new();
    for name in FORWARDED_HEADERS {
        if let Some(value) = upstream.headers().get(&name) {
            headers.insert(name, value.clone());
        }
    }
    debug!(route, status = status.as_u16(), "forwarding relay response");

    (status, headers, Body::from_stream(upstream.bytes_stream())).into_response()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_address_uses_peer_by_default() {
        let mut headers = HeaderMap::new();
        headers.insert("x-forwarded-for", HeaderValue::from_static("198.51.100.7"));
        let peer: SocketAddr = "192.0.2.1:4000".parse().unwrap();

        assert_eq!(client_address(&headers, Some(peer), false).as_deref(), Some("192.0.2.1"));
        assert_eq!(client_address(&headers, Some(peer), true).as_deref(), Some("198.51.100.7"));
        assert_eq!(client_address(&HeaderMap::new(), None, true), None);
    }
}
