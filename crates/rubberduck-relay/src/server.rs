//! Axum HTTP server.
//!
//! Exposes:
//! - `POST /debug`
//! - `POST /generate-docs`
//! - `GET /personas`
//! - `GET /health`

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use anyhow::{Context, Result};
use axum::body::{Body, Bytes};
use axum::extract::{ConnectInfo, DefaultBodyLimit, FromRequest, Request, State};
use axum::http::{header, HeaderName, HeaderValue, Method, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use rubberduck_providers::CompletionClient;
use rubberduck_types::{PersonaInfo, PERSONAS};
use serde::Serialize;
use tokio::net::TcpListener;
use tower_http::cors::CorsLayer;
use tower_http::set_header::SetResponseHeaderLayer;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use crate::admission::{
    Admission, Endpoint, InMemoryRateLimitStore, RateLimitStore, RateLimiter, SERVICE_KEY_HEADER,
};
use crate::relay::{Relay, RelayStream};
use crate::{RelayConfig, RelayError};

/// Upper bound on a request body. Well above 5000 characters of escaped JSON.
const MAX_BODY_BYTES: usize = 64 * 1024;

struct AppState {
    admission: Admission,
    relay: Relay,
    start_time: Instant,
}

#[derive(Debug, Serialize)]
struct HealthResponse {
    status: &'static str,
    uptime_secs: u64,
    open_mode: bool,
    version: &'static str,
}

pub struct RelayServer {
    config: RelayConfig,
    client: Arc<dyn CompletionClient>,
    rate_limit_store: Arc<dyn RateLimitStore>,
}

impl RelayServer {
    pub fn new(config: RelayConfig, client: Arc<dyn CompletionClient>) -> Self {
        let rate_limit_store = Arc::new(InMemoryRateLimitStore::new(config.rate_limit));
        Self {
            config,
            client,
            rate_limit_store,
        }
    }

    /// Swap the rate-limit counter store, e.g. for one shared across replicas.
    pub fn with_rate_limit_store(mut self, store: Arc<dyn RateLimitStore>) -> Self {
        self.rate_limit_store = store;
        self
    }

    pub fn router(&self) -> Router {
        let state = Arc::new(AppState {
            admission: Admission::new(
                self.config.service_key.clone(),
                RateLimiter::new(self.rate_limit_store.clone()),
                self.config.max_code_chars,
            )
            .with_trust_proxy_headers(self.config.trust_proxy_headers),
            relay: Relay::new(self.client.clone()),
            start_time: Instant::now(),
        });

        Router::new()
            .route("/debug", post(debug_handler))
            .route("/generate-docs", post(generate_docs_handler))
            .route("/personas", get(personas_handler))
            .route("/health", get(health_handler))
            .with_state(state)
            .layer(DefaultBodyLimit::max(MAX_BODY_BYTES))
            .layer(cors_layer(self.config.allowed_origin.as_deref()))
            .layer(SetResponseHeaderLayer::if_not_present(
                header::X_CONTENT_TYPE_OPTIONS,
                HeaderValue::from_static("nosniff"),
            ))
            .layer(SetResponseHeaderLayer::if_not_present(
                header::X_FRAME_OPTIONS,
                HeaderValue::from_static("DENY"),
            ))
            .layer(SetResponseHeaderLayer::if_not_present(
                header::REFERRER_POLICY,
                HeaderValue::from_static("no-referrer"),
            ))
            .layer(TraceLayer::new_for_http())
    }

    pub async fn start(&self) -> Result<()> {
        let app = self.router();
        let addr = self.config.bind_addr();
        let listener = TcpListener::bind(&addr)
            .await
            .with_context(|| format!("failed to bind {}", addr))?;

        info!(
            addr = %addr,
            model = self.client.model(),
            provider = self.client.provider(),
            "rubberduck-relay listening"
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
        .allow_headers([header::CONTENT_TYPE, HeaderName::from_static(SERVICE_KEY_HEADER)]);

    match HeaderValue::from_str(origin) {
        Ok(value) => layer.allow_origin(value),
        Err(_) => {
            warn!(origin, "ALLOWED_ORIGIN is not a valid header value; cross-origin requests disabled");
            layer
        }
    }
}

async fn health_handler(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        uptime_secs: state.start_time.elapsed().as_secs(),
        open_mode: state.admission.is_open(),
        version: env!("CARGO_PKG_VERSION"),
    })
}

async fn personas_handler() -> Json<Vec<PersonaInfo>> {
    Json(PERSONAS.iter().map(|p| p.info()).collect())
}

async fn debug_handler(State(state): State<Arc<AppState>>, request: Request) -> Response {
    handle_analysis(&state, Endpoint::Debug, request).await
}

async fn generate_docs_handler(State(state): State<Arc<AppState>>, request: Request) -> Response {
    handle_analysis(&state, Endpoint::GenerateDocs, request).await
}

async fn handle_analysis(state: &AppState, endpoint: Endpoint, request: Request) -> Response {
    let peer = request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|info| info.0);

    let client = match state.admission.admit_caller(request.headers(), peer) {
        Ok(client) => client,
        Err(err) => {
            warn!(
                route = endpoint.path(),
                peer = ?peer,
                kind = err.kind(),
                error = %err,
                "request rejected"
            );
            return err.into_response();
        }
    };

    let body = match Bytes::from_request(request, &()).await {
        Ok(body) => body,
        Err(rejection) => {
            let err = if rejection.status() == StatusCode::PAYLOAD_TOO_LARGE {
                RelayError::BadRequest(format!("request body exceeds {} bytes", MAX_BODY_BYTES))
            } else {
                RelayError::BadRequest("failed to read request body".to_string())
            };
            warn!(route = endpoint.path(), client = %client, kind = err.kind(), error = %err, "request rejected");
            return err.into_response();
        }
    };

    let admitted = match state.admission.validate(endpoint, &body) {
        Ok(admitted) => admitted,
        Err(err) => {
            warn!(
                route = endpoint.path(),
                client = %client,
                body_bytes = body.len(),
                kind = err.kind(),
                error = %err,
                "request rejected"
            );
            return err.into_response();
        }
    };

    info!(
        route = endpoint.path(),
        client = %client,
        persona = %admitted.persona,
        code_chars = admitted.code_chars(),
        "request admitted"
    );

    match state.relay.open(admitted).await {
        Ok(stream) => streaming_response(stream),
        Err(err) => err.into_response(),
    }
}

fn streaming_response(stream: RelayStream) -> Response {
    (
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, "text/plain; charset=utf-8"),
            (header::CACHE_CONTROL, "no-cache"),
            (HeaderName::from_static("x-accel-buffering"), "no"),
        ],
        Body::from_stream(stream),
    )
        .into_response()
}
