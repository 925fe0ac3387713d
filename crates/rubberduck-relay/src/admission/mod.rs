//! Admission control.
//!
//! Checks run in a fixed order and stop at the first failure:
//! 1. authentication (shared secret in `x-service-key`)
//! 2. per-client rate limit
//! 3. schema and size validation of the body
//!
//! Steps 1 and 2 look only at the request head, so they run before the body
//! is read. All three complete before any upstream call is attempted.
//!
//! When no service key is configured, step 1 is a no-op. That open mode is a
//! deliberate trust boundary for local or private-network deployments.

mod auth;
mod rate_limit;
mod validate;

use std::net::SocketAddr;

use axum::http::HeaderMap;
use rubberduck_types::{AnalysisRequest, Persona, CLIENT_ADDRESS_HEADER};
use secrecy::SecretString;

use crate::RelayError;

pub use auth::{authenticate, SERVICE_KEY_HEADER};
pub use rate_limit::{
    InMemoryRateLimitStore, RateDecision, RateLimitConfig, RateLimitStore, RateLimiter,
};
pub use validate::parse_request;

/// The relay's analysis endpoints.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Endpoint {
    /// `POST /debug`: persona chosen by the caller, `senior` when absent.
    Debug,
    /// `POST /generate-docs`: always the documentation-writer persona.
    GenerateDocs,
}

impl Endpoint {
    pub fn path(&self) -> &'static str {
        match self {
            Endpoint::Debug => "/debug",
            Endpoint::GenerateDocs => "/generate-docs",
        }
    }

    /// Persona forced by the endpoint, if any.
    pub fn fixed_persona(&self) -> Option<Persona> {
        match self {
            Endpoint::Debug => None,
            Endpoint::GenerateDocs => Some(Persona::DocWriter),
        }
    }
}

pub struct Admission {
    service_key: Option<SecretString>,
    limiter: RateLimiter,
    max_code_chars: usize,
    trust_proxy_headers: bool,
}

impl Admission {
    pub fn new(
        service_key: Option<SecretString>,
        limiter: RateLimiter,
        max_code_chars: usize,
    ) -> Self {
        Self {
            service_key,
            limiter,
            max_code_chars,
            trust_proxy_headers: false,
        }
    }

    pub fn with_trust_proxy_headers(mut self, trust: bool) -> Self {
        self.trust_proxy_headers = trust;
        self
    }

    /// `true` when no shared secret is configured.
    pub fn is_open(&self) -> bool {
        self.service_key.is_none()
    }

    /// Steps 1 and 2. Needs only the request head, so it runs before the
    /// body is read. Returns the key the request was counted under.
    pub fn admit_caller(
        &self,
        headers: &HeaderMap,
        peer: Option<SocketAddr>,
    ) -> Result<String, RelayError> {
        authenticate(self.service_key.as_ref(), headers)?;

        // A caller holding the service key is the edge forwarder; its
        // client headers name the browser behind it.
        let trusted = self.trust_proxy_headers || self.service_key.is_some();
        let client = client_key(headers, peer, trusted);
        self.limiter.check(&client)?;
        Ok(client)
    }

    /// Step 3.
    pub fn validate(&self, endpoint: Endpoint, body: &[u8]) -> Result<AnalysisRequest, RelayError> {
        parse_request(endpoint, body, self.max_code_chars)
    }
}

/// Identity used to key rate limits.
///
/// The socket peer address by default. When `trust_forwarded` is set, the
/// `x-client-address` header wins, then the first `x-forwarded-for` hop.
pub fn client_key(headers: &HeaderMap, peer: Option<SocketAddr>, trust_forwarded: bool) -> String {
    if trust_forwarded {
        let explicit = headers
            .get(CLIENT_ADDRESS_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|v| !v.is_empty());
        let forwarded = headers
            .get("x-forwarded-for")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.split(',').next())
            .map(str::trim)
            .filter(|v| !v.is_empty());
        if let Some(addr) = explicit.or(forwarded) {
            return addr.to_string();
        }
    }

    peer.map(|addr| addr.ip().to_string())
        .unwrap_or_else(|| "unknown".to_string())
}
