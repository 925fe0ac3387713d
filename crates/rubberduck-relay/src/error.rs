use axum::http::{header, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use rubberduck_providers::ProviderError;
use rubberduck_types::ErrorBody;
use thiserror::Error;

/// Failures surfaced to the caller before the response stream is committed.
#[derive(Debug, Error)]
pub enum RelayError {
    #[error("{0}")]
    BadRequest(String),

    #[error("missing or invalid service key")]
    Unauthorized,

    #[error("too many requests")]
    RateLimited { retry_after_secs: u64 },

    #[error("upstream not configured: {0}")]
    Misconfigured(String),

    #[error("upstream failure: {0}")]
    UpstreamFailure(String),
}

impl RelayError {
    pub fn status(&self) -> StatusCode {
        match self {
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::Unauthorized => StatusCode::UNAUTHORIZED,
            Self::RateLimited { .. } => StatusCode::TOO_MANY_REQUESTS,
            Self::Misconfigured(_) | Self::UpstreamFailure(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    /// Short stable label used in logs.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::BadRequest(_) => "bad_request",
            Self::Unauthorized => "unauthorized",
            Self::RateLimited { .. } => "rate_limited",
            Self::Misconfigured(_) => "misconfigured",
            Self::UpstreamFailure(_) => "upstream_failure",
        }
    }

    /// Message placed in the `error` field of the response body. Upstream
    /// details stay in the server log.
    pub fn public_message(&self) -> String {
        match self {
            Self::BadRequest(message) => message.clone(),
            Self::Unauthorized => "unauthorized".to_string(),
            Self::RateLimited { .. } => "too many requests".to_string(),
            Self::Misconfigured(_) => "Server configuration error: Missing API Key".to_string(),
            Self::UpstreamFailure(_) => "Failed to analyze code".to_string(),
        }
    }
}

impl From<ProviderError> for RelayError {
    fn from(err: ProviderError) -> Self {
        match err {
            ProviderError::Misconfigured(message) => Self::Misconfigured(message),
            other => Self::UpstreamFailure(other.to_string()),
        }
    }
}

impl IntoResponse for RelayError {
    fn into_response(self) -> Response {
        let mut response =
            (self.status(), Json(ErrorBody::new(self.public_message()))).into_response();

        if let Self::RateLimited { retry_after_secs } = self {
            if let Ok(value) = HeaderValue::from_str(&retry_after_secs.to_string()) {
                response.headers_mut().insert(header::RETRY_AFTER, value);
            }
        }

        response
    }
}
