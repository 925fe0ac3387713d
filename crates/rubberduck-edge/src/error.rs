use axum::http::{header, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use rubberduck_types::ErrorBody;
use thiserror::Error;

/// Shown to the user when the relay reports a rate limit.
pub const SLOW_DOWN_MESSAGE: &str = "You are chatting too fast! Slow down.";

#[derive(Debug, Error)]
pub enum EdgeError {
    #[error("relay unreachable: {0}")]
    RelayUnreachable(String),

    #[error("rate limited by relay")]
    RateLimited { retry_after: Option<HeaderValue> },
}

impl IntoResponse for EdgeError {
    fn into_response(self) -> Response {
        match self {
            EdgeError::RelayUnreachable(_) => (
                StatusCode::BAD_GATEWAY,
                Json(ErrorBody::new("Analysis service is unavailable")),
            )
                .into_response(),
            EdgeError::RateLimited { retry_after } => {
                let mut response = (
                    StatusCode::TOO_MANY_REQUESTS,
                    Json(ErrorBody::new(SLOW_DOWN_MESSAGE)),
                )
                    .into_response();
                if let Some(value) = retry_after {
                    response.headers_mut().insert(header::RETRY_AFTER, value);
                }
                response
            }
        }
    }
}
