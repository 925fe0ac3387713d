//! Provider error types

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ProviderError {
    /// No usable credential. Raised before any network call is attempted.
    #[error("upstream not configured: {0}")]
    Misconfigured(String),

    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("API error {status}: {body}")]
    Api { status: u16, body: String },

    #[error("stream error: {0}")]
    StreamError(String),

    #[error("invalid response: {0}")]
    InvalidResponse(String),
}

impl ProviderError {
    pub fn is_misconfigured(&self) -> bool {
        matches!(self, Self::Misconfigured(_))
    }

    /// Short stable label used in logs.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Misconfigured(_) => "misconfigured",
            Self::Network(_) => "network",
            Self::Api { .. } => "api",
            Self::StreamError(_) => "stream",
            Self::InvalidResponse(_) => "invalid_response",
        }
    }
}
