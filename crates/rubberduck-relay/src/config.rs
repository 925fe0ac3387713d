//! Relay configuration from environment variables.
//!
//! **Environment variables:**
//! - `HOST` / `PORT`: bind address (default: 0.0.0.0:3001)
//! - `SERVICE_API_KEY`: shared secret required in `x-service-key`. Unset or
//!   empty runs the relay in open mode.
//! - `ALLOWED_ORIGIN`: browser origin allowed by CORS (default: any)
//! - `RATE_LIMIT_WINDOW_SECS`: rate-limit window (default: 60)
//! - `RATE_LIMIT_MAX`: requests per client per window (default: 5)
//! - `MAX_CODE_CHARS`: bound on submitted code length (default: 5000)
//! - `TRUST_PROXY_HEADERS`: key rate limits on `x-client-address` or
//!   `x-forwarded-for` even in open mode (default: false). A caller that
//!   presents the service key is always trusted to name its client.

use secrecy::SecretString;
use std::time::Duration;

use crate::admission::RateLimitConfig;

pub const DEFAULT_PORT: u16 = 3001;
pub const DEFAULT_MAX_CODE_CHARS: usize = 5000;

#[derive(Debug, Clone)]
pub struct RelayConfig {
    pub host: String,
    pub port: u16,
    pub service_key: Option<SecretString>,
    pub allowed_origin: Option<String>,
    pub rate_limit: RateLimitConfig,
    pub max_code_chars: usize,
    pub trust_proxy_headers: bool,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: DEFAULT_PORT,
            service_key: None,
            allowed_origin: None,
            rate_limit: RateLimitConfig::default(),
            max_code_chars: DEFAULT_MAX_CODE_CHARS,
            trust_proxy_headers: false,
        }
    }
}

impl RelayConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let non_empty = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        Self {
            host: non_empty("HOST").unwrap_or(defaults.host),
            port: non_empty("PORT")
                .and_then(|p| p.parse().ok())
                .unwrap_or(defaults.port),
            service_key: non_empty("SERVICE_API_KEY").map(SecretString::from),
            allowed_origin: non_empty("ALLOWED_ORIGIN"),
            rate_limit: RateLimitConfig {
                window: non_empty("RATE_LIMIT_WINDOW_SECS")
                    .and_then(|v| v.parse().ok())
                    .filter(|v| *v > 0)
                    .map(Duration::from_secs)
                    .unwrap_or(defaults.rate_limit.window),
                max_requests: non_empty("RATE_LIMIT_MAX")
                    .and_then(|v| v.parse().ok())
                    .unwrap_or(defaults.rate_limit.max_requests),
            },
            max_code_chars: non_empty("MAX_CODE_CHARS")
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.max_code_chars),
            trust_proxy_headers: non_empty("TRUST_PROXY_HEADERS")
                .map(|v| matches!(v.trim().to_ascii_lowercase().as_str(), "1" | "true" | "yes"))
                .unwrap_or(false),
        }
    }

    pub fn with_service_key(mut self, key: impl Into<String>) -> Self {
        self.service_key = Some(SecretString::from(key.into()));
        self
    }

    pub fn with_rate_limit(mut self, max_requests: u32, window: Duration) -> Self {
        self.rate_limit = RateLimitConfig {
            window,
            max_requests,
        };
        self
    }

    pub fn with_allowed_origin(mut self, origin: impl Into<String>) -> Self {
        self.allowed_origin = Some(origin.into());
        self
    }

    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}
