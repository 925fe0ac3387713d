//! Edge configuration from environment variables.
//!
//! **Environment variables:**
//! - `SERVER_URL`: relay base URL (default: http://localhost:3001)
//! - `SERVICE_API_KEY`: shared secret attached as `x-service-key`
//! - `EDGE_HOST` / `EDGE_PORT`: bind address (default: 0.0.0.0:3000)
//! - `CONNECT_TIMEOUT_SECS`: relay connect timeout (default: 10)
//! - `ALLOWED_ORIGIN`: browser origin allowed by CORS (default: any)
//! - `TRUST_PROXY_HEADERS`: take the browser address from `x-forwarded-for`
//!   instead of the socket peer (default: false)

use secrecy::SecretString;

pub const DEFAULT_SERVER_URL: &str = "http://localhost:3001";
pub const DEFAULT_EDGE_PORT: u16 = 3000;

#[derive(Debug, Clone)]
pub struct EdgeConfig {
    pub host: String,
    pub port: u16,
    pub server_url: String,
    pub service_key: Option<SecretString>,
    pub connect_timeout_secs: u64,
    pub allowed_origin: Option<String>,
    pub trust_proxy_headers: bool,
}

impl Default for EdgeConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: DEFAULT_EDGE_PORT,
            server_url: DEFAULT_SERVER_URL.to_string(),
            service_key: None,
            connect_timeout_secs: 10,
            allowed_origin: None,
            trust_proxy_headers: false,
        }
    }
}

impl EdgeConfig {
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
            host: non_empty("EDGE_HOST").unwrap_or(defaults.host),
            port: non_empty("EDGE_PORT")
                .and_then(|p| p.parse().ok())
                .unwrap_or(defaults.port),
            server_url: non_empty("SERVER_URL").unwrap_or(defaults.server_url),
            service_key: non_empty("SERVICE_API_KEY").map(SecretString::from),
            connect_timeout_secs: non_empty("CONNECT_TIMEOUT_SECS")
                .and_then(|v| v.parse().ok())
                .filter(|v| *v > 0)
                .unwrap_or(defaults.connect_timeout_secs),
            allowed_origin: non_empty("ALLOWED_ORIGIN"),
            trust_proxy_headers: non_empty("TRUST_PROXY_HEADERS")
                .map(|v| matches!(v.trim().to_ascii_lowercase().as_str(), "1" | "true" | "yes"))
                .unwrap_or(false),
        }
    }

    pub fn with_server_url(mut self, url: impl Into<String>) -> Self {
        self.server_url = url.into();
        self
    }

    pub fn with_service_key(mut self, key: impl Into<String>) -> Self {
        self.service_key = Some(SecretString::from(key.into()));
        self
    }

    pub fn with_allowed_origin(mut self, origin: impl Into<String>) -> Self {
        self.allowed_origin = Some(origin.into());
        self
    }

    pub fn with_trust_proxy_headers(mut self, trust: bool) -> Self {
        self.trust_proxy_headers = trust;
        self
    }

    pub fn server_url_trimmed(&self) -> &str {
        self.server_url.trim_end_matches('/')
    }

    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use secrecy::ExposeSecret;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| map.get(name).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = EdgeConfig::from_lookup(lookup_from(&[]));
        assert_eq!(config.server_url, "http://localhost:3001");
        assert!(config.service_key.is_none());
        assert!(config.allowed_origin.is_none());
        assert!(!config.trust_proxy_headers);
        assert_eq!(config.bind_addr(), "0.0.0.0:3000");
    }

    #[test]
    fn test_overrides() {
        let config = EdgeConfig::from_lookup(lookup_from(&[
            ("SERVER_URL", "http://relay:3001/"),
            ("SERVICE_API_KEY", "s3cret"),
            ("EDGE_PORT", "8080"),
            ("ALLOWED_ORIGIN", "https://duck.example"),
            ("TRUST_PROXY_HEADERS", "1"),
        ]));
        assert_eq!(config.server_url_trimmed(), "http://relay:3001");
        assert_eq!(config.service_key.unwrap().expose_secret(), "s3cret");
        assert_eq!(config.port, 8080);
        assert_eq!(config.allowed_origin.as_deref(), Some("https://duck.example"));
        assert!(config.trust_proxy_headers);
    }
}
