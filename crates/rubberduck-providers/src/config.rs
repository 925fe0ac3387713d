//! Provider configuration
//!
//! Resolved once at startup. The adapter never re-reads the environment per
//! request.
//!
//! **Environment variables:**
//! - `OPENAI_API_KEY`, then `LLM_API_KEY`: upstream credential (first non-empty wins)
//! - `OPENAI_BASE_URL`: provider base URL (default: https://api.openai.com)
//! - `OPENAI_MODEL`: model name (default: gpt-4o)
//! - `MAX_OUTPUT_TOKENS`: cap on generated tokens (default: 2048)
//! - `REQUEST_TIMEOUT_SECS`: upstream request timeout (default: 120)

use secrecy::SecretString;

pub const DEFAULT_BASE_URL: &str = "https://api.openai.com";
pub const DEFAULT_MODEL: &str = "gpt-4o";
pub const DEFAULT_MAX_OUTPUT_TOKENS: u32 = 2048;
const DEFAULT_TIMEOUT_SECS: u64 = 120;

/// Credential sources, checked in order.
pub const CREDENTIAL_SOURCES: &[&str] = &["OPENAI_API_KEY", "LLM_API_KEY"];

/// Configuration for the upstream provider
#[derive(Debug, Clone)]
pub struct ProviderConfig {
    pub api_key: Option<SecretString>,
    /// Name of the source the credential came from, for startup logging.
    pub api_key_source: Option<&'static str>,
    pub base_url: String,
    pub model: String,
    pub max_output_tokens: u32,
    pub timeout_seconds: u64,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            api_key_source: None,
            base_url: DEFAULT_BASE_URL.to_string(),
            model: DEFAULT_MODEL.to_string(),
            max_output_tokens: DEFAULT_MAX_OUTPUT_TOKENS,
            timeout_seconds: DEFAULT_TIMEOUT_SECS,
        }
    }
}

/// Walk `sources` in order and return the first non-empty value.
pub fn resolve_credential<F>(
    sources: &[&'static str],
    lookup: F,
) -> Option<(&'static str, SecretString)>
where
    F: Fn(&str) -> Option<String>,
{
    sources.iter().find_map(|name| {
        lookup(name)
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
            .map(|v| (*name, SecretString::from(v)))
    })
}

impl ProviderConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Build a config from an arbitrary variable lookup.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let credential = resolve_credential(CREDENTIAL_SOURCES, &lookup);
        let defaults = Self::default();

        Self {
            api_key_source: credential.as_ref().map(|(source, _)| *source),
            api_key: credential.map(|(_, key)| key),
            base_url: lookup("OPENAI_BASE_URL")
                .filter(|v| !v.trim().is_empty())
                .unwrap_or(defaults.base_url),
            model: lookup("OPENAI_MODEL")
                .filter(|v| !v.trim().is_empty())
                .unwrap_or(defaults.model),
            max_output_tokens: lookup("MAX_OUTPUT_TOKENS")
                .and_then(|v| v.parse().ok())
                .filter(|v| *v > 0)
                .unwrap_or(defaults.max_output_tokens),
            timeout_seconds: lookup("REQUEST_TIMEOUT_SECS")
                .and_then(|v| v.parse().ok())
                .filter(|v| *v > 0)
                .unwrap_or(defaults.timeout_seconds),
        }
    }

    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(SecretString::from(api_key.into()));
        self
    }

    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into();
        self
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    pub fn with_max_output_tokens(mut self, max_output_tokens: u32) -> Self {
        self.max_output_tokens = max_output_tokens;
        self
    }

    pub fn with_timeout_seconds(mut self, seconds: u64) -> Self {
        self.timeout_seconds = seconds;
        self
    }

    pub fn has_credential(&self) -> bool {
        self.api_key.is_some()
    }

    pub fn base_url_trimmed(&self) -> &str {
        self.base_url.trim_end_matches('/')
    }
}
