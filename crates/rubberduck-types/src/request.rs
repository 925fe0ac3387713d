use serde::{Deserialize, Serialize};

use crate::Persona;

/// Fixed text placed before the submitted code in the user message.
pub const USER_PREAMBLE: &str = "Here is my code:\n\n";

/// Header carrying the shared secret from the edge forwarder to the relay.
pub const SERVICE_KEY_HEADER: &str = "x-service-key";

/// Header carrying the browser's address from the edge forwarder to the relay.
/// The relay only honours it from a caller it trusts.
pub const CLIENT_ADDRESS_HEADER: &str = "x-client-address";

/// A validated analysis request.
///
/// Only admission control builds these from untrusted input; by the time one
/// exists the code length bound and persona enum have already been checked.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnalysisRequest {
    pub code: String,
    #[serde(default)]
    pub persona: Persona,
}

impl AnalysisRequest {
    pub fn new(code: impl Into<String>, persona: Persona) -> Self {
        Self {
            code: code.into(),
            persona,
        }
    }

    /// Length of the submitted code in characters, as bounded by admission.
    pub fn code_chars(&self) -> usize {
        self.code.chars().count()
    }

    /// Content of the user-role message sent upstream.
    pub fn user_message(&self) -> String {
        format!("{}{}", USER_PREAMBLE, self.code)
    }
}

/// JSON body of every non-streaming error response: `{"error": "..."}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: String,
}

impl ErrorBody {
    pub fn new(error: impl Into<String>) -> Self {
        Self {
            error: error.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_user_message_prepends_preamble() {
        let req = AnalysisRequest::new("let x = 1;", Persona::Duck);
        assert_eq!(req.user_message(), "Here is my code:\n\nlet x = 1;");
    }

    #[test]
    fn test_code_chars_counts_unicode_scalars() {
        let req = AnalysisRequest::new("héllo🦆", Persona::Senior);
        assert_eq!(req.code_chars(), 6);
        assert!(req.code.len() > 6);
    }

    #[test]
    fn test_persona_defaults_when_absent() {
        let req: AnalysisRequest = serde_json::from_str(r#"{"code": "x"}"#).unwrap();
        assert_eq!(req.persona, Persona::Senior);
    }

    #[test]
    fn test_error_body_shape() {
        let json = serde_json::to_value(ErrorBody::new("too many requests")).unwrap();
        assert_eq!(json, serde_json::json!({"error": "too many requests"}));
    }
}
