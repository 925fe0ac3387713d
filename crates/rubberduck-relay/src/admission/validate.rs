use rubberduck_types::{AnalysisRequest, Persona};
use serde_json::Value;

use super::Endpoint;
use crate::RelayError;

/// Parse and bound-check a request body.
///
/// The body is read as loose JSON first so each violated constraint gets its
/// own message instead of a generic deserialization error.
pub fn parse_request(
    endpoint: Endpoint,
    body: &[u8],
    max_code_chars: usize,
) -> Result<AnalysisRequest, RelayError> {
    let value: Value = serde_json::from_slice(body)
        .map_err(|_| RelayError::BadRequest("invalid JSON body".to_string()))?;

    let fields = value.as_object().ok_or_else(|| {
        RelayError::BadRequest("request body must be a JSON object".to_string())
    })?;

    let code = match fields.get("code") {
        None => return Err(RelayError::BadRequest("missing field: code".to_string())),
        Some(Value::String(code)) => code,
        Some(_) => return Err(RelayError::BadRequest("code must be a string".to_string())),
    };

    let persona = match endpoint.fixed_persona() {
        Some(persona) => persona,
        None => match fields.get("persona") {
            None => Persona::default(),
            Some(Value::String(id)) => id
                .parse::<Persona>()
                .map_err(|e| RelayError::BadRequest(e.to_string()))?,
            Some(_) => {
                return Err(RelayError::BadRequest(
                    "invalid persona: must be one of senior, academic, duck, doc_writer"
                        .to_string(),
                ))
            }
        },
    };

    if code.chars().count() > max_code_chars {
        return Err(RelayError::BadRequest(format!(
            "code exceeds {} characters",
            max_code_chars
        )));
    }

    Ok(AnalysisRequest::new(code.clone(), persona))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bad_request_message(result: Result<AnalysisRequest, RelayError>) -> String {
        match result {
            Err(RelayError::BadRequest(message)) => message,
            other => panic!("expected bad request, got {:?}", other),
        }
    }

    #[test]
    fn test_valid_request_with_persona() {
        let req = parse_request(Endpoint::Debug, br#"{"code":"x","persona":"duck"}"#, 5000).unwrap();
        assert_eq!(req.code, "x");
        assert_eq!(req.persona, Persona::Duck);
    }

    #[test]
    fn test_absent_persona_defaults_to_senior() {
        let req = parse_request(Endpoint::Debug, br#"{"code":"x"}"#, 5000).unwrap();
        assert_eq!(req.persona, Persona::Senior);
    }

    #[test]
    fn test_invalid_persona_is_not_defaulted() {
        let message =
            bad_request_message(parse_request(Endpoint::Debug, br#"{"code":"x","persona":"pirate"}"#, 5000));
        assert!(message.starts_with("invalid persona"));

        let message =
            bad_request_message(parse_request(Endpoint::Debug, br#"{"code":"x","persona":null}"#, 5000));
        assert!(message.starts_with("invalid persona"));
    }

    #[test]
    fn test_missing_code() {
        let message = bad_request_message(parse_request(Endpoint::Debug, br#"{"persona":"duck"}"#, 5000));
        assert_eq!(message, "missing field: code");
    }

    #[test]
    fn test_non_string_code() {
        let message = bad_request_message(parse_request(Endpoint::Debug, br#"{"code":42}"#, 5000));
        assert_eq!(message, "code must be a string");
    }

    #[test]
    fn test_length_bound_is_inclusive() {
        let at_limit = serde_json::json!({"code": "a".repeat(5000)}).to_string();
        assert!(parse_request(Endpoint::Debug, at_limit.as_bytes(), 5000).is_ok());

        let over = serde_json::json!({"code": "a".repeat(5001)}).to_string();
        let message = bad_request_message(parse_request(Endpoint::Debug, over.as_bytes(), 5000));
        assert_eq!(message, "code exceeds 5000 characters");
    }

    #[test]
    fn test_length_counts_characters_not_bytes() {
        let body = serde_json::json!({"code": "é".repeat(5000)}).to_string();
        assert!(parse_request(Endpoint::Debug, body.as_bytes(), 5000).is_ok());
    }

    #[test]
    fn test_malformed_json_and_non_object() {
        let message = bad_request_message(parse_request(Endpoint::Debug, b"{not json", 5000));
        assert_eq!(message, "invalid JSON body");

        let message = bad_request_message(parse_request(Endpoint::Debug, b"[1,2]", 5000));
        assert_eq!(message, "request body must be a JSON object");
    }

    #[test]
    fn test_generate_docs_forces_doc_writer() {
        let req = parse_request(
            Endpoint::GenerateDocs,
            br#"{"code":"fn f() {}","persona":"duck"}"#,
            5000,
        )
        .unwrap();
        assert_eq!(req.persona, Persona::DocWriter);
    }
}
