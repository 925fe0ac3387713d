use axum::http::HeaderMap;
use secrecy::{ExposeSecret, SecretString};

use crate::RelayError;

pub use rubberduck_types::SERVICE_KEY_HEADER;

/// Check the shared secret. `expected == None` is open mode and always passes.
pub fn authenticate(expected: Option<&SecretString>, headers: &HeaderMap) -> Result<(), RelayError> {
    let Some(expected) = expected else {
        return Ok(());
    };

    let provided = headers
        .get(SERVICE_KEY_HEADER)
        .and_then(|v| v.to_str().ok())
        .ok_or(RelayError::Unauthorized)?;

    if constant_time_eq(provided.as_bytes(), expected.expose_secret().as_bytes()) {
        Ok(())
    } else {
        Err(RelayError::Unauthorized)
    }
}

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}
