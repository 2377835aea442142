//! Authentication gate.
//!
//! Evaluates a listener's configured auth methods against the request parts.
//! Succeeds on the first matching entry; an empty list means the listener is
//! open to all requests. Runs strictly before argument extraction so
//! unauthenticated requests do no extraction work.

use axum::http::header::AUTHORIZATION;
use axum::http::HeaderMap;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use thiserror::Error;

use crate::config::AuthConfig;

/// Fixed identity used when a basic-auth entry omits the username.
pub const DEFAULT_BASIC_AUTH_USER: &str = "gw";

/// Reserved query parameter carrying a shared-secret API key.
pub const KEY_API_KEY_QUERY: &str = "__gwApiKey";

#[derive(Debug, Error)]
#[error("no configured auth method matched the request")]
pub struct AuthRejected;

/// Verify the request against the configured auth methods (OR semantics).
pub fn verify_auth(
    headers: &HeaderMap,
    query: Option<&str>,
    configs: &[AuthConfig],
) -> Result<(), AuthRejected> {
    if configs.is_empty() {
        return Ok(());
    }

    for config in configs {
        let matched = match config {
            AuthConfig::BasicAuth { username, password } => {
                matches_basic_auth(headers, username, password)
            }
            AuthConfig::ApiKey { api_key } => matches_api_key(query, api_key),
        };
        if matched {
            return Ok(());
        }
    }

    Err(AuthRejected)
}

fn matches_basic_auth(headers: &HeaderMap, username: &str, password: &str) -> bool {
    let Some(value) = headers.get(AUTHORIZATION).and_then(|v| v.to_str().ok()) else {
        return false;
    };
    let Some(encoded) = value.strip_prefix("Basic ") else {
        return false;
    };
    let Ok(decoded) = BASE64.decode(encoded.trim()) else {
        return false;
    };
    let Ok(credentials) = String::from_utf8(decoded) else {
        return false;
    };
    match credentials.split_once(':') {
        Some((user, pass)) => user == username && pass == password,
        None => false,
    }
}

fn matches_api_key(query: Option<&str>, api_key: &str) -> bool {
    let Some(query) = query else {
        return false;
    };
    url::form_urlencoded::parse(query.as_bytes())
        .any(|(key, value)| key == KEY_API_KEY_QUERY && value == api_key)
}
