use axum::{
    extract::{Request, State},
    http::{HeaderMap, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use std::sync::Arc;
use tracing::warn;

/// API keys accepted by the gateway. Empty = no auth required.
#[derive(Clone, Debug, Default)]
pub struct AuthConfig {
    pub api_keys: Vec<String>,
}

impl AuthConfig {
    pub fn new(api_keys: Vec<String>) -> Self {
        Self { api_keys }
    }

    pub fn is_enabled(&self) -> bool {
        !self.api_keys.is_empty()
    }

    fn accepts(&self, key: &str) -> bool {
        self.api_keys.iter().any(|k| k == key)
    }
}

/// The `api_key` parameter of a query string. Other parameters are ignored
/// even when malformed, so a bad query string still ends in a 401.
fn query_api_key(query: &str) -> Option<String> {
    query
        .split('&')
        .find_map(|pair| pair.strip_prefix("api_key="))
        .map(percent_decode)
}

fn percent_decode(raw: &str) -> String {
    let bytes = raw.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'+' => out.push(b' '),
            b'%' => {
                let escaped = raw
                    .get(i + 1..i + 3)
                    .and_then(|hex| u8::from_str_radix(hex, 16).ok());
                if let Some(byte) = escaped {
                    out.push(byte);
                    i += 3;
                    continue;
                }
                out.push(b'%');
            }
            b => out.push(b),
        }
        i += 1;
    }
    String::from_utf8_lossy(&out).into_owned()
}

/// Checks `Authorization: Bearer <key>` first, then `?api_key=<key>`.
pub async fn auth_middleware(
    State(auth): State<Arc<AuthConfig>>,
    headers: HeaderMap,
    request: Request,
    next: Next,
) -> Response {
    if !auth.is_enabled() {
        return next.run(request).await;
    }

    let key = headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::to_string)
        .or_else(|| request.uri().query().and_then(query_api_key));

    match key {
        Some(k) if auth.accepts(&k) => next.run(request).await,
        Some(_) => {
            warn!(path = %request.uri().path(), "Rejected request: invalid API key");
            unauthorized("Invalid API key")
        }
        None => {
            warn!(path = %request.uri().path(), "Rejected request: missing API key");
            unauthorized("API key required")
        }
    }
}

fn unauthorized(message: &str) -> Response {
    (
        StatusCode::UNAUTHORIZED,
        Json(json!({"success": false, "error": message, "code": "UNAUTHORIZED"})),
    )
        .into_response()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_auth_config_disabled() {
        let config = AuthConfig::new(vec![]);
        assert!(!config.is_enabled());
    }

    #[test]
    fn test_auth_config_accepts_only_listed_keys() {
        let config = AuthConfig::new(vec!["key123".to_string()]);
        assert!(config.is_enabled());
        assert!(config.accepts("key123"));
        assert!(!config.accepts("key12"));
    }

    #[test]
    fn test_query_api_key_is_lenient() {
        assert_eq!(query_api_key("api_key=secret"), Some("secret".to_string()));
        assert_eq!(
            query_api_key("x=%zz&&api_key=a%2Bb+c"),
            Some("a+b c".to_string())
        );
        assert_eq!(query_api_key("api_key=100%"), Some("100%".to_string()));
        assert_eq!(query_api_key("other=1"), None);
    }
}
