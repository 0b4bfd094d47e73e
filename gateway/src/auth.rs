//! # Authentication
//!
//! A single opt-in header gates `/v1/*`: when [`AuthConfig::enabled`] is
//! set, every request must present a key from [`AuthConfig::api_keys`],
//! either as `Authorization: Bearer <key>`, `X-API-Key: <key>`, or under
//! the configured [`AuthConfig::header_name`]. When disabled (the
//! default), every request passes through unauthenticated.
//!
//! There is no JWT, no session store, and no per-key rate limiting here —
//! just the one header check described above.

use crate::config::AuthConfig;
use axum::http::HeaderMap;

/// Pulls a candidate API key out of the request, trying the
/// `Authorization: Bearer` form, `X-API-Key`, and the configured header
/// name in that order. Returns the first one present regardless of
/// whether it is valid.
pub fn extract_api_key(headers: &HeaderMap, config: &AuthConfig) -> Option<String> {
    if let Some(value) = headers.get(axum::http::header::AUTHORIZATION) {
        if let Ok(value) = value.to_str() {
            if let Some(key) = value.strip_prefix("Bearer ") {
                return Some(key.trim().to_string());
            }
        }
    }

    if let Some(value) = headers.get("x-api-key") {
        if let Ok(value) = value.to_str() {
            return Some(value.trim().to_string());
        }
    }

    if config.header_name.eq_ignore_ascii_case("authorization") {
        return None;
    }
    headers
        .get(config.header_name.as_str())
        .and_then(|v| v.to_str().ok())
        .map(|v| v.trim().to_string())
}

/// Whether `key` is one of the configured API keys. Auth is vacuously
/// satisfied when disabled.
pub fn is_authorized(key: Option<&str>, config: &AuthConfig) -> bool {
    if !config.enabled {
        return true;
    }
    match key {
        Some(key) => config.api_keys.iter().any(|candidate| candidate == key),
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn config(enabled: bool, keys: &[&str]) -> AuthConfig {
        AuthConfig {
            enabled,
            header_name: "Authorization".to_string(),
            api_keys: keys.iter().map(|s| s.to_string()).collect(),
        }
    }

    #[test]
    fn disabled_auth_passes_without_a_key() {
        assert!(is_authorized(None, &config(false, &[])));
    }

    #[test]
    fn enabled_auth_rejects_missing_key() {
        assert!(!is_authorized(None, &config(true, &["secret"])));
    }

    #[test]
    fn enabled_auth_accepts_configured_key() {
        assert!(is_authorized(Some("secret"), &config(true, &["secret"])));
    }

    #[test]
    fn enabled_auth_rejects_unknown_key() {
        assert!(!is_authorized(Some("wrong"), &config(true, &["secret"])));
    }

    #[test]
    fn extracts_bearer_token_from_authorization_header() {
        let mut headers = HeaderMap::new();
        headers.insert(axum::http::header::AUTHORIZATION, HeaderValue::from_static("Bearer sk-123"));
        let key = extract_api_key(&headers, &config(true, &["sk-123"]));
        assert_eq!(key.as_deref(), Some("sk-123"));
    }

    #[test]
    fn extracts_key_from_x_api_key_header() {
        let mut headers = HeaderMap::new();
        headers.insert("x-api-key", HeaderValue::from_static("sk-456"));
        let key = extract_api_key(&headers, &config(true, &["sk-456"]));
        assert_eq!(key.as_deref(), Some("sk-456"));
    }

    #[test]
    fn missing_header_yields_no_key() {
        let headers = HeaderMap::new();
        assert_eq!(extract_api_key(&headers, &config(true, &["sk-456"])), None);
    }
}
