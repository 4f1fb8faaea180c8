//! Cross-cutting extraction helpers shared by every handler: client IP,
//! token lookup across the three places it may live, and shared-secret
//! checks for game-server-only routes.

use std::collections::HashMap;
use std::net::SocketAddr;

use axum::http::HeaderMap;

use radio_core::state::AppState;

use crate::error::ApiError;

/// First element of `x-forwarded-for` (trimmed), else the peer address (§6).
pub fn client_ip(headers: &HeaderMap, peer: SocketAddr) -> String {
    headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .unwrap_or_else(|| peer.ip().to_string())
}

/// Token may arrive in header `x-radio-token`, query parameter `token`, or
/// body field `token`, checked in that order (§6).
pub fn find_token(
    headers: &HeaderMap,
    query: &HashMap<String, String>,
    body_token: Option<&str>,
) -> Option<String> {
    headers
        .get("x-radio-token")
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
        .or_else(|| query.get("token").cloned())
        .or_else(|| body_token.map(str::to_string))
        .filter(|s| !s.is_empty())
}

/// Verify the shared `x-roblox-key` header against configuration. An empty
/// configured key means every game-server call fails (§6).
pub fn check_server_key(headers: &HeaderMap, state: &AppState) -> Result<(), ApiError> {
    let configured = state
        .config
        .roblox_server_key
        .as_deref()
        .filter(|s| !s.is_empty());
    let Some(configured) = configured else {
        return Err(ApiError::Unauthorized("unauthorized"));
    };
    let provided = headers.get("x-roblox-key").and_then(|v| v.to_str().ok());
    if provided == Some(configured) {
        Ok(())
    } else {
        Err(ApiError::Unauthorized("unauthorized"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn client_ip_prefers_forwarded_header() {
        let mut headers = HeaderMap::new();
        headers.insert("x-forwarded-for", HeaderValue::from_static(" 10.0.0.5 , 10.0.0.1"));
        let peer: SocketAddr = "127.0.0.1:9999".parse().unwrap();
        assert_eq!(client_ip(&headers, peer), "10.0.0.5");
    }

    #[test]
    fn client_ip_falls_back_to_peer() {
        let headers = HeaderMap::new();
        let peer: SocketAddr = "127.0.0.1:9999".parse().unwrap();
        assert_eq!(client_ip(&headers, peer), "127.0.0.1");
    }

    #[test]
    fn token_lookup_order_header_query_body() {
        let mut headers = HeaderMap::new();
        headers.insert("x-radio-token", HeaderValue::from_static("from-header"));
        let mut query = HashMap::new();
        query.insert("token".to_string(), "from-query".to_string());
        assert_eq!(
            find_token(&headers, &query, Some("from-body")),
            Some("from-header".to_string())
        );

        let headers = HeaderMap::new();
        assert_eq!(
            find_token(&headers, &query, Some("from-body")),
            Some("from-query".to_string())
        );

        let query = HashMap::new();
        assert_eq!(
            find_token(&headers, &query, Some("from-body")),
            Some("from-body".to_string())
        );
        assert_eq!(find_token(&headers, &query, None), None);
    }
}
