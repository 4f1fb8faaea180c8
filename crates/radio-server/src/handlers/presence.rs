//! `POST /presence`, `GET /presence/:u` — game-server presence publication
//! and readback. Unauthenticated; rate-limited per source IP.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::{ConnectInfo, Path, State};
use axum::http::HeaderMap;
use axum::response::IntoResponse;
use axum::Json;
use serde::Deserialize;
use serde_json::json;

use radio_core::normalize;
use radio_core::ratelimit::Scope;
use radio_core::state::AppState;

use crate::error::ApiError;
use crate::extract::client_ip;

#[derive(Deserialize)]
pub struct PublishRequest {
    username: Option<String>,
    #[serde(rename = "inGame")]
    in_game: Option<bool>,
    #[serde(rename = "havePass")]
    have_pass: Option<bool>,
}

pub async fn publish(
    State(state): State<Arc<AppState>>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
    Json(req): Json<PublishRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let ip = client_ip(&headers, peer);
    if !state.rate_limiter.hit(Scope::PresenceIp, &ip, state.now()) {
        return Err(ApiError::RateLimited);
    }

    let username = req.username.ok_or(ApiError::MissingField("username"))?;
    let in_game = req.in_game.ok_or(ApiError::MissingField("inGame"))?;
    if username.trim().is_empty() {
        return Err(ApiError::MissingField("username"));
    }

    let username = normalize::username(&username);
    state
        .presence
        .publish(&username, in_game, req.have_pass, state.now());

    Ok(Json(json!({ "ok": true })))
}

pub async fn read(
    State(state): State<Arc<AppState>>,
    Path(username): Path<String>,
) -> impl IntoResponse {
    let username = normalize::username(&username);
    match state.presence.get(&username) {
        Some(record) => Json(json!({
            "ok": true,
            "exists": true,
            "inGame": record.in_game,
            "havePass": record.have_pass,
        })),
        None => Json(json!({
            "ok": true,
            "exists": false,
            "inGame": false,
            "havePass": false,
        })),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deserializes_optional_have_pass() {
        let req: PublishRequest =
            serde_json::from_str(r#"{"username":"Alice","inGame":true}"#).unwrap();
        assert_eq!(req.username.as_deref(), Some("Alice"));
        assert_eq!(req.in_game, Some(true));
        assert_eq!(req.have_pass, None);
    }
}
