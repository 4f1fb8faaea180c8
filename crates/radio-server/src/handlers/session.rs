//! `POST /session/create`, `POST /session/verify` — pairing code issuance
//! (game-server authenticated) and redemption (rate-limited, public).

use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::{ConnectInfo, State};
use axum::http::HeaderMap;
use axum::response::IntoResponse;
use axum::Json;
use serde::Deserialize;
use serde_json::json;

use radio_core::normalize;
use radio_core::ratelimit::Scope;
use radio_core::state::{AppState, IssueFailure, RedeemFailure};

use crate::error::ApiError;
use crate::extract::{check_server_key, client_ip};

#[derive(Deserialize)]
pub struct CreateRequest {
    username: Option<String>,
    #[serde(rename = "havePass")]
    have_pass: Option<bool>,
}

pub async fn create(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(req): Json<CreateRequest>,
) -> Result<impl IntoResponse, ApiError> {
    check_server_key(&headers, &state)?;

    let username = req.username.ok_or(ApiError::MissingField("username"))?;
    if username.trim().is_empty() {
        return Err(ApiError::MissingField("username"));
    }
    let username = normalize::username(&username);

    let outcome = state
        .issue(&username, req.have_pass.unwrap_or(false))
        .map_err(|e| match e {
            IssueFailure::NotInGame => ApiError::NotInGame,
            IssueFailure::CodeGenerationFailed => ApiError::CodeGenerationFailed,
        })?;

    Ok(Json(json!({
        "ok": true,
        "code": outcome.code,
        "exp": outcome.exp,
    })))
}

#[derive(Deserialize)]
pub struct VerifyRequest {
    code: Option<String>,
}

pub async fn verify(
    State(state): State<Arc<AppState>>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
    Json(req): Json<VerifyRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let ip = client_ip(&headers, peer);
    if !state.rate_limiter.hit(Scope::Verify, &ip, state.now()) {
        return Err(ApiError::RateLimited);
    }

    let code = req.code.ok_or(ApiError::MissingField("code"))?;
    if code.trim().is_empty() {
        return Err(ApiError::MissingField("code"));
    }
    let code = normalize::code(&code);

    match state.redeem(&code) {
        Ok(redeemed) => Ok(Json(json!({
            "ok": true,
            "username": redeemed.username,
            "havePass": redeemed.have_pass,
            "token": redeemed.token,
            "tokenExp": redeemed.token_exp,
        }))),
        Err(RedeemFailure::InvalidOrExpired) => {
            Ok(Json(json!({ "ok": false, "error": "invalid_or_expired" })))
        }
        Err(RedeemFailure::NotInGame) => {
            Ok(Json(json!({ "ok": false, "error": "not_in_game" })))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn create_request_deserializes_without_have_pass() {
        let req: CreateRequest = serde_json::from_str(r#"{"username":"Alice"}"#).unwrap();
        assert_eq!(req.username.as_deref(), Some("Alice"));
        assert_eq!(req.have_pass, None);
    }
}
