//! Radio-control routes: join/mute fan-out, playback-state publication, the
//! active-listener view, and the two audience-scoped pull drains.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::{ConnectInfo, Path, Query, State};
use axum::http::HeaderMap;
use axum::response::IntoResponse;
use axum::Json;
use serde::Deserialize;
use serde_json::json;

use radio_core::events::{Audience, EventKind, EventRecord};
use radio_core::normalize;
use radio_core::push::PushFrame;
use radio_core::radio_state::StateUpdate;
use radio_core::ratelimit::Scope;
use radio_core::state::AppState;

use crate::error::ApiError;
use crate::extract::{check_server_key, client_ip, find_token};

fn require_matching_token(
    state: &AppState,
    headers: &HeaderMap,
    query: &HashMap<String, String>,
    body_token: Option<&str>,
    username: &str,
) -> Result<(), ApiError> {
    let token =
        find_token(headers, query, body_token).ok_or(ApiError::Unauthorized("missing_token"))?;
    let verified = state.verify_token(&token)?;
    if verified.username != username {
        return Err(ApiError::TokenUserMismatch);
    }
    Ok(())
}

fn require_in_game(state: &AppState, username: &str) -> Result<(), ApiError> {
    if state.presence.is_in_game(username) {
        Ok(())
    } else {
        Err(ApiError::NotInGame)
    }
}

#[derive(Deserialize)]
pub struct JoinRequest {
    username: Option<String>,
    token: Option<String>,
}

pub async fn join(
    State(state): State<Arc<AppState>>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    Query(query): Query<HashMap<String, String>>,
    headers: HeaderMap,
    Json(req): Json<JoinRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let ip = client_ip(&headers, peer);
    if !state.rate_limiter.hit(Scope::JoinIp, &ip, state.now()) {
        return Err(ApiError::RateLimited);
    }

    let username = req.username.ok_or(ApiError::MissingField("username"))?;
    if username.trim().is_empty() {
        return Err(ApiError::MissingField("username"));
    }
    let username = normalize::username(&username);

    require_matching_token(&state, &headers, &query, req.token.as_deref(), &username)?;
    require_in_game(&state, &username)?;

    let record = EventRecord {
        kind: EventKind::RadioJoin,
        audience: Audience::Roblox,
        ts: state.now(),
    };
    match state.events.append(&username, record) {
        radio_core::events::AppendOutcome::Stored => Ok(Json(json!({ "ok": true }))),
        radio_core::events::AppendOutcome::Ignored => {
            Ok(Json(json!({ "ok": true, "ignored": true })))
        }
    }
}

#[derive(Deserialize)]
pub struct MuteRequest {
    username: Option<String>,
    muted: Option<bool>,
    token: Option<String>,
}

/// Shared by the token-authenticated and server-key-authenticated mute
/// routes: build the tagged event, append it for the browser drain, and
/// push it best-effort to any live subscriber (§4.4).
fn apply_mute(state: &AppState, username: &str, muted: bool) -> impl IntoResponse {
    let kind = if muted {
        EventKind::RadioMute { muted }
    } else {
        EventKind::RadioUnmute { muted }
    };
    let record = EventRecord {
        kind,
        audience: Audience::Web,
        ts: state.now(),
    };

    match state.events.append(username, record.clone()) {
        radio_core::events::AppendOutcome::Ignored => Json(json!({ "ok": true, "ignored": true })),
        radio_core::events::AppendOutcome::Stored => {
            state.push.send(username, &PushFrame::new("radio", &record));
            let pushed = state.push.subscriber_count(username) > 0;
            Json(json!({ "ok": true, "pushed": pushed }))
        }
    }
}

pub async fn mute(
    State(state): State<Arc<AppState>>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    Query(query): Query<HashMap<String, String>>,
    headers: HeaderMap,
    Json(req): Json<MuteRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let ip = client_ip(&headers, peer);
    if !state.rate_limiter.hit(Scope::MuteIp, &ip, state.now()) {
        return Err(ApiError::RateLimited);
    }

    let username = req.username.ok_or(ApiError::MissingField("username"))?;
    let muted = req.muted.ok_or(ApiError::MissingField("muted"))?;
    if username.trim().is_empty() {
        return Err(ApiError::MissingField("username"));
    }
    let username = normalize::username(&username);

    require_matching_token(&state, &headers, &query, req.token.as_deref(), &username)?;
    require_in_game(&state, &username)?;

    Ok(apply_mute(&state, &username, muted))
}

pub async fn mute_server(
    State(state): State<Arc<AppState>>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
    Json(req): Json<MuteRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let ip = client_ip(&headers, peer);
    if !state.rate_limiter.hit(Scope::MuteIp, &ip, state.now()) {
        return Err(ApiError::RateLimited);
    }
    check_server_key(&headers, &state)?;

    let username = req.username.ok_or(ApiError::MissingField("username"))?;
    let muted = req.muted.ok_or(ApiError::MissingField("muted"))?;
    if username.trim().is_empty() {
        return Err(ApiError::MissingField("username"));
    }
    let username = normalize::username(&username);
    require_in_game(&state, &username)?;

    Ok(apply_mute(&state, &username, muted))
}

#[derive(Deserialize)]
pub struct StateRequest {
    username: Option<String>,
    #[serde(rename = "trackIndex")]
    track_index: Option<i64>,
    #[serde(rename = "trackName")]
    track_name: Option<String>,
    #[serde(rename = "positionSec")]
    position_sec: Option<f64>,
    #[serde(rename = "isPlaying")]
    is_playing: Option<bool>,
    muted: Option<bool>,
    token: Option<String>,
}

pub async fn update_state(
    State(state): State<Arc<AppState>>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    Query(query): Query<HashMap<String, String>>,
    headers: HeaderMap,
    Json(req): Json<StateRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let ip = client_ip(&headers, peer);
    if !state.rate_limiter.hit(Scope::StateIp, &ip, state.now()) {
        return Err(ApiError::RateLimited);
    }

    let username = req.username.ok_or(ApiError::MissingField("username"))?;
    if username.trim().is_empty() {
        return Err(ApiError::MissingField("username"));
    }
    let username = normalize::username(&username);

    require_matching_token(&state, &headers, &query, req.token.as_deref(), &username)?;
    require_in_game(&state, &username)?;

    let update = StateUpdate {
        track_index: req.track_index,
        track_name: req.track_name,
        position_sec: req.position_sec,
        is_playing: req.is_playing,
        muted: req.muted,
    };

    match state
        .radio_state
        .apply(&username, update, state.now(), state.config.state_min_gap_ms)
    {
        Some(_) => Ok(Json(json!({ "ok": true }))),
        None => Ok(Json(json!({ "ok": true, "ignored": true }))),
    }
}

pub async fn active(
    State(state): State<Arc<AppState>>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
) -> Result<impl IntoResponse, ApiError> {
    let ip = client_ip(&headers, peer);
    if !state.rate_limiter.hit(Scope::ActiveIp, &ip, state.now()) {
        return Err(ApiError::RateLimited);
    }

    let listeners = state
        .radio_state
        .active_listeners(state.now(), |username| state.presence.is_in_game(username));

    Ok(Json(json!({ "ok": true, "listeners": listeners })))
}

pub async fn sync(
    State(state): State<Arc<AppState>>,
    Path(path_username): Path<String>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    Query(query): Query<HashMap<String, String>>,
    headers: HeaderMap,
) -> Result<impl IntoResponse, ApiError> {
    let ip = client_ip(&headers, peer);
    if !state.rate_limiter.hit(Scope::SyncIp, &ip, state.now()) {
        return Err(ApiError::RateLimited);
    }

    let username = normalize::username(&path_username);
    require_matching_token(&state, &headers, &query, None, &username)?;

    let events = state.events.drain_web(&username);
    Ok(Json(json!({ "ok": true, "events": events })))
}

pub async fn poll(
    State(state): State<Arc<AppState>>,
    Path(path_username): Path<String>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
) -> Result<impl IntoResponse, ApiError> {
    let ip = client_ip(&headers, peer);
    if !state.rate_limiter.hit(Scope::PollIp, &ip, state.now()) {
        return Err(ApiError::RateLimited);
    }
    check_server_key(&headers, &state)?;

    let username = normalize::username(&path_username);
    let events = state.events.drain_roblox(&username);
    Ok(Json(json!({ "ok": true, "events": events })))
}
