//! `GET /events/:u` — the push channel. Admission runs the five checks of
//! §4.4 in order, then the connection streams `hello`, every broadcast
//! frame, and a periodic `ping` heartbeat until the client disconnects.

use std::collections::HashMap;
use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::{ConnectInfo, Path, Query, State};
use axum::http::HeaderMap;
use axum::response::sse::{Event, Sse};
use futures::stream::Stream;
use serde_json::json;

use radio_core::push::{PushFrame, Subscription};
use radio_core::ratelimit::Scope;
use radio_core::state::AppState;

use crate::error::ApiError;
use crate::extract::{client_ip, find_token};

pub async fn subscribe(
    State(state): State<Arc<AppState>>,
    Path(path_username): Path<String>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    Query(query): Query<HashMap<String, String>>,
    headers: HeaderMap,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, ApiError> {
    let ip = client_ip(&headers, peer);
    let username = radio_core::normalize::username(&path_username);

    // (1) per-IP open rate
    if !state.rate_limiter.hit(Scope::SseOpenIp, &ip, state.now()) {
        return Err(ApiError::RateLimited);
    }
    // (2) per-user open rate
    if !state.rate_limiter.hit(Scope::SseOpenUser, &username, state.now()) {
        return Err(ApiError::RateLimited);
    }
    // (3) token must verify and match the path user
    let token = find_token(&headers, &query, None).ok_or(ApiError::Unauthorized("missing_token"))?;
    let verified = state.verify_token(&token)?;
    if verified.username != username {
        return Err(ApiError::TokenUserMismatch);
    }
    // (4), (5) per-user / per-ip subscriber caps
    let subscription = state.push.subscribe(&username, &ip)?;

    let hello = Event::default()
        .event("hello")
        .data(serde_json::to_string(&json!({"ok": true, "username": username})).unwrap());

    let heartbeat_ms = state.config.push_heartbeat_ms.max(1) as u64;
    let stream = build_stream(state, username, subscription, hello, heartbeat_ms);

    Ok(Sse::new(stream))
}

/// Interleave the subscriber's frame channel with a periodic `ping`, and
/// release the subscription (and its per-IP slot) the moment the stream is
/// dropped — whether the client disconnects or the task is cancelled.
fn build_stream(
    state: Arc<AppState>,
    username: String,
    subscription: Subscription,
    hello: Event,
    heartbeat_ms: u64,
) -> impl Stream<Item = Result<Event, Infallible>> {
    struct Guard {
        state: Arc<AppState>,
        username: String,
        id: radio_core::push::SubscriberId,
    }
    impl Drop for Guard {
        fn drop(&mut self) {
            self.state.push.remove(&self.username, self.id);
        }
    }

    let guard = Guard {
        state,
        username,
        id: subscription.id,
    };

    let frames = subscription.frames;
    let ticker = tokio::time::interval(Duration::from_millis(heartbeat_ms));

    futures::stream::unfold(
        (guard, Some(hello), frames, ticker),
        |(guard, mut pending_hello, mut frames, mut ticker)| async move {
            if let Some(hello) = pending_hello.take() {
                return Some((Ok(hello), (guard, None, frames, ticker)));
            }
            tokio::select! {
                frame = frames.recv() => {
                    let event = render(frame?);
                    Some((Ok(event), (guard, None, frames, ticker)))
                }
                _ = ticker.tick() => {
                    let ping = Event::default()
                        .event("ping")
                        .data(serde_json::to_string(&json!({})).unwrap());
                    Some((Ok(ping), (guard, None, frames, ticker)))
                }
            }
        },
    )
}

fn render(frame: PushFrame) -> Event {
    Event::default().event(frame.event).data(frame.data)
}
