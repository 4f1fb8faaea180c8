//! HTTP bridge exposing `radio-core`'s coordination engine (§6): route
//! table, CORS policy, auth/extraction helpers, and the closed error
//! surface. Kept as a library so the binary and the integration tests
//! build the exact same router.

pub mod cors;
pub mod error;
pub mod extract;
pub mod handlers;

use std::sync::Arc;

use axum::routing::{get, post};
use axum::Router;
use tower_http::classify::StatusInRangeAsFailures;
use tower_http::trace::{DefaultMakeSpan, DefaultOnFailure, DefaultOnResponse, TraceLayer};
use tracing::Level;

use radio_core::state::AppState;

/// Build the full route table (§6) over a shared `AppState`, with the CORS
/// policy and per-request trace layer already applied.
pub fn build_router(state: Arc<AppState>) -> Router {
    let cors = cors::build(&state.config);

    // 4xx and 5xx both route through `on_failure` at warn (§4.10); only 2xx/3xx
    // are logged via `on_response` at debug.
    let trace = TraceLayer::new(StatusInRangeAsFailures::new(400..=599).into_make_classifier())
        .make_span_with(DefaultMakeSpan::new().level(Level::DEBUG))
        .on_response(DefaultOnResponse::new().level(Level::DEBUG))
        .on_failure(DefaultOnFailure::new().level(Level::WARN));

    Router::new()
        .route("/", get(banner))
        .route("/presence", post(handlers::presence::publish))
        .route("/presence/{u}", get(handlers::presence::read))
        .route("/session/create", post(handlers::session::create))
        .route("/session/verify", post(handlers::session::verify))
        .route("/events/{u}", get(handlers::stream::subscribe))
        .route("/radio/join", post(handlers::radio::join))
        .route("/radio/mute", post(handlers::radio::mute))
        .route("/radio/mute/server", post(handlers::radio::mute_server))
        .route("/radio/sync/{u}", get(handlers::radio::sync))
        .route("/radio/poll/{u}", get(handlers::radio::poll))
        .route("/radio/state", post(handlers::radio::update_state))
        .route("/radio/active", get(handlers::radio::active))
        .layer(trace)
        .layer(cors)
        .with_state(state)
}

async fn banner() -> &'static str {
    "radio-server is running"
}
