//! End-to-end coverage of the external interface (§6) driven straight
//! through the router, mirroring the scenarios in §8.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::body::Body;
use axum::extract::ConnectInfo;
use axum::http::{Request, StatusCode};
use serde_json::{json, Value};
use tower::ServiceExt;

use radio_core::clock::FixedClock;
use radio_core::config::Config;
use radio_core::state::AppState;

const PEER: &str = "203.0.113.7:5555";

fn app_with_clock(secret: Option<&str>) -> (axum::Router, Arc<FixedClock>) {
    let mut config = Config::default();
    config.roblox_server_key = Some("server-secret".to_string());
    config.web_token_secret = secret.map(|s| s.as_bytes().to_vec());
    let clock = Arc::new(FixedClock::new(1_000_000));
    let state = Arc::new(AppState::with_clock(config, clock.clone()));
    (radio_server::build_router(state), clock)
}

fn app() -> axum::Router {
    app_with_clock(Some("web-secret")).0
}

fn json_request(method: &str, path: &str, body: Value) -> Request<Body> {
    let mut req = Request::builder()
        .method(method)
        .uri(path)
        .header("content-type", "application/json")
        .body(Body::from(serde_json::to_vec(&body).unwrap()))
        .unwrap();
    req.extensions_mut()
        .insert(ConnectInfo(PEER.parse::<SocketAddr>().unwrap()));
    req
}

fn get_request(path: &str) -> Request<Body> {
    let mut req = Request::builder()
        .method("GET")
        .uri(path)
        .body(Body::empty())
        .unwrap();
    req.extensions_mut()
        .insert(ConnectInfo(PEER.parse::<SocketAddr>().unwrap()));
    req
}

async fn body_json(response: axum::response::Response) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn s1_happy_pairing() {
    let app = app();

    let resp = app
        .clone()
        .oneshot(json_request(
            "POST",
            "/presence",
            json!({"username": "Alice", "inGame": true}),
        ))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);

    let mut create_req = json_request("POST", "/session/create", json!({"username": "Alice"}));
    create_req
        .headers_mut()
        .insert("x-roblox-key", "server-secret".parse().unwrap());
    let resp = app.clone().oneshot(create_req).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let body = body_json(resp).await;
    assert_eq!(body["ok"], json!(true));
    let code = body["code"].as_str().unwrap().to_string();
    assert_eq!(code.len(), 7);

    let resp = app
        .clone()
        .oneshot(json_request(
            "POST",
            "/session/verify",
            json!({"code": code.to_lowercase()}),
        ))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let body = body_json(resp).await;
    assert_eq!(body["ok"], json!(true));
    assert_eq!(body["username"], json!("alice"));
    assert!(body["token"].as_str().is_some());
}

#[tokio::test]
async fn s2_reissue_revokes_previous_token() {
    let (app, clock) = app_with_clock(Some("web-secret"));

    app.clone()
        .oneshot(json_request(
            "POST",
            "/presence",
            json!({"username": "Alice", "inGame": true}),
        ))
        .await
        .unwrap();

    let mut create1 = json_request("POST", "/session/create", json!({"username": "Alice"}));
    create1
        .headers_mut()
        .insert("x-roblox-key", "server-secret".parse().unwrap());
    let body1 = body_json(app.clone().oneshot(create1).await.unwrap()).await;
    let code1 = body1["code"].as_str().unwrap().to_string();

    let verify1 = body_json(
        app.clone()
            .oneshot(json_request("POST", "/session/verify", json!({"code": code1})))
            .await
            .unwrap(),
    )
    .await;
    let token1 = verify1["token"].as_str().unwrap().to_string();

    clock.advance(1);

    let mut create2 = json_request("POST", "/session/create", json!({"username": "Alice"}));
    create2
        .headers_mut()
        .insert("x-roblox-key", "server-secret".parse().unwrap());
    app.clone().oneshot(create2).await.unwrap();

    // token1 is now revoked: using it on a token-gated route is 401
    let mut join_req = json_request("POST", "/radio/join", json!({"username": "alice"}));
    join_req
        .headers_mut()
        .insert("x-radio-token", token1.parse().unwrap());
    let resp = app.clone().oneshot(join_req).await.unwrap();
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    let body = body_json(resp).await;
    assert_eq!(body["error"], json!("token_revoked"));
}

#[tokio::test]
async fn s3_not_in_game_gating() {
    let app = app();
    app.clone()
        .oneshot(json_request(
            "POST",
            "/presence",
            json!({"username": "Bob", "inGame": false}),
        ))
        .await
        .unwrap();

    let mut req = json_request("POST", "/session/create", json!({"username": "Bob"}));
    req.headers_mut()
        .insert("x-roblox-key", "server-secret".parse().unwrap());
    let resp = app.oneshot(req).await.unwrap();
    assert_eq!(resp.status(), StatusCode::FORBIDDEN);
    let body = body_json(resp).await;
    assert_eq!(body["error"], json!("not_in_game"));
}

#[tokio::test]
async fn s5_join_coalescing() {
    let app = app();
    app.clone()
        .oneshot(json_request(
            "POST",
            "/presence",
            json!({"username": "Alice", "inGame": true}),
        ))
        .await
        .unwrap();

    let mut create = json_request("POST", "/session/create", json!({"username": "Alice"}));
    create
        .headers_mut()
        .insert("x-roblox-key", "server-secret".parse().unwrap());
    let body = body_json(app.clone().oneshot(create).await.unwrap()).await;
    let code = body["code"].as_str().unwrap().to_string();
    let verify = body_json(
        app.clone()
            .oneshot(json_request("POST", "/session/verify", json!({"code": code})))
            .await
            .unwrap(),
    )
    .await;
    let token = verify["token"].as_str().unwrap().to_string();

    let mut join1 = json_request("POST", "/radio/join", json!({"username": "alice"}));
    join1
        .headers_mut()
        .insert("x-radio-token", token.parse().unwrap());
    let first = body_json(app.clone().oneshot(join1).await.unwrap()).await;
    assert_eq!(first, json!({"ok": true}));

    let mut join2 = json_request("POST", "/radio/join", json!({"username": "alice"}));
    join2
        .headers_mut()
        .insert("x-radio-token", token.parse().unwrap());
    let second = body_json(app.clone().oneshot(join2).await.unwrap()).await;
    assert_eq!(second, json!({"ok": true, "ignored": true}));

    let mut poll = get_request("/radio/poll/alice");
    poll.headers_mut()
        .insert("x-roblox-key", "server-secret".parse().unwrap());
    let polled = body_json(app.oneshot(poll).await.unwrap()).await;
    let events = polled["events"].as_array().unwrap();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0]["type"], json!("RADIO_JOIN"));
}

#[tokio::test]
async fn session_verify_without_secret_still_redeems() {
    let (app, _clock) = app_with_clock(None);
    app.clone()
        .oneshot(json_request(
            "POST",
            "/presence",
            json!({"username": "Alice", "inGame": true}),
        ))
        .await
        .unwrap();

    let mut create = json_request("POST", "/session/create", json!({"username": "Alice"}));
    create
        .headers_mut()
        .insert("x-roblox-key", "server-secret".parse().unwrap());
    let body = body_json(app.clone().oneshot(create).await.unwrap()).await;
    let code = body["code"].as_str().unwrap().to_string();

    let verify = body_json(
        app.oneshot(json_request("POST", "/session/verify", json!({"code": code})))
            .await
            .unwrap(),
    )
    .await;
    assert_eq!(verify["ok"], json!(true));
    assert_eq!(verify["token"], Value::Null);
}

#[tokio::test]
async fn unknown_user_presence_reports_absent() {
    let app = app();
    let resp = app.oneshot(get_request("/presence/ghost")).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let body = body_json(resp).await;
    assert_eq!(body, json!({"ok": true, "exists": false, "inGame": false, "havePass": false}));
}

#[tokio::test]
async fn active_listing_is_empty_with_no_listeners() {
    let app = app();
    let resp = app.oneshot(get_request("/radio/active")).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let body = body_json(resp).await;
    assert_eq!(body["listeners"], json!([]));
}
