//! Process entry point: load configuration from the environment, wire up
//! the router, start the GC scheduler, and serve.

use std::net::SocketAddr;
use std::sync::Arc;

use radio_core::config::Config;
use radio_core::scheduler::Scheduler;
use radio_core::state::AppState;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt::init();

    let config = Config::from_env();
    let port = config.port;

    let state = Arc::new(AppState::new(config));
    let scheduler = Scheduler::start(state.clone());
    let app = radio_server::build_router(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .expect("failed to bind listener");

    tracing::info!(%addr, "radio-server listening");

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await
    .expect("server error");

    scheduler.shutdown();
}
