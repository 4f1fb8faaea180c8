//! CORS policy builder (§6): allow any origin when the allowlist is empty,
//! otherwise echo the origin only on an exact match.

use axum::http::{HeaderName, HeaderValue, Method};
use tower_http::cors::{AllowOrigin, CorsLayer};

use radio_core::config::Config;

pub fn build(config: &Config) -> CorsLayer {
    let origins = config.allowed_origins.clone();

    let allow_origin = if origins.is_empty() {
        AllowOrigin::any()
    } else {
        AllowOrigin::predicate(move |origin: &HeaderValue, _| {
            origin
                .to_str()
                .map(|o| origins.iter().any(|allowed| allowed == o))
                .unwrap_or(false)
        })
    };

    CorsLayer::new()
        .allow_origin(allow_origin)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([
            axum::http::header::CONTENT_TYPE,
            HeaderName::from_static("x-roblox-key"),
            HeaderName::from_static("x-radio-token"),
        ])
        .max_age(std::time::Duration::from_secs(86_400))
}
