//! The closed set of error responses this service can produce (§7). Every
//! variant renders to exactly the status code and `error` string the
//! external interface documents — no exception text or internal detail
//! ever reaches a client.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;

use radio_core::push::AdmissionError;
use radio_core::state::{IssueFailure, RedeemFailure};
use radio_core::token::TokenError;

#[derive(Debug, Clone)]
pub enum ApiError {
    MissingField(&'static str),
    Unauthorized(&'static str),
    TokenUserMismatch,
    NotInGame,
    RateLimited,
    CodeGenerationFailed,
}

impl ApiError {
    fn status_and_code(&self) -> (StatusCode, String) {
        match self {
            ApiError::MissingField(field) => {
                (StatusCode::BAD_REQUEST, format!("missing_field:{field}"))
            }
            ApiError::Unauthorized(code) => (StatusCode::UNAUTHORIZED, (*code).to_string()),
            ApiError::TokenUserMismatch => {
                (StatusCode::FORBIDDEN, "token_user_mismatch".to_string())
            }
            ApiError::NotInGame => (StatusCode::FORBIDDEN, "not_in_game".to_string()),
            ApiError::RateLimited => (StatusCode::TOO_MANY_REQUESTS, "rate_limited".to_string()),
            ApiError::CodeGenerationFailed => {
                (StatusCode::INTERNAL_SERVER_ERROR, "code_generation_failed".to_string())
            }
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error) = self.status_and_code();
        (status, Json(json!({ "ok": false, "error": error }))).into_response()
    }
}

impl From<TokenError> for ApiError {
    fn from(err: TokenError) -> Self {
        ApiError::Unauthorized(err.code())
    }
}

impl From<AdmissionError> for ApiError {
    fn from(_: AdmissionError) -> Self {
        // capacity refusals are rate/cap violations per §4.4, rendered as 429
        ApiError::RateLimited
    }
}

impl From<IssueFailure> for ApiError {
    fn from(err: IssueFailure) -> Self {
        match err {
            IssueFailure::NotInGame => ApiError::NotInGame,
            IssueFailure::CodeGenerationFailed => ApiError::CodeGenerationFailed,
        }
    }
}

/// `redeem` failures are not rendered through `ApiError` — per §7 they are
/// soft failures: `200 {ok:false, error:...}`, handled directly by the
/// session handler rather than as an HTTP error status.
impl RedeemFailureExt for RedeemFailure {
    fn code(self) -> &'static str {
        match self {
            RedeemFailure::InvalidOrExpired => "invalid_or_expired",
            RedeemFailure::NotInGame => "not_in_game",
        }
    }
}

pub trait RedeemFailureExt {
    fn code(self) -> &'static str;
}
