//! Self-contained capability tokens.
//!
//! A token is `payload.signature`, both URL-safe-base64. `payload` decodes to
//! a JSON record of `{username, issuedAt, expiresAt}`; `signature` is
//! `HMAC-SHA256(secret, payload_b64)`. There is no server-side token table —
//! revocation is a per-user watermark (see [`crate::revocation`]), not a scan
//! over issued tokens.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine as _;
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use thiserror::Error;

use crate::clock::Millis;
use crate::revocation::RevocationLog;

type HmacSha256 = Hmac<Sha256>;

#[derive(Debug, Clone, Serialize, Deserialize)]
struct Claims {
    username: String,
    #[serde(rename = "issuedAt")]
    issued_at: Millis,
    #[serde(rename = "expiresAt")]
    expires_at: Millis,
}

/// Closed set of verification failure kinds, surfaced verbatim to callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum TokenError {
    #[error("token_disabled")]
    Disabled,
    #[error("missing_token")]
    Missing,
    #[error("bad_token_format")]
    BadFormat,
    #[error("bad_signature")]
    BadSignature,
    #[error("bad_payload")]
    BadPayload,
    #[error("token_expired")]
    Expired,
    #[error("token_revoked")]
    Revoked,
}

impl TokenError {
    /// The exact string that appears in the `error` field of a response.
    pub fn code(self) -> &'static str {
        match self {
            TokenError::Disabled => "token_disabled",
            TokenError::Missing => "missing_token",
            TokenError::BadFormat => "bad_token_format",
            TokenError::BadSignature => "bad_signature",
            TokenError::BadPayload => "bad_payload",
            TokenError::Expired => "token_expired",
            TokenError::Revoked => "token_revoked",
        }
    }
}

/// A successfully verified token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerifiedToken {
    pub username: String,
    pub issued_at: Millis,
    pub expires_at: Millis,
}

/// Mints and verifies capability tokens against a shared HMAC secret.
pub struct TokenAuthority {
    secret: Option<Vec<u8>>,
    ttl_ms: Millis,
}

impl TokenAuthority {
    pub fn new(secret: Option<Vec<u8>>, ttl_ms: Millis) -> Self {
        let secret = secret.filter(|s| !s.is_empty());
        Self { secret, ttl_ms }
    }

    pub fn is_enabled(&self) -> bool {
        self.secret.is_some()
    }

    /// Mint a token for `username` (already lowercased) at `now`. Returns
    /// `None` when no secret is configured.
    pub fn mint(&self, username: &str, now: Millis) -> Option<(String, Millis)> {
        let secret = self.secret.as_ref()?;
        let expires_at = now + self.ttl_ms;
        let claims = Claims {
            username: username.to_string(),
            issued_at: now,
            expires_at,
        };
        let payload_json = serde_json::to_vec(&claims).expect("claims always serialize");
        let payload_b64 = URL_SAFE_NO_PAD.encode(payload_json);

        let mut mac = HmacSha256::new_from_slice(secret).expect("HMAC accepts any key length");
        mac.update(payload_b64.as_bytes());
        let sig_b64 = URL_SAFE_NO_PAD.encode(mac.finalize().into_bytes());

        Some((format!("{payload_b64}.{sig_b64}"), expires_at))
    }

    /// Verify `token` against `now` and the caller's revocation log.
    pub fn verify(
        &self,
        token: &str,
        now: Millis,
        revocations: &RevocationLog,
    ) -> Result<VerifiedToken, TokenError> {
        let Some(secret) = self.secret.as_ref() else {
            return Err(TokenError::Disabled);
        };
        if token.is_empty() {
            return Err(TokenError::Missing);
        }

        let (payload_b64, sig_b64) = token.split_once('.').ok_or(TokenError::BadFormat)?;
        let sig_bytes = URL_SAFE_NO_PAD
            .decode(sig_b64)
            .map_err(|_| TokenError::BadFormat)?;

        let mut mac = HmacSha256::new_from_slice(secret).expect("HMAC accepts any key length");
        mac.update(payload_b64.as_bytes());
        // `verify_slice` length-checks before comparing, and compares in constant time.
        mac.verify_slice(&sig_bytes).map_err(|_| TokenError::BadSignature)?;

        let payload_bytes = URL_SAFE_NO_PAD
            .decode(payload_b64)
            .map_err(|_| TokenError::BadPayload)?;
        let claims: Claims =
            serde_json::from_slice(&payload_bytes).map_err(|_| TokenError::BadPayload)?;

        if claims.expires_at <= now {
            return Err(TokenError::Expired);
        }
        if claims.issued_at < revocations.revoked_at(&claims.username) {
            return Err(TokenError::Revoked);
        }

        Ok(VerifiedToken {
            username: claims.username,
            issued_at: claims.issued_at,
            expires_at: claims.expires_at,
        })
    }
}
