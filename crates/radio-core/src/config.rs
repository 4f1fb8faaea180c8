//! Runtime configuration: the numeric constants from §3 plus the
//! environment-derived knobs from §6. Building this from the process
//! environment is the server binary's job ([`Config::from_env`]); this type
//! itself is plain data so it's trivial to construct in tests.

use crate::clock::Millis;

#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    pub roblox_server_key: Option<String>,
    pub web_token_secret: Option<Vec<u8>>,
    pub allowed_origins: Vec<String>,
    pub max_sse_per_user: u32,
    pub max_sse_per_ip: u32,

    pub session_ttl_ms: Millis,
    pub radio_ttl_ms: Millis,
    pub state_ttl_ms: Millis,
    pub state_min_gap_ms: Millis,
    pub web_token_ttl_ms: Millis,
    pub push_heartbeat_ms: Millis,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: 3000,
            roblox_server_key: None,
            web_token_secret: None,
            allowed_origins: Vec::new(),
            max_sse_per_user: 3,
            max_sse_per_ip: 10,

            session_ttl_ms: 120_000,
            radio_ttl_ms: 300_000,
            state_ttl_ms: 25_000,
            state_min_gap_ms: 700,
            web_token_ttl_ms: 600_000,
            push_heartbeat_ms: 20_000,
        }
    }
}

impl Config {
    /// Build configuration from the process environment, falling back to
    /// documented defaults for anything absent or unparsable (§4.9 — an
    /// operator typo degrades gracefully rather than crashing startup).
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let port = std::env::var("PORT")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(defaults.port);

        let roblox_server_key = std::env::var("ROBLOX_SERVER_KEY")
            .ok()
            .filter(|s| !s.is_empty());

        let web_token_secret = std::env::var("WEB_TOKEN_SECRET")
            .ok()
            .filter(|s| !s.is_empty())
            .map(String::into_bytes);

        let allowed_origins = std::env::var("ALLOWED_ORIGINS")
            .ok()
            .map(|v| {
                v.split(',')
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default();

        let max_sse_per_user = std::env::var("MAX_SSE_PER_USER")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(defaults.max_sse_per_user);

        let max_sse_per_ip = std::env::var("MAX_SSE_PER_IP")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(defaults.max_sse_per_ip);

        Self {
            port,
            roblox_server_key,
            web_token_secret,
            allowed_origins,
            max_sse_per_user,
            max_sse_per_ip,
            ..defaults
        }
    }

    /// Whether `origin` is allowed by `ALLOWED_ORIGINS` (empty list means
    /// allow any origin, per §6).
    pub fn origin_allowed(&self, origin: &str) -> bool {
        self.allowed_origins.is_empty() || self.allowed_origins.iter().any(|o| o == origin)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_spec() {
        let config = Config::default();
        assert_eq!(config.port, 3000);
        assert_eq!(config.max_sse_per_user, 3);
        assert_eq!(config.max_sse_per_ip, 10);
        assert_eq!(config.session_ttl_ms, 120_000);
        assert_eq!(config.radio_ttl_ms, 300_000);
        assert_eq!(config.state_ttl_ms, 25_000);
        assert_eq!(config.state_min_gap_ms, 700);
        assert_eq!(config.web_token_ttl_ms, 600_000);
        assert_eq!(config.push_heartbeat_ms, 20_000);
    }

    #[test]
    fn from_env_falls_back_to_defaults_when_unset() {
        for key in [
            "PORT",
            "ROBLOX_SERVER_KEY",
            "WEB_TOKEN_SECRET",
            "ALLOWED_ORIGINS",
            "MAX_SSE_PER_USER",
            "MAX_SSE_PER_IP",
        ] {
            std::env::remove_var(key);
        }
        let config = Config::from_env();
        assert_eq!(config.port, 3000);
        assert_eq!(config.max_sse_per_user, 3);
        assert_eq!(config.max_sse_per_ip, 10);
    }

    #[test]
    fn empty_allowlist_allows_any_origin() {
        let config = Config::default();
        assert!(config.origin_allowed("https://anything.example"));
    }

    #[test]
    fn nonempty_allowlist_matches_exactly() {
        let mut config = Config::default();
        config.allowed_origins = vec!["https://ok.example".to_string()];
        assert!(config.origin_allowed("https://ok.example"));
        assert!(!config.origin_allowed("https://evil.example"));
    }
}
