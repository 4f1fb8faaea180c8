//! The single owned `State` value passed to every request handler and
//! every scheduler task — no process-wide singletons (§9).

use std::sync::Arc;

use crate::clock::{Clock, Millis, SystemClock};
use crate::config::Config;
use crate::events::{Audience, EventKind, EventRecord, EventStore};
use crate::pairing::{IssueError, PairingRegistry, RedeemError};
use crate::presence::PresenceRegistry;
use crate::push::PushHub;
use crate::radio_state::RadioStateTable;
use crate::ratelimit::RateLimiter;
use crate::revocation::RevocationLog;
use crate::token::{TokenAuthority, TokenError, VerifiedToken};

pub struct AppState {
    pub config: Config,
    pub clock: Arc<dyn Clock>,

    pub presence: PresenceRegistry,
    pub pairing: PairingRegistry,
    pub revocations: RevocationLog,
    pub tokens: TokenAuthority,
    pub events: EventStore,
    pub push: PushHub,
    pub radio_state: RadioStateTable,
    pub rate_limiter: RateLimiter,
}

/// Outcome of the cross-cutting `issue` operation (§4.2, §5): besides
/// minting the code it revokes the user's outstanding tokens, drops their
/// radio snapshot, and kicks any live push subscriber.
#[derive(Debug, PartialEq, Eq)]
pub struct IssueOutcome {
    pub code: String,
    pub exp: Millis,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IssueFailure {
    NotInGame,
    CodeGenerationFailed,
}

#[derive(Debug, PartialEq, Eq)]
pub struct RedeemOutcome {
    pub username: String,
    pub have_pass: bool,
    /// `None` when `WEB_TOKEN_SECRET` is unset — token issuance is disabled
    /// but redemption itself still succeeds (§4.1).
    pub token: Option<String>,
    pub token_exp: Option<Millis>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RedeemFailure {
    InvalidOrExpired,
    NotInGame,
}

impl AppState {
    pub fn new(config: Config) -> Self {
        Self::with_clock(config, Arc::new(SystemClock))
    }

    pub fn with_clock(config: Config, clock: Arc<dyn Clock>) -> Self {
        let tokens = TokenAuthority::new(config.web_token_secret.clone(), config.web_token_ttl_ms);
        let pairing = PairingRegistry::new(config.session_ttl_ms);
        let push = PushHub::new(config.max_sse_per_user, config.max_sse_per_ip);
        Self {
            config,
            clock,
            presence: PresenceRegistry::default(),
            pairing,
            revocations: RevocationLog::default(),
            tokens,
            events: EventStore::default(),
            push,
            radio_state: RadioStateTable::default(),
            rate_limiter: RateLimiter::default(),
        }
    }

    pub fn now(&self) -> Millis {
        self.clock.now_ms()
    }

    /// Issue a fresh pairing code for `username`, preconditioned on the
    /// user currently being in-game. Touches pairing, revocation, radio
    /// state, and the push hub in that fixed order (§5) so it can never
    /// deadlock against `redeem`, which only touches pairing and the token
    /// authority.
    pub fn issue(&self, username: &str, have_pass: bool) -> Result<IssueOutcome, IssueFailure> {
        if !self.presence.is_in_game(username) {
            return Err(IssueFailure::NotInGame);
        }

        let now = self.now();
        let issued = self
            .pairing
            .issue(username, have_pass, now)
            .map_err(|_: IssueError| IssueFailure::CodeGenerationFailed)?;

        self.revocations.revoke(username, now);
        self.radio_state.remove(username);

        let kick = EventRecord {
            kind: EventKind::Kick {
                reason: "new_code".to_string(),
            },
            audience: Audience::Web,
            ts: now,
        };
        self.events.append(username, kick.clone());
        self.push
            .send(username, &crate::push::PushFrame::new("radio", &kick));

        Ok(IssueOutcome {
            code: issued.code,
            exp: issued.exp,
        })
    }

    /// Redeem `code`. Deletes the pairing record whether or not the
    /// in-game check passes (§4.2).
    pub fn redeem(&self, code: &str) -> Result<RedeemOutcome, RedeemFailure> {
        let now = self.now();
        let redeemed = self
            .pairing
            .redeem(code, now)
            .map_err(|_: RedeemError| RedeemFailure::InvalidOrExpired)?;

        if !self.presence.is_in_game(&redeemed.username) {
            return Err(RedeemFailure::NotInGame);
        }

        let (token, token_exp) = match self.tokens.mint(&redeemed.username, now) {
            Some((token, exp)) => (Some(token), Some(exp)),
            None => (None, None),
        };

        Ok(RedeemOutcome {
            username: redeemed.username,
            have_pass: redeemed.have_pass,
            token,
            token_exp,
        })
    }

    pub fn verify_token(&self, token: &str) -> Result<VerifiedToken, TokenError> {
        self.tokens.verify(token, self.now(), &self.revocations)
    }
}
