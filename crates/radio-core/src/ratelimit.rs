//! Fixed-window rate limiting, keyed by `(scope, principal)`.

use std::collections::HashMap;

use parking_lot::Mutex;

use crate::clock::Millis;

/// The named scopes a request can be rate-limited under. Each carries its
/// own window and quota (§4.6).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Scope {
    Verify,
    SseOpenIp,
    SseOpenUser,
    JoinIp,
    MuteIp,
    SyncIp,
    StateIp,
    ActiveIp,
    PollIp,
    PresenceIp,
}

impl Scope {
    const fn config(self) -> (Millis, u32) {
        match self {
            Scope::Verify => (15_000, 12),
            Scope::SseOpenIp => (60_000, 60),
            Scope::SseOpenUser => (60_000, 60),
            Scope::JoinIp => (10_000, 25),
            Scope::MuteIp => (10_000, 25),
            Scope::SyncIp => (10_000, 40),
            Scope::StateIp => (10_000, 80),
            Scope::ActiveIp => (10_000, 40),
            Scope::PollIp => (10_000, 80),
            Scope::PresenceIp => (10_000, 200),
        }
    }
}

struct Counter {
    count: u32,
    reset_at: Millis,
}

/// Maximum number of stale entries a single GC sweep will evict, bounding
/// pause time under a pathological number of distinct principals.
const MAX_GC_PER_SWEEP: usize = 5_000;

#[derive(Default)]
pub struct RateLimiter {
    counters: Mutex<HashMap<(Scope, String), Counter>>,
}

impl RateLimiter {
    /// Record a hit for `(scope, principal)` at `now`. Returns `true` if the
    /// request is allowed, `false` if the scope's quota is exceeded.
    pub fn hit(&self, scope: Scope, principal: &str, now: Millis) -> bool {
        let (window_ms, max) = scope.config();
        let mut counters = self.counters.lock();
        let key = (scope, principal.to_string());
        let counter = counters.entry(key).or_insert(Counter {
            count: 0,
            reset_at: now + window_ms,
        });

        if counter.reset_at <= now {
            counter.count = 0;
            counter.reset_at = now + window_ms;
        }

        counter.count += 1;
        let allowed = counter.count <= max;
        if !allowed {
            tracing::debug!(
                ?scope,
                principal,
                count = counter.count,
                max,
                "rate limit exceeded"
            );
        }
        allowed
    }

    /// Evict expired counters, capped at [`MAX_GC_PER_SWEEP`] deletions.
    pub fn gc(&self, now: Millis) -> usize {
        let mut counters = self.counters.lock();
        let stale: Vec<(Scope, String)> = counters
            .iter()
            .filter(|(_, c)| c.reset_at <= now)
            .take(MAX_GC_PER_SWEEP)
            .map(|(k, _)| k.clone())
            .collect();
        let removed = stale.len();
        for key in stale {
            counters.remove(&key);
        }
        removed
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.counters.lock().len()
    }
}
