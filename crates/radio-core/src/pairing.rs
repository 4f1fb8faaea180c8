//! One-shot pairing codes: a game-server client issues a code for an
//! in-game user, a browser client redeems it once for a capability token.
//!
//! A `(username, code)` pair moves through four states: absent, pending
//! (issued, unexpired, unredeemed), redeemed (terminal, not stored), expired
//! (terminal, not stored). Only the pending state is ever materialized.

use std::collections::HashMap;

use parking_lot::RwLock;
use thiserror::Error;

use crate::clock::{generate_code, Millis};

const MAX_ISSUE_ATTEMPTS: u32 = 12;

struct PairingRecord {
    username: String,
    have_pass: bool,
    exp: Millis,
}

/// Two-way mapping maintained under one lock so "at most one live code per
/// user" can be enforced atomically against lookups by code.
#[derive(Default)]
struct Tables {
    by_code: HashMap<String, PairingRecord>,
    by_user: HashMap<String, String>,
}

#[derive(Default)]
pub struct PairingRegistry {
    tables: RwLock<Tables>,
    ttl_ms: Millis,
}

impl PairingRegistry {
    pub fn new(ttl_ms: Millis) -> Self {
        Self {
            tables: RwLock::default(),
            ttl_ms,
        }
    }

    /// Issue a fresh code for `username` (already lowercased), pre-empting
    /// any code that user already holds. Does not itself touch revocation,
    /// radio state, or the push hub — those cross-cutting effects are the
    /// caller's responsibility (see the dispatcher's `issue` operation),
    /// kept separate so this type stays a plain two-way map.
    pub fn issue(&self, username: &str, have_pass: bool, now: Millis) -> Result<IssuedCode, IssueError> {
        let mut tables = self.tables.write();

        if let Some(old_code) = tables.by_user.remove(username) {
            tables.by_code.remove(&old_code);
        }

        for _ in 0..MAX_ISSUE_ATTEMPTS {
            let code = generate_code();
            if !tables.by_code.contains_key(&code) {
                let exp = now + self.ttl_ms;
                tables.by_code.insert(
                    code.clone(),
                    PairingRecord {
                        username: username.to_string(),
                        have_pass,
                        exp,
                    },
                );
                tables.by_user.insert(username.to_string(), code.clone());
                return Ok(IssuedCode { code, exp });
            }
        }
        Err(IssueError::CodeGenerationFailed)
    }

    /// Redeem `code` (already uppercased/trimmed). Deletes the record
    /// whether or not it is expired, per §4.2.
    pub fn redeem(&self, code: &str, now: Millis) -> Result<RedeemedCode, RedeemError> {
        let mut tables = self.tables.write();
        let record = tables.by_code.remove(code).ok_or(RedeemError::InvalidOrExpired)?;
        tables.by_user.remove(&record.username);

        if record.exp <= now {
            return Err(RedeemError::InvalidOrExpired);
        }

        Ok(RedeemedCode {
            username: record.username,
            have_pass: record.have_pass,
        })
    }

    /// The live code for `username`, if any (for invariant checks/tests).
    pub fn code_for_user(&self, username: &str) -> Option<String> {
        self.tables.read().by_user.get(username).cloned()
    }

    pub fn contains_code(&self, code: &str) -> bool {
        self.tables.read().by_code.contains_key(code)
    }

    /// Drop expired codes. Removes the user-index entry alongside each.
    pub fn gc(&self, now: Millis) -> usize {
        let mut tables = self.tables.write();
        let expired: Vec<String> = tables
            .by_code
            .iter()
            .filter(|(_, r)| r.exp <= now)
            .map(|(code, _)| code.clone())
            .collect();
        let removed = expired.len();
        for code in expired {
            if let Some(record) = tables.by_code.remove(&code) {
                tables.by_user.remove(&record.username);
            }
        }
        removed
    }
}

pub struct IssuedCode {
    pub code: String,
    pub exp: Millis,
}

#[derive(Debug)]
pub struct RedeemedCode {
    pub username: String,
    pub have_pass: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum IssueError {
    #[error("code_generation_failed")]
    CodeGenerationFailed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum RedeemError {
    #[error("invalid_or_expired")]
    InvalidOrExpired,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn issue_then_redeem_round_trips() {
        let registry = PairingRegistry::new(120_000);
        let issued = registry.issue("alice", true, 1_000).unwrap();
        assert_eq!(issued.exp, 121_000);
        assert_eq!(registry.code_for_user("alice").as_deref(), Some(issued.code.as_str()));

        let redeemed = registry.redeem(&issued.code, 1_500).unwrap();
        assert_eq!(redeemed.username, "alice");
        assert!(redeemed.have_pass);

        // redemption deletes the code
        assert!(registry.redeem(&issued.code, 1_500).is_err());
        assert_eq!(registry.code_for_user("alice"), None);
    }

    #[test]
    fn reissue_preempts_old_code() {
        let registry = PairingRegistry::new(120_000);
        let first = registry.issue("alice", false, 0).unwrap();
        let second = registry.issue("alice", false, 10).unwrap();
        assert!(!registry.contains_code(&first.code) || first.code == second.code);
        assert_eq!(registry.code_for_user("alice").as_deref(), Some(second.code.as_str()));
    }

    #[test]
    fn expired_code_rejected_and_removed() {
        let registry = PairingRegistry::new(1_000);
        let issued = registry.issue("alice", false, 0).unwrap();
        let err = registry.redeem(&issued.code, 2_000).unwrap_err();
        assert_eq!(err, RedeemError::InvalidOrExpired);
        assert_eq!(registry.code_for_user("alice"), None);
    }

    #[test]
    fn gc_removes_only_expired() {
        let registry = PairingRegistry::new(1_000);
        let expired = registry.issue("alice", false, 0).unwrap();
        registry.redeem(&expired.code, 0).ok(); // put alice back to absent
        let alive = registry.issue("bob", false, 5_000).unwrap();
        let removed = registry.gc(5_500);
        assert_eq!(removed, 0);
        assert!(registry.contains_code(&alive.code));

        let removed_later = registry.gc(6_501);
        assert_eq!(removed_later, 1);
        assert_eq!(registry.code_for_user("bob"), None);
    }

    #[test]
    fn invariant_secondary_index_matches_primary() {
        let registry = PairingRegistry::new(120_000);
        let issued = registry.issue("alice", false, 0).unwrap();
        let code = registry.code_for_user("alice").unwrap();
        assert_eq!(code, issued.code);
        assert!(registry.contains_code(&code));
    }
}
