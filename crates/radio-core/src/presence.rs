//! Game-server-reported presence: whether a user is currently in-game, and
//! whether they hold a radio pass. Has no intrinsic TTL — it's consulted as
//! a precondition by most write paths, not expired on its own.

use std::collections::HashMap;

use parking_lot::RwLock;

use crate::clock::Millis;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PresenceRecord {
    pub in_game: bool,
    pub have_pass: bool,
    pub updated_at: Millis,
}

#[derive(Default)]
pub struct PresenceRegistry {
    users: RwLock<HashMap<String, PresenceRecord>>,
}

impl PresenceRegistry {
    /// Publish presence for `username` (already lowercased). `have_pass`
    /// only overwrites the stored value when explicitly provided — a
    /// presence ping without it leaves the prior value untouched, except on
    /// first publish where it defaults to `false`.
    pub fn publish(&self, username: &str, in_game: bool, have_pass: Option<bool>, now: Millis) {
        let mut users = self.users.write();
        let have_pass = have_pass.unwrap_or_else(|| {
            users
                .get(username)
                .map(|r| r.have_pass)
                .unwrap_or(false)
        });
        users.insert(
            username.to_string(),
            PresenceRecord {
                in_game,
                have_pass,
                updated_at: now,
            },
        );
    }

    pub fn get(&self, username: &str) -> Option<PresenceRecord> {
        self.users.read().get(username).copied()
    }

    pub fn is_in_game(&self, username: &str) -> bool {
        self.get(username).is_some_and(|r| r.in_game)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn publish_then_read_round_trips() {
        let registry = PresenceRegistry::default();
        registry.publish("alice", true, Some(true), 1_000);
        let record = registry.get("alice").unwrap();
        assert!(record.in_game);
        assert!(record.have_pass);
        assert_eq!(record.updated_at, 1_000);
    }

    #[test]
    fn missing_user_is_not_in_game() {
        let registry = PresenceRegistry::default();
        assert!(!registry.is_in_game("nobody"));
    }

    #[test]
    fn have_pass_defaults_and_persists_when_omitted() {
        let registry = PresenceRegistry::default();
        registry.publish("alice", true, None, 1_000);
        assert!(!registry.get("alice").unwrap().have_pass);

        registry.publish("alice", true, Some(true), 2_000);
        assert!(registry.get("alice").unwrap().have_pass);

        // a later ping that omits havePass does not clobber it back to false
        registry.publish("alice", false, None, 3_000);
        let record = registry.get("alice").unwrap();
        assert!(!record.in_game);
        assert!(record.have_pass);
    }
}
