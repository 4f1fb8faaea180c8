//! Per-user ordered event queue with audience-filtered drain and
//! append-time coalescing.

use std::collections::HashMap;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::clock::Millis;

pub const JOIN_DEDUP_WINDOW_MS: Millis = 10_000;
pub const MUTE_DEDUP_WINDOW_MS: Millis = 1_500;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Audience {
    Roblox,
    Web,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum EventKind {
    #[serde(rename = "RADIO_JOIN")]
    RadioJoin,
    #[serde(rename = "RADIO_MUTE")]
    RadioMute { muted: bool },
    #[serde(rename = "RADIO_UNMUTE")]
    RadioUnmute { muted: bool },
    #[serde(rename = "KICK")]
    Kick { reason: String },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventRecord {
    #[serde(flatten)]
    pub kind: EventKind,
    pub audience: Audience,
    pub ts: Millis,
}

impl EventRecord {
    fn muted_value(&self) -> Option<bool> {
        match &self.kind {
            EventKind::RadioMute { muted } | EventKind::RadioUnmute { muted } => Some(*muted),
            _ => None,
        }
    }

    fn is_join(&self) -> bool {
        matches!(self.kind, EventKind::RadioJoin)
    }

    fn is_mute_family(&self) -> bool {
        matches!(self.kind, EventKind::RadioMute { .. } | EventKind::RadioUnmute { .. })
    }
}

/// Outcome of appending an event: whether it was actually stored or
/// suppressed by coalescing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppendOutcome {
    Stored,
    Ignored,
}

#[derive(Default)]
pub struct EventStore {
    queues: Mutex<HashMap<String, Vec<EventRecord>>>,
}

impl EventStore {
    /// Append `record` to `username`'s queue, applying the coalescing rules
    /// from §4.3. `username` is already lowercased.
    pub fn append(&self, username: &str, record: EventRecord) -> AppendOutcome {
        let mut queues = self.queues.lock();
        let queue = queues.entry(username.to_string()).or_default();

        if let Some(last) = queue.last() {
            if record.is_join() && last.is_join() && record.ts - last.ts < JOIN_DEDUP_WINDOW_MS {
                return AppendOutcome::Ignored;
            }
            if record.is_mute_family()
                && last.is_mute_family()
                && record.muted_value() == last.muted_value()
                && record.ts - last.ts < MUTE_DEDUP_WINDOW_MS
            {
                return AppendOutcome::Ignored;
            }
        }

        queue.push(record);
        AppendOutcome::Stored
    }

    /// Drain every record for `username` matching `predicate`, preserving
    /// the relative order of what remains.
    fn drain_matching(&self, username: &str, predicate: impl Fn(&EventRecord) -> bool) -> Vec<EventRecord> {
        let mut queues = self.queues.lock();
        let Some(queue) = queues.get_mut(username) else {
            return Vec::new();
        };
        let mut drained = Vec::new();
        queue.retain(|record| {
            if predicate(record) {
                drained.push(record.clone());
                false
            } else {
                true
            }
        });
        drained
    }

    /// Browser drain: records with `audience == web`.
    pub fn drain_web(&self, username: &str) -> Vec<EventRecord> {
        self.drain_matching(username, |r| r.audience == Audience::Web)
    }

    /// Game-server drain: records with `audience == roblox`.
    pub fn drain_roblox(&self, username: &str) -> Vec<EventRecord> {
        self.drain_matching(username, |r| r.audience == Audience::Roblox)
    }

    /// Drop events older than `max_age_ms`; remove the user's key entirely
    /// once its queue is empty.
    pub fn gc(&self, now: Millis, max_age_ms: Millis) -> usize {
        let cutoff = now - max_age_ms;
        let mut queues = self.queues.lock();
        let mut removed = 0;
        queues.retain(|_, queue| {
            let before = queue.len();
            queue.retain(|r| r.ts >= cutoff);
            removed += before - queue.len();
            !queue.is_empty()
        });
        removed
    }

    #[cfg(test)]
    pub fn queue_len(&self, username: &str) -> usize {
        self.queues.lock().get(username).map_or(0, Vec::len)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn join(ts: Millis, audience: Audience) -> EventRecord {
        EventRecord {
            kind: EventKind::RadioJoin,
            audience,
            ts,
        }
    }

    fn mute(ts: Millis, muted: bool, audience: Audience) -> EventRecord {
        EventRecord {
            kind: EventKind::RadioMute { muted },
            audience,
            ts,
        }
    }

    #[test]
    fn join_coalesced_within_window() {
        let store = EventStore::default();
        assert_eq!(
            store.append("alice", join(0, Audience::Web)),
            AppendOutcome::Stored
        );
        assert_eq!(
            store.append("alice", join(5_000, Audience::Web)),
            AppendOutcome::Ignored
        );
        assert_eq!(store.queue_len("alice"), 1);

        // outside the window, a new join is stored
        assert_eq!(
            store.append("alice", join(10_001, Audience::Web)),
            AppendOutcome::Stored
        );
        assert_eq!(store.queue_len("alice"), 2);
    }

    #[test]
    fn mute_coalesced_only_when_same_value() {
        let store = EventStore::default();
        store.append("alice", mute(0, true, Audience::Web));
        assert_eq!(
            store.append("alice", mute(1_000, true, Audience::Web)),
            AppendOutcome::Ignored
        );
        assert_eq!(
            store.append("alice", mute(1_100, false, Audience::Web)),
            AppendOutcome::Stored
        );
    }

    #[test]
    fn drain_is_audience_scoped_and_total_order_preserved() {
        let store = EventStore::default();
        store.append("alice", join(0, Audience::Roblox));
        store.append("alice", mute(20_000, true, Audience::Web));
        store.append("alice", mute(30_000, false, Audience::Web));

        let web = store.drain_web("alice");
        assert_eq!(web.len(), 2);
        assert_eq!(web[0].ts, 20_000);
        assert_eq!(web[1].ts, 30_000);

        let roblox = store.drain_roblox("alice");
        assert_eq!(roblox.len(), 1);

        // second drain sees nothing new
        assert!(store.drain_web("alice").is_empty());
    }

    #[test]
    fn gc_drops_old_events_and_empty_keys() {
        let store = EventStore::default();
        store.append("alice", join(0, Audience::Web));
        let removed = store.gc(400_000, 300_000);
        assert_eq!(removed, 1);
        assert_eq!(store.queue_len("alice"), 0);
    }
}
