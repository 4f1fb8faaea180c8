//! Per-user last-known playback snapshot, min-update-interval gated, with
//! a live "who's currently listening" view.

use std::collections::HashMap;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::clock::Millis;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Snapshot {
    pub track_index: i64,
    pub track_name: String,
    pub position_at: f64,
    pub is_playing: bool,
    pub muted: bool,
    pub server_ts: Millis,
    pub updated_at: Millis,
}

impl Default for Snapshot {
    fn default() -> Self {
        Self {
            track_index: 0,
            track_name: String::new(),
            position_at: 0.0,
            is_playing: false,
            muted: false,
            server_ts: 0,
            updated_at: 0,
        }
    }
}

/// Fields a `/radio/state` write may update. Missing or non-finite values
/// fall back to the previous snapshot's value (§4.5).
#[derive(Debug, Clone, Default)]
pub struct StateUpdate {
    pub track_index: Option<i64>,
    pub track_name: Option<String>,
    pub position_sec: Option<f64>,
    pub is_playing: Option<bool>,
    pub muted: Option<bool>,
}

#[derive(Default)]
pub struct RadioStateTable {
    snapshots: RwLock<HashMap<String, Snapshot>>,
}

/// An entry in the `/radio/active` listing.
#[derive(Debug, Clone, Serialize)]
pub struct ActiveListener {
    pub username: String,
    pub track_index: i64,
    pub track_name: String,
    pub position: f64,
    pub is_playing: bool,
    pub muted: bool,
    #[serde(rename = "lastSeenMs")]
    pub last_seen_ms: Millis,
}

impl RadioStateTable {
    /// Apply `update` for `username` at `now`, respecting `min_gap_ms`
    /// since the previous write. Returns `None` when the write is
    /// suppressed for being too soon (`ignored: true` to the caller).
    pub fn apply(
        &self,
        username: &str,
        update: StateUpdate,
        now: Millis,
        min_gap_ms: Millis,
    ) -> Option<Snapshot> {
        let mut snapshots = self.snapshots.write();
        let previous = snapshots.get(username).cloned().unwrap_or_default();

        if now - previous.updated_at < min_gap_ms && previous.updated_at != 0 {
            return None;
        }

        let position = update
            .position_sec
            .filter(|p| p.is_finite())
            .unwrap_or(previous.position_at)
            .max(0.0);

        let next = Snapshot {
            track_index: update.track_index.unwrap_or(previous.track_index),
            track_name: update.track_name.unwrap_or(previous.track_name),
            position_at: position,
            is_playing: update.is_playing.unwrap_or(previous.is_playing),
            muted: update.muted.unwrap_or(previous.muted),
            server_ts: now,
            updated_at: now,
        };
        snapshots.insert(username.to_string(), next.clone());
        Some(next)
    }

    /// Live "who's listening" view: skip anyone not currently in-game
    /// (`in_game` supplied by the caller per user), project position
    /// forward if playing, and sort ascending by `lastSeenMs`.
    pub fn active_listeners(
        &self,
        now: Millis,
        is_in_game: impl Fn(&str) -> bool,
    ) -> Vec<ActiveListener> {
        let snapshots = self.snapshots.read();
        let mut listeners: Vec<ActiveListener> = snapshots
            .iter()
            .filter(|(username, _)| is_in_game(username))
            .map(|(username, snapshot)| {
                let position = if snapshot.is_playing {
                    let elapsed_secs = ((now - snapshot.server_ts).max(0) as f64) / 1000.0;
                    snapshot.position_at + elapsed_secs.max(0.0)
                } else {
                    snapshot.position_at
                };
                ActiveListener {
                    username: username.clone(),
                    track_index: snapshot.track_index,
                    track_name: snapshot.track_name.clone(),
                    position,
                    is_playing: snapshot.is_playing,
                    muted: snapshot.muted,
                    last_seen_ms: now - snapshot.updated_at,
                }
            })
            .collect();
        listeners.sort_by_key(|l| l.last_seen_ms);
        listeners
    }

    pub fn remove(&self, username: &str) {
        self.snapshots.write().remove(username);
    }

    /// Purge snapshots untouched for longer than `ttl_ms`.
    pub fn gc(&self, now: Millis, ttl_ms: Millis) -> usize {
        let mut snapshots = self.snapshots.write();
        let before = snapshots.len();
        snapshots.retain(|_, s| now - s.updated_at < ttl_ms);
        before - snapshots.len()
    }
}
