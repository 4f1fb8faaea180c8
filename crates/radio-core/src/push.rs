//! Push channel: per-user set of active SSE subscribers with per-user and
//! per-IP caps, heartbeats, and best-effort, drop-on-overflow delivery.
//!
//! Each subscriber is modeled as a bounded `tokio::sync::mpsc` channel
//! rather than a direct write to the transport — this isolates one slow
//! consumer from stalling delivery to everyone else, and lets "best-effort,
//! swallow write failures" become "best-effort, drop on a full channel".

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::RwLock;
use serde::Serialize;
use tokio::sync::mpsc;

/// Outbound frame queue depth per subscriber before new sends are dropped.
const SUBSCRIBER_CHANNEL_CAPACITY: usize = 32;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SubscriberId(u64);

/// A framed server-sent event: `event: <name>\ndata: <json>\n\n`.
#[derive(Debug, Clone)]
pub struct PushFrame {
    pub event: &'static str,
    pub data: String,
}

impl PushFrame {
    pub fn new(event: &'static str, payload: &impl Serialize) -> Self {
        Self {
            event,
            data: serde_json::to_string(payload).expect("push payload always serializes"),
        }
    }

    pub fn render(&self) -> String {
        format!("event: {}\ndata: {}\n\n", self.event, self.data)
    }
}

struct Subscriber {
    id: SubscriberId,
    ip: String,
    tx: mpsc::Sender<PushFrame>,
}

#[derive(Default)]
struct HubState {
    by_user: HashMap<String, Vec<Subscriber>>,
    ip_counts: HashMap<String, u32>,
}

pub struct PushHub {
    state: RwLock<HubState>,
    next_id: AtomicU64,
    max_per_user: u32,
    max_per_ip: u32,
}

/// Why a subscription request was refused at the capacity checks — steps
/// (4) and (5) of the admission order in §4.4. Steps (1)-(3) (rate limits
/// and the token check) are the caller's responsibility, evaluated before
/// `subscribe` is ever reached.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdmissionError {
    UserAtCapacity,
    IpAtCapacity,
}

/// A handle to a newly admitted subscription: the caller reads `frames` to
/// stream to the transport, and must call [`PushHub::remove`] with `id` on
/// disconnect.
#[derive(Debug)]
pub struct Subscription {
    pub id: SubscriberId,
    pub frames: mpsc::Receiver<PushFrame>,
}

impl PushHub {
    pub fn new(max_per_user: u32, max_per_ip: u32) -> Self {
        Self {
            state: RwLock::default(),
            next_id: AtomicU64::new(1),
            max_per_user,
            max_per_ip,
        }
    }

    /// Admit a subscriber for `username` from `ip`, enforcing the per-user
    /// and per-IP caps (checks (4) and (5) of §4.4 — the rate-limit and
    /// token checks (1)-(3) are the caller's responsibility, evaluated
    /// before this is reached).
    pub fn subscribe(&self, username: &str, ip: &str) -> Result<Subscription, AdmissionError> {
        let mut state = self.state.write();

        let user_count = state.by_user.get(username).map_or(0, Vec::len) as u32;
        if user_count >= self.max_per_user {
            tracing::debug!(
                username,
                user_count,
                max_per_user = self.max_per_user,
                "push subscription refused: user at capacity"
            );
            return Err(AdmissionError::UserAtCapacity);
        }
        let ip_count = state.ip_counts.get(ip).copied().unwrap_or(0);
        if ip_count >= self.max_per_ip {
            tracing::debug!(
                ip,
                ip_count,
                max_per_ip = self.max_per_ip,
                "push subscription refused: ip at capacity"
            );
            return Err(AdmissionError::IpAtCapacity);
        }

        let id = SubscriberId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let (tx, rx) = mpsc::channel(SUBSCRIBER_CHANNEL_CAPACITY);
        state
            .by_user
            .entry(username.to_string())
            .or_default()
            .push(Subscriber {
                id,
                ip: ip.to_string(),
                tx,
            });
        *state.ip_counts.entry(ip.to_string()).or_insert(0) += 1;

        Ok(Subscription { id, frames: rx })
    }

    /// Release a subscriber on disconnect. Synchronous so membership and
    /// the per-IP count drop before the close notification returns.
    pub fn remove(&self, username: &str, id: SubscriberId) {
        let mut state = self.state.write();
        let mut removed_ip = None;
        let mut is_empty = false;
        if let Some(subscribers) = state.by_user.get_mut(username) {
            if let Some(pos) = subscribers.iter().position(|s| s.id == id) {
                removed_ip = Some(subscribers.remove(pos).ip);
            }
            is_empty = subscribers.is_empty();
        }
        if let Some(ip) = removed_ip {
            if let Some(count) = state.ip_counts.get_mut(&ip) {
                *count = count.saturating_sub(1);
                if *count == 0 {
                    state.ip_counts.remove(&ip);
                }
            }
        }
        if is_empty {
            state.by_user.remove(username);
        }
    }

    /// Best-effort broadcast to every subscriber of `username`. A full
    /// channel (slow consumer) drops the frame for that subscriber only;
    /// it never blocks or errors the caller.
    pub fn send(&self, username: &str, frame: &PushFrame) {
        let state = self.state.read();
        let Some(subscribers) = state.by_user.get(username) else {
            return;
        };
        for subscriber in subscribers {
            let _ = subscriber.tx.try_send(frame.clone());
        }
    }

    pub fn subscriber_count(&self, username: &str) -> usize {
        self.state.read().by_user.get(username).map_or(0, Vec::len)
    }

    pub fn ip_count(&self, ip: &str) -> u32 {
        self.state.read().ip_counts.get(ip).copied().unwrap_or(0)
    }
}
