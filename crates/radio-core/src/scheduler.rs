//! Periodic garbage collection of every TTL-indexed structure. Each task is
//! an independent `tokio::select!` loop over an interval tick and a
//! shutdown signal, mirroring the keep-alive loop shape used elsewhere in
//! this codebase — a missed tick just means the next one does a bigger
//! sweep, never a pile-up of concurrent sweeps.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;

use crate::state::AppState;

const PAIRING_GC_INTERVAL: Duration = Duration::from_secs(30);
const EVENT_GC_INTERVAL: Duration = Duration::from_secs(60);
const RADIO_STATE_GC_INTERVAL: Duration = Duration::from_secs(5);
const REVOCATION_GC_INTERVAL: Duration = Duration::from_secs(60);
const RATE_LIMIT_GC_INTERVAL: Duration = Duration::from_secs(60);

/// Handle to the running scheduler. Dropping it (or calling `shutdown`)
/// stops every task.
pub struct Scheduler {
    shutdown_tx: watch::Sender<()>,
}

impl Scheduler {
    /// Spawn the five periodic GC tasks against `state`.
    pub fn start(state: Arc<AppState>) -> Self {
        let (shutdown_tx, shutdown_rx) = watch::channel(());

        spawn_task(
            "pairing-gc",
            PAIRING_GC_INTERVAL,
            shutdown_rx.clone(),
            state.clone(),
            |state, now| {
                let removed = state.pairing.gc(now);
                if removed > 0 {
                    tracing::debug!(removed, "pairing GC swept expired codes");
                }
            },
        );

        spawn_task(
            "event-gc",
            EVENT_GC_INTERVAL,
            shutdown_rx.clone(),
            state.clone(),
            |state, now| {
                let removed = state.events.gc(now, state.config.radio_ttl_ms);
                if removed > 0 {
                    tracing::debug!(removed, "event GC swept stale events");
                }
            },
        );

        spawn_task(
            "radio-state-gc",
            RADIO_STATE_GC_INTERVAL,
            shutdown_rx.clone(),
            state.clone(),
            |state, now| {
                let removed = state.radio_state.gc(now, state.config.state_ttl_ms);
                if removed > 0 {
                    tracing::debug!(removed, "radio-state GC swept stale snapshots");
                }
            },
        );

        spawn_task(
            "revocation-gc",
            REVOCATION_GC_INTERVAL,
            shutdown_rx.clone(),
            state.clone(),
            |state, now| {
                let max_age = state.config.web_token_ttl_ms.max(10 * 60 * 1_000);
                let removed = state.revocations.gc(now, max_age);
                if removed > 0 {
                    tracing::debug!(removed, "revocation GC swept stale watermarks");
                }
            },
        );

        spawn_task(
            "rate-limit-gc",
            RATE_LIMIT_GC_INTERVAL,
            shutdown_rx,
            state,
            |state, now| {
                let removed = state.rate_limiter.gc(now);
                if removed > 0 {
                    tracing::debug!(removed, "rate-limit GC swept expired counters");
                }
            },
        );

        Self { shutdown_tx }
    }

    pub fn shutdown(&self) {
        let _ = self.shutdown_tx.send(());
    }
}

fn spawn_task(
    name: &'static str,
    interval: Duration,
    mut shutdown_rx: watch::Receiver<()>,
    state: Arc<AppState>,
    sweep: impl Fn(&AppState, i64) + Send + 'static,
) {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let now = state.clock.now_ms();
                    sweep(&state, now);
                }
                _ = shutdown_rx.changed() => {
                    tracing::info!(task = name, "scheduler task shutting down");
                    break;
                }
            }
        }
    });
}
