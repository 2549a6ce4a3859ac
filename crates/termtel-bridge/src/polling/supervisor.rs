//! Polling supervisor.
//!
//! Telemetry arrives as backend pushes; the supervisor only watches for
//! silence. Each polling session owns one periodic timer. On a tick, a session
//! whose last update is older than the stall threshold moves to `Stalled` and
//! its refresh hook runs once. The next recorded update moves it back to
//! `Polling`.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use dashmap::DashMap;
use tokio::task::JoinHandle;
use tokio::time::{Duration, Instant, MissedTickBehavior};

use crate::config::PollingSection;
use crate::obs::BridgeMetrics;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollState {
    Idle,
    Polling,
    Stalled,
}

/// Called with the session id when a session stalls.
pub type RefreshHook = Arc<dyn Fn(&str) + Send + Sync>;

struct PollEntry {
    state: PollState,
    last_update_at: Instant,
    generation: u64,
    timer: Option<JoinHandle<()>>,
}

struct Inner {
    entries: DashMap<String, PollEntry>,
    period: Duration,
    stall_after: Duration,
    next_generation: AtomicU64,
    metrics: Arc<BridgeMetrics>,
}

enum Tick {
    Healthy,
    Stalled,
    Stop,
}

impl Inner {
    fn tick(&self, session_id: &str, generation: u64) -> Tick {
        let Some(mut e) = self.entries.get_mut(session_id) else {
            return Tick::Stop;
        };
        if e.generation != generation || e.state == PollState::Idle {
            return Tick::Stop;
        }
        if e.state == PollState::Polling && e.last_update_at.elapsed() > self.stall_after {
            e.state = PollState::Stalled;
            return Tick::Stalled;
        }
        Tick::Healthy
    }
}

impl Drop for Inner {
    fn drop(&mut self) {
        for mut e in self.entries.iter_mut() {
            if let Some(t) = e.timer.take() {
                t.abort();
            }
        }
    }
}

#[derive(Clone)]
pub struct PollingSupervisor {
    inner: Arc<Inner>,
}

impl PollingSupervisor {
    pub fn new(cfg: &PollingSection, metrics: Arc<BridgeMetrics>) -> Self {
        Self {
            inner: Arc::new(Inner {
                entries: DashMap::new(),
                period: Duration::from_millis(cfg.watchdog_period_ms),
                stall_after: Duration::from_millis(cfg.stall_after_ms),
                next_generation: AtomicU64::new(1),
                metrics,
            }),
        }
    }

    pub fn state(&self, session_id: &str) -> PollState {
        self.inner
            .entries
            .get(session_id)
            .map(|e| e.state)
            .unwrap_or(PollState::Idle)
    }

    pub fn last_update_at(&self, session_id: &str) -> Option<Instant> {
        self.inner.entries.get(session_id).map(|e| e.last_update_at)
    }

    /// Number of live watchdog timers.
    pub fn active_timers(&self) -> usize {
        self.inner
            .entries
            .iter()
            .filter(|e| e.timer.as_ref().is_some_and(|t| !t.is_finished()))
            .count()
    }

    /// Begin watching `session_id`. No-op (returns false) unless it is idle.
    ///
    /// Must be called from within a tokio runtime.
    pub fn start(&self, session_id: &str, refresh: RefreshHook) -> bool {
        let mut entry = self
            .inner
            .entries
            .entry(session_id.to_string())
            .or_insert_with(|| PollEntry {
                state: PollState::Idle,
                last_update_at: Instant::now(),
                generation: 0,
                timer: None,
            });
        if entry.state != PollState::Idle {
            tracing::debug!(session = %session_id, "polling already active");
            return false;
        }

        let generation = self.inner.next_generation.fetch_add(1, Ordering::Relaxed);
        entry.state = PollState::Polling;
        entry.last_update_at = Instant::now();
        entry.generation = generation;
        if let Some(old) = entry.timer.take() {
            old.abort();
        }
        entry.timer = Some(tokio::spawn(watchdog(
            Arc::downgrade(&self.inner),
            session_id.to_string(),
            generation,
            refresh,
        )));
        tracing::info!(session = %session_id, "polling started");
        true
    }

    /// Note that data arrived for `session_id`. Clears a stall.
    pub fn record_update(&self, session_id: &str) {
        let Some(mut e) = self.inner.entries.get_mut(session_id) else {
            return;
        };
        e.last_update_at = Instant::now();
        if e.state == PollState::Stalled {
            e.state = PollState::Polling;
            tracing::info!(session = %session_id, "telemetry resumed");
        }
    }

    /// Stop watching `session_id`. Returns whether it was active.
    pub fn stop(&self, session_id: &str) -> bool {
        let Some(mut e) = self.inner.entries.get_mut(session_id) else {
            return false;
        };
        let was_active = e.state != PollState::Idle;
        e.state = PollState::Idle;
        if let Some(t) = e.timer.take() {
            t.abort();
        }
        if was_active {
            tracing::info!(session = %session_id, "polling stopped");
        }
        was_active
    }
}

async fn watchdog(inner: Weak<Inner>, session_id: String, generation: u64, refresh: RefreshHook) {
    let period = match inner.upgrade() {
        Some(i) => i.period,
        None => return,
    };
    let mut tick = tokio::time::interval_at(Instant::now() + period, period);
    tick.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tick.tick().await;
        let Some(inner) = inner.upgrade() else { return };
        match inner.tick(&session_id, generation) {
            Tick::Healthy => {}
            Tick::Stalled => {
                tracing::warn!(
                    session = %session_id,
                    stall_after_ms = inner.stall_after.as_millis() as u64,
                    "no telemetry received, requesting refresh"
                );
                inner
                    .metrics
                    .watchdog_stalls
                    .inc(&[("session", session_id.as_str())]);
                refresh(&session_id);
            }
            Tick::Stop => return,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicUsize;

    use super::*;

    fn supervisor() -> PollingSupervisor {
        let cfg = PollingSection {
            watchdog_period_ms: 30_000,
            stall_after_ms: 45_000,
        };
        PollingSupervisor::new(&cfg, Arc::new(BridgeMetrics::default()))
    }

    fn counting_hook() -> (RefreshHook, Arc<AtomicUsize>) {
        let hits = Arc::new(AtomicUsize::new(0));
        let h = Arc::clone(&hits);
        let hook: RefreshHook = Arc::new(move |_: &str| {
            h.fetch_add(1, Ordering::SeqCst);
        });
        (hook, hits)
    }

    #[tokio::test(start_paused = true)]
    async fn updates_keep_session_polling() {
        let sup = supervisor();
        let (hook, hits) = counting_hook();
        assert!(sup.start("telemetry", hook));

        for _ in 0..6 {
            tokio::time::sleep(Duration::from_secs(20)).await;
            sup.record_update("telemetry");
        }
        assert_eq!(sup.state("telemetry"), PollState::Polling);
        assert_eq!(hits.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn silence_stalls_once_and_update_recovers() {
        let sup = supervisor();
        let (hook, hits) = counting_hook();
        sup.start("telemetry", hook);

        // ticks at 30s (healthy), 60s (stalled), 90s, 120s (still stalled)
        tokio::time::sleep(Duration::from_secs(125)).await;
        assert_eq!(sup.state("telemetry"), PollState::Stalled);
        assert_eq!(hits.load(Ordering::SeqCst), 1);

        sup.record_update("telemetry");
        assert_eq!(sup.state("telemetry"), PollState::Polling);
    }

    #[tokio::test(start_paused = true)]
    async fn start_is_idempotent_and_stop_ends_ticks() {
        let sup = supervisor();
        let (hook, hits) = counting_hook();
        assert!(sup.start("telemetry", Arc::clone(&hook)));
        assert!(!sup.start("telemetry", hook));
        assert_eq!(sup.active_timers(), 1);

        assert!(sup.stop("telemetry"));
        assert!(!sup.stop("telemetry"));
        tokio::time::sleep(Duration::from_secs(300)).await;
        assert_eq!(sup.state("telemetry"), PollState::Idle);
        assert_eq!(hits.load(Ordering::SeqCst), 0);
        assert_eq!(sup.active_timers(), 0);
    }
}
