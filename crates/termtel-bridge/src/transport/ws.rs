//! WebSocket bridge to the native backend.
//!
//! The backend attaches at `bridge.path`; at most one backend is attached at a
//! time and a newer attachment replaces the older one. Each WebSocket text
//! frame carries exactly one envelope.
//!
//! Per connection:
//! - outbound queue drained into the socket
//! - inbound text handed to the registered callback
//! - heartbeat ping + idle timeout

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use axum::{
    extract::{ws::Message, ws::WebSocket, ws::WebSocketUpgrade, State},
    response::Response,
};
use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio::time::{Duration, Instant};

use termtel_core::error::{Result, TermtelError};

use super::{InboundCallback, Transport};
use crate::app_state::AppState;
use crate::obs::BridgeMetrics;

struct Attachment {
    generation: u64,
    tx: mpsc::Sender<String>,
}

pub struct WsBridge {
    attached: Mutex<Option<Attachment>>,
    callback: Mutex<Option<InboundCallback>>,
    next_generation: AtomicU64,
    queue: usize,
    metrics: Arc<BridgeMetrics>,
}

impl WsBridge {
    pub fn new(queue: usize, metrics: Arc<BridgeMetrics>) -> Self {
        Self {
            attached: Mutex::new(None),
            callback: Mutex::new(None),
            next_generation: AtomicU64::new(1),
            queue: queue.max(1),
            metrics,
        }
    }

    /// Attach a backend connection. Any previous attachment loses its sender,
    /// which ends its connection loop.
    fn attach(&self) -> (u64, mpsc::Receiver<String>) {
        let generation = self.next_generation.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = mpsc::channel(self.queue);
        let previous = self
            .attached
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .replace(Attachment { generation, tx });
        if let Some(prev) = previous {
            tracing::info!(old = prev.generation, new = generation, "backend attachment replaced");
        }
        self.metrics.backend_attached.set(&[], 1);
        (generation, rx)
    }

    /// Detach only if `generation` is still the current attachment.
    fn detach(&self, generation: u64) {
        let mut slot = self.attached.lock().unwrap_or_else(PoisonError::into_inner);
        if slot.as_ref().map(|a| a.generation) == Some(generation) {
            *slot = None;
            self.metrics.backend_attached.set(&[], 0);
        }
    }

    fn deliver(&self, text: String) {
        let cb = self
            .callback
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        match cb {
            Some(cb) => cb(text),
            None => tracing::warn!("inbound text dropped: no listener registered"),
        }
    }
}

impl Transport for WsBridge {
    /// A full outbound queue is reported as `TransportUnavailable`: the backend
    /// is attached but not draining.
    fn send(&self, text: String) -> Result<()> {
        let slot = self.attached.lock().unwrap_or_else(PoisonError::into_inner);
        let Some(att) = slot.as_ref() else {
            return Err(TermtelError::TransportUnavailable);
        };
        att.tx.try_send(text).map_err(|e| {
            if let mpsc::error::TrySendError::Full(_) = e {
                tracing::warn!(generation = att.generation, "outbound queue full");
            }
            TermtelError::TransportUnavailable
        })
    }

    fn on_message(&self, callback: InboundCallback) {
        *self.callback.lock().unwrap_or_else(PoisonError::into_inner) = Some(callback);
    }

    fn is_ready(&self) -> bool {
        self.attached
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }
}

pub async fn bridge_upgrade(State(app): State<AppState>, ws: WebSocketUpgrade) -> Response {
    ws.on_upgrade(move |socket| run_bridge(app, socket))
}

async fn run_bridge(app: AppState, socket: WebSocket) {
    let bridge = app.ws_bridge();
    let (generation, mut out_rx) = bridge.attach();
    tracing::info!(generation, "backend attached");

    let (mut ws_tx, mut ws_rx) = socket.split();

    let cfg = &app.cfg().bridge;
    let ping_every = Duration::from_millis(cfg.ping_interval_ms);
    let idle_timeout = Duration::from_millis(cfg.idle_timeout_ms);

    let mut ping_tick = tokio::time::interval(ping_every);
    ping_tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    let mut last_activity = Instant::now();

    loop {
        tokio::select! {
            maybe_out = out_rx.recv() => {
                match maybe_out {
                    Some(text) => {
                        if ws_tx.send(Message::Text(text)).await.is_err() {
                            break;
                        }
                    }
                    // replaced by a newer attachment
                    None => break,
                }
            }

            incoming = ws_rx.next() => {
                let Some(Ok(msg)) = incoming else { break; };
                last_activity = Instant::now();

                match msg {
                    Message::Text(s) => bridge.deliver(s),
                    Message::Binary(b) => {
                        tracing::warn!(generation, len = b.len(), "binary frame ignored");
                    }
                    Message::Ping(p) => {
                        if ws_tx.send(Message::Pong(p)).await.is_err() {
                            break;
                        }
                    }
                    Message::Pong(_) => {}
                    Message::Close(_) => break,
                }
            }

            _ = ping_tick.tick() => {
                if ws_tx.send(Message::Ping(Vec::new())).await.is_err() {
                    break;
                }
            }

            _ = tokio::time::sleep(Duration::from_millis(250)) => {
                if last_activity.elapsed() > idle_timeout {
                    tracing::info!(generation, "backend idle timeout");
                    break;
                }
            }
        }
    }

    bridge.detach(generation);
    tracing::info!(generation, "backend detached");
}
