//! Turns fire-and-forget sends into awaitable requests.
//!
//! A pending request is keyed by `(session_id, action, payload_key)`. At most
//! one request per key is outstanding: a second one supersedes the first. The
//! first inbound envelope on the same session whose action is the expected
//! response action and whose payload contains `payload_key` resolves it with
//! `payload[payload_key]` (which may be `null`), or with the whole payload for
//! requests that asked for it.
//!
//! Every exit path (response, deadline, supersede, cancel, caller dropped)
//! removes the entry, so the pending table never grows with churn.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use dashmap::DashMap;
use serde_json::Value;
use tokio::sync::oneshot;
use tokio::time::{Duration, Instant};

use termtel_core::error::{Result, TermtelError};
use termtel_core::protocol::action;
use termtel_core::protocol::envelope::{Envelope, Payload};
use termtel_core::protocol::telemetry::{
    parse_facet, DeviceInfo, Facet, TelemetrySnapshot,
};

use crate::config::CorrelatorSection;
use crate::dispatch::SessionRouter;
use crate::obs::BridgeMetrics;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PendingKey {
    pub session_id: String,
    pub action: String,
    pub payload_key: String,
}

/// Snapshot of one outstanding request.
#[derive(Debug, Clone, PartialEq)]
pub struct PendingInfo {
    pub key: PendingKey,
    pub id: u64,
    pub response_action: &'static str,
    pub deadline: Instant,
}

struct Waiter {
    id: u64,
    response_action: &'static str,
    deadline: Instant,
    whole_payload: bool,
    tx: oneshot::Sender<Result<Value>>,
}

#[derive(Debug, Clone)]
pub struct Request {
    pub session_id: String,
    pub action: String,
    pub payload_key: String,
    pub payload: Payload,
    pub timeout: Option<Duration>,
}

impl Request {
    pub fn new(
        session_id: impl Into<String>,
        action: impl Into<String>,
        payload_key: impl Into<String>,
    ) -> Self {
        Self {
            session_id: session_id.into(),
            action: action.into(),
            payload_key: payload_key.into(),
            payload: Payload::new(),
            timeout: None,
        }
    }

    /// Request for one telemetry facet.
    pub fn for_facet(session_id: impl Into<String>, facet: Facet) -> Self {
        Self::new(session_id, facet.request_action(), facet.payload_key())
    }

    pub fn payload(mut self, payload: Payload) -> Self {
        self.payload = payload;
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

pub struct Correlator {
    pending: DashMap<PendingKey, Waiter>,
    next_id: AtomicU64,
    default_timeout: Duration,
    echo_request_id: bool,
    metrics: Arc<BridgeMetrics>,
}

/// Removes the caller's entry if the request future is dropped mid-flight.
struct WaiterGuard<'a> {
    correlator: &'a Correlator,
    key: &'a PendingKey,
    id: u64,
}

impl Drop for WaiterGuard<'_> {
    fn drop(&mut self) {
        self.correlator.remove_if_current(self.key, self.id);
    }
}

impl Correlator {
    pub fn new(cfg: &CorrelatorSection, metrics: Arc<BridgeMetrics>) -> Self {
        Self {
            pending: DashMap::new(),
            next_id: AtomicU64::new(1),
            default_timeout: cfg.request_timeout(),
            echo_request_id: cfg.echo_request_id,
            metrics,
        }
    }

    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    pub fn pending(&self) -> Vec<PendingInfo> {
        self.pending
            .iter()
            .map(|e| PendingInfo {
                key: e.key().clone(),
                id: e.value().id,
                response_action: e.value().response_action,
                deadline: e.value().deadline,
            })
            .collect()
    }

    fn sync_gauge(&self) {
        self.metrics
            .pending_requests
            .set(&[], self.pending.len() as i64);
    }

    fn register(
        &self,
        key: PendingKey,
        timeout: Duration,
        whole_payload: bool,
    ) -> (u64, oneshot::Receiver<Result<Value>>) {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = oneshot::channel();
        let waiter = Waiter {
            id,
            response_action: action::response_action(&key.action),
            deadline: Instant::now() + timeout,
            whole_payload,
            tx,
        };
        let action_name = key.action.clone();
        if let Some(old) = self.pending.insert(key, waiter) {
            tracing::debug!(action = %action_name, old = old.id, new = id, "pending request superseded");
            let _ = old.tx.send(Err(TermtelError::Superseded {
                action: action_name,
            }));
        }
        self.sync_gauge();
        (id, rx)
    }

    fn remove_if_current(&self, key: &PendingKey, id: u64) -> bool {
        let removed = self.pending.remove_if(key, |_, w| w.id == id).is_some();
        if removed {
            self.sync_gauge();
        }
        removed
    }

    /// Send `req` and wait for its correlated response value.
    ///
    /// The waiter is registered before the envelope is sent. A send that fails
    /// because no backend is attached surfaces as `RequestTimeout` once the
    /// deadline passes.
    pub async fn request(&self, router: &SessionRouter, req: Request) -> Result<Value> {
        self.send_and_wait(router, req, false).await
    }

    async fn send_and_wait(
        &self,
        router: &SessionRouter,
        req: Request,
        whole_payload: bool,
    ) -> Result<Value> {
        let timeout = req.timeout.unwrap_or(self.default_timeout);
        let key = PendingKey {
            session_id: req.session_id,
            action: req.action,
            payload_key: req.payload_key,
        };
        let started = Instant::now();
        let (id, rx) = self.register(key.clone(), timeout, whole_payload);
        let _guard = WaiterGuard {
            correlator: self,
            key: &key,
            id,
        };

        let mut payload = req.payload;
        if self.echo_request_id {
            payload.insert("request_id".to_string(), Value::from(id));
        }
        if let Err(e) = router.send(&key.session_id, &key.action, payload) {
            tracing::debug!(action = %key.action, error = %e, "request not delivered, waiting for deadline");
        }

        let outcome = match tokio::time::timeout(timeout, rx).await {
            Ok(Ok(result)) => result,
            Ok(Err(_)) => Err(TermtelError::Cancelled {
                action: key.action.clone(),
            }),
            Err(_) => {
                self.remove_if_current(&key, id);
                tracing::debug!(session = %key.session_id, action = %key.action, "request timed out");
                Err(TermtelError::RequestTimeout {
                    action: key.action.clone(),
                })
            }
        };

        let outcome_label = match &outcome {
            Ok(_) => {
                self.metrics
                    .request_latency
                    .observe(&[("action", key.action.as_str())], started.elapsed());
                "resolved"
            }
            Err(TermtelError::RequestTimeout { .. }) => "timeout",
            Err(TermtelError::Superseded { .. }) => "superseded",
            Err(TermtelError::Cancelled { .. }) => "cancelled",
            Err(_) => "error",
        };
        self.metrics.request_outcomes.inc(&[
            ("session", key.session_id.as_str()),
            ("action", key.action.as_str()),
            ("outcome", outcome_label),
        ]);
        outcome
    }

    fn matches(&self, key: &PendingKey, w: &Waiter, env: &Envelope, echoed: Option<u64>) -> bool {
        if key.session_id != env.session_id()
            || w.response_action != env.action()
            || !env.payload().contains_key(&key.payload_key)
        {
            return false;
        }
        match echoed {
            Some(rid) if self.echo_request_id => rid == w.id,
            _ => true,
        }
    }

    /// Offer an inbound envelope. Every pending request it satisfies is
    /// resolved; returns how many were.
    pub fn offer(&self, env: &Envelope) -> usize {
        let echoed = env.field("request_id").and_then(Value::as_u64);
        let candidates: Vec<PendingKey> = self
            .pending
            .iter()
            .filter(|e| self.matches(e.key(), e.value(), env, echoed))
            .map(|e| e.key().clone())
            .collect();

        let mut resolved = 0;
        for key in candidates {
            let Some((key, waiter)) = self
                .pending
                .remove_if(&key, |k, w| self.matches(k, w, env, echoed))
            else {
                continue;
            };
            let value = if waiter.whole_payload {
                Value::Object(env.payload().clone())
            } else {
                env.field(&key.payload_key).cloned().unwrap_or(Value::Null)
            };
            let _ = waiter.tx.send(Ok(value));
            resolved += 1;
        }
        if resolved > 0 {
            self.sync_gauge();
        }
        resolved
    }

    /// Abort one pending request with `Cancelled`.
    pub fn cancel(&self, session_id: &str, action: &str, payload_key: &str) -> bool {
        let key = PendingKey {
            session_id: session_id.to_string(),
            action: action.to_string(),
            payload_key: payload_key.to_string(),
        };
        match self.pending.remove(&key) {
            Some((key, waiter)) => {
                let _ = waiter.tx.send(Err(TermtelError::Cancelled { action: key.action }));
                self.sync_gauge();
                true
            }
            None => false,
        }
    }

    /// Abort every pending request of a session. Returns how many were.
    pub fn cancel_session(&self, session_id: &str) -> usize {
        let keys: Vec<PendingKey> = self
            .pending
            .iter()
            .filter(|e| e.key().session_id == session_id)
            .map(|e| e.key().clone())
            .collect();
        let mut cancelled = 0;
        for key in keys {
            if let Some((key, waiter)) = self.pending.remove(&key) {
                let _ = waiter.tx.send(Err(TermtelError::Cancelled { action: key.action }));
                cancelled += 1;
            }
        }
        if cancelled > 0 {
            tracing::debug!(session = %session_id, cancelled, "pending requests cancelled");
            self.sync_gauge();
        }
        cancelled
    }

    /// Fetch a full telemetry snapshot.
    ///
    /// Device info comes first and must be valid. Facets carried by the same
    /// push are taken from it; the rest are then requested concurrently and
    /// are individually optional.
    pub async fn request_all(
        &self,
        router: &SessionRouter,
        session_id: &str,
    ) -> Result<TelemetrySnapshot> {
        let push = self
            .send_and_wait(router, Request::for_facet(session_id, Facet::DeviceInfo), true)
            .await?;
        let raw = push
            .get(Facet::DeviceInfo.payload_key())
            .cloned()
            .unwrap_or(Value::Null);
        let device_info: DeviceInfo = parse_facet(Facet::DeviceInfo, &raw)
            .map_err(|e| TermtelError::InvalidDeviceInfo(e.to_string()))?;
        device_info.validate()?;

        let (interfaces, neighbors, routing_table, environment) = tokio::join!(
            self.facet_or_fetch(router, session_id, Facet::Interfaces, &push),
            self.facet_or_fetch(router, session_id, Facet::Neighbors, &push),
            self.facet_or_fetch(router, session_id, Facet::RoutingTable, &push),
            self.facet_or_fetch(router, session_id, Facet::Environment, &push),
        );

        Ok(TelemetrySnapshot {
            device_info,
            interfaces,
            neighbors,
            routing_table,
            environment,
        })
    }

    async fn facet_or_fetch<T: serde::de::DeserializeOwned>(
        &self,
        router: &SessionRouter,
        session_id: &str,
        facet: Facet,
        push: &Value,
    ) -> Option<T> {
        match push.get(facet.payload_key()) {
            Some(raw) => read_facet(facet, raw),
            None => self.fetch_facet(router, session_id, facet).await,
        }
    }

    async fn fetch_facet<T: serde::de::DeserializeOwned>(
        &self,
        router: &SessionRouter,
        session_id: &str,
        facet: Facet,
    ) -> Option<T> {
        match self.request(router, Request::for_facet(session_id, facet)).await {
            Ok(raw) => read_facet(facet, &raw),
            Err(e) => {
                tracing::warn!(facet = facet.payload_key(), error = %e, "facet unavailable");
                None
            }
        }
    }
}

fn read_facet<T: serde::de::DeserializeOwned>(facet: Facet, raw: &Value) -> Option<T> {
    if raw.is_null() {
        return None;
    }
    match parse_facet(facet, raw) {
        Ok(v) => Some(v),
        Err(e) => {
            tracing::warn!(facet = facet.payload_key(), error = %e, "facet unreadable");
            None
        }
    }
}
