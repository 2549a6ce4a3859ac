use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use futures_util::FutureExt;

use termtel_core::error::{Result, TermtelError};
use termtel_core::protocol::envelope::{decode, encode, Envelope, Payload};

use super::interceptor::Interceptor;
use crate::context::BridgeCtx;
use crate::correlate::Correlator;
use crate::obs::BridgeMetrics;
use crate::sessions::ConnectRequest;
use crate::transport::{InboundCallback, Transport};

/// A named logical channel on the shared transport.
#[async_trait]
pub trait Session: Send + Sync {
    fn session_id(&self) -> &str;

    /// Handle one inbound envelope addressed to this session.
    ///
    /// Inbound messages are processed one at a time, so a handler must not
    /// await a correlated response itself; spawn the request instead.
    async fn handle_message(&self, ctx: &BridgeCtx, env: &Envelope) -> Result<()>;

    /// Open the session's device connection. Sessions without one refuse.
    async fn connect(&self, _ctx: &BridgeCtx, _req: ConnectRequest) -> Result<()> {
        Err(TermtelError::NotConnectable(self.session_id().to_string()))
    }

    async fn disconnect(&self, _ctx: &BridgeCtx) -> Result<()> {
        Err(TermtelError::NotConnectable(self.session_id().to_string()))
    }
}

/// Owns the transport's inbound callback and demultiplexes envelopes to
/// sessions by `session_id`.
pub struct SessionRouter {
    sessions: DashMap<String, Arc<dyn Session>>,
    transport: Arc<dyn Transport>,
    correlator: Arc<Correlator>,
    interceptors: Vec<Arc<dyn Interceptor>>,
    metrics: Arc<BridgeMetrics>,
}

impl SessionRouter {
    pub fn new(
        transport: Arc<dyn Transport>,
        correlator: Arc<Correlator>,
        interceptors: Vec<Arc<dyn Interceptor>>,
        metrics: Arc<BridgeMetrics>,
    ) -> Self {
        Self {
            sessions: DashMap::new(),
            transport,
            correlator,
            interceptors,
            metrics,
        }
    }

    /// Register a session. Last writer wins; the replaced session is returned.
    pub fn register(&self, session: Arc<dyn Session>) -> Option<Arc<dyn Session>> {
        let id = session.session_id().to_string();
        let prev = self.sessions.insert(id.clone(), session);
        if prev.is_some() {
            tracing::warn!(session = %id, "session re-registered, previous handler replaced");
        }
        prev
    }

    pub fn session(&self, session_id: &str) -> Option<Arc<dyn Session>> {
        self.sessions.get(session_id).map(|s| Arc::clone(s.value()))
    }

    pub fn session_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.sessions.iter().map(|e| e.key().clone()).collect();
        ids.sort();
        ids
    }

    pub fn transport_ready(&self) -> bool {
        self.transport.is_ready()
    }

    /// Claim the transport's inbound callback.
    pub(crate) fn bind_inbound(&self, callback: InboundCallback) {
        self.transport.on_message(callback);
    }

    /// Encode and send one envelope. Never blocks; a missing backend is logged
    /// and reported as `TransportUnavailable`.
    pub fn send(&self, session_id: &str, action: &str, payload: Payload) -> Result<()> {
        let env = Envelope::new(session_id, action, payload);
        let text = encode(&env)?;
        for i in &self.interceptors {
            guard_interceptor(|| i.on_outbound(&env));
        }
        match self.transport.send(text) {
            Ok(()) => {
                self.metrics
                    .outbound_envelopes
                    .inc(&[("session", session_id), ("action", action)]);
                Ok(())
            }
            Err(e) => {
                tracing::warn!(session = %session_id, action = %action, error = %e, "send dropped");
                self.metrics.dropped_sends.inc(&[("session", session_id)]);
                Err(e)
            }
        }
    }

    /// Process one inbound text message. Nothing here propagates to the
    /// transport: every failure is logged and the message dropped.
    pub async fn dispatch(&self, ctx: &BridgeCtx, raw: &str) {
        let env = match decode(raw) {
            Ok(env) => env,
            Err(e) => {
                tracing::warn!(error = %e, len = raw.len(), "dropping malformed envelope");
                self.metrics.decode_errors.inc(&[]);
                for i in &self.interceptors {
                    guard_interceptor(|| i.on_malformed(raw, &e));
                }
                return;
            }
        };

        self.metrics
            .inbound_envelopes
            .inc(&[("session", env.session_id()), ("action", env.action())]);
        for i in &self.interceptors {
            guard_interceptor(|| i.on_inbound(&env));
        }

        let Some(session) = self.session(env.session_id()) else {
            let err = TermtelError::UnknownSession(env.session_id().to_string());
            tracing::warn!(error = %err, action = %env.action(), "dropping envelope");
            self.metrics
                .unknown_sessions
                .inc(&[("session", env.session_id())]);
            return;
        };

        match std::panic::catch_unwind(AssertUnwindSafe(|| self.correlator.offer(&env))) {
            Ok(0) => {}
            Ok(resolved) => {
                tracing::trace!(session = %env.session_id(), resolved, "pending requests resolved");
            }
            Err(_) => tracing::error!(session = %env.session_id(), "correlator panicked"),
        }

        let outcome = AssertUnwindSafe(session.handle_message(ctx, &env))
            .catch_unwind()
            .await;
        match outcome {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                tracing::warn!(
                    session = %env.session_id(),
                    action = %env.action(),
                    code = e.code().as_str(),
                    error = %e,
                    "session handler failed"
                );
                self.metrics
                    .session_errors
                    .inc(&[("session", env.session_id()), ("code", e.code().as_str())]);
            }
            Err(_) => {
                tracing::error!(
                    session = %env.session_id(),
                    action = %env.action(),
                    "session handler panicked"
                );
                self.metrics
                    .session_errors
                    .inc(&[("session", env.session_id()), ("code", "PANIC")]);
            }
        }
    }
}

fn guard_interceptor(f: impl FnOnce()) {
    if std::panic::catch_unwind(AssertUnwindSafe(f)).is_err() {
        tracing::error!("interceptor panicked");
    }
}
