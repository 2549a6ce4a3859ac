//! Bridge context.
//!
//! One `BridgeCtx` is built at startup and handed by reference to every
//! session. It owns the router, correlator and polling supervisor; there is no
//! ambient global state.

use std::sync::{Arc, Weak};

use serde_json::Value;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use termtel_core::error::{Result, TermtelError};
use termtel_core::protocol::action;
use termtel_core::protocol::envelope::Payload;
use termtel_core::protocol::telemetry::TelemetrySnapshot;

use crate::config::BridgeConfig;
use crate::correlate::{Correlator, Request};
use crate::dispatch::{Interceptor, Session, SessionRouter, TracingInterceptor};
use crate::obs::BridgeMetrics;
use crate::polling::{PollingSupervisor, RefreshHook};
use crate::sessions::ConnectRequest;
use crate::transport::Transport;

struct CtxInner {
    cfg: BridgeConfig,
    router: SessionRouter,
    correlator: Arc<Correlator>,
    polling: PollingSupervisor,
    metrics: Arc<BridgeMetrics>,
}

#[derive(Clone)]
pub struct BridgeCtx {
    inner: Arc<CtxInner>,
}

pub struct BridgeCtxBuilder {
    cfg: BridgeConfig,
    transport: Arc<dyn Transport>,
    interceptors: Vec<Arc<dyn Interceptor>>,
    metrics: Option<Arc<BridgeMetrics>>,
}

impl BridgeCtxBuilder {
    pub fn interceptor(mut self, i: Arc<dyn Interceptor>) -> Self {
        self.interceptors.push(i);
        self
    }

    pub fn metrics(mut self, metrics: Arc<BridgeMetrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn build(self) -> BridgeCtx {
        let metrics = self.metrics.unwrap_or_default();
        let mut interceptors = Vec::with_capacity(self.interceptors.len() + 1);
        if self.cfg.interceptors.trace {
            interceptors.push(Arc::new(TracingInterceptor) as Arc<dyn Interceptor>);
        }
        interceptors.extend(self.interceptors);

        let correlator = Arc::new(Correlator::new(&self.cfg.correlator, Arc::clone(&metrics)));
        let router = SessionRouter::new(
            self.transport,
            Arc::clone(&correlator),
            interceptors,
            Arc::clone(&metrics),
        );
        let polling = PollingSupervisor::new(&self.cfg.polling, Arc::clone(&metrics));

        BridgeCtx {
            inner: Arc::new(CtxInner {
                cfg: self.cfg,
                router,
                correlator,
                polling,
                metrics,
            }),
        }
    }
}

impl BridgeCtx {
    pub fn builder(cfg: BridgeConfig, transport: Arc<dyn Transport>) -> BridgeCtxBuilder {
        BridgeCtxBuilder {
            cfg,
            transport,
            interceptors: Vec::new(),
            metrics: None,
        }
    }

    pub fn new(cfg: BridgeConfig, transport: Arc<dyn Transport>) -> Self {
        Self::builder(cfg, transport).build()
    }

    pub fn config(&self) -> &BridgeConfig {
        &self.inner.cfg
    }
    pub fn router(&self) -> &SessionRouter {
        &self.inner.router
    }
    pub fn correlator(&self) -> &Correlator {
        &self.inner.correlator
    }
    pub fn polling(&self) -> &PollingSupervisor {
        &self.inner.polling
    }
    pub fn metrics(&self) -> &Arc<BridgeMetrics> {
        &self.inner.metrics
    }

    pub fn register(&self, session: Arc<dyn Session>) -> Option<Arc<dyn Session>> {
        self.inner.router.register(session)
    }

    /// Claim the transport's inbound callback and start the FIFO pump that
    /// dispatches inbound text one message at a time.
    ///
    /// The pump ends once the context is dropped.
    pub fn bind_inbound(&self) -> JoinHandle<()> {
        let (tx, mut rx) = mpsc::unbounded_channel::<String>();
        self.inner.router.bind_inbound(Arc::new(move |text: String| {
            if tx.send(text).is_err() {
                tracing::debug!("inbound pump gone, message dropped");
            }
        }));

        let weak: Weak<CtxInner> = Arc::downgrade(&self.inner);
        tokio::spawn(async move {
            while let Some(text) = rx.recv().await {
                let Some(inner) = weak.upgrade() else { break };
                let ctx = BridgeCtx { inner };
                ctx.dispatch(&text).await;
            }
        })
    }

    /// Route one inbound text message.
    pub async fn dispatch(&self, raw: &str) {
        self.inner.router.dispatch(self, raw).await;
    }

    pub fn send(&self, session_id: &str, action: &str, payload: Payload) -> Result<()> {
        self.inner.router.send(session_id, action, payload)
    }

    pub async fn request(&self, req: Request) -> Result<Value> {
        self.inner.correlator.request(&self.inner.router, req).await
    }

    pub async fn request_all(&self, session_id: &str) -> Result<TelemetrySnapshot> {
        self.inner
            .correlator
            .request_all(&self.inner.router, session_id)
            .await
    }

    /// Start the watchdog for `session_id`; a stall re-requests device info.
    pub fn start_polling(&self, session_id: &str) -> bool {
        let weak = Arc::downgrade(&self.inner);
        let refresh: RefreshHook = Arc::new(move |sid: &str| {
            if let Some(inner) = weak.upgrade() {
                let _ = inner
                    .router
                    .send(sid, action::GET_DEVICE_INFO, Payload::new());
            }
        });
        self.inner.polling.start(session_id, refresh)
    }

    /// Connect the session registered under `session_id`.
    pub async fn connect(&self, session_id: &str, req: ConnectRequest) -> Result<()> {
        let session = self.session(session_id)?;
        session.connect(self, req).await
    }

    pub async fn disconnect(&self, session_id: &str) -> Result<()> {
        let session = self.session(session_id)?;
        session.disconnect(self).await
    }

    fn session(&self, session_id: &str) -> Result<Arc<dyn Session>> {
        self.inner
            .router
            .session(session_id)
            .ok_or_else(|| TermtelError::UnknownSession(session_id.to_string()))
    }
}
