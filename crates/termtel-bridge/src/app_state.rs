//! Shared application state for the bridge binary.
//!
//! Wires the WebSocket transport, the bridge context and the built-in
//! sessions together. Startup errors are returned, not panicked.

use std::sync::Arc;

use termtel_core::error::Result;

use crate::config::BridgeConfig;
use crate::context::BridgeCtx;
use crate::dispatch::{Interceptor, MessageRecorder};
use crate::obs::BridgeMetrics;
use crate::render::RenderSink;
use crate::sessions::{TelemetrySession, TerminalSession, UiStateSession};
use crate::transport::{Transport, WsBridge};

#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    ctx: BridgeCtx,
    ws_bridge: Arc<WsBridge>,
    recorder: Option<Arc<MessageRecorder>>,
    metrics: Arc<BridgeMetrics>,
}

impl AppState {
    /// Build application state and start the inbound pump.
    /// Must be called from within a tokio runtime.
    pub fn new(cfg: BridgeConfig, render: Arc<dyn RenderSink>) -> Result<Self> {
        cfg.validate()?;

        let metrics = Arc::new(BridgeMetrics::default());
        let ws_bridge = Arc::new(WsBridge::new(
            cfg.bridge.outbound_queue,
            Arc::clone(&metrics),
        ));

        let recorder = cfg
            .interceptors
            .record
            .then(|| Arc::new(MessageRecorder::new(cfg.interceptors.record_capacity)));

        let telemetry_cfg = cfg.telemetry.clone();
        let mut builder = BridgeCtx::builder(cfg, Arc::clone(&ws_bridge) as Arc<dyn Transport>)
            .metrics(Arc::clone(&metrics));
        if let Some(r) = &recorder {
            builder = builder.interceptor(Arc::clone(r) as Arc<dyn Interceptor>);
        }
        let ctx = builder.build();

        ctx.register(Arc::new(TerminalSession::new(Arc::clone(&render))));
        ctx.register(Arc::new(TelemetrySession::new(&telemetry_cfg, Arc::clone(&render))));
        ctx.register(Arc::new(UiStateSession::new(render)));
        ctx.bind_inbound();

        tracing::info!(sessions = ?ctx.router().session_ids(), "bridge context ready");

        Ok(Self {
            inner: Arc::new(AppStateInner {
                ctx,
                ws_bridge,
                recorder,
                metrics,
            }),
        })
    }

    pub fn cfg(&self) -> &BridgeConfig {
        self.inner.ctx.config()
    }

    pub fn ctx(&self) -> &BridgeCtx {
        &self.inner.ctx
    }

    pub fn ws_bridge(&self) -> Arc<WsBridge> {
        Arc::clone(&self.inner.ws_bridge)
    }

    pub fn recorder(&self) -> Option<&Arc<MessageRecorder>> {
        self.inner.recorder.as_ref()
    }

    pub fn metrics(&self) -> &BridgeMetrics {
        &self.inner.metrics
    }

    /// Ready once a backend is attached.
    pub fn is_ready(&self) -> bool {
        self.inner.ctx.router().transport_ready()
    }
}
