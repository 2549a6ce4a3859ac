#![allow(dead_code)]
#![allow(clippy::unwrap_used)]

use std::sync::Arc;

use serde_json::Value;
use tokio::task::JoinHandle;

use termtel_bridge::config::BridgeConfig;
use termtel_bridge::dispatch::MessageRecorder;
use termtel_bridge::render::RecordingRenderer;
use termtel_bridge::sessions::{TelemetrySession, TerminalSession, UiStateSession};
use termtel_bridge::{BridgeCtx, LoopbackTransport};

/// A bridge wired to an in-memory backend with the three built-in sessions.
pub struct Harness {
    pub transport: Arc<LoopbackTransport>,
    pub ctx: BridgeCtx,
    pub render: Arc<RecordingRenderer>,
    pub recorder: Arc<MessageRecorder>,
    pub telemetry: Arc<TelemetrySession>,
    pub terminal: Arc<TerminalSession>,
    pub ui: Arc<UiStateSession>,
    pub pump: JoinHandle<()>,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_config(BridgeConfig::default())
    }

    pub fn with_config(cfg: BridgeConfig) -> Self {
        Self::build(cfg, Arc::new(LoopbackTransport::new()))
    }

    pub fn build(cfg: BridgeConfig, transport: Arc<LoopbackTransport>) -> Self {
        let render = Arc::new(RecordingRenderer::new());
        let recorder = Arc::new(MessageRecorder::new(64));
        let telemetry_cfg = cfg.telemetry.clone();

        let ctx = BridgeCtx::builder(cfg, transport.clone())
            .interceptor(recorder.clone())
            .build();

        let telemetry = Arc::new(TelemetrySession::new(&telemetry_cfg, render.clone()));
        let terminal = Arc::new(TerminalSession::new(render.clone()));
        let ui = Arc::new(UiStateSession::new(render.clone()));
        ctx.register(telemetry.clone());
        ctx.register(terminal.clone());
        ctx.register(ui.clone());
        let pump = ctx.bind_inbound();

        Self {
            transport,
            ctx,
            render,
            recorder,
            telemetry,
            terminal,
            ui,
            pump,
        }
    }

    /// Deliver an envelope as the backend would.
    pub fn push(&self, session: &str, action: &str, payload: Value) {
        let text = serde_json::json!({
            "session_id": session,
            "action": action,
            "payload": payload,
        })
        .to_string();
        assert!(self.transport.deliver(text));
    }

    pub fn push_raw(&self, text: &str) {
        assert!(self.transport.deliver(text));
    }
}

/// Let the inbound pump and spawned tasks run without moving the clock.
pub async fn settle() {
    for _ in 0..16 {
        tokio::task::yield_now().await;
    }
}
