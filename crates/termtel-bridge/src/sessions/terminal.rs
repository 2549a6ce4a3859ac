//! Terminal session: keystrokes out, screen text in.

use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use serde_json::Value;

use termtel_core::error::{Result, TermtelError};
use termtel_core::protocol::action;
use termtel_core::protocol::envelope::{Envelope, Payload};

use super::{error_message, ConnectRequest};
use crate::context::BridgeCtx;
use crate::dispatch::Session;
use crate::render::RenderSink;

/// Character geometry of the terminal surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TermSize {
    pub cols: u16,
    pub rows: u16,
}

/// Pixel size of one character cell.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CellMetrics {
    pub width: f64,
    pub height: f64,
}

impl CellMetrics {
    /// Character geometry that fits `width` x `height` pixels. Never below 1x1.
    pub fn fit(&self, width: f64, height: f64) -> TermSize {
        TermSize {
            cols: cells(width, self.width),
            rows: cells(height, self.height),
        }
    }
}

fn cells(px: f64, cell: f64) -> u16 {
    if cell.is_nan() || cell <= 0.0 || !px.is_finite() {
        return 1;
    }
    (px / cell).floor().clamp(1.0, f64::from(u16::MAX)) as u16
}

#[derive(Debug, Default)]
struct TerminalState {
    geometry: Option<TermSize>,
    connected: bool,
}

pub struct TerminalSession {
    session_id: String,
    render: Arc<dyn RenderSink>,
    state: Mutex<TerminalState>,
}

impl TerminalSession {
    pub fn new(render: Arc<dyn RenderSink>) -> Self {
        Self::with_id(action::session::TERMINAL, render)
    }

    pub fn with_id(session_id: impl Into<String>, render: Arc<dyn RenderSink>) -> Self {
        Self {
            session_id: session_id.into(),
            render,
            state: Mutex::new(TerminalState::default()),
        }
    }

    fn state(&self) -> std::sync::MutexGuard<'_, TerminalState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn geometry(&self) -> Option<TermSize> {
        self.state().geometry
    }

    pub fn is_connected(&self) -> bool {
        self.state().connected
    }

    /// Forward keystrokes to the backend.
    pub fn send_input(&self, ctx: &BridgeCtx, text: &str) -> Result<()> {
        let mut p = Payload::new();
        p.insert("text".into(), Value::from(text));
        ctx.send(&self.session_id, action::DATA, p)
    }

    /// Record a new geometry and send it if it changed. Returns whether a
    /// `resize` went out.
    pub fn resize(&self, ctx: &BridgeCtx, size: TermSize) -> Result<bool> {
        if size.cols == 0 || size.rows == 0 {
            return Ok(false);
        }
        {
            let mut st = self.state();
            if st.geometry == Some(size) {
                return Ok(false);
            }
            st.geometry = Some(size);
        }
        self.send_geometry(ctx, size)?;
        Ok(true)
    }

    /// Resize from a pixel area.
    pub fn resize_pixels(
        &self,
        ctx: &BridgeCtx,
        width: f64,
        height: f64,
        cell: CellMetrics,
    ) -> Result<bool> {
        self.resize(ctx, cell.fit(width, height))
    }

    fn send_geometry(&self, ctx: &BridgeCtx, size: TermSize) -> Result<()> {
        let mut p = Payload::new();
        p.insert("cols".into(), Value::from(size.cols));
        p.insert("rows".into(), Value::from(size.rows));
        ctx.send(&self.session_id, action::RESIZE, p)
    }
}

#[async_trait]
impl Session for TerminalSession {
    fn session_id(&self) -> &str {
        &self.session_id
    }

    async fn handle_message(&self, ctx: &BridgeCtx, env: &Envelope) -> Result<()> {
        match env.action() {
            action::DATA => {
                let text = env.str_field("text").ok_or_else(|| {
                    TermtelError::MalformedMessage("terminal data without text".into())
                })?;
                self.render.on_terminal_data(text);
            }
            action::CONNECTED => {
                let geometry = {
                    let mut st = self.state();
                    st.connected = true;
                    st.geometry
                };
                // the backend pty starts at its own default size
                if let Some(size) = geometry {
                    self.send_geometry(ctx, size)?;
                }
            }
            action::DISCONNECTED => {
                self.state().connected = false;
                self.render.on_terminal_data("\r\nConnection closed.\r\n");
            }
            action::ERROR => {
                let msg = error_message(env);
                self.render
                    .on_terminal_data(&format!("\r\nError: {msg}\r\n"));
                self.render.on_error(&self.session_id, &msg);
            }
            other => {
                tracing::debug!(session = %self.session_id, action = %other, "unhandled terminal action");
            }
        }
        Ok(())
    }

    async fn connect(&self, ctx: &BridgeCtx, req: ConnectRequest) -> Result<()> {
        self.render.on_terminal_data("Connecting...\r\n");
        let mut payload = req.to_payload();
        payload.remove("driver_type");
        ctx.send(&self.session_id, action::CONNECT, payload)
    }

    async fn disconnect(&self, ctx: &BridgeCtx) -> Result<()> {
        self.state().connected = false;
        ctx.send(&self.session_id, action::DISCONNECT, Payload::new())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pixel_fit_floors_and_clamps() {
        let cell = CellMetrics { width: 9.0, height: 17.0 };
        assert_eq!(cell.fit(800.0, 600.0), TermSize { cols: 88, rows: 35 });
        assert_eq!(cell.fit(3.0, 0.0), TermSize { cols: 1, rows: 1 });
        let broken = CellMetrics { width: 0.0, height: f64::NAN };
        assert_eq!(broken.fit(800.0, 600.0), TermSize { cols: 1, rows: 1 });
    }
}
