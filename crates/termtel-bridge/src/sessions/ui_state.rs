//! UI state session: theme get/set pass-through.

use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use serde_json::Value;

use termtel_core::error::{Result, TermtelError};
use termtel_core::protocol::action;
use termtel_core::protocol::envelope::{Envelope, Payload};

use crate::context::BridgeCtx;
use crate::correlate::Request;
use crate::dispatch::Session;
use crate::render::RenderSink;

const THEME_KEY: &str = "theme";

pub struct UiStateSession {
    session_id: String,
    render: Arc<dyn RenderSink>,
    theme: Mutex<Option<String>>,
}

impl UiStateSession {
    pub fn new(render: Arc<dyn RenderSink>) -> Self {
        Self {
            session_id: action::session::UI_STATE.to_string(),
            render,
            theme: Mutex::new(None),
        }
    }

    pub fn current_theme(&self) -> Option<String> {
        self.theme
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Ask the backend for its theme; the answer arrives as `theme_changed`.
    pub fn request_theme(&self, ctx: &BridgeCtx) -> Result<()> {
        ctx.send(&self.session_id, action::GET_THEME, Payload::new())
    }

    /// Send the theme to the backend, then apply it locally.
    pub fn set_theme(&self, ctx: &BridgeCtx, name: &str) -> Result<()> {
        if name.is_empty() {
            return Ok(());
        }
        let mut p = Payload::new();
        p.insert(THEME_KEY.into(), Value::from(name));
        let sent = ctx.send(&self.session_id, action::SET_THEME, p);
        self.apply(name);
        sent
    }

    /// Await the backend's current theme.
    pub async fn fetch_theme(&self, ctx: &BridgeCtx) -> Result<String> {
        let value = ctx
            .request(Request::new(&self.session_id, action::GET_THEME, THEME_KEY))
            .await?;
        match value {
            Value::String(s) if !s.is_empty() => Ok(s),
            other => Err(TermtelError::MalformedMessage(format!(
                "theme must be a non-empty string, got {other}"
            ))),
        }
    }

    fn apply(&self, name: &str) {
        let changed = {
            let mut cur = self.theme.lock().unwrap_or_else(PoisonError::into_inner);
            if cur.as_deref() == Some(name) {
                false
            } else {
                *cur = Some(name.to_string());
                true
            }
        };
        if changed {
            tracing::debug!(theme = %name, "theme applied");
            self.render.on_theme_changed(name);
        }
    }
}

#[async_trait]
impl Session for UiStateSession {
    fn session_id(&self) -> &str {
        &self.session_id
    }

    async fn handle_message(&self, _ctx: &BridgeCtx, env: &Envelope) -> Result<()> {
        match env.action() {
            action::THEME_CHANGED => match env.str_field(THEME_KEY) {
                Some(name) if !name.is_empty() => self.apply(name),
                _ => tracing::debug!("theme_changed without theme"),
            },
            other => tracing::debug!(action = %other, "unhandled ui_state action"),
        }
        Ok(())
    }
}
