//! Telemetry session.
//!
//! ```text
//! Disconnected --connect--> Discovering --connected--> Connected
//!      ^                        |  (or fallback timer,        |
//!      |                        |   or valid device_info)     |
//!      +---- error -------------+                             |
//!      +---- disconnected | repeated invalid device_info -----+
//! ```
//!
//! Polling runs only while `Connected`. Each `telemetry_update` may carry any
//! subset of the five facets; device info renders on every receipt, the other
//! facets only when their value changed.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use tokio::task::JoinHandle;
use tokio::time::Duration;

use termtel_core::error::{Result, TermtelError};
use termtel_core::protocol::action;
use termtel_core::protocol::envelope::{Envelope, Payload};
use termtel_core::protocol::telemetry::{
    parse_facet, DeviceInfo, Environment, Facet, Interface, Neighbor, Route,
};

use super::{error_message, ConnectRequest, WidgetState};
use crate::config::TelemetrySection;
use crate::context::BridgeCtx;
use crate::dispatch::Session;
use crate::render::{DeviceView, RenderSink};

pub use crate::render::ConnectionState;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct TelemetryWidgets {
    pub device_info: WidgetState<DeviceInfo>,
    pub interfaces: WidgetState<Vec<Interface>>,
    pub neighbors: WidgetState<Vec<Neighbor>>,
    pub routing_table: WidgetState<Vec<Route>>,
    pub environment: WidgetState<Environment>,
}

struct TelemetryState {
    conn: ConnectionState,
    widgets: TelemetryWidgets,
    invalid_streak: u32,
    fallback: Option<JoinHandle<()>>,
    initial_fetch: Option<JoinHandle<()>>,
}

impl TelemetryState {
    fn abort_timers(&mut self) {
        if let Some(t) = self.fallback.take() {
            t.abort();
        }
        if let Some(t) = self.initial_fetch.take() {
            t.abort();
        }
    }
}

struct Shared {
    session_id: String,
    render: Arc<dyn RenderSink>,
    fallback_after: Duration,
    default_driver: String,
    max_invalid: u32,
    state: Mutex<TelemetryState>,
}

impl Drop for Shared {
    fn drop(&mut self) {
        self.state
            .get_mut()
            .unwrap_or_else(PoisonError::into_inner)
            .abort_timers();
    }
}

pub struct TelemetrySession {
    shared: Arc<Shared>,
}

impl TelemetrySession {
    pub fn new(settings: &TelemetrySection, render: Arc<dyn RenderSink>) -> Self {
        Self::with_id(action::session::TELEMETRY, settings, render)
    }

    pub fn with_id(
        session_id: impl Into<String>,
        settings: &TelemetrySection,
        render: Arc<dyn RenderSink>,
    ) -> Self {
        Self {
            shared: Arc::new(Shared {
                session_id: session_id.into(),
                render,
                fallback_after: Duration::from_millis(settings.connect_fallback_ms),
                default_driver: settings.default_driver.clone(),
                max_invalid: settings.max_invalid_device_info.max(1),
                state: Mutex::new(TelemetryState {
                    conn: ConnectionState::Disconnected,
                    widgets: TelemetryWidgets::default(),
                    invalid_streak: 0,
                    fallback: None,
                    initial_fetch: None,
                }),
            }),
        }
    }

    pub fn connection_state(&self) -> ConnectionState {
        self.shared.lock().conn
    }

    pub fn widgets(&self) -> TelemetryWidgets {
        self.shared.lock().widgets.clone()
    }
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, TelemetryState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn on_fallback(self: &Arc<Self>, ctx: &BridgeCtx) {
        let discovering = {
            let mut st = self.lock();
            st.fallback = None;
            st.conn == ConnectionState::Discovering
        };
        if discovering {
            tracing::warn!(
                session = %self.session_id,
                after_ms = self.fallback_after.as_millis() as u64,
                "no connected event, proceeding optimistically"
            );
            self.enter_connected(ctx);
        }
    }

    fn enter_connected(self: &Arc<Self>, ctx: &BridgeCtx) {
        {
            let mut st = self.lock();
            if st.conn == ConnectionState::Connected {
                return;
            }
            st.conn = ConnectionState::Connected;
            st.abort_timers();

            let fetch_ctx = ctx.clone();
            let id = self.session_id.clone();
            st.initial_fetch = Some(tokio::spawn(async move {
                match fetch_ctx.request_all(&id).await {
                    Ok(snap) => tracing::debug!(
                        session = %id,
                        hostname = snap.device_info.hostname.as_deref().unwrap_or("-"),
                        "initial telemetry fetched"
                    ),
                    Err(e) => {
                        tracing::warn!(session = %id, code = e.code().as_str(), error = %e, "initial telemetry fetch failed")
                    }
                }
            }));
        }
        ctx.start_polling(&self.session_id);
        self.render
            .on_connection_state(&self.session_id, ConnectionState::Connected);
    }

    fn enter_disconnected(&self, ctx: &BridgeCtx) {
        let was = {
            let mut st = self.lock();
            let was = st.conn;
            st.conn = ConnectionState::Disconnected;
            st.invalid_streak = 0;
            st.abort_timers();
            was
        };
        ctx.polling().stop(&self.session_id);
        ctx.correlator().cancel_session(&self.session_id);
        if was != ConnectionState::Disconnected {
            self.render
                .on_connection_state(&self.session_id, ConnectionState::Disconnected);
        }
    }

    fn facet<T: DeserializeOwned>(&self, facet: Facet, env: &Envelope) -> Option<T> {
        let raw = env.field(facet.payload_key())?;
        if raw.is_null() {
            return None;
        }
        match parse_facet(facet, raw) {
            Ok(v) => Some(v),
            Err(e) => {
                tracing::warn!(session = %self.session_id, error = %e, "facet skipped");
                None
            }
        }
    }

    fn apply_device_info(self: &Arc<Self>, ctx: &BridgeCtx, env: &Envelope) {
        let Some(raw) = env.field(Facet::DeviceInfo.payload_key()) else {
            return;
        };
        if raw.is_null() {
            self.render.on_device_info(&DeviceView::Unknown);
            return;
        }
        let checked = parse_facet::<DeviceInfo>(Facet::DeviceInfo, raw)
            .map_err(|e| TermtelError::InvalidDeviceInfo(e.to_string()))
            .and_then(|info| info.validate().map(|()| info));

        match checked {
            Ok(info) => {
                let promote = {
                    let mut st = self.lock();
                    st.invalid_streak = 0;
                    st.widgets.device_info.update(info.clone());
                    st.conn == ConnectionState::Discovering
                };
                self.render.on_device_info(&DeviceView::Info(info));
                if promote {
                    self.enter_connected(ctx);
                }
            }
            Err(e) => {
                self.render.on_device_info(&DeviceView::Unknown);
                self.note_invalid(ctx, &e);
            }
        }
    }

    fn note_invalid(&self, ctx: &BridgeCtx, err: &TermtelError) {
        let streak = {
            let mut st = self.lock();
            st.invalid_streak += 1;
            st.invalid_streak
        };
        tracing::warn!(session = %self.session_id, streak, error = %err, "invalid device info");
        if streak >= self.max_invalid {
            let msg = format!("device info invalid {streak} times in a row: {err}");
            self.render.on_error(&self.session_id, &msg);
            self.enter_disconnected(ctx);
        }
    }

    fn apply_update(self: &Arc<Self>, ctx: &BridgeCtx, env: &Envelope) {
        ctx.polling().record_update(&self.session_id);

        self.apply_device_info(ctx, env);

        if let Some(list) = self.facet::<Vec<Interface>>(Facet::Interfaces, env) {
            if self.lock().widgets.interfaces.update(list.clone()) {
                self.render.on_interfaces(&list);
            }
        }
        if let Some(list) = self.facet::<Vec<Neighbor>>(Facet::Neighbors, env) {
            if self.lock().widgets.neighbors.update(list.clone()) {
                self.render.on_neighbors(&list);
            }
        }
        if let Some(list) = self.facet::<Vec<Route>>(Facet::RoutingTable, env) {
            if list.is_empty() {
                tracing::debug!(session = %self.session_id, "empty routing table ignored");
            } else if self.lock().widgets.routing_table.update(list.clone()) {
                self.render.on_routing_table(&list);
            }
        }
        if let Some(data) = self.facet::<Environment>(Facet::Environment, env) {
            if self.lock().widgets.environment.update(data.clone()) {
                self.render.on_environment(&data);
            }
        }
    }
}

#[async_trait]
impl Session for TelemetrySession {
    fn session_id(&self) -> &str {
        &self.shared.session_id
    }

    async fn handle_message(&self, ctx: &BridgeCtx, env: &Envelope) -> Result<()> {
        let s = &self.shared;
        match env.action() {
            action::CONNECTED => s.enter_connected(ctx),
            action::DISCONNECTED => s.enter_disconnected(ctx),
            action::TELEMETRY_UPDATE => s.apply_update(ctx, env),
            action::ERROR => {
                let msg = error_message(env);
                s.render.on_error(&s.session_id, &msg);
                let discovering = s.lock().conn == ConnectionState::Discovering;
                if discovering {
                    tracing::warn!(session = %s.session_id, error = %msg, "connect failed");
                    s.enter_disconnected(ctx);
                } else {
                    tracing::warn!(session = %s.session_id, error = %msg, "backend error, polling continues");
                }
            }
            other => {
                tracing::debug!(session = %s.session_id, action = %other, "unhandled telemetry action");
            }
        }
        Ok(())
    }

    async fn connect(&self, ctx: &BridgeCtx, mut req: ConnectRequest) -> Result<()> {
        let s = &self.shared;
        {
            let mut st = s.lock();
            if st.conn == ConnectionState::Connected {
                tracing::warn!(session = %s.session_id, "already connected, connect ignored");
                return Ok(());
            }
            st.conn = ConnectionState::Discovering;
            st.invalid_streak = 0;
            st.abort_timers();

            let shared = Arc::clone(s);
            let fallback_ctx = ctx.clone();
            st.fallback = Some(tokio::spawn(async move {
                tokio::time::sleep(shared.fallback_after).await;
                shared.on_fallback(&fallback_ctx);
            }));
        }
        s.render.on_device_info(&DeviceView::Discovering);
        s.render
            .on_connection_state(&s.session_id, ConnectionState::Discovering);

        if req.driver_type.is_none() {
            req.driver_type = Some(s.default_driver.clone());
        }
        tracing::info!(session = %s.session_id, host = %req.host, "connecting");
        ctx.send(&s.session_id, action::CONNECT, req.to_payload())
    }

    async fn disconnect(&self, ctx: &BridgeCtx) -> Result<()> {
        let s = &self.shared;
        let sent = if s.lock().conn != ConnectionState::Disconnected {
            ctx.send(&s.session_id, action::DISCONNECT, Payload::new())
        } else {
            Ok(())
        };
        s.enter_disconnected(ctx);
        sent
    }
}
