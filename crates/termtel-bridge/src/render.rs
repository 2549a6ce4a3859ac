//! Render collaborators.
//!
//! Sessions never draw anything themselves; they push state into a
//! [`RenderSink`]. The binary uses [`TracingRenderer`]; embedding hosts plug in
//! their own widgets. [`RecordingRenderer`] keeps every call for inspection.

use std::sync::{Mutex, PoisonError};

use termtel_core::protocol::telemetry::{DeviceInfo, Environment, Interface, Neighbor, Route};

/// Connection state of a device session, as shown to the user.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Discovering,
    Connected,
}

impl ConnectionState {
    pub fn as_str(self) -> &'static str {
        match self {
            ConnectionState::Disconnected => "disconnected",
            ConnectionState::Discovering => "discovering",
            ConnectionState::Connected => "connected",
        }
    }
}

/// What the device-info panel shows.
#[derive(Debug, Clone, PartialEq)]
pub enum DeviceView {
    /// Connect sent, nothing known yet.
    Discovering,
    /// Backend reported the device but without usable details.
    Unknown,
    Info(DeviceInfo),
}

#[allow(unused_variables)]
pub trait RenderSink: Send + Sync {
    fn on_device_info(&self, view: &DeviceView) {}
    fn on_interfaces(&self, interfaces: &[Interface]) {}
    fn on_neighbors(&self, neighbors: &[Neighbor]) {}
    fn on_routing_table(&self, routes: &[Route]) {}
    fn on_environment(&self, env: &Environment) {}
    fn on_terminal_data(&self, text: &str) {}
    fn on_theme_changed(&self, theme: &str) {}
    fn on_connection_state(&self, session_id: &str, state: ConnectionState) {}
    fn on_error(&self, session_id: &str, message: &str) {}
}

/// Logs every render call. Used by the headless binary.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingRenderer;

impl RenderSink for TracingRenderer {
    fn on_device_info(&self, view: &DeviceView) {
        match view {
            DeviceView::Discovering => tracing::info!("device: discovering"),
            DeviceView::Unknown => tracing::info!("device: unknown"),
            DeviceView::Info(info) => {
                tracing::info!(hostname = info.hostname.as_deref().unwrap_or("-"), "device info")
            }
        }
    }

    fn on_interfaces(&self, interfaces: &[Interface]) {
        tracing::info!(count = interfaces.len(), "interfaces");
    }

    fn on_neighbors(&self, neighbors: &[Neighbor]) {
        tracing::info!(count = neighbors.len(), "neighbors");
    }

    fn on_routing_table(&self, routes: &[Route]) {
        tracing::info!(count = routes.len(), "routing table");
    }

    fn on_environment(&self, env: &Environment) {
        let cpu = env.cpu.as_ref().and_then(|c| c.average_usage);
        tracing::info!(?cpu, "environment");
    }

    fn on_terminal_data(&self, text: &str) {
        tracing::debug!(len = text.len(), "terminal data");
    }

    fn on_theme_changed(&self, theme: &str) {
        tracing::info!(%theme, "theme changed");
    }

    fn on_connection_state(&self, session_id: &str, state: ConnectionState) {
        tracing::info!(session = %session_id, state = state.as_str(), "connection state");
    }

    fn on_error(&self, session_id: &str, message: &str) {
        tracing::warn!(session = %session_id, %message, "backend error");
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum RenderEvent {
    DeviceInfo(DeviceView),
    Interfaces(Vec<Interface>),
    Neighbors(Vec<Neighbor>),
    RoutingTable(Vec<Route>),
    Environment(Environment),
    TerminalData(String),
    ThemeChanged(String),
    ConnectionState(String, ConnectionState),
    Error(String, String),
}

/// Keeps every render call in order.
#[derive(Debug, Default)]
pub struct RecordingRenderer {
    events: Mutex<Vec<RenderEvent>>,
}

impl RecordingRenderer {
    pub fn new() -> Self {
        Self::default()
    }

    fn push(&self, ev: RenderEvent) {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(ev);
    }

    pub fn events(&self) -> Vec<RenderEvent> {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn count(&self, pred: impl Fn(&RenderEvent) -> bool) -> usize {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter(|e| pred(e))
            .count()
    }

    pub fn device_info_calls(&self) -> usize {
        self.count(|e| matches!(e, RenderEvent::DeviceInfo(_)))
    }

    /// Concatenated terminal output.
    pub fn terminal_text(&self) -> String {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                RenderEvent::TerminalData(t) => Some(t),
                _ => None,
            })
            .collect()
    }

    pub fn last_connection_state(&self) -> Option<ConnectionState> {
        self.events().into_iter().rev().find_map(|e| match e {
            RenderEvent::ConnectionState(_, s) => Some(s),
            _ => None,
        })
    }

    pub fn clear(&self) {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }
}

impl RenderSink for RecordingRenderer {
    fn on_device_info(&self, view: &DeviceView) {
        self.push(RenderEvent::DeviceInfo(view.clone()));
    }

    fn on_interfaces(&self, interfaces: &[Interface]) {
        self.push(RenderEvent::Interfaces(interfaces.to_vec()));
    }

    fn on_neighbors(&self, neighbors: &[Neighbor]) {
        self.push(RenderEvent::Neighbors(neighbors.to_vec()));
    }

    fn on_routing_table(&self, routes: &[Route]) {
        self.push(RenderEvent::RoutingTable(routes.to_vec()));
    }

    fn on_environment(&self, env: &Environment) {
        self.push(RenderEvent::Environment(env.clone()));
    }

    fn on_terminal_data(&self, text: &str) {
        self.push(RenderEvent::TerminalData(text.to_string()));
    }

    fn on_theme_changed(&self, theme: &str) {
        self.push(RenderEvent::ThemeChanged(theme.to_string()));
    }

    fn on_connection_state(&self, session_id: &str, state: ConnectionState) {
        self.push(RenderEvent::ConnectionState(session_id.to_string(), state));
    }

    fn on_error(&self, session_id: &str, message: &str) {
        self.push(RenderEvent::Error(session_id.to_string(), message.to_string()));
    }
}
