//! Built-in sessions: terminal, telemetry and UI state.

pub mod telemetry;
pub mod terminal;
pub mod ui_state;
pub mod widget;

use std::fmt;

use serde::Deserialize;
use serde_json::Value;
use termtel_core::protocol::envelope::{Envelope, Payload};

pub use telemetry::{TelemetrySession, TelemetryWidgets};
pub use terminal::{CellMetrics, TermSize, TerminalSession};
pub use ui_state::UiStateSession;
pub use widget::WidgetState;

/// Device credentials for a `connect` action.
#[derive(Clone, Deserialize)]
pub struct ConnectRequest {
    pub host: String,
    pub username: String,
    pub password: String,
    /// Driver hint for telemetry sessions.
    #[serde(default)]
    pub driver_type: Option<String>,
}

impl ConnectRequest {
    pub fn new(
        host: impl Into<String>,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        Self {
            host: host.into(),
            username: username.into(),
            password: password.into(),
            driver_type: None,
        }
    }

    pub fn with_driver(mut self, driver: impl Into<String>) -> Self {
        self.driver_type = Some(driver.into());
        self
    }

    /// Wire payload. `driver_type` is included only when given.
    pub fn to_payload(&self) -> Payload {
        let mut p = Payload::new();
        p.insert("host".into(), Value::from(self.host.as_str()));
        p.insert("username".into(), Value::from(self.username.as_str()));
        p.insert("password".into(), Value::from(self.password.as_str()));
        if let Some(d) = &self.driver_type {
            p.insert("driver_type".into(), Value::from(d.as_str()));
        }
        p
    }
}

impl fmt::Debug for ConnectRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectRequest")
            .field("host", &self.host)
            .field("username", &self.username)
            .field("password", &"***")
            .field("driver_type", &self.driver_type)
            .finish()
    }
}

/// Human-readable text of an `error` envelope.
pub(crate) fn error_message(env: &Envelope) -> String {
    env.str_field("message")
        .or_else(|| env.str_field("error"))
        .map(str::to_string)
        .unwrap_or_else(|| Value::Object(env.payload().clone()).to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn debug_hides_password() {
        let req = ConnectRequest::new("10.0.0.1", "admin", "s3cret").with_driver("eos");
        let shown = format!("{req:?}");
        assert!(!shown.contains("s3cret"));
        assert_eq!(req.to_payload()["driver_type"], "eos");
        assert!(ConnectRequest::new("h", "u", "p").to_payload().get("driver_type").is_none());
    }
}
