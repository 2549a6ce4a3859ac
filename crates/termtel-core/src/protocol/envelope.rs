//! Envelope (JSON text frame).
//!
//! Wire contract, fixed by the backend:
//! `{"session_id": string, "action": string, "payload": object}`.
//!
//! Envelopes are immutable once built. An inbound frame without `payload` is
//! accepted with an empty payload; a `payload` that is present but not an
//! object is malformed.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{Result, TermtelError};

/// Envelope payload: string keys to arbitrary JSON values.
pub type Payload = Map<String, Value>;

/// One wire message, bound to exactly one session and one action.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Envelope {
    session_id: String,
    action: String,
    payload: Payload,
}

impl Envelope {
    pub fn new(session_id: impl Into<String>, action: impl Into<String>, payload: Payload) -> Self {
        Self {
            session_id: session_id.into(),
            action: action.into(),
            payload,
        }
    }

    /// Envelope with an empty payload.
    pub fn bare(session_id: impl Into<String>, action: impl Into<String>) -> Self {
        Self::new(session_id, action, Payload::new())
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn action(&self) -> &str {
        &self.action
    }

    pub fn payload(&self) -> &Payload {
        &self.payload
    }

    /// Payload field lookup. An explicit `null` is `Some(Value::Null)`.
    pub fn field(&self, key: &str) -> Option<&Value> {
        self.payload.get(key)
    }

    /// String payload field, if present and a string.
    pub fn str_field(&self, key: &str) -> Option<&str> {
        self.payload.get(key).and_then(Value::as_str)
    }
}

#[derive(Debug, Deserialize)]
struct WireEnvelope {
    session_id: String,
    action: String,
    #[serde(default = "absent_payload")]
    payload: Value,
}

// A missing payload is empty; an explicit `null` is not.
fn absent_payload() -> Value {
    Value::Object(Payload::new())
}

/// Serialize an envelope to its canonical JSON text.
pub fn encode(env: &Envelope) -> Result<String> {
    serde_json::to_string(env)
        .map_err(|e| TermtelError::Internal(format!("envelope encode failed: {e}")))
}

/// Parse JSON text into an envelope.
pub fn decode(text: &str) -> Result<Envelope> {
    let wire: WireEnvelope = serde_json::from_str(text)
        .map_err(|e| TermtelError::MalformedMessage(format!("invalid envelope json: {e}")))?;

    if wire.session_id.is_empty() {
        return Err(TermtelError::MalformedMessage("empty session_id".into()));
    }
    if wire.action.is_empty() {
        return Err(TermtelError::MalformedMessage("empty action".into()));
    }

    let payload = match wire.payload {
        Value::Object(map) => map,
        other => {
            return Err(TermtelError::MalformedMessage(format!(
                "payload must be an object, got {}",
                json_kind(&other)
            )))
        }
    };

    Ok(Envelope {
        session_id: wire.session_id,
        action: wire.action,
        payload,
    })
}

fn json_kind(v: &Value) -> &'static str {
    match v {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
