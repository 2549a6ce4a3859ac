//! Envelope interceptors.
//!
//! Interceptors observe traffic in both directions without altering it. A
//! panicking interceptor is contained by the router.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, PoisonError};
use std::time::SystemTime;

use termtel_core::error::TermtelError;
use termtel_core::protocol::action;
use termtel_core::protocol::envelope::Envelope;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Inbound,
    Outbound,
}

impl Direction {
    pub fn as_str(self) -> &'static str {
        match self {
            Direction::Inbound => "inbound",
            Direction::Outbound => "outbound",
        }
    }
}

#[allow(unused_variables)]
pub trait Interceptor: Send + Sync {
    fn on_inbound(&self, env: &Envelope) {}
    fn on_outbound(&self, env: &Envelope) {}
    /// Inbound text that failed to decode.
    fn on_malformed(&self, raw: &str, err: &TermtelError) {}
}

/// Logs every envelope at debug level.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingInterceptor;

impl Interceptor for TracingInterceptor {
    fn on_inbound(&self, env: &Envelope) {
        if !action::is_known_inbound(env.action()) {
            tracing::debug!(action = %env.action(), "unrecognised inbound action");
        }
        tracing::debug!(
            session = %env.session_id(),
            action = %env.action(),
            keys = env.payload().len(),
            "<- envelope"
        );
    }

    fn on_outbound(&self, env: &Envelope) {
        tracing::debug!(
            session = %env.session_id(),
            action = %env.action(),
            keys = env.payload().len(),
            "-> envelope"
        );
    }

    fn on_malformed(&self, raw: &str, err: &TermtelError) {
        tracing::debug!(len = raw.len(), error = %err, "<- malformed");
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RecordedMessage {
    pub seq: u64,
    pub at: SystemTime,
    pub direction: Direction,
    /// `None` for inbound text that did not decode.
    pub envelope: Option<Envelope>,
    /// Raw text, kept only for malformed input.
    pub raw: Option<String>,
}

/// Bounded history of recent traffic for debugging.
pub struct MessageRecorder {
    capacity: usize,
    seq: AtomicU64,
    records: Mutex<VecDeque<RecordedMessage>>,
}

impl MessageRecorder {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            seq: AtomicU64::new(0),
            records: Mutex::new(VecDeque::with_capacity(capacity)),
        }
    }

    fn push(&self, direction: Direction, envelope: Option<Envelope>, raw: Option<String>) {
        let rec = RecordedMessage {
            seq: self.seq.fetch_add(1, Ordering::Relaxed),
            at: SystemTime::now(),
            direction,
            envelope,
            raw,
        };
        let mut q = self.records.lock().unwrap_or_else(PoisonError::into_inner);
        if q.len() == self.capacity {
            q.pop_front();
        }
        q.push_back(rec);
    }

    pub fn len(&self) -> usize {
        self.records
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Up to `n` most recent records, oldest first.
    pub fn recent(&self, n: usize) -> Vec<RecordedMessage> {
        let q = self.records.lock().unwrap_or_else(PoisonError::into_inner);
        let skip = q.len().saturating_sub(n);
        q.iter().skip(skip).cloned().collect()
    }

    pub fn find_by_action(&self, action: &str) -> Vec<RecordedMessage> {
        self.filter(|env| env.action() == action)
    }

    pub fn find_by_payload_key(&self, key: &str) -> Vec<RecordedMessage> {
        self.filter(|env| env.payload().contains_key(key))
    }

    fn filter(&self, pred: impl Fn(&Envelope) -> bool) -> Vec<RecordedMessage> {
        self.records
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter(|r| r.envelope.as_ref().is_some_and(&pred))
            .cloned()
            .collect()
    }

    pub fn clear(&self) {
        self.records
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }
}

impl Interceptor for MessageRecorder {
    fn on_inbound(&self, env: &Envelope) {
        self.push(Direction::Inbound, Some(env.clone()), None);
    }

    fn on_outbound(&self, env: &Envelope) {
        self.push(Direction::Outbound, Some(env.clone()), None);
    }

    fn on_malformed(&self, raw: &str, _err: &TermtelError) {
        self.push(Direction::Inbound, None, Some(raw.to_string()));
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use termtel_core::protocol::envelope::Payload;

    use super::*;

    fn env(action: &str, key: &str) -> Envelope {
        let mut p = Payload::new();
        p.insert(key.to_string(), json!(1));
        Envelope::new("telemetry", action, p)
    }

    #[test]
    fn recorder_is_bounded_and_ordered() {
        let r = MessageRecorder::new(2);
        r.on_outbound(&env("get_routes", "a"));
        r.on_inbound(&env("telemetry_update", "routing_table"));
        r.on_malformed("{oops", &TermtelError::MalformedMessage("x".into()));

        assert_eq!(r.len(), 2);
        let recent = r.recent(10);
        assert_eq!(recent[0].direction, Direction::Inbound);
        assert!(recent[1].envelope.is_none());
        assert_eq!(recent[1].raw.as_deref(), Some("{oops"));
        assert!(recent[0].seq < recent[1].seq);
    }

    #[test]
    fn recorder_queries() {
        let r = MessageRecorder::new(10);
        r.on_outbound(&env("get_interfaces", "x"));
        r.on_inbound(&env("telemetry_update", "interfaces"));
        r.on_inbound(&env("telemetry_update", "neighbors"));

        assert_eq!(r.find_by_action("telemetry_update").len(), 2);
        assert_eq!(r.find_by_payload_key("interfaces").len(), 1);
        assert_eq!(r.recent(1)[0].envelope.as_ref().map(|e| e.action()), Some("telemetry_update"));

        r.clear();
        assert!(r.is_empty());
    }
}
