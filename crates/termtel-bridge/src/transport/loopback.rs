//! In-memory transport for tests and embedding hosts.
//!
//! Outbound text is recorded; `deliver` plays the backend's role by invoking
//! the registered callback.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Mutex, PoisonError};

use termtel_core::error::{Result, TermtelError};
use termtel_core::protocol::envelope::{decode, encode, Envelope};

use super::{InboundCallback, Transport};

pub struct LoopbackTransport {
    ready: AtomicBool,
    sent: Mutex<Vec<String>>,
    callback: Mutex<Option<InboundCallback>>,
    registrations: AtomicUsize,
}

impl Default for LoopbackTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl LoopbackTransport {
    pub fn new() -> Self {
        Self {
            ready: AtomicBool::new(true),
            sent: Mutex::new(Vec::new()),
            callback: Mutex::new(None),
            registrations: AtomicUsize::new(0),
        }
    }

    /// A transport whose backend is not attached yet.
    pub fn not_ready() -> Self {
        let t = Self::new();
        t.set_ready(false);
        t
    }

    pub fn set_ready(&self, ready: bool) {
        self.ready.store(ready, Ordering::SeqCst);
    }

    /// Hand `text` to the registered callback, as if the backend sent it.
    /// Returns false when nobody is listening.
    pub fn deliver(&self, text: impl Into<String>) -> bool {
        let cb = self
            .callback
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        match cb {
            Some(cb) => {
                cb(text.into());
                true
            }
            None => false,
        }
    }

    pub fn deliver_envelope(&self, env: &Envelope) -> bool {
        match encode(env) {
            Ok(text) => self.deliver(text),
            Err(_) => false,
        }
    }

    /// Everything sent so far, oldest first.
    pub fn sent(&self) -> Vec<String> {
        self.sent.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    pub fn sent_envelopes(&self) -> Vec<Envelope> {
        self.sent().iter().filter_map(|s| decode(s).ok()).collect()
    }

    /// Number of sent envelopes carrying `action`.
    pub fn count_sent(&self, action: &str) -> usize {
        self.sent_envelopes()
            .iter()
            .filter(|e| e.action() == action)
            .count()
    }

    pub fn clear_sent(&self) {
        self.sent.lock().unwrap_or_else(PoisonError::into_inner).clear();
    }

    /// How many times `on_message` was called.
    pub fn registrations(&self) -> usize {
        self.registrations.load(Ordering::SeqCst)
    }
}

impl Transport for LoopbackTransport {
    fn send(&self, text: String) -> Result<()> {
        if !self.is_ready() {
            return Err(TermtelError::TransportUnavailable);
        }
        self.sent
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(text);
        Ok(())
    }

    fn on_message(&self, callback: InboundCallback) {
        self.registrations.fetch_add(1, Ordering::SeqCst);
        *self.callback.lock().unwrap_or_else(PoisonError::into_inner) = Some(callback);
    }

    fn is_ready(&self) -> bool {
        self.ready.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;

    #[test]
    fn re_registration_overwrites() {
        let t = LoopbackTransport::new();
        let hits = Arc::new(Mutex::new(Vec::new()));

        let first = Arc::clone(&hits);
        t.on_message(Arc::new(move |s: String| first.lock().unwrap().push(format!("first:{s}"))));
        let second = Arc::clone(&hits);
        t.on_message(Arc::new(move |s: String| second.lock().unwrap().push(format!("second:{s}"))));

        assert!(t.deliver("x"));
        assert_eq!(*hits.lock().unwrap(), vec!["second:x".to_string()]);
        assert_eq!(t.registrations(), 2);
    }

    #[test]
    fn send_fails_until_ready() {
        let t = LoopbackTransport::not_ready();
        assert_eq!(t.send("a".into()), Err(TermtelError::TransportUnavailable));
        t.set_ready(true);
        assert!(t.send("b".into()).is_ok());
        assert_eq!(t.sent(), vec!["b".to_string()]);
    }
}
