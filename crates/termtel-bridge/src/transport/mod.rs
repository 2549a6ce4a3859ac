//! Transport layer: the single bidirectional channel to the native backend.
//!
//! A transport only knows how to send text and how to hand inbound text to one
//! registered callback. It has no notion of requests or responses; pairing is
//! the correlator's job. Only the session router registers the callback.

pub mod loopback;
pub mod ws;

use std::sync::Arc;

use termtel_core::error::Result;

pub use loopback::LoopbackTransport;
pub use ws::WsBridge;

/// Inbound text callback. Exactly one may be registered at a time.
pub type InboundCallback = Arc<dyn Fn(String) + Send + Sync>;

pub trait Transport: Send + Sync {
    /// Queue `text` for the backend. Fails with `TransportUnavailable` when no
    /// backend is reachable.
    fn send(&self, text: String) -> Result<()>;

    /// Register the inbound callback. Re-registration overwrites.
    fn on_message(&self, callback: InboundCallback);

    /// Whether `send` can currently reach a backend.
    fn is_ready(&self) -> bool;
}
