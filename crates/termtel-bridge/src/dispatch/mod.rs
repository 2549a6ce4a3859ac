//! Inbound demultiplexing and outbound sends.
//!
//! Re-exports the session router, the session trait and interceptors so
//! downstream consumers can depend on this module directly.

pub mod dispatcher;
pub mod interceptor;

pub use dispatcher::{Session, SessionRouter};
pub use interceptor::{Direction, Interceptor, MessageRecorder, RecordedMessage, TracingInterceptor};
