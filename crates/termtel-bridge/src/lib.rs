//! termtel bridge library entry.
//!
//! This crate layers request/response correlation and polling supervision
//! on top of a fire-and-forget text transport shared by several sessions
//! (terminal, telemetry, UI state). It is consumed by the binary
//! (`main.rs`), by embedding hosts through [`context::BridgeCtx`], and by
//! integration tests.

pub mod app_state;
pub mod config;
pub mod context;
pub mod correlate;
pub mod dispatch;
pub mod obs;
pub mod ops;
pub mod polling;
pub mod render;
pub mod router;
pub mod sessions;
pub mod transport;

pub use context::{BridgeCtx, BridgeCtxBuilder};
pub use correlate::{Correlator, Request};
pub use dispatch::{Interceptor, Session, SessionRouter};
pub use polling::{PollState, PollingSupervisor};
pub use render::{ConnectionState, DeviceView, RenderSink};
pub use transport::{LoopbackTransport, Transport, WsBridge};
