//! Request/response pairing over the shared transport.

pub mod correlator;

pub use correlator::{Correlator, PendingInfo, PendingKey, Request};
