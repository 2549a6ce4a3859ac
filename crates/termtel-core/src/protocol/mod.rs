//! Wire protocol shared with the native backend.
//!
//! - `envelope`: the `{session_id, action, payload}` JSON frame and its codec.
//! - `action`: session ids and action tags both sides agree on.
//! - `telemetry`: typed views over `telemetry_update` payload facets.
//!
//! Decoding is panic-free: anything the backend sends that does not fit the
//! envelope contract is reported as `TermtelError::MalformedMessage`.

pub mod action;
pub mod envelope;
pub mod telemetry;
