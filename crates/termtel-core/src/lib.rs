//! termtel core: transport-agnostic protocol primitives and the shared error type.
//!
//! This crate defines the wire envelope exchanged with the native backend, the
//! action vocabulary both sides agree on, and typed views over telemetry
//! payloads. It carries no runtime or transport dependencies so the bridge,
//! tests and any embedding host can share it.
//!
//! # Panic-free decoding
//! `unwrap`, `expect` and `panic!` are compile-denied here. Every malformed
//! frame surfaces as [`TermtelError::MalformedMessage`] so a bad message from
//! the backend can never take the bridge down.

#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]

pub mod error;
pub mod protocol;

/// Shared result type.
pub use error::{ErrorCode, Result, TermtelError};
pub use protocol::envelope::{decode, encode, Envelope, Payload};
