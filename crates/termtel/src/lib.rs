//! Top-level facade crate for termtel.
//!
//! Re-exports the protocol core and the bridge runtime so hosts can depend on a single crate.

pub mod core {
    pub use termtel_core::*;
}

pub mod bridge {
    pub use termtel_bridge::*;
}
