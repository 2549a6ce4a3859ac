//! Per-session liveness watchdog.

pub mod supervisor;

pub use supervisor::{PollState, PollingSupervisor, RefreshHook};
