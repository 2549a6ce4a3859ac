//! In-process metrics for the bridge.
//!
//! Counters and gauges are atomics keyed by label sets, rendered in Prometheus
//! text format by the `/metrics` handler.

pub mod metrics;

pub use metrics::BridgeMetrics;
