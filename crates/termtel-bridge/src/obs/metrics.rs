//! Label-keyed metric families backed by `DashMap`.
//!
//! Labels are flattened into a sorted key vector so the same label set always
//! lands on the same slot regardless of argument order. Latency buckets are
//! fixed in milliseconds.

use std::fmt::Write;
use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};
use std::time::Duration;

use dashmap::DashMap;

type LabelKey = Vec<(String, String)>;

fn label_key(labels: &[(&str, &str)]) -> LabelKey {
    let mut key: LabelKey = labels
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
    key.sort();
    key
}

fn escape_label(v: &str) -> String {
    v.replace('\\', "\\\\").replace('"', "\\\"").replace('\n', "\\n")
}

fn render_labels(key: &LabelKey) -> String {
    key.iter()
        .map(|(k, v)| format!("{}=\"{}\"", k, escape_label(v)))
        .collect::<Vec<_>>()
        .join(",")
}

#[derive(Default)]
pub struct CounterVec {
    map: DashMap<LabelKey, AtomicU64>,
}

impl CounterVec {
    pub fn inc(&self, labels: &[(&str, &str)]) {
        self.add(labels, 1);
    }

    pub fn add(&self, labels: &[(&str, &str)], v: u64) {
        self.map
            .entry(label_key(labels))
            .or_insert_with(|| AtomicU64::new(0))
            .fetch_add(v, Ordering::Relaxed);
    }

    /// Current value for an exact label set (0 when never touched).
    pub fn get(&self, labels: &[(&str, &str)]) -> u64 {
        self.map
            .get(&label_key(labels))
            .map(|c| c.load(Ordering::Relaxed))
            .unwrap_or(0)
    }

    fn render(&self, name: &str, out: &mut String) {
        let _ = writeln!(out, "# TYPE {name} counter");
        for r in self.map.iter() {
            let _ = writeln!(out, "{}{{{}}} {}", name, render_labels(r.key()), r.value().load(Ordering::Relaxed));
        }
    }
}

#[derive(Default)]
pub struct GaugeVec {
    map: DashMap<LabelKey, AtomicI64>,
}

impl GaugeVec {
    pub fn inc(&self, labels: &[(&str, &str)]) {
        self.add(labels, 1);
    }

    pub fn dec(&self, labels: &[(&str, &str)]) {
        self.add(labels, -1);
    }

    pub fn add(&self, labels: &[(&str, &str)], v: i64) {
        self.map
            .entry(label_key(labels))
            .or_insert_with(|| AtomicI64::new(0))
            .fetch_add(v, Ordering::Relaxed);
    }

    pub fn set(&self, labels: &[(&str, &str)], v: i64) {
        self.map
            .entry(label_key(labels))
            .or_insert_with(|| AtomicI64::new(0))
            .store(v, Ordering::Relaxed);
    }

    pub fn get(&self, labels: &[(&str, &str)]) -> i64 {
        self.map
            .get(&label_key(labels))
            .map(|g| g.load(Ordering::Relaxed))
            .unwrap_or(0)
    }

    fn render(&self, name: &str, out: &mut String) {
        let _ = writeln!(out, "# TYPE {name} gauge");
        for r in self.map.iter() {
            let _ = writeln!(out, "{}{{{}}} {}", name, render_labels(r.key()), r.value().load(Ordering::Relaxed));
        }
    }
}

// 5ms .. 10s; request round-trips go through a desktop backend, not a LAN.
const BUCKETS_MILLIS: [u64; 8] = [5, 25, 100, 250, 1_000, 2_500, 5_000, 10_000];

#[derive(Default)]
struct AtomicHistogram {
    count: AtomicU64,
    sum: AtomicU64,
    buckets: [AtomicU64; 8],
}

#[derive(Default)]
pub struct HistogramVec {
    map: DashMap<LabelKey, AtomicHistogram>,
}

impl HistogramVec {
    pub fn observe(&self, labels: &[(&str, &str)], elapsed: Duration) {
        let millis = elapsed.as_millis() as u64;
        let hist = self.map.entry(label_key(labels)).or_default();

        hist.count.fetch_add(1, Ordering::Relaxed);
        hist.sum.fetch_add(millis, Ordering::Relaxed);
        for (i, &le) in BUCKETS_MILLIS.iter().enumerate() {
            if millis <= le {
                hist.buckets[i].fetch_add(1, Ordering::Relaxed);
            }
        }
    }

    pub fn count(&self, labels: &[(&str, &str)]) -> u64 {
        self.map
            .get(&label_key(labels))
            .map(|h| h.count.load(Ordering::Relaxed))
            .unwrap_or(0)
    }

    fn render(&self, name: &str, out: &mut String) {
        let _ = writeln!(out, "# TYPE {name} histogram");
        for r in self.map.iter() {
            let labels = render_labels(r.key());
            let prefix = if labels.is_empty() { String::new() } else { format!("{labels},") };
            let hist = r.value();
            for (i, &le) in BUCKETS_MILLIS.iter().enumerate() {
                let _ = writeln!(
                    out,
                    "{}_bucket{{{}le=\"{}\"}} {}",
                    name,
                    prefix,
                    le,
                    hist.buckets[i].load(Ordering::Relaxed)
                );
            }
            let count = hist.count.load(Ordering::Relaxed);
            let _ = writeln!(out, "{name}_bucket{{{prefix}le=\"+Inf\"}} {count}");
            let _ = writeln!(out, "{}_sum{{{}}} {}", name, labels, hist.sum.load(Ordering::Relaxed));
            let _ = writeln!(out, "{name}_count{{{labels}}} {count}");
        }
    }
}

#[derive(Default)]
pub struct BridgeMetrics {
    pub inbound_envelopes: CounterVec,
    pub outbound_envelopes: CounterVec,
    pub decode_errors: CounterVec,
    pub unknown_sessions: CounterVec,
    pub session_errors: CounterVec,
    pub dropped_sends: CounterVec,
    pub request_outcomes: CounterVec,
    pub pending_requests: GaugeVec,
    pub request_latency: HistogramVec, // milliseconds
    pub watchdog_stalls: CounterVec,
    pub backend_attached: GaugeVec,
}

impl BridgeMetrics {
    pub fn render(&self) -> String {
        let mut out = String::new();
        self.inbound_envelopes.render("termtel_inbound_envelopes_total", &mut out);
        self.outbound_envelopes.render("termtel_outbound_envelopes_total", &mut out);
        self.decode_errors.render("termtel_decode_errors_total", &mut out);
        self.unknown_sessions.render("termtel_unknown_session_total", &mut out);
        self.session_errors.render("termtel_session_errors_total", &mut out);
        self.dropped_sends.render("termtel_dropped_sends_total", &mut out);
        self.request_outcomes.render("termtel_request_outcomes_total", &mut out);
        self.pending_requests.render("termtel_pending_requests", &mut out);
        self.request_latency.render("termtel_request_latency_millis", &mut out);
        self.watchdog_stalls.render("termtel_watchdog_stalls_total", &mut out);
        self.backend_attached.render("termtel_backend_attached", &mut out);
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn label_order_does_not_split_series() {
        let c = CounterVec::default();
        c.inc(&[("session", "telemetry"), ("outcome", "timeout")]);
        c.inc(&[("outcome", "timeout"), ("session", "telemetry")]);
        assert_eq!(c.get(&[("session", "telemetry"), ("outcome", "timeout")]), 2);
    }

    #[test]
    fn histogram_buckets_are_cumulative() {
        let m = BridgeMetrics::default();
        m.request_latency.observe(&[("action", "get_routes")], Duration::from_millis(30));
        let text = m.render();
        assert!(text.contains("termtel_request_latency_millis_bucket{action=\"get_routes\",le=\"25\"} 0"));
        assert!(text.contains("termtel_request_latency_millis_bucket{action=\"get_routes\",le=\"100\"} 1"));
        assert!(text.contains("termtel_request_latency_millis_count{action=\"get_routes\"} 1"));
    }
}
