#![allow(clippy::unwrap_used)]
#![allow(clippy::expect_used)]
#![allow(clippy::panic)]

use termtel_bridge::config;

#[test]
fn deny_unknown_fields_nested() {
    let bad = r#"
version: 1
polling:
  watchdog_period_ms: 30000
  stall_afterms: 45000 # typo should fail
"#;

    let err = config::load_from_str(bad).expect_err("must fail");
    assert_eq!(err.code().as_str(), "BAD_CONFIG");
}

#[test]
fn ok_minimal_config() {
    let cfg = config::load_from_str("version: 1\n").expect("must parse");
    assert_eq!(cfg.version, 1);
    assert_eq!(cfg.correlator.request_timeout_ms, 10000);
    assert_eq!(cfg.polling.watchdog_period_ms, 30000);
    assert_eq!(cfg.polling.stall_after_ms, 45000);
    assert_eq!(cfg.telemetry.connect_fallback_ms, 5000);
    assert_eq!(cfg.telemetry.default_driver, "ios");
    assert_eq!(cfg.bridge.path, "/v1/bridge");
    assert!(!cfg.correlator.echo_request_id);
}

#[test]
fn wrong_version_is_rejected() {
    let err = config::load_from_str("version: 2\n").expect_err("must fail");
    assert_eq!(err.code().as_str(), "UNSUPPORTED_VERSION");
}

#[test]
fn stall_threshold_must_exceed_watchdog_period() {
    let bad = r#"
version: 1
polling:
  watchdog_period_ms: 30000
  stall_after_ms: 20000
"#;
    let err = config::load_from_str(bad).expect_err("must fail");
    assert!(err.to_string().contains("stall_after_ms"));
}

#[test]
fn oversized_watchdog_period_is_rejected() {
    let bad = r#"
version: 1
polling:
  watchdog_period_ms: 18446744073709551000
  stall_after_ms: 18446744073709551615
"#;
    let err = config::load_from_str(bad).expect_err("must fail");
    assert_eq!(err.code().as_str(), "BAD_CONFIG");
    assert!(err.to_string().contains("watchdog_period_ms"));

    let bad = r#"
version: 1
polling:
  watchdog_period_ms: 30000
  stall_after_ms: 18446744073709551615
"#;
    let err = config::load_from_str(bad).expect_err("must fail");
    assert!(err.to_string().contains("stall_after_ms"));
}

#[test]
fn full_config_round_trip() {
    let ok = r#"
version: 1
bridge:
  listen: "0.0.0.0:9000"
  path: "/bridge"
  ping_interval_ms: 10000
  idle_timeout_ms: 30000
correlator:
  request_timeout_ms: 2500
  echo_request_id: true
telemetry:
  default_driver: "eos"
  max_invalid_device_info: 1
interceptors:
  trace: false
  record: true
  record_capacity: 16
"#;
    let cfg = config::load_from_str(ok).expect("must parse");
    assert_eq!(cfg.bridge.listen, "0.0.0.0:9000");
    assert_eq!(cfg.correlator.request_timeout().as_millis(), 2500);
    assert!(cfg.correlator.echo_request_id);
    assert_eq!(cfg.telemetry.default_driver, "eos");
    assert!(cfg.interceptors.record);
    assert_eq!(cfg.interceptors.record_capacity, 16);
}

#[test]
fn shipped_sample_config_loads() {
    let path = concat!(env!("CARGO_MANIFEST_DIR"), "/../../termtel.yaml");
    let cfg = config::load_from_file(path).expect("sample config");
    assert_eq!(cfg.polling.stall_after_ms, 45000);
    assert_eq!(cfg.bridge.outbound_queue, 256);
}
