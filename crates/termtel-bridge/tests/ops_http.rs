#![allow(clippy::unwrap_used)]
#![allow(clippy::expect_used)]

use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;

use termtel_bridge::app_state::AppState;
use termtel_bridge::config::BridgeConfig;
use termtel_bridge::ops;
use termtel_bridge::render::TracingRenderer;
use termtel_bridge::sessions::ConnectRequest;

fn state(cfg: BridgeConfig) -> AppState {
    AppState::new(cfg, Arc::new(TracingRenderer)).expect("state")
}

#[tokio::test]
async fn readyz_waits_for_a_backend() {
    let s = state(BridgeConfig::default());
    let resp = ops::readyz(State(s)).await.into_response();
    assert_eq!(resp.status(), StatusCode::SERVICE_UNAVAILABLE);
}

#[tokio::test]
async fn connect_reports_unknown_session_and_missing_backend() {
    let s = state(BridgeConfig::default());

    let resp = ops::connect_session(
        State(s.clone()),
        Path("nope".to_string()),
        Json(ConnectRequest::new("10.0.0.1", "admin", "x")),
    )
    .await;
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);

    let resp = ops::connect_session(
        State(s.clone()),
        Path("telemetry".to_string()),
        Json(ConnectRequest::new("10.0.0.1", "admin", "x")),
    )
    .await;
    assert_eq!(resp.status(), StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(s.metrics().dropped_sends.get(&[("session", "telemetry")]), 1);
}

#[tokio::test]
async fn ui_state_has_no_connection_to_open_or_close() {
    let s = state(BridgeConfig::default());

    let resp = ops::connect_session(
        State(s.clone()),
        Path("ui_state".to_string()),
        Json(ConnectRequest::new("10.0.0.1", "admin", "x")),
    )
    .await;
    assert_eq!(resp.status(), StatusCode::CONFLICT);

    let resp = ops::disconnect_session(State(s.clone()), Path("ui_state".to_string())).await;
    assert_eq!(resp.status(), StatusCode::CONFLICT);
    assert_eq!(s.metrics().dropped_sends.get(&[("session", "ui_state")]), 0);
}

#[tokio::test]
async fn metrics_render_prometheus_text() {
    let s = state(BridgeConfig::default());
    let _ = s.ctx().send("terminal", "data", Default::default());

    let resp = ops::metrics(State(s)).await;
    assert_eq!(resp.status(), StatusCode::OK);
    let ct = resp.headers().get(axum::http::header::CONTENT_TYPE).unwrap();
    assert!(ct.to_str().unwrap().starts_with("text/plain"));
}

#[tokio::test]
async fn recorder_endpoint_follows_config() {
    let s = state(BridgeConfig::default());
    let q = ops::RecorderQuery { action: None, key: None, limit: 10 };
    let resp = ops::recorder(State(s), Query(q)).await;
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);

    let mut cfg = BridgeConfig::default();
    cfg.interceptors.record = true;
    let s = state(cfg);
    let _ = s.ctx().send("terminal", "data", Default::default());
    assert_eq!(s.recorder().unwrap().len(), 1);

    let q = ops::RecorderQuery { action: Some("data".into()), key: None, limit: 10 };
    let resp = ops::recorder(State(s), Query(q)).await;
    assert_eq!(resp.status(), StatusCode::OK);
}
