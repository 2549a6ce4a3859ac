//! Operational HTTP endpoints.
//!
//! - `/healthz` : liveness
//! - `/readyz`  : readiness (503 until a backend is attached)
//! - `/metrics` : Prometheus text format
//! - `/v1/sessions/:id/{connect,disconnect}` : drive a session without a UI
//! - `/v1/recorder` : recent traffic, when recording is enabled

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Deserialize;
use serde_json::{json, Value};

use termtel_core::error::{ErrorCode, TermtelError};

use crate::app_state::AppState;
use crate::dispatch::RecordedMessage;
use crate::sessions::ConnectRequest;

pub async fn healthz() -> impl IntoResponse {
    (StatusCode::OK, "ok")
}

pub async fn readyz(State(state): State<AppState>) -> impl IntoResponse {
    if state.is_ready() {
        (StatusCode::OK, "ready")
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, "no backend attached")
    }
}

pub async fn metrics(State(state): State<AppState>) -> Response {
    let body = state.metrics().render();

    (
        StatusCode::OK,
        [(axum::http::header::CONTENT_TYPE, "text/plain; version=0.0.4; charset=utf-8")],
        body,
    )
        .into_response()
}

fn error_response(e: &TermtelError) -> Response {
    let status = match e.code() {
        ErrorCode::UnknownSession => StatusCode::NOT_FOUND,
        ErrorCode::TransportUnavailable => StatusCode::SERVICE_UNAVAILABLE,
        ErrorCode::RequestTimeout => StatusCode::GATEWAY_TIMEOUT,
        ErrorCode::NotConnectable => StatusCode::CONFLICT,
        _ => StatusCode::BAD_REQUEST,
    };
    (
        status,
        Json(json!({ "code": e.code().as_str(), "msg": e.to_string() })),
    )
        .into_response()
}

pub async fn connect_session(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
    Json(req): Json<ConnectRequest>,
) -> Response {
    match state.ctx().connect(&session_id, req).await {
        Ok(()) => StatusCode::ACCEPTED.into_response(),
        Err(e) => error_response(&e),
    }
}

pub async fn disconnect_session(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> Response {
    match state.ctx().disconnect(&session_id).await {
        Ok(()) => StatusCode::ACCEPTED.into_response(),
        Err(e) => error_response(&e),
    }
}

#[derive(Debug, Deserialize)]
pub struct RecorderQuery {
    pub action: Option<String>,
    pub key: Option<String>,
    #[serde(default = "default_limit")]
    pub limit: usize,
}

fn default_limit() -> usize {
    50
}

fn record_json(r: &RecordedMessage) -> Value {
    json!({
        "seq": r.seq,
        "direction": r.direction.as_str(),
        "envelope": r.envelope,
        "raw": r.raw,
    })
}

pub async fn recorder(State(state): State<AppState>, Query(q): Query<RecorderQuery>) -> Response {
    let Some(rec) = state.recorder() else {
        return (StatusCode::NOT_FOUND, "recording disabled").into_response();
    };
    let mut records = match (&q.action, &q.key) {
        (Some(a), _) => rec.find_by_action(a),
        (None, Some(k)) => rec.find_by_payload_key(k),
        (None, None) => rec.recent(q.limit),
    };
    if records.len() > q.limit {
        records.drain(..records.len() - q.limit);
    }
    let body: Vec<Value> = records.iter().map(record_json).collect();
    Json(body).into_response()
}
