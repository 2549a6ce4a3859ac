//! Axum router wiring (HTTP -> WS upgrade + ops).

use axum::{
    routing::{get, post},
    Router,
};

use crate::{app_state::AppState, ops, transport};

pub fn build_router(state: AppState) -> Router {
    let bridge_path = state.cfg().bridge.path.clone();
    Router::new()
        .route(&bridge_path, get(transport::ws::bridge_upgrade))
        .route("/healthz", get(ops::healthz))
        .route("/readyz", get(ops::readyz))
        .route("/metrics", get(ops::metrics))
        .route("/v1/sessions/:id/connect", post(ops::connect_session))
        .route("/v1/sessions/:id/disconnect", post(ops::disconnect_session))
        .route("/v1/recorder", get(ops::recorder))
        .with_state(state)
}
