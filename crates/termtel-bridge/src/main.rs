//! termtel bridge
//!
//! - Backend endpoint: `bridge.path` (WebSocket, one envelope per text frame)
//! - Sessions: terminal, telemetry, ui_state
//! - Ops: /healthz, /readyz, /metrics
//!
//! Config is read from `$TERMTEL_CONFIG` or `termtel.yaml`; defaults apply
//! when neither exists.

use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;

use tracing_subscriber::{fmt, EnvFilter};

use termtel_bridge::{app_state, config, render::TracingRenderer, router};

#[tokio::main]
async fn main() {
    fmt().with_env_filter(EnvFilter::from_default_env()).init();

    if let Err(e) = run().await {
        tracing::error!(code = e.code().as_str(), error = %e, "termtel-bridge failed");
        std::process::exit(1);
    }
}

async fn run() -> termtel_core::Result<()> {
    let path = std::env::var("TERMTEL_CONFIG").unwrap_or_else(|_| "termtel.yaml".to_string());
    let cfg = if Path::new(&path).exists() {
        config::load_from_file(&path)?
    } else {
        tracing::info!(%path, "config not found, using defaults");
        config::BridgeConfig::default()
    };

    let listen: SocketAddr = cfg.bridge.listen.parse().map_err(|e| {
        termtel_core::TermtelError::BadConfig(format!("bridge.listen must be a valid SocketAddr: {e}"))
    })?;

    let state = app_state::AppState::new(cfg, Arc::new(TracingRenderer))?;
    let app = router::build_router(state);

    tracing::info!(%listen, "termtel-bridge starting");
    let listener = tokio::net::TcpListener::bind(listen)
        .await
        .map_err(|e| termtel_core::TermtelError::Internal(format!("bind failed: {e}")))?;

    axum::serve(listener, app)
        .await
        .map_err(|e| termtel_core::TermtelError::Internal(format!("server failed: {e}")))
}
