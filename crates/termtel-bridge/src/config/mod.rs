//! Bridge config loader (strict parsing).

pub mod schema;

use std::fs;

use termtel_core::error::{Result, TermtelError};

pub use schema::{
    BridgeConfig, BridgeSection, CorrelatorSection, InterceptorSection, PollingSection,
    TelemetrySection,
};

pub fn load_from_file(path: &str) -> Result<BridgeConfig> {
    let s = fs::read_to_string(path)
        .map_err(|e| TermtelError::BadConfig(format!("read config failed ({path}): {e}")))?;
    load_from_str(&s)
}

pub fn load_from_str(s: &str) -> Result<BridgeConfig> {
    let cfg: BridgeConfig = serde_yaml::from_str(s)
        .map_err(|e| TermtelError::BadConfig(format!("invalid yaml: {e}")))?;
    cfg.validate()?;
    Ok(cfg)
}
