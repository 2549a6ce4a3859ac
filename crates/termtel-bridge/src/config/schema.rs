use std::time::Duration;

use serde::Deserialize;
use termtel_core::error::{Result, TermtelError};

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BridgeConfig {
    pub version: u32,

    #[serde(default)]
    pub bridge: BridgeSection,

    #[serde(default)]
    pub correlator: CorrelatorSection,

    #[serde(default)]
    pub polling: PollingSection,

    #[serde(default)]
    pub telemetry: TelemetrySection,

    #[serde(default)]
    pub interceptors: InterceptorSection,
}

impl BridgeConfig {
    pub fn validate(&self) -> Result<()> {
        if self.version != 1 {
            return Err(TermtelError::UnsupportedVersion);
        }
        self.bridge.validate()?;
        self.correlator.validate()?;
        self.polling.validate()?;
        self.telemetry.validate()?;
        self.interceptors.validate()?;
        Ok(())
    }
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            version: 1,
            bridge: BridgeSection::default(),
            correlator: CorrelatorSection::default(),
            polling: PollingSection::default(),
            telemetry: TelemetrySection::default(),
            interceptors: InterceptorSection::default(),
        }
    }
}

fn bad(msg: &str) -> TermtelError {
    TermtelError::BadConfig(msg.into())
}

// --------------------
// bridge (WebSocket endpoint the backend attaches to)
// --------------------
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BridgeSection {
    #[serde(default = "default_listen")]
    pub listen: String,

    #[serde(default = "default_path")]
    pub path: String,

    #[serde(default = "default_ping_interval_ms")]
    pub ping_interval_ms: u64,

    #[serde(default = "default_idle_timeout_ms")]
    pub idle_timeout_ms: u64,

    #[serde(default = "default_outbound_queue")]
    pub outbound_queue: usize,
}

impl Default for BridgeSection {
    fn default() -> Self {
        Self {
            listen: default_listen(),
            path: default_path(),
            ping_interval_ms: default_ping_interval_ms(),
            idle_timeout_ms: default_idle_timeout_ms(),
            outbound_queue: default_outbound_queue(),
        }
    }
}

impl BridgeSection {
    pub fn validate(&self) -> Result<()> {
        if !self.path.starts_with('/') {
            return Err(bad("bridge.path must start with '/'"));
        }
        if !(5000..=120000).contains(&self.ping_interval_ms) {
            return Err(bad("bridge.ping_interval_ms must be between 5000 and 120000"));
        }
        if !(10000..=600000).contains(&self.idle_timeout_ms) {
            return Err(bad("bridge.idle_timeout_ms must be between 10000 and 600000"));
        }
        if self.idle_timeout_ms <= self.ping_interval_ms {
            return Err(bad("bridge.idle_timeout_ms must be greater than ping_interval_ms"));
        }
        if self.outbound_queue == 0 {
            return Err(bad("bridge.outbound_queue must be at least 1"));
        }
        Ok(())
    }
}

fn default_listen() -> String {
    "127.0.0.1:8765".into()
}
fn default_path() -> String {
    "/v1/bridge".into()
}
fn default_ping_interval_ms() -> u64 {
    20000
}
fn default_idle_timeout_ms() -> u64 {
    60000
}
fn default_outbound_queue() -> usize {
    256
}

// --------------------
// correlator
// --------------------
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CorrelatorSection {
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,

    /// Stamp outbound requests with `request_id` and honour it when echoed.
    /// Needs backend cooperation; off by default.
    #[serde(default)]
    pub echo_request_id: bool,
}

impl Default for CorrelatorSection {
    fn default() -> Self {
        Self {
            request_timeout_ms: default_request_timeout_ms(),
            echo_request_id: false,
        }
    }
}

impl CorrelatorSection {
    pub fn validate(&self) -> Result<()> {
        if !(100..=120000).contains(&self.request_timeout_ms) {
            return Err(bad("correlator.request_timeout_ms must be between 100 and 120000"));
        }
        Ok(())
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}

fn default_request_timeout_ms() -> u64 {
    10000
}

// --------------------
// polling watchdog
// --------------------
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PollingSection {
    #[serde(default = "default_watchdog_period_ms")]
    pub watchdog_period_ms: u64,

    #[serde(default = "default_stall_after_ms")]
    pub stall_after_ms: u64,
}

impl Default for PollingSection {
    fn default() -> Self {
        Self {
            watchdog_period_ms: default_watchdog_period_ms(),
            stall_after_ms: default_stall_after_ms(),
        }
    }
}

impl PollingSection {
    pub fn validate(&self) -> Result<()> {
        if !(100..=3_600_000).contains(&self.watchdog_period_ms) {
            return Err(bad("polling.watchdog_period_ms must be between 100 and 3600000"));
        }
        if self.stall_after_ms <= self.watchdog_period_ms {
            return Err(bad("polling.stall_after_ms must be greater than watchdog_period_ms"));
        }
        if self.stall_after_ms > 86_400_000 {
            return Err(bad("polling.stall_after_ms must be at most 86400000"));
        }
        Ok(())
    }
}

fn default_watchdog_period_ms() -> u64 {
    30000
}
fn default_stall_after_ms() -> u64 {
    45000
}

// --------------------
// telemetry session
// --------------------
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TelemetrySection {
    #[serde(default = "default_connect_fallback_ms")]
    pub connect_fallback_ms: u64,

    #[serde(default = "default_driver")]
    pub default_driver: String,

    #[serde(default = "default_max_invalid_device_info")]
    pub max_invalid_device_info: u32,
}

impl Default for TelemetrySection {
    fn default() -> Self {
        Self {
            connect_fallback_ms: default_connect_fallback_ms(),
            default_driver: default_driver(),
            max_invalid_device_info: default_max_invalid_device_info(),
        }
    }
}

impl TelemetrySection {
    pub fn validate(&self) -> Result<()> {
        if !(100..=120000).contains(&self.connect_fallback_ms) {
            return Err(bad("telemetry.connect_fallback_ms must be between 100 and 120000"));
        }
        if self.default_driver.trim().is_empty() {
            return Err(bad("telemetry.default_driver must not be empty"));
        }
        if self.max_invalid_device_info == 0 {
            return Err(bad("telemetry.max_invalid_device_info must be at least 1"));
        }
        Ok(())
    }
}

fn default_connect_fallback_ms() -> u64 {
    5000
}
fn default_driver() -> String {
    "ios".into()
}
fn default_max_invalid_device_info() -> u32 {
    3
}

// --------------------
// interceptors
// --------------------
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct InterceptorSection {
    #[serde(default = "default_true")]
    pub trace: bool,

    #[serde(default)]
    pub record: bool,

    #[serde(default = "default_record_capacity")]
    pub record_capacity: usize,
}

impl Default for InterceptorSection {
    fn default() -> Self {
        Self {
            trace: true,
            record: false,
            record_capacity: default_record_capacity(),
        }
    }
}

impl InterceptorSection {
    pub fn validate(&self) -> Result<()> {
        if self.record_capacity == 0 {
            return Err(bad("interceptors.record_capacity must be at least 1"));
        }
        Ok(())
    }
}

fn default_true() -> bool {
    true
}
fn default_record_capacity() -> usize {
    100
}
