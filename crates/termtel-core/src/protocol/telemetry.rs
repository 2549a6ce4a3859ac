//! Typed views over `telemetry_update` payloads.
//!
//! A push may carry any subset of the five facets. Each facet parses on its
//! own; one bad facet never poisons the others. Unknown fields are kept in
//! `extra` so renderers can still show what the driver reported.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{Result, TermtelError};
use crate::protocol::action;

/// Hostname drivers report when discovery failed.
pub const UNKNOWN_HOSTNAME: &str = "Unknown";

/// One telemetry facet, in the order a full refresh requests them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Facet {
    DeviceInfo,
    Interfaces,
    Neighbors,
    RoutingTable,
    Environment,
}

impl Facet {
    /// Key of this facet inside a `telemetry_update` payload.
    pub fn payload_key(self) -> &'static str {
        match self {
            Facet::DeviceInfo => "device_info",
            Facet::Interfaces => "interfaces",
            Facet::Neighbors => "neighbors",
            Facet::RoutingTable => "routing_table",
            Facet::Environment => "environment",
        }
    }

    /// Action that asks the backend for this facet.
    pub fn request_action(self) -> &'static str {
        match self {
            Facet::DeviceInfo => action::GET_DEVICE_INFO,
            Facet::Interfaces => action::GET_INTERFACES,
            Facet::Neighbors => action::GET_NEIGHBORS,
            Facet::RoutingTable => action::GET_ROUTES,
            Facet::Environment => action::GET_ENVIRONMENT,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct DeviceInfo {
    #[serde(default)]
    pub hostname: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl DeviceInfo {
    /// A device info is usable when it names a real host.
    pub fn validate(&self) -> Result<()> {
        match self.hostname.as_deref() {
            None | Some("") => Err(TermtelError::InvalidDeviceInfo("missing hostname".into())),
            Some(UNKNOWN_HOSTNAME) => Err(TermtelError::InvalidDeviceInfo(
                "hostname is Unknown".into(),
            )),
            Some(_) => Ok(()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Interface {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub status: String,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Neighbor {
    #[serde(default)]
    pub local_port: String,
    #[serde(default)]
    pub neighbor: String,
    #[serde(default)]
    pub remote_port: String,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Route {
    #[serde(default)]
    pub network: String,
    #[serde(default)]
    pub mask: String,
    #[serde(default)]
    pub next_hop: String,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct CpuStatus {
    #[serde(default)]
    pub num_cpus: Option<u32>,
    #[serde(default)]
    pub average_usage: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct MemoryStatus {
    #[serde(default)]
    pub total: Option<u64>,
    #[serde(default)]
    pub used: Option<u64>,
    #[serde(default)]
    pub usage_percent: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct TemperatureSensor {
    #[serde(default)]
    pub location: String,
    #[serde(default)]
    pub temperature: f64,
    #[serde(default)]
    pub alert: bool,
    #[serde(default)]
    pub critical: bool,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct PowerSupply {
    /// Drivers send either a numeric or a string id.
    #[serde(default)]
    pub id: Value,
    #[serde(default)]
    pub status: bool,
    #[serde(default)]
    pub output: f64,
    #[serde(default)]
    pub capacity: f64,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Fan {
    #[serde(default)]
    pub location: String,
    #[serde(default)]
    pub status: bool,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Environment {
    #[serde(default)]
    pub cpu: Option<CpuStatus>,
    #[serde(default)]
    pub memory: Option<MemoryStatus>,
    #[serde(default)]
    pub temperature: Option<Vec<TemperatureSensor>>,
    #[serde(default)]
    pub power: Option<Vec<PowerSupply>>,
    #[serde(default)]
    pub fans: Option<Vec<Fan>>,
}

/// Parse one facet value into its typed form.
pub fn parse_facet<T: DeserializeOwned>(facet: Facet, value: &Value) -> Result<T> {
    T::deserialize(value).map_err(|e| {
        TermtelError::MalformedMessage(format!("invalid {}: {e}", facet.payload_key()))
    })
}

/// Result of one full refresh. Device info is mandatory; the other facets are
/// whatever arrived before their own deadlines.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct TelemetrySnapshot {
    pub device_info: DeviceInfo,
    pub interfaces: Option<Vec<Interface>>,
    pub neighbors: Option<Vec<Neighbor>>,
    pub routing_table: Option<Vec<Route>>,
    pub environment: Option<Environment>,
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;
    use serde_json::json;

    #[test]
    fn device_info_keeps_unknown_fields() {
        let info: DeviceInfo = parse_facet(
            Facet::DeviceInfo,
            &json!({"hostname": "router1", "model": "ISR4331", "uptime": "3 weeks"}),
        )
        .unwrap();
        assert_eq!(info.hostname.as_deref(), Some("router1"));
        assert_eq!(info.extra["model"], json!("ISR4331"));
        assert!(info.validate().is_ok());
    }

    #[test]
    fn sentinel_hostname_is_invalid() {
        let info: DeviceInfo = parse_facet(Facet::DeviceInfo, &json!({"hostname": "Unknown"})).unwrap();
        assert_eq!(info.validate().unwrap_err().code().as_str(), "INVALID_DEVICE_INFO");

        let missing: DeviceInfo = parse_facet(Facet::DeviceInfo, &json!({"model": "x"})).unwrap();
        assert!(missing.validate().is_err());
    }

    #[test]
    fn environment_parses_partial_sensor_lists() {
        let env: Environment = parse_facet(
            Facet::Environment,
            &json!({
                "cpu": {"num_cpus": 2, "average_usage": 12.5},
                "fans": [{"location": "tray1", "status": true}],
                "power": [{"id": 1, "status": false, "output": 0, "capacity": 250}]
            }),
        )
        .unwrap();
        assert_eq!(env.cpu.unwrap().num_cpus, Some(2));
        assert!(env.memory.is_none());
        assert!(env.temperature.is_none());
        assert_eq!(env.power.unwrap()[0].id, json!(1));
    }

    #[test]
    fn wrong_shape_reports_facet_name() {
        let err = parse_facet::<Vec<Route>>(Facet::RoutingTable, &json!({"network": "10.0.0.0"}))
            .unwrap_err();
        assert!(err.to_string().contains("routing_table"));
    }
}
