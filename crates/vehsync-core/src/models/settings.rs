//! Host-managed device settings record

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::capability::is_toggle_key;

const REDACTED: &str = "<redacted>";

/// Settings record as persisted by the automation host.
///
/// `password` holds the *encrypted* secret. Keys the engine does not model
/// explicitly (the `remote_*` / `measure_*` toggles) are kept in `extra`.
#[derive(Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceSettings {
    /// Vehicle identification number
    #[serde(default)]
    pub vin: String,
    /// Vehicle type name (`id`, `audietron`, `skodae`, `legacy`)
    #[serde(rename = "type", default)]
    pub vehicle_type: String,
    /// Security PIN, empty when not configured
    #[serde(default)]
    pub pin: String,
    /// Polling interval in minutes
    #[serde(default = "default_update_interval")]
    pub update_interval: i64,
    /// Dump raw telemetry and forward client debug output
    #[serde(default)]
    pub debug_logs: bool,
    /// Vendor account user name
    #[serde(default)]
    pub username: String,
    /// Vendor account password (encrypted at rest)
    #[serde(default)]
    pub password: String,
    /// Optional capability toggles and any other host-side keys
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

fn default_update_interval() -> i64 {
    10
}

impl Default for DeviceSettings {
    fn default() -> Self {
        Self {
            vin: String::new(),
            vehicle_type: "id".to_string(),
            pin: String::new(),
            update_interval: default_update_interval(),
            debug_logs: false,
            username: String::new(),
            password: String::new(),
            extra: BTreeMap::new(),
        }
    }
}

impl DeviceSettings {
    /// Capability toggles that are switched on, in key order
    pub fn enabled_toggles(&self) -> Vec<String> {
        self.extra
            .iter()
            .filter(|(key, value)| is_toggle_key(key) && is_truthy(value))
            .map(|(key, _)| key.clone())
            .collect()
    }

    /// Names of the settings that differ between `self` and `other`
    pub fn changed_keys(&self, other: &DeviceSettings) -> Vec<String> {
        let mut changed = Vec::new();
        if self.vin != other.vin {
            changed.push("vin".to_string());
        }
        if self.vehicle_type != other.vehicle_type {
            changed.push("type".to_string());
        }
        if self.pin != other.pin {
            changed.push("pin".to_string());
        }
        if self.update_interval != other.update_interval {
            changed.push("update_interval".to_string());
        }
        if self.debug_logs != other.debug_logs {
            changed.push("debug_logs".to_string());
        }
        if self.username != other.username {
            changed.push("username".to_string());
        }
        if self.password != other.password {
            changed.push("password".to_string());
        }
        for key in self.extra.keys().chain(other.extra.keys()) {
            if self.extra.get(key) != other.extra.get(key) && !changed.contains(key) {
                changed.push(key.clone());
            }
        }
        changed
    }
}

impl std::fmt::Debug for DeviceSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeviceSettings")
            .field("vin", &REDACTED)
            .field("vehicle_type", &self.vehicle_type)
            .field("pin", &REDACTED)
            .field("update_interval", &self.update_interval)
            .field("debug_logs", &self.debug_logs)
            .field("username", &REDACTED)
            .field("password", &REDACTED)
            .field("extra", &self.extra)
            .finish()
    }
}

/// Loose truthiness used for toggle settings: `true`, non-zero numbers and
/// non-empty strings enable a capability.
pub fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().map(|f| f != 0.0 && !f.is_nan()).unwrap_or(false),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}
