//! Capability models

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Settings keys with this prefix toggle an optional remote command capability
pub const REMOTE_PREFIX: &str = "remote_";

/// Settings keys with this prefix toggle an optional measurement capability
pub const MEASURE_PREFIX: &str = "measure_";

/// Boolean capabilities with this prefix fire a `<name>_changed` flow trigger
pub const EVENT_PREFIX: &str = "is_";

/// Location capability, derived from the vehicle's parking position
pub const IS_HOME: &str = "is_home";

/// A typed capability value as stored by the host
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CapabilityValue {
    Bool(bool),
    Number(f64),
    Text(String),
}

impl CapabilityValue {
    /// Convert a raw JSON value. `null` has no capability representation;
    /// arrays and objects are passed through as their JSON text.
    pub fn from_json(value: &Value) -> Option<Self> {
        match value {
            Value::Null => None,
            Value::Bool(b) => Some(CapabilityValue::Bool(*b)),
            Value::Number(n) => n.as_f64().map(CapabilityValue::Number),
            Value::String(s) => Some(CapabilityValue::Text(s.clone())),
            other => Some(CapabilityValue::Text(other.to_string())),
        }
    }

    pub fn to_json(&self) -> Value {
        match self {
            CapabilityValue::Bool(b) => Value::Bool(*b),
            CapabilityValue::Number(n) => serde_json::Number::from_f64(*n)
                .map(Value::Number)
                .unwrap_or(Value::Null),
            CapabilityValue::Text(s) => Value::String(s.clone()),
        }
    }
}

impl From<bool> for CapabilityValue {
    fn from(value: bool) -> Self {
        CapabilityValue::Bool(value)
    }
}

impl From<f64> for CapabilityValue {
    fn from(value: f64) -> Self {
        CapabilityValue::Number(value)
    }
}

impl From<&str> for CapabilityValue {
    fn from(value: &str) -> Self {
        CapabilityValue::Text(value.to_string())
    }
}

impl From<String> for CapabilityValue {
    fn from(value: String) -> Self {
        CapabilityValue::Text(value)
    }
}

impl std::fmt::Display for CapabilityValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CapabilityValue::Bool(b) => write!(f, "{}", b),
            CapabilityValue::Number(n) => write!(f, "{}", n),
            CapabilityValue::Text(s) => f.write_str(s),
        }
    }
}

/// Settings key that may enable an optional capability
pub fn is_toggle_key(key: &str) -> bool {
    key.starts_with(REMOTE_PREFIX) || key.starts_with(MEASURE_PREFIX)
}

/// Capability that accepts writes from the host and is routed to the
/// command dispatcher
pub fn is_writable(name: &str) -> bool {
    name.contains(REMOTE_PREFIX) || name.contains("locked") || name.contains("target_")
}

/// Boolean capability whose changes are announced as flow events
pub fn is_event_capability(name: &str) -> bool {
    name.starts_with(EVENT_PREFIX)
}

/// Flow trigger card fired when an event capability changes
pub fn changed_trigger(name: &str) -> String {
    format!("{}_changed", name)
}
