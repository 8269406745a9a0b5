//! Telemetry snapshot model

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Subtree of a vehicle entry that holds live status data
pub const STATUS_KEY: &str = "status";

/// Raw state blob returned by the backend, one top-level entry per VIN
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TelemetrySnapshot {
    root: Value,
}

impl TelemetrySnapshot {
    /// Wrap an already nested state tree
    pub fn new(root: Value) -> Self {
        Self { root }
    }

    /// Build a nested snapshot from flat dotted keys
    /// (`"<vin>.status.batteryStatus.value"`).
    ///
    /// When a key addresses a child of an existing scalar, the scalar is
    /// replaced by an object.
    pub fn from_flat<I, K>(entries: I) -> Self
    where
        I: IntoIterator<Item = (K, Value)>,
        K: AsRef<str>,
    {
        let mut root = Map::new();
        for (key, value) in entries {
            insert_dotted(&mut root, key.as_ref(), value);
        }
        Self {
            root: Value::Object(root),
        }
    }

    pub fn root(&self) -> &Value {
        &self.root
    }

    /// Entry for one vehicle
    pub fn vehicle(&self, vin: &str) -> Option<&Value> {
        self.root.get(vin)
    }

    /// Entry for one vehicle, but only once the backend has delivered
    /// status data for it
    pub fn vehicle_with_status(&self, vin: &str) -> Option<&Value> {
        self.vehicle(vin)
            .filter(|entry| entry.get(STATUS_KEY).is_some_and(|s| !s.is_null()))
    }

    pub fn is_empty(&self) -> bool {
        match &self.root {
            Value::Object(map) => map.is_empty(),
            Value::Null => true,
            _ => false,
        }
    }
}

fn insert_dotted(root: &mut Map<String, Value>, key: &str, value: Value) {
    let mut segments = key.split('.').peekable();
    let mut current = root;
    while let Some(segment) = segments.next() {
        if segments.peek().is_none() {
            current.insert(segment.to_string(), value);
            return;
        }
        let child = current
            .entry(segment.to_string())
            .or_insert_with(|| Value::Object(Map::new()));
        if !child.is_object() {
            *child = Value::Object(Map::new());
        }
        current = match child {
            Value::Object(map) => map,
            _ => return,
        };
    }
}

/// Resolve a dotted path (`"status.battery.soc"`) inside a JSON tree.
///
/// Numeric segments index into arrays. Returns `None` when any segment is
/// missing.
pub fn lookup<'a>(value: &'a Value, path: &str) -> Option<&'a Value> {
    if path.is_empty() {
        return Some(value);
    }
    path.split('.').try_fold(value, |node, segment| match node {
        Value::Object(map) => map.get(segment),
        Value::Array(items) => segment.parse::<usize>().ok().and_then(|i| items.get(i)),
        _ => None,
    })
}
