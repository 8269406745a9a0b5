//! Capability map entries

use serde::{Deserialize, Serialize};

/// Where a capability's raw value lives in a vehicle's telemetry tree
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PathSpec {
    /// Dotted path to a single value, e.g. `status.batteryStatus.currentSOC_pct`
    Key(String),
    /// Pair of dotted paths to a position in micro-degrees
    Location { latitude: String, longitude: String },
}

impl PathSpec {
    pub fn key(path: impl Into<String>) -> Self {
        PathSpec::Key(path.into())
    }

    pub fn location(latitude: impl Into<String>, longitude: impl Into<String>) -> Self {
        PathSpec::Location {
            latitude: latitude.into(),
            longitude: longitude.into(),
        }
    }
}
