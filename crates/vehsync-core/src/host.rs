//! HostDevice trait - the port to the automation host's device model

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::HostResult;
use crate::models::{CapabilityValue, DeviceSettings};

/// A point on the globe in decimal degrees
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    pub latitude: f64,
    pub longitude: f64,
}

impl GeoPoint {
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
        }
    }
}

/// The device object the host exposes for one paired vehicle.
///
/// All persistence (settings, store values, capability values) lives on the
/// host side; the engine keeps no state of its own across restarts.
#[async_trait]
pub trait HostDevice: Send + Sync {
    /// Display name, used in log lines and availability messages
    fn name(&self) -> String;

    /// Driver identifier, first half of the capability map key
    fn driver_id(&self) -> String;

    /// Capabilities every device of this driver exposes
    fn driver_capabilities(&self) -> Vec<String>;

    fn settings(&self) -> DeviceSettings;

    async fn set_settings(&self, settings: DeviceSettings) -> HostResult<()>;

    fn store_value(&self, key: &str) -> Option<Value>;

    async fn set_store_value(&self, key: &str, value: Value) -> HostResult<()>;

    /// Currently exposed capabilities
    fn capabilities(&self) -> Vec<String>;

    async fn add_capability(&self, name: &str) -> HostResult<()>;

    async fn remove_capability(&self, name: &str) -> HostResult<()>;

    fn capability_value(&self, name: &str) -> Option<CapabilityValue>;

    async fn set_capability_value(&self, name: &str, value: CapabilityValue) -> HostResult<()>;

    /// Route host-side writes to these capabilities to the engine as one
    /// batch per write event. Replaces any earlier registration.
    async fn register_capability_listener(&self, names: Vec<String>) -> HostResult<()>;

    fn is_available(&self) -> bool;

    async fn set_available(&self) -> HostResult<()>;

    async fn set_unavailable(&self, reason: &str) -> HostResult<()>;

    /// Reference location of the host (the "home" position)
    fn home_location(&self) -> GeoPoint;

    /// Fire a device flow trigger card by name
    async fn trigger_flow(&self, card: &str, tokens: Value) -> HostResult<()>;
}
