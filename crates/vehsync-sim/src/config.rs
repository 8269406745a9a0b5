//! Simulator configuration file

use std::path::Path;

use serde::Deserialize;
use serde_json::Value;
use vehsync_core::{CapabilityValue, DeviceSettings, GeoPoint};
use vehsync_engine::EngineConfig;

/// Root of the simulator TOML file
#[derive(Debug, Deserialize)]
pub struct SimConfig {
    #[serde(default)]
    pub device: DeviceSection,
    /// Settings record; `password` is given in plaintext and encrypted on load
    pub settings: DeviceSettings,
    #[serde(default)]
    pub engine: EngineConfig,
    #[serde(default)]
    pub cipher: CipherSection,
    /// Telemetry tree of the vehicle, as the backend client would report it
    #[serde(default)]
    pub telemetry: Value,
    /// Capability writes issued by the simulated user
    #[serde(default)]
    pub commands: Vec<ScriptedCommand>,
    /// Error lines emitted by the simulated backend client
    #[serde(default)]
    pub errors: Vec<ScriptedError>,
}

#[derive(Debug, Deserialize)]
pub struct DeviceSection {
    #[serde(default = "default_name")]
    pub name: String,
    #[serde(default = "default_driver")]
    pub driver: String,
    /// Capabilities the driver declares statically
    #[serde(default)]
    pub capabilities: Vec<String>,
    #[serde(default)]
    pub home: GeoPoint,
}

impl Default for DeviceSection {
    fn default() -> Self {
        Self {
            name: default_name(),
            driver: default_driver(),
            capabilities: Vec::new(),
            home: GeoPoint::default(),
        }
    }
}

fn default_name() -> String {
    "Vehicle".to_string()
}

fn default_driver() -> String {
    "car".to_string()
}

#[derive(Debug, Default, Deserialize)]
pub struct CipherSection {
    /// XOR key for the stored password; empty stores plain hex
    #[serde(default)]
    pub key: String,
}

#[derive(Debug, Deserialize)]
pub struct ScriptedCommand {
    pub after_secs: u64,
    pub capability: String,
    pub value: CapabilityValue,
}

#[derive(Debug, Deserialize)]
pub struct ScriptedError {
    pub after_secs: u64,
    pub line: String,
}

impl SimConfig {
    pub fn from_file(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .map_err(|e| anyhow::anyhow!("Failed to read {}: {}", path.display(), e))?;
        Self::from_toml(&content)
    }

    pub fn from_toml(text: &str) -> anyhow::Result<Self> {
        Ok(toml::from_str(text)?)
    }
}
