//! Engine configuration
//!
//! Every settle delay of the synchronization flow is configurable so the
//! simulator and the tests can run the same code paths without waiting.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use vehsync_conv::CapabilityMap;
use vehsync_core::{SyncError, SyncResult};

/// `forceUpdate` value at which a normal tick escalates to a forced refresh
pub const FORCE_UPDATE_THRESHOLD: i64 = 360;

/// Configuration for a [`crate::VehicleDevice`]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Settle delays and poll unit
    #[serde(default)]
    pub timings: EngineTimings,
    /// Counter threshold for escalating to a forced refresh
    #[serde(default = "default_force_update_threshold")]
    pub force_update_threshold: i64,
    /// Capability map file; the built-in map is used when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub capability_map: Option<PathBuf>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            timings: EngineTimings::default(),
            force_update_threshold: default_force_update_threshold(),
            capability_map: None,
        }
    }
}

impl EngineConfig {
    /// Load from a TOML file
    pub fn from_file(path: impl AsRef<Path>) -> SyncResult<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .map_err(|e| SyncError::Config(format!("{}: {}", path.display(), e)))?;
        Self::from_toml(&content)
    }

    /// Parse from a TOML string
    pub fn from_toml(text: &str) -> SyncResult<Self> {
        toml::from_str(text).map_err(|e| SyncError::Config(e.to_string()))
    }

    /// The configured capability map, or the built-in one
    pub fn load_capability_map(&self) -> SyncResult<CapabilityMap> {
        let map = match &self.capability_map {
            Some(path) => CapabilityMap::from_file(path),
            None => CapabilityMap::builtin(),
        };
        map.map_err(|e| SyncError::Config(format!("Capability map: {}", e)))
    }
}

fn default_force_update_threshold() -> i64 {
    FORCE_UPDATE_THRESHOLD
}

/// Settle delays (milliseconds) around backend and host transitions
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineTimings {
    /// After dropping an old client, before creating a new one
    #[serde(default = "default_teardown_settle_ms")]
    pub teardown_settle_ms: u64,
    /// After the client signals ready
    #[serde(default = "default_ready_settle_ms")]
    pub ready_settle_ms: u64,
    /// After unloading the client's own polling
    #[serde(default = "default_unload_settle_ms")]
    pub unload_settle_ms: u64,
    /// After each capability add/remove batch
    #[serde(default = "default_capability_settle_ms")]
    pub capability_settle_ms: u64,
    /// Before and after requesting a status update from the vehicle
    #[serde(default = "default_force_request_settle_ms")]
    pub force_request_settle_ms: u64,
    /// After a forced status refresh
    #[serde(default = "default_force_update_settle_ms")]
    pub force_update_settle_ms: u64,
    /// After a normal status refresh
    #[serde(default = "default_normal_update_settle_ms")]
    pub normal_update_settle_ms: u64,
    /// Before a one-shot capability falls back to `false`
    #[serde(default = "default_one_shot_reset_ms")]
    pub one_shot_reset_ms: u64,
    /// Before re-persisting settings with a freshly encrypted password
    #[serde(default = "default_settings_save_delay_ms")]
    pub settings_save_delay_ms: u64,
    /// Length of one `update_interval` unit
    #[serde(default = "default_poll_unit_ms")]
    pub poll_unit_ms: u64,
}

fn default_teardown_settle_ms() -> u64 {
    1000
}

fn default_ready_settle_ms() -> u64 {
    6000
}

fn default_unload_settle_ms() -> u64 {
    1000
}

fn default_capability_settle_ms() -> u64 {
    2000
}

fn default_force_request_settle_ms() -> u64 {
    5000
}

fn default_force_update_settle_ms() -> u64 {
    10000
}

fn default_normal_update_settle_ms() -> u64 {
    10000
}

fn default_one_shot_reset_ms() -> u64 {
    3000
}

fn default_settings_save_delay_ms() -> u64 {
    2000
}

fn default_poll_unit_ms() -> u64 {
    60_000
}

impl Default for EngineTimings {
    fn default() -> Self {
        Self {
            teardown_settle_ms: default_teardown_settle_ms(),
            ready_settle_ms: default_ready_settle_ms(),
            unload_settle_ms: default_unload_settle_ms(),
            capability_settle_ms: default_capability_settle_ms(),
            force_request_settle_ms: default_force_request_settle_ms(),
            force_update_settle_ms: default_force_update_settle_ms(),
            normal_update_settle_ms: default_normal_update_settle_ms(),
            one_shot_reset_ms: default_one_shot_reset_ms(),
            settings_save_delay_ms: default_settings_save_delay_ms(),
            poll_unit_ms: default_poll_unit_ms(),
        }
    }
}

impl EngineTimings {
    /// No settle delays; the poll unit is kept so intervals stay meaningful
    pub fn immediate() -> Self {
        Self {
            teardown_settle_ms: 0,
            ready_settle_ms: 0,
            unload_settle_ms: 0,
            capability_settle_ms: 0,
            force_request_settle_ms: 0,
            force_update_settle_ms: 0,
            normal_update_settle_ms: 0,
            one_shot_reset_ms: 0,
            settings_save_delay_ms: 0,
            poll_unit_ms: default_poll_unit_ms(),
        }
    }

    pub fn teardown_settle(&self) -> Duration {
        Duration::from_millis(self.teardown_settle_ms)
    }

    pub fn ready_settle(&self) -> Duration {
        Duration::from_millis(self.ready_settle_ms)
    }

    pub fn unload_settle(&self) -> Duration {
        Duration::from_millis(self.unload_settle_ms)
    }

    pub fn capability_settle(&self) -> Duration {
        Duration::from_millis(self.capability_settle_ms)
    }

    pub fn force_request_settle(&self) -> Duration {
        Duration::from_millis(self.force_request_settle_ms)
    }

    pub fn force_update_settle(&self) -> Duration {
        Duration::from_millis(self.force_update_settle_ms)
    }

    pub fn normal_update_settle(&self) -> Duration {
        Duration::from_millis(self.normal_update_settle_ms)
    }

    pub fn one_shot_reset(&self) -> Duration {
        Duration::from_millis(self.one_shot_reset_ms)
    }

    pub fn settings_save_delay(&self) -> Duration {
        Duration::from_millis(self.settings_save_delay_ms)
    }

    /// Poll period for an interval given in minutes (never zero)
    pub fn poll_period(&self, interval_minutes: u32) -> Duration {
        let ms = self.poll_unit_ms.saturating_mul(u64::from(interval_minutes));
        Duration::from_millis(ms.max(1))
    }
}

/// Sleep unless the delay is zero
pub(crate) async fn settle(delay: Duration) {
    if !delay.is_zero() {
        tokio::time::sleep(delay).await;
    }
}
