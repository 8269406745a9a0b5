//! Persistent device store
//!
//! Two host-persisted values drive the scheduler across restarts:
//! `forceUpdate` (minutes polled since the last forced refresh) and
//! `shouldRestart` (a pending client recreation).

use std::sync::Arc;

use serde_json::Value;
use tracing::debug;
use vehsync_core::{HostDevice, HostResult};

pub const FORCE_UPDATE_KEY: &str = "forceUpdate";
pub const SHOULD_RESTART_KEY: &str = "shouldRestart";

/// Typed view over the host's key/value store for one device
#[derive(Clone)]
pub struct DeviceStore {
    host: Arc<dyn HostDevice>,
}

impl DeviceStore {
    pub fn new(host: Arc<dyn HostDevice>) -> Self {
        Self { host }
    }

    /// Seed missing values and clear any stale restart request
    pub async fn init(&self) -> HostResult<()> {
        if self.host.store_value(FORCE_UPDATE_KEY).is_none() {
            self.set_force_update(0).await?;
        }
        self.set_should_restart(false).await
    }

    pub fn force_update(&self) -> i64 {
        match self.host.store_value(FORCE_UPDATE_KEY) {
            Some(Value::Number(n)) => n
                .as_i64()
                .or_else(|| n.as_f64().map(|f| f as i64))
                .unwrap_or(0),
            _ => 0,
        }
    }

    pub async fn set_force_update(&self, value: i64) -> HostResult<()> {
        debug!(force_update = value, "Store forceUpdate");
        self.host
            .set_store_value(FORCE_UPDATE_KEY, Value::from(value))
            .await
    }

    pub fn should_restart(&self) -> bool {
        matches!(self.host.store_value(SHOULD_RESTART_KEY), Some(Value::Bool(true)))
    }

    pub async fn set_should_restart(&self, value: bool) -> HostResult<()> {
        debug!(should_restart = value, "Store shouldRestart");
        self.host
            .set_store_value(SHOULD_RESTART_KEY, Value::Bool(value))
            .await
    }
}
