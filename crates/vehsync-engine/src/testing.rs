//! In-memory host and scripted backend for tests and the simulator
//!
//! ```ignore
//! use vehsync_engine::testing::{MemoryHost, MockClientFactory};
//!
//! let host = Arc::new(MemoryHost::new("Golf", "car").with_settings(settings));
//! let factory = Arc::new(MockClientFactory::new());
//! factory.client().set_snapshot(snapshot);
//! ```

use std::collections::{BTreeMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::RwLock;
use serde_json::Value;
use vehsync_core::{
    CapabilityValue, ClientError, ClientFactory, ClientOptions, ClientResult, DeviceSettings,
    GeoPoint, HostDevice, HostError, HostResult, StateChange, StatePath, TelemetrySnapshot,
    VehicleClient,
};

// =============================================================================
// Host
// =============================================================================

/// Availability as last reported to the host
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Availability {
    Available,
    Unavailable(String),
}

/// Host device that keeps everything in memory
pub struct MemoryHost {
    name: String,
    driver_id: String,
    driver_capabilities: Vec<String>,
    settings: RwLock<DeviceSettings>,
    settings_writes: RwLock<Vec<DeviceSettings>>,
    store: RwLock<BTreeMap<String, Value>>,
    capabilities: RwLock<Vec<String>>,
    values: RwLock<BTreeMap<String, CapabilityValue>>,
    listeners: RwLock<Vec<String>>,
    availability: RwLock<Vec<Availability>>,
    home: RwLock<GeoPoint>,
    flows: RwLock<Vec<(String, Value)>>,
    rejected: RwLock<HashSet<String>>,
}

impl MemoryHost {
    pub fn new(name: impl Into<String>, driver_id: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            driver_id: driver_id.into(),
            driver_capabilities: Vec::new(),
            settings: RwLock::new(DeviceSettings::default()),
            settings_writes: RwLock::new(Vec::new()),
            store: RwLock::new(BTreeMap::new()),
            capabilities: RwLock::new(Vec::new()),
            values: RwLock::new(BTreeMap::new()),
            listeners: RwLock::new(Vec::new()),
            availability: RwLock::new(Vec::new()),
            home: RwLock::new(GeoPoint::default()),
            flows: RwLock::new(Vec::new()),
            rejected: RwLock::new(HashSet::new()),
        }
    }

    pub fn with_driver_capabilities<I, S>(mut self, capabilities: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.driver_capabilities = capabilities.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_settings(self, settings: DeviceSettings) -> Self {
        *self.settings.write() = settings;
        self
    }

    pub fn with_home(self, home: GeoPoint) -> Self {
        *self.home.write() = home;
        self
    }

    pub fn with_capabilities<I, S>(self, capabilities: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        *self.capabilities.write() = capabilities.into_iter().map(Into::into).collect();
        self
    }

    /// Make `add_capability` / `set_capability_value` fail for `name`
    pub fn reject_capability(&self, name: &str) {
        self.rejected.write().insert(name.to_string());
    }

    /// Replace settings without recording a write
    pub fn replace_settings(&self, settings: DeviceSettings) {
        *self.settings.write() = settings;
    }

    pub fn insert_store_value(&self, key: &str, value: Value) {
        self.store.write().insert(key.to_string(), value);
    }

    /// Settings records written through [`HostDevice::set_settings`]
    pub fn settings_writes(&self) -> Vec<DeviceSettings> {
        self.settings_writes.read().clone()
    }

    pub fn listeners(&self) -> Vec<String> {
        self.listeners.read().clone()
    }

    pub fn availability_history(&self) -> Vec<Availability> {
        self.availability.read().clone()
    }

    /// Flow triggers fired so far, as `(card, tokens)`
    pub fn flows(&self) -> Vec<(String, Value)> {
        self.flows.read().clone()
    }

    pub fn values(&self) -> BTreeMap<String, CapabilityValue> {
        self.values.read().clone()
    }
}

#[async_trait]
impl HostDevice for MemoryHost {
    fn name(&self) -> String {
        self.name.clone()
    }

    fn driver_id(&self) -> String {
        self.driver_id.clone()
    }

    fn driver_capabilities(&self) -> Vec<String> {
        self.driver_capabilities.clone()
    }

    fn settings(&self) -> DeviceSettings {
        self.settings.read().clone()
    }

    async fn set_settings(&self, settings: DeviceSettings) -> HostResult<()> {
        self.settings_writes.write().push(settings.clone());
        *self.settings.write() = settings;
        Ok(())
    }

    fn store_value(&self, key: &str) -> Option<Value> {
        self.store.read().get(key).cloned()
    }

    async fn set_store_value(&self, key: &str, value: Value) -> HostResult<()> {
        self.store.write().insert(key.to_string(), value);
        Ok(())
    }

    fn capabilities(&self) -> Vec<String> {
        self.capabilities.read().clone()
    }

    async fn add_capability(&self, name: &str) -> HostResult<()> {
        if self.rejected.read().contains(name) {
            return Err(HostError::CapabilityRejected(name.to_string()));
        }
        let mut capabilities = self.capabilities.write();
        if !capabilities.iter().any(|c| c == name) {
            capabilities.push(name.to_string());
        }
        Ok(())
    }

    async fn remove_capability(&self, name: &str) -> HostResult<()> {
        let mut capabilities = self.capabilities.write();
        let before = capabilities.len();
        capabilities.retain(|c| c != name);
        if capabilities.len() == before {
            return Err(HostError::CapabilityNotFound(name.to_string()));
        }
        self.values.write().remove(name);
        Ok(())
    }

    fn capability_value(&self, name: &str) -> Option<CapabilityValue> {
        self.values.read().get(name).cloned()
    }

    async fn set_capability_value(&self, name: &str, value: CapabilityValue) -> HostResult<()> {
        if self.rejected.read().contains(name) {
            return Err(HostError::CapabilityRejected(name.to_string()));
        }
        if !self.capabilities.read().iter().any(|c| c == name) {
            return Err(HostError::CapabilityNotFound(name.to_string()));
        }
        self.values.write().insert(name.to_string(), value);
        Ok(())
    }

    async fn register_capability_listener(&self, names: Vec<String>) -> HostResult<()> {
        *self.listeners.write() = names;
        Ok(())
    }

    fn is_available(&self) -> bool {
        matches!(self.availability.read().last(), Some(Availability::Available))
    }

    async fn set_available(&self) -> HostResult<()> {
        self.availability.write().push(Availability::Available);
        Ok(())
    }

    async fn set_unavailable(&self, reason: &str) -> HostResult<()> {
        self.availability
            .write()
            .push(Availability::Unavailable(reason.to_string()));
        Ok(())
    }

    fn home_location(&self) -> GeoPoint {
        *self.home.read()
    }

    async fn trigger_flow(&self, card: &str, tokens: Value) -> HostResult<()> {
        self.flows.write().push((card.to_string(), tokens));
        Ok(())
    }
}

// =============================================================================
// Backend client
// =============================================================================

/// A call received by [`MockVehicleClient`]
#[derive(Debug, Clone, PartialEq)]
pub enum ClientCall {
    WaitReady,
    Unload,
    SetState { path: String, change: StateChange },
    RequestStatusUpdate(String),
    UpdateStatus(String),
    RefreshToken(bool),
}

/// Scripted backend client that records every call
#[derive(Default)]
pub struct MockVehicleClient {
    calls: RwLock<Vec<ClientCall>>,
    snapshot: RwLock<TelemetrySnapshot>,
    rejected_paths: RwLock<HashSet<String>>,
    fail_ready: AtomicBool,
    fail_status_request: AtomicBool,
    fail_update: AtomicBool,
    fail_refresh_token: AtomicBool,
}

impl MockVehicleClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_snapshot(&self, snapshot: TelemetrySnapshot) {
        *self.snapshot.write() = snapshot;
    }

    /// Reject state changes to this full path
    pub fn reject_path(&self, path: &str) {
        self.rejected_paths.write().insert(path.to_string());
    }

    pub fn fail_ready(&self, fail: bool) {
        self.fail_ready.store(fail, Ordering::SeqCst);
    }

    pub fn fail_status_request(&self, fail: bool) {
        self.fail_status_request.store(fail, Ordering::SeqCst);
    }

    pub fn fail_update(&self, fail: bool) {
        self.fail_update.store(fail, Ordering::SeqCst);
    }

    pub fn fail_refresh_token(&self, fail: bool) {
        self.fail_refresh_token.store(fail, Ordering::SeqCst);
    }

    pub fn calls(&self) -> Vec<ClientCall> {
        self.calls.read().clone()
    }

    pub fn clear_calls(&self) {
        self.calls.write().clear();
    }

    /// State changes sent so far, as `(path, change)`
    pub fn state_changes(&self) -> Vec<(String, StateChange)> {
        self.calls
            .read()
            .iter()
            .filter_map(|call| match call {
                ClientCall::SetState { path, change } => Some((path.clone(), change.clone())),
                _ => None,
            })
            .collect()
    }

    /// Number of recorded calls matching `pred`
    pub fn count(&self, pred: impl Fn(&ClientCall) -> bool) -> usize {
        self.calls.read().iter().filter(|c| pred(c)).count()
    }

    fn record(&self, call: ClientCall) {
        self.calls.write().push(call);
    }
}

#[async_trait]
impl VehicleClient for MockVehicleClient {
    async fn wait_ready(&self) -> ClientResult<()> {
        self.record(ClientCall::WaitReady);
        if self.fail_ready.load(Ordering::SeqCst) {
            return Err(ClientError::Auth("login rejected".into()));
        }
        Ok(())
    }

    async fn unload(&self) -> ClientResult<()> {
        self.record(ClientCall::Unload);
        Ok(())
    }

    async fn set_state(&self, path: &StatePath, change: StateChange) -> ClientResult<()> {
        let path = path.to_string();
        self.record(ClientCall::SetState {
            path: path.clone(),
            change,
        });
        if self.rejected_paths.read().contains(&path) {
            return Err(ClientError::Rejected(path));
        }
        Ok(())
    }

    async fn request_status_update(&self, vin: &str) -> ClientResult<()> {
        self.record(ClientCall::RequestStatusUpdate(vin.to_string()));
        if self.fail_status_request.load(Ordering::SeqCst) {
            return Err(ClientError::Transport("vehicle asleep".into()));
        }
        Ok(())
    }

    async fn update_status(&self, reason: &str) -> ClientResult<()> {
        self.record(ClientCall::UpdateStatus(reason.to_string()));
        if self.fail_update.load(Ordering::SeqCst) {
            return Err(ClientError::Transport("status fetch failed".into()));
        }
        Ok(())
    }

    fn state(&self) -> TelemetrySnapshot {
        self.snapshot.read().clone()
    }

    async fn refresh_token(&self, force: bool) -> ClientResult<()> {
        self.record(ClientCall::RefreshToken(force));
        if self.fail_refresh_token.load(Ordering::SeqCst) {
            return Err(ClientError::Auth("refresh token expired".into()));
        }
        Ok(())
    }
}

/// Factory that hands out one shared [`MockVehicleClient`]
pub struct MockClientFactory {
    client: Arc<MockVehicleClient>,
    connects: RwLock<Vec<ClientOptions>>,
    fail_connect: AtomicBool,
}

impl Default for MockClientFactory {
    fn default() -> Self {
        Self::new()
    }
}

impl MockClientFactory {
    pub fn new() -> Self {
        Self::with_client(Arc::new(MockVehicleClient::new()))
    }

    pub fn with_client(client: Arc<MockVehicleClient>) -> Self {
        Self {
            client,
            connects: RwLock::new(Vec::new()),
            fail_connect: AtomicBool::new(false),
        }
    }

    pub fn client(&self) -> Arc<MockVehicleClient> {
        self.client.clone()
    }

    pub fn fail_connect(&self, fail: bool) {
        self.fail_connect.store(fail, Ordering::SeqCst);
    }

    pub fn connect_count(&self) -> usize {
        self.connects.read().len()
    }

    pub fn last_options(&self) -> Option<ClientOptions> {
        self.connects.read().last().cloned()
    }

    /// Report an error line the way a live client would
    pub fn emit_error(&self, line: &str) -> bool {
        self.last_options()
            .map(|options| options.errors.send(line.to_string()).is_ok())
            .unwrap_or(false)
    }
}

#[async_trait]
impl ClientFactory for MockClientFactory {
    async fn connect(&self, options: ClientOptions) -> ClientResult<Arc<dyn VehicleClient>> {
        self.connects.write().push(options);
        if self.fail_connect.load(Ordering::SeqCst) {
            return Err(ClientError::Transport("backend unreachable".into()));
        }
        Ok(self.client.clone())
    }
}
