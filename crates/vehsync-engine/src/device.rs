//! Vehicle device - the per-device synchronization engine
//!
//! Ties the components together and exposes the host-facing entry points:
//! [`VehicleDevice::init`], [`VehicleDevice::on_settings`],
//! [`VehicleDevice::on_capability_write`] and [`VehicleDevice::on_deleted`].

use std::sync::{Arc, Weak};

use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};
use serde_json::json;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};
use vehsync_conv::{CapabilityMap, ConvError, StateMapper};
use vehsync_core::{
    changed_trigger, is_event_capability, CapabilityValue, ClientFactory, DeviceSettings,
    ErrorSink, HostDevice, SyncError, SyncResult, VehicleClient, VehicleType,
};

use crate::config::{settle, EngineConfig};
use crate::dispatcher::{CommandBatch, CommandDispatcher, DispatchOutcome, DispatchTarget};
use crate::lifecycle::{ClientLifecycle, LifecycleState};
use crate::reconciler::{desired_capabilities, CapabilityReconciler, ReconcileReport};
use crate::recovery::{RecoveryAction, RecoveryHandler, RecoverySignal};
use crate::resolver::{ConfigResolver, ResolvedConfig};
use crate::scheduler::{self, RefreshKind, RefreshPlan};
use crate::secret::SecretCipher;
use crate::store::DeviceStore;

/// Result of one normalization cycle
#[derive(Debug, Clone)]
pub struct CycleReport {
    pub kind: RefreshKind,
    /// `forceUpdate` after the cycle
    pub force_update: i64,
    /// Capability values pushed to the host
    pub values: usize,
    pub finished_at: DateTime<Utc>,
}

/// Point-in-time view of a device
#[derive(Debug, Clone)]
pub struct DeviceStatus {
    pub state: LifecycleState,
    pub available: bool,
    pub polling: bool,
    pub force_update: i64,
    pub should_restart: bool,
    pub last_cycle: Option<CycleReport>,
    pub last_error: Option<String>,
}

/// Synchronization engine for one paired vehicle
#[derive(Clone)]
pub struct VehicleDevice {
    inner: Arc<DeviceInner>,
}

struct DeviceInner {
    name: String,
    host: Arc<dyn HostDevice>,
    config: EngineConfig,
    capability_map: Arc<CapabilityMap>,
    resolver: ConfigResolver,
    lifecycle: ClientLifecycle,
    store: DeviceStore,
    reconciler: CapabilityReconciler,
    dispatcher: CommandDispatcher,
    recovery: RecoveryHandler,
    /// Held for the duration of a normalization cycle or bootstrap
    cycle_lock: tokio::sync::Mutex<()>,
    active: RwLock<Option<ResolvedConfig>>,
    errors_tx: ErrorSink,
    errors_rx: Mutex<Option<mpsc::UnboundedReceiver<String>>>,
    recovery_task: Mutex<Option<JoinHandle<()>>>,
    last_cycle: RwLock<Option<CycleReport>>,
    last_error: RwLock<Option<String>>,
}

impl Drop for DeviceInner {
    fn drop(&mut self) {
        if let Some(handle) = self.recovery_task.get_mut().take() {
            handle.abort();
        }
    }
}

impl VehicleDevice {
    pub fn new(
        host: Arc<dyn HostDevice>,
        factory: Arc<dyn ClientFactory>,
        cipher: Arc<dyn SecretCipher>,
        capability_map: Arc<CapabilityMap>,
        config: EngineConfig,
    ) -> Self {
        let timings = config.timings.clone();
        let store = DeviceStore::new(host.clone());
        let (errors_tx, errors_rx) = mpsc::unbounded_channel();

        let inner = DeviceInner {
            name: host.name(),
            resolver: ConfigResolver::new(cipher),
            lifecycle: ClientLifecycle::new(factory, timings.clone()),
            reconciler: CapabilityReconciler::new(host.clone(), timings.capability_settle()),
            dispatcher: CommandDispatcher::new(host.clone(), timings.one_shot_reset()),
            recovery: RecoveryHandler::new(store.clone()),
            store,
            host,
            config,
            capability_map,
            cycle_lock: tokio::sync::Mutex::new(()),
            active: RwLock::new(None),
            errors_tx,
            errors_rx: Mutex::new(Some(errors_rx)),
            recovery_task: Mutex::new(None),
            last_cycle: RwLock::new(None),
            last_error: RwLock::new(None),
        };

        Self {
            inner: Arc::new(inner),
        }
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    pub fn store(&self) -> &DeviceStore {
        &self.inner.store
    }

    // =========================================================================
    // Host entry points
    // =========================================================================

    /// Bring the device up: store, capabilities, backend client, polling
    pub async fn init(&self) {
        let inner = &self.inner;
        info!(device = %inner.name, "Initializing device");

        if let Err(e) = inner
            .host
            .set_unavailable(&format!("Starting... - {}", inner.name))
            .await
        {
            warn!(device = %inner.name, error = %e, "Could not mark device unavailable");
        }

        self.start_recovery_listener();

        if let Err(e) = inner.store.init().await {
            warn!(device = %inner.name, error = %e, "Store initialization failed");
        }

        let settings = inner.host.settings();
        if let Err(e) = self.reconcile(&settings).await {
            warn!(device = %inner.name, error = %e, "Capability reconciliation failed");
        }

        // Failures are logged and leave the device unavailable
        let _ = self.bootstrap(&settings).await;
    }

    /// Apply a settings change made on the host.
    ///
    /// `new` carries the password in plaintext when it was changed; it is
    /// encrypted for the new client and re-persisted after a short delay.
    pub async fn on_settings(
        &self,
        old: &DeviceSettings,
        new: &DeviceSettings,
        changed_keys: &[String],
    ) -> SyncResult<()> {
        let inner = &self.inner;
        debug!(device = %inner.name, ?old, ?new, ?changed_keys, "Settings changed");

        if changed_keys.is_empty() {
            return Ok(());
        }

        inner.lifecycle.stop_polling().await;

        if let Err(e) = self.reconcile(new).await {
            warn!(device = %inner.name, error = %e, "Capability reconciliation failed");
        }

        let mut effective = new.clone();
        if new.password != old.password {
            effective.password = inner.resolver.encrypt_password(&new.password)?;
            self.schedule_settings_save(effective.clone());
        }

        let _ = self.bootstrap(&effective).await;
        Ok(())
    }

    /// Handle one host write event on the command capabilities
    pub async fn on_capability_write(&self, batch: CommandBatch) -> SyncResult<DispatchOutcome> {
        let inner = &self.inner;
        info!(device = %inner.name, capabilities = ?batch.keys().collect::<Vec<_>>(), "Capability write");

        let settings = inner.host.settings();
        let vehicle_type: VehicleType = settings.vehicle_type.parse().map_err(SyncError::Config)?;
        let client = inner.lifecycle.client();
        let target = DispatchTarget {
            vin: settings.vin.trim(),
            vehicle_type,
            pin: &settings.pin,
        };

        let outcome = inner
            .dispatcher
            .dispatch(client.as_deref(), target, &batch)
            .await
            .inspect_err(|e| warn!(device = %inner.name, error = %e, "Dispatch failed"))?;

        if outcome.force_refresh {
            let device = self.clone();
            tokio::spawn(async move {
                device.normalize(true).await;
            });
        }

        Ok(outcome)
    }

    /// The host removed the device
    pub async fn on_deleted(&self) {
        let inner = &self.inner;
        info!(device = %inner.name, "Device deleted");

        if let Some(handle) = inner.recovery_task.lock().take() {
            handle.abort();
        }
        inner.lifecycle.dispose().await;
        *inner.active.write() = None;
    }

    // =========================================================================
    // Engine operations
    // =========================================================================

    /// Reconcile exposed capabilities against `settings`
    pub async fn reconcile(&self, settings: &DeviceSettings) -> SyncResult<ReconcileReport> {
        let inner = &self.inner;
        let vehicle_type: VehicleType = settings.vehicle_type.parse().map_err(SyncError::Config)?;

        let driver = inner.host.driver_capabilities();
        let mapped = inner
            .capability_map
            .capabilities(&inner.host.driver_id(), vehicle_type);
        let toggles = settings.enabled_toggles();
        let desired = desired_capabilities([&driver[..], &mapped[..], &toggles[..]]);

        Ok(inner.reconciler.reconcile(&desired).await?)
    }

    /// (Re)create the backend client from `settings` and start polling.
    ///
    /// Waits for an in-flight cycle to finish first.
    pub async fn bootstrap(&self, settings: &DeviceSettings) -> SyncResult<()> {
        let _cycle = self.inner.cycle_lock.lock().await;
        self.start_client(settings).await
    }

    /// Run one normalization cycle.
    ///
    /// A timer tick is skipped while another cycle is in flight. A forced
    /// cycle waits for it instead, then wakes the vehicle and resets
    /// `forceUpdate`.
    pub async fn normalize(&self, forced: bool) -> Option<CycleReport> {
        let _cycle = if forced {
            self.inner.cycle_lock.lock().await
        } else {
            match self.inner.cycle_lock.try_lock() {
                Ok(guard) => guard,
                Err(_) => {
                    debug!(device = %self.inner.name, "Cycle in flight, skipping tick");
                    return None;
                }
            }
        };
        self.cycle(forced).await
    }

    /// Feed one error line from the backend client
    pub async fn handle_error_signal(&self, line: &str) -> Option<RecoveryAction> {
        let inner = &self.inner;
        warn!(device = %inner.name, message = %line, "Backend client error");

        if !inner.host.is_available() {
            return None;
        }

        let signal = RecoverySignal::classify(line)?;
        match inner.recovery.handle(signal, inner.lifecycle.client()).await {
            Ok(action) => Some(action),
            Err(e) => {
                warn!(device = %inner.name, error = %e, "Recovery failed");
                None
            }
        }
    }

    pub async fn status(&self) -> DeviceStatus {
        let inner = &self.inner;
        let polling = inner.lifecycle.is_polling().await;
        DeviceStatus {
            state: inner.lifecycle.state(),
            available: inner.host.is_available(),
            polling,
            force_update: inner.store.force_update(),
            should_restart: inner.store.should_restart(),
            last_cycle: inner.last_cycle.read().clone(),
            last_error: inner.last_error.read().clone(),
        }
    }

    // =========================================================================
    // Internals
    // =========================================================================

    async fn cycle(&self, forced: bool) -> Option<CycleReport> {
        let inner = &self.inner;

        if !forced && inner.store.should_restart() {
            info!(device = %inner.name, "Restart pending, recreating backend client");
            inner.lifecycle.stop_polling().await;
            let settings = inner.host.settings();
            let _ = self.start_client(&settings).await;
            return None;
        }

        let client = inner.lifecycle.client();
        let config = inner.active.read().clone();
        let (Some(client), Some(config)) = (client, config) else {
            debug!(device = %inner.name, "No backend client, skipping cycle");
            return None;
        };

        let (kind, force_update) = match self.refresh(client.as_ref(), &config, forced).await {
            Ok(refreshed) => refreshed,
            Err(e) => {
                warn!(device = %inner.name, error = %e, "Normalization cycle failed");
                *inner.last_error.write() = Some(e.to_string());
                return None;
            }
        };

        // The host may have taken the device offline while the backend calls
        // were pending; it keeps that state and the fetched values are dropped
        if !inner.host.is_available() {
            info!(device = %inner.name, ?kind, "Device unavailable, discarding cycle results");
            return None;
        }

        Some(self.map_state(client.as_ref(), &config, kind, force_update).await)
    }

    async fn start_client(&self, settings: &DeviceSettings) -> SyncResult<()> {
        let inner = &self.inner;
        let result = self.try_start_client(settings).await;
        if let Err(e) = &result {
            error!(device = %inner.name, error = %e, "Backend client bootstrap failed");
            *inner.last_error.write() = Some(e.to_string());
            if let Err(e) = inner.host.set_unavailable(&e.to_string()).await {
                warn!(device = %inner.name, error = %e, "Could not mark device unavailable");
            }
        }
        result
    }

    async fn try_start_client(&self, settings: &DeviceSettings) -> SyncResult<()> {
        let inner = &self.inner;
        let config = inner.resolver.resolve(settings)?;
        debug!(device = %inner.name, ?config, "Resolved configuration");

        inner.lifecycle.stop_polling().await;
        *inner.active.write() = None;
        inner
            .host
            .set_unavailable(&format!("Connecting... - {}", inner.name))
            .await?;

        let client = inner
            .lifecycle
            .connect(config.client_options(inner.errors_tx.clone()))
            .await?;
        *inner.active.write() = Some(config.clone());
        inner.store.set_should_restart(false).await?;

        // Runs while the device is still marked "Connecting..."
        match self.refresh(client.as_ref(), &config, true).await {
            Ok((kind, force_update)) => {
                self.map_state(client.as_ref(), &config, kind, force_update)
                    .await;
            }
            Err(e) => warn!(device = %inner.name, error = %e, "Initial refresh failed"),
        }

        inner.host.set_available().await?;

        let handle = self.spawn_poller(config.interval_minutes);
        inner.lifecycle.set_poll_task(handle).await;
        info!(
            device = %inner.name,
            interval_minutes = config.interval_minutes,
            "Device ready, polling started"
        );
        Ok(())
    }

    async fn refresh(
        &self,
        client: &dyn VehicleClient,
        config: &ResolvedConfig,
        forced: bool,
    ) -> SyncResult<(RefreshKind, i64)> {
        let inner = &self.inner;
        scheduler::refresh(
            client,
            &inner.store,
            &inner.config.timings,
            RefreshPlan {
                vin: &config.vin,
                forced,
                interval_minutes: config.interval_minutes,
                threshold: inner.config.force_update_threshold,
            },
        )
        .await
    }

    /// Push the refreshed state and record the finished cycle
    async fn map_state(
        &self,
        client: &dyn VehicleClient,
        config: &ResolvedConfig,
        kind: RefreshKind,
        force_update: i64,
    ) -> CycleReport {
        let inner = &self.inner;
        let values = self.apply_state(client, config).await;

        let report = CycleReport {
            kind,
            force_update,
            values,
            finished_at: Utc::now(),
        };
        *inner.last_cycle.write() = Some(report.clone());
        *inner.last_error.write() = None;
        report
    }

    /// Map the client's current state and push it to the host
    async fn apply_state(&self, client: &dyn VehicleClient, config: &ResolvedConfig) -> usize {
        let inner = &self.inner;
        let driver = inner.host.driver_id();

        let Some(table) = inner.capability_map.resolve(&driver, config.vehicle_type) else {
            warn!(device = %inner.name, driver = %driver, vehicle_type = %config.vehicle_type, "No capability map");
            return 0;
        };

        let snapshot = client.state();
        if config.debug {
            debug!(device = %inner.name, telemetry = ?snapshot.vehicle(&config.vin), "Raw telemetry");
        }

        let mapper = StateMapper::new(table, config.vehicle_type, inner.host.home_location());
        let Some(outcome) = mapper.map_snapshot(&snapshot, &config.vin) else {
            debug!(device = %inner.name, "No status data yet");
            return 0;
        };

        for e in &outcome.errors {
            warn!(device = %inner.name, error = %mapping_error(e), "Skipped capability");
        }

        let mut pushed = 0;
        for (name, value) in outcome.values {
            if self.push_value(&name, value).await {
                pushed += 1;
            }
        }
        pushed
    }

    /// Set one capability value, announcing changes of event capabilities
    async fn push_value(&self, name: &str, value: CapabilityValue) -> bool {
        let inner = &self.inner;
        let previous = inner.host.capability_value(name);
        debug!(device = %inner.name, capability = %name, %value, "Set value");

        if let Err(e) = inner.host.set_capability_value(name, value.clone()).await {
            warn!(device = %inner.name, capability = %name, error = %e, "Set value failed");
            return false;
        }

        if let CapabilityValue::Bool(flag) = value {
            if is_event_capability(name) && previous != Some(value) {
                let card = changed_trigger(name);
                match inner.host.trigger_flow(&card, json!({ name: flag })).await {
                    Ok(()) => debug!(device = %inner.name, card = %card, flag, "Flow triggered"),
                    Err(e) => warn!(device = %inner.name, card = %card, error = %e, "Flow trigger failed"),
                }
            }
        }
        true
    }

    /// Start the repeating poll timer; each tick runs a cycle in its own task
    fn spawn_poller(&self, interval_minutes: u32) -> JoinHandle<()> {
        let period = self.inner.config.timings.poll_period(interval_minutes);
        let weak: Weak<DeviceInner> = Arc::downgrade(&self.inner);

        scheduler::spawn_ticker(period, move || match weak.upgrade() {
            Some(inner) => {
                let device = VehicleDevice { inner };
                tokio::spawn(async move {
                    device.normalize(false).await;
                });
                true
            }
            None => false,
        })
    }

    /// Start the listener for backend error lines, once
    fn start_recovery_listener(&self) {
        let Some(mut rx) = self.inner.errors_rx.lock().take() else {
            return;
        };
        let weak = Arc::downgrade(&self.inner);

        let handle = tokio::spawn(async move {
            while let Some(line) = rx.recv().await {
                let Some(inner) = weak.upgrade() else {
                    break;
                };
                VehicleDevice { inner }.handle_error_signal(&line).await;
            }
        });
        *self.inner.recovery_task.lock() = Some(handle);
    }

    fn schedule_settings_save(&self, settings: DeviceSettings) {
        let host = self.inner.host.clone();
        let name = self.inner.name.clone();
        let delay = self.inner.config.timings.settings_save_delay();

        tokio::spawn(async move {
            settle(delay).await;
            match host.set_settings(settings).await {
                Ok(()) => debug!(device = %name, "Settings saved with encrypted password"),
                Err(e) => warn!(device = %name, error = %e, "Saving settings failed"),
            }
        });
    }
}

fn mapping_error(e: &ConvError) -> SyncError {
    SyncError::Mapping {
        capability: e.capability().unwrap_or("<map>").to_string(),
        message: e.to_string(),
    }
}
