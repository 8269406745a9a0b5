//! Integration tests for VehicleDevice
//!
//! Run with: cargo test -p vehsync-engine --test device_test

use std::sync::Arc;
use std::time::Duration;

use secrecy::{ExposeSecret as _, SecretString};
use serde_json::json;
use tokio_test::{assert_err, assert_ok};
use vehsync_core::{CapabilityValue, GeoPoint, HostDevice, TelemetrySnapshot};
use vehsync_engine::testing::{Availability, ClientCall, MemoryHost, MockClientFactory, MockVehicleClient};
use vehsync_engine::{
    CommandBatch, DeviceSettings, EngineConfig, EngineTimings, LifecycleState, SecretCipher,
    SyncError, VehicleDevice, XorHexCipher,
};

const VIN: &str = "WVWZZZE1ZMP000001";

// =============================================================================
// Fixture
// =============================================================================

struct Fixture {
    host: Arc<MemoryHost>,
    factory: Arc<MockClientFactory>,
    cipher: Arc<XorHexCipher>,
    device: VehicleDevice,
}

impl Fixture {
    fn new(vehicle_type: &str, pin: &str) -> Self {
        Self::with_timings(vehicle_type, pin, EngineTimings::immediate())
    }

    fn with_timings(vehicle_type: &str, pin: &str, timings: EngineTimings) -> Self {
        let cipher = Arc::new(XorHexCipher::new("fixture-key"));
        let settings = settings(&cipher, vehicle_type, pin);

        let host = Arc::new(
            MemoryHost::new("Test Car", "car")
                .with_driver_capabilities(["locked", "remote_force_refresh", "measure_battery"])
                .with_home(GeoPoint::new(52.0, 13.0))
                .with_settings(settings),
        );

        let factory = Arc::new(MockClientFactory::new());
        factory.client().set_snapshot(snapshot(80, "connected", 52_000_000));

        let config = EngineConfig {
            timings,
            ..Default::default()
        };
        let map = Arc::new(config.load_capability_map().unwrap());
        let device = VehicleDevice::new(host.clone(), factory.clone(), cipher.clone(), map, config);

        Self {
            host,
            factory,
            cipher,
            device,
        }
    }

    fn client(&self) -> Arc<MockVehicleClient> {
        self.factory.client()
    }

    fn value(&self, name: &str) -> Option<CapabilityValue> {
        self.host.capability_value(name)
    }

    fn write(&self, entries: &[(&str, CapabilityValue)]) -> CommandBatch {
        entries
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }
}

fn settings(cipher: &XorHexCipher, vehicle_type: &str, pin: &str) -> DeviceSettings {
    let mut settings = DeviceSettings {
        vin: VIN.into(),
        vehicle_type: vehicle_type.into(),
        pin: pin.into(),
        update_interval: 10,
        username: "driver@example.com".into(),
        password: cipher.encrypt(&SecretString::from("hunter2")).unwrap(),
        ..Default::default()
    };
    settings.extra.insert("remote_flash".into(), json!(true));
    settings.extra.insert("measure_tyre_pressure".into(), json!(false));
    settings
}

fn snapshot(soc: i64, plug: &str, lat: i64) -> TelemetrySnapshot {
    TelemetrySnapshot::from_flat([
        (format!("{VIN}.status.batteryStatus.currentSOC_pct"), json!(soc)),
        (format!("{VIN}.status.batteryStatus.cruisingRangeElectric_km"), json!(312)),
        (format!("{VIN}.status.plugStatus.plugConnectionState"), json!(plug)),
        (format!("{VIN}.parkingposition.lat"), json!(lat)),
        (format!("{VIN}.parkingposition.lon"), json!(13_000_000)),
    ])
}

/// Normal refreshes hold the cycle for 10 s, everything else is immediate
fn slow_normal_update() -> EngineTimings {
    EngineTimings {
        normal_update_settle_ms: 10_000,
        ..EngineTimings::immediate()
    }
}

async fn settle_tasks() {
    for _ in 0..20 {
        tokio::task::yield_now().await;
    }
}

// =============================================================================
// Bootstrap
// =============================================================================

#[tokio::test]
async fn test_init_bootstraps_client_and_maps_state() {
    let fx = Fixture::new("id", "");
    fx.device.init().await;

    assert!(fx.host.is_available());
    assert_eq!(
        fx.host.availability_history().first(),
        Some(&Availability::Unavailable("Starting... - Test Car".into()))
    );

    let capabilities = fx.host.capabilities();
    for name in ["locked", "remote_force_refresh", "measure_battery", "is_home", "remote_flash"] {
        assert!(capabilities.contains(&name.to_string()), "missing {name}");
    }
    assert!(!capabilities.contains(&"measure_tyre_pressure".to_string()));

    let listeners = fx.host.listeners();
    assert!(listeners.contains(&"locked".to_string()));
    assert!(listeners.contains(&"target_temperature".to_string()));
    assert!(!listeners.contains(&"measure_battery".to_string()));

    assert_eq!(fx.value("measure_battery"), Some(CapabilityValue::Number(80.0)));
    assert_eq!(fx.value("measure_range"), Some(CapabilityValue::Number(312.0)));
    assert_eq!(fx.value("is_plug_connected"), Some(CapabilityValue::Bool(true)));
    assert_eq!(fx.value("is_home"), Some(CapabilityValue::Bool(true)));

    assert_eq!(
        fx.client().calls(),
        vec![
            ClientCall::WaitReady,
            ClientCall::Unload,
            ClientCall::RequestStatusUpdate(VIN.into()),
            ClientCall::UpdateStatus("force".into()),
            ClientCall::Unload,
        ]
    );

    let status = fx.device.status().await;
    assert_eq!(status.state, LifecycleState::Ready);
    assert!(status.polling);
    assert_eq!(status.force_update, 0);
    assert!(!status.should_restart);
    assert!(status.last_cycle.is_some());
}

#[tokio::test]
async fn test_events_fire_only_on_change() {
    let fx = Fixture::new("id", "");
    fx.device.init().await;

    let flows = fx.host.flows();
    assert!(flows.contains(&(
        "is_plug_connected_changed".to_string(),
        json!({ "is_plug_connected": true })
    )));
    assert!(flows.contains(&("is_home_changed".to_string(), json!({ "is_home": true }))));
    let fired = flows.len();

    // Same state again: nothing changes
    fx.device.normalize(false).await.unwrap();
    assert_eq!(fx.host.flows().len(), fired);

    // Unplugged and parked away from home
    fx.client().set_snapshot(snapshot(79, "Disconnected", 48_000_000));
    fx.device.normalize(false).await.unwrap();

    let flows = fx.host.flows();
    assert_eq!(flows.len(), fired + 2);
    assert!(flows.contains(&(
        "is_plug_connected_changed".to_string(),
        json!({ "is_plug_connected": false })
    )));
    assert_eq!(fx.value("is_home"), Some(CapabilityValue::Bool(false)));
}

#[tokio::test]
async fn test_connect_failure_leaves_device_unavailable() {
    let fx = Fixture::new("id", "");
    fx.factory.fail_connect(true);
    fx.device.init().await;

    assert!(!fx.host.is_available());
    let status = fx.device.status().await;
    assert_eq!(status.state, LifecycleState::Uninitialized);
    assert!(!status.polling);
    assert!(status.last_error.unwrap().contains("Connection"));

    // No automatic retry
    settle_tasks().await;
    assert_eq!(fx.factory.connect_count(), 1);
}

#[tokio::test]
async fn test_invalid_settings_never_reach_the_backend() {
    let fx = Fixture::new("tesla", "");
    fx.device.init().await;

    assert!(!fx.host.is_available());
    assert_eq!(fx.factory.connect_count(), 0);
}

#[tokio::test]
async fn test_missing_status_skips_mapping() {
    let fx = Fixture::new("id", "");
    fx.client().set_snapshot(TelemetrySnapshot::from_flat([(
        format!("{VIN}.parkingposition.lat"),
        json!(52_000_000),
    )]));
    fx.device.init().await;

    assert!(fx.host.is_available());
    assert!(fx.host.values().is_empty());
}

// =============================================================================
// Polling
// =============================================================================

#[tokio::test(start_paused = true)]
async fn test_polling_advances_counter_then_escalates() {
    let fx = Fixture::new("id", "");
    fx.device.init().await;
    let period = Duration::from_secs(600);

    // First tick one period after start
    tokio::time::sleep(period - Duration::from_secs(1)).await;
    assert_eq!(fx.device.store().force_update(), 0);

    tokio::time::sleep(Duration::from_secs(2)).await;
    assert_eq!(fx.device.store().force_update(), 10);

    tokio::time::sleep(period * 2).await;
    assert_eq!(fx.device.store().force_update(), 30);
    assert_eq!(
        fx.client()
            .count(|c| *c == ClientCall::UpdateStatus("normal".into())),
        3
    );

    fx.device.store().set_force_update(350).await.unwrap();
    tokio::time::sleep(period).await;
    assert_eq!(fx.device.store().force_update(), 360);

    tokio::time::sleep(period).await;
    assert_eq!(fx.device.store().force_update(), 0);
    assert_eq!(
        fx.client()
            .count(|c| *c == ClientCall::UpdateStatus("force".into())),
        2
    );
}

#[tokio::test(start_paused = true)]
async fn test_failed_tick_keeps_timer_running() {
    let fx = Fixture::new("id", "");
    fx.device.init().await;

    fx.client().fail_update(true);
    tokio::time::sleep(Duration::from_secs(601)).await;
    assert_eq!(fx.device.store().force_update(), 0);
    assert!(fx.device.status().await.last_error.is_some());

    fx.client().fail_update(false);
    tokio::time::sleep(Duration::from_secs(600)).await;
    assert_eq!(fx.device.store().force_update(), 10);
    assert!(fx.device.status().await.polling);
}

#[tokio::test(start_paused = true)]
async fn test_tick_during_cycle_is_skipped() {
    let fx = Fixture::with_timings("id", "", slow_normal_update());
    fx.device.init().await;
    fx.client().clear_calls();

    // The first tick is now waiting out its settle delay
    tokio::time::sleep(Duration::from_secs(601)).await;
    assert!(fx.device.normalize(false).await.is_none());

    tokio::time::sleep(Duration::from_secs(20)).await;
    assert_eq!(
        fx.client()
            .count(|c| *c == ClientCall::UpdateStatus("normal".into())),
        1
    );
    assert_eq!(fx.device.store().force_update(), 10);
}

#[tokio::test(start_paused = true)]
async fn test_bootstrap_waits_for_in_flight_cycle() {
    let fx = Fixture::with_timings("id", "", slow_normal_update());
    fx.device.init().await;
    fx.client().clear_calls();

    tokio::time::sleep(Duration::from_secs(601)).await;

    let device = fx.device.clone();
    let settings = fx.host.settings();
    let bootstrap = tokio::spawn(async move { device.bootstrap(&settings).await });
    settle_tasks().await;
    assert_eq!(fx.factory.connect_count(), 1);

    assert_ok!(bootstrap.await.unwrap());
    assert_eq!(fx.factory.connect_count(), 2);

    let calls = fx.client().calls();
    let tick = calls
        .iter()
        .position(|c| *c == ClientCall::UpdateStatus("normal".into()))
        .unwrap();
    let rebootstrap = calls
        .iter()
        .position(|c| *c == ClientCall::UpdateStatus("force".into()))
        .unwrap();
    assert!(tick < rebootstrap);
    assert_eq!(fx.device.store().force_update(), 0);
    assert!(fx.host.is_available());
}

#[tokio::test(start_paused = true)]
async fn test_results_dropped_when_device_goes_unavailable() {
    let fx = Fixture::with_timings("id", "", slow_normal_update());
    fx.device.init().await;
    assert_eq!(fx.value("measure_battery"), Some(CapabilityValue::Number(80.0)));

    tokio::time::sleep(Duration::from_secs(601)).await;
    fx.host.set_unavailable("maintenance").await.unwrap();
    fx.client().set_snapshot(snapshot(42, "disconnected", 52_000_000));

    tokio::time::sleep(Duration::from_secs(20)).await;
    assert!(!fx.host.is_available());
    assert_eq!(fx.value("measure_battery"), Some(CapabilityValue::Number(80.0)));
    assert_eq!(fx.value("is_plug_connected"), Some(CapabilityValue::Bool(true)));
    // The backend was still polled
    assert_eq!(fx.device.store().force_update(), 10);
    assert!(fx.device.status().await.polling);
}

// =============================================================================
// Commands
// =============================================================================

#[tokio::test]
async fn test_legacy_without_pin_is_refused() {
    let fx = Fixture::new("legacy", "");
    fx.device.init().await;
    fx.client().clear_calls();

    let err = assert_err!(
        fx.device
            .on_capability_write(fx.write(&[("locked", true.into())]))
            .await
    );

    assert!(matches!(err, SyncError::Authorization(_)));
    assert!(fx.client().calls().is_empty());
}

#[tokio::test]
async fn test_legacy_with_pin_routes_legacy_paths() {
    let fx = Fixture::new("legacy", "1234");
    fx.device.init().await;

    let outcome = assert_ok!(
        fx.device
            .on_capability_write(fx.write(&[
                ("remote_battery_charge", true.into()),
                ("target_temperature", 21.0.into()),
            ]))
            .await
    );

    assert_eq!(
        outcome.issued,
        vec![
            format!("vw-connect.0.{VIN}.remote.batterycharge"),
            format!("vw-connect.0.{VIN}.remote.climatisationTemperature"),
        ]
    );
}

#[tokio::test]
async fn test_one_shot_commands_reset() {
    let fx = Fixture::new("id", "");
    fx.device.init().await;

    fx.host
        .set_capability_value("remote_flash", true.into())
        .await
        .unwrap();
    fx.device
        .on_capability_write(fx.write(&[("remote_flash", true.into())]))
        .await
        .unwrap();
    settle_tasks().await;

    assert_eq!(fx.value("remote_flash"), Some(CapabilityValue::Bool(false)));
    assert_eq!(
        fx.client().state_changes().last().map(|(path, _)| path.clone()),
        Some(format!("vw-connect.0.{VIN}.remote.flash"))
    );
}

#[tokio::test]
async fn test_force_refresh_runs_forced_pass() {
    let fx = Fixture::new("id", "");
    fx.device.init().await;
    fx.device.store().set_force_update(120).await.unwrap();
    fx.client().clear_calls();

    let outcome = fx
        .device
        .on_capability_write(fx.write(&[("remote_force_refresh", true.into())]))
        .await
        .unwrap();
    assert!(outcome.force_refresh);
    settle_tasks().await;

    assert_eq!(
        fx.client()
            .count(|c| matches!(c, ClientCall::RequestStatusUpdate(_))),
        1
    );
    assert!(fx.client().state_changes().is_empty());
    assert_eq!(fx.device.store().force_update(), 0);
    assert_eq!(
        fx.value("remote_force_refresh"),
        Some(CapabilityValue::Bool(false))
    );
}

#[tokio::test(start_paused = true)]
async fn test_force_refresh_waits_for_in_flight_tick() {
    let fx = Fixture::with_timings("id", "", slow_normal_update());
    fx.device.init().await;
    fx.client().clear_calls();

    tokio::time::sleep(Duration::from_secs(601)).await;
    let outcome = assert_ok!(
        fx.device
            .on_capability_write(fx.write(&[("remote_force_refresh", true.into())]))
            .await
    );
    assert!(outcome.force_refresh);

    tokio::time::sleep(Duration::from_secs(60)).await;
    let calls = fx.client().calls();
    assert_eq!(
        calls
            .iter()
            .filter(|c| **c == ClientCall::UpdateStatus("force".into()))
            .count(),
        1
    );
    assert_eq!(
        calls
            .iter()
            .filter(|c| matches!(c, ClientCall::RequestStatusUpdate(_)))
            .count(),
        1
    );
    // The forced pass ran after the tick it waited for
    assert_eq!(
        calls
            .iter()
            .filter(|c| matches!(c, ClientCall::UpdateStatus(_)))
            .last(),
        Some(&ClientCall::UpdateStatus("force".into()))
    );
    assert_eq!(fx.device.store().force_update(), 0);
}

// =============================================================================
// Recovery
// =============================================================================

#[tokio::test]
async fn test_restart_signals_cause_exactly_one_restart() {
    let fx = Fixture::new("id", "");
    fx.device.init().await;
    assert_eq!(fx.factory.connect_count(), 1);

    assert!(fx.factory.emit_error("Too many errors. Restart adapter in 10min"));
    assert!(fx.factory.emit_error("Too many errors. Restart adapter in 10min"));
    settle_tasks().await;
    assert!(fx.device.store().should_restart());

    // The next tick recreates the client instead of polling
    assert!(fx.device.normalize(false).await.is_none());
    assert_eq!(fx.factory.connect_count(), 2);
    assert!(!fx.device.store().should_restart());
    assert!(fx.host.is_available());

    fx.device.normalize(false).await.unwrap();
    assert_eq!(fx.factory.connect_count(), 2);
}

#[tokio::test]
async fn test_token_expiry_refreshes_token() {
    let fx = Fixture::new("id", "");
    fx.device.init().await;

    fx.factory.emit_error("Error: Refresh Token in 10min");
    fx.factory.emit_error("Some unrelated warning");
    settle_tasks().await;

    assert_eq!(
        fx.client()
            .count(|c| *c == ClientCall::RefreshToken(true)),
        1
    );
    assert!(!fx.device.store().should_restart());
}

#[tokio::test]
async fn test_signals_ignored_while_unavailable() {
    let fx = Fixture::new("id", "");
    fx.device.init().await;
    fx.host.set_unavailable("maintenance").await.unwrap();

    assert!(fx
        .device
        .handle_error_signal("Restart adapter in 5min")
        .await
        .is_none());
    assert!(!fx.device.store().should_restart());
}

// =============================================================================
// Settings and teardown
// =============================================================================

#[tokio::test]
async fn test_unchanged_settings_are_a_no_op() {
    let fx = Fixture::new("id", "");
    fx.device.init().await;

    let current = fx.host.settings();
    fx.device.on_settings(&current, &current, &[]).await.unwrap();
    assert_eq!(fx.factory.connect_count(), 1);
}

#[tokio::test]
async fn test_settings_change_recreates_client() {
    let fx = Fixture::new("id", "");
    fx.device.init().await;

    let old = fx.host.settings();
    let mut new = old.clone();
    new.update_interval = 5;
    new.password = "n3w-pass".into();
    new.extra.insert("measure_tyre_pressure".into(), json!(true));
    fx.host.replace_settings(new.clone());

    let changed = new.changed_keys(&old);
    assert_ok!(fx.device.on_settings(&old, &new, &changed).await);
    settle_tasks().await;

    assert_eq!(fx.factory.connect_count(), 2);
    let options = fx.factory.last_options().unwrap();
    assert_eq!(options.interval_minutes, 5);
    assert_eq!(options.password.expose_secret(), "n3w-pass");

    assert!(fx
        .host
        .capabilities()
        .contains(&"measure_tyre_pressure".to_string()));

    let saved = fx.host.settings_writes();
    assert_eq!(saved.len(), 1);
    assert_ne!(saved[0].password, "n3w-pass");
    assert_eq!(
        fx.cipher.decrypt(&saved[0].password).unwrap().expose_secret(),
        "n3w-pass"
    );
    assert!(fx.device.status().await.polling);
}

#[tokio::test]
async fn test_deleted_device_stops_polling() {
    let fx = Fixture::new("id", "");
    fx.device.init().await;
    assert!(fx.device.status().await.polling);

    fx.device.on_deleted().await;
    let status = fx.device.status().await;
    assert!(!status.polling);
    assert_eq!(status.state, LifecycleState::Uninitialized);
    assert!(fx.device.normalize(false).await.is_none());
}
