//! vehsync-sim - Vehicle sync simulator
//!
//! Runs one vehicle device through the full synchronization engine against
//! an in-memory host and a scripted backend client.
//!
//! Usage:
//!   vehsync-sim [OPTIONS] [sim.toml]
//!
//! Options:
//!   --log-json   Emit logs as JSON lines
//!
//! If no config file is provided, the bundled sample configuration is used.

mod config;

use std::sync::Arc;
use std::time::Duration;

use serde_json::json;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use vehsync_core::{HostDevice, TelemetrySnapshot};
use vehsync_engine::testing::{MemoryHost, MockClientFactory};
use vehsync_engine::{CommandBatch, ConfigResolver, VehicleDevice, XorHexCipher};

use crate::config::SimConfig;

const SAMPLE_CONFIG: &str = include_str!("../sim.toml");

/// Parsed command-line arguments
struct Args {
    /// Simulator config file (TOML)
    config_path: Option<String>,
    /// JSON log output
    log_json: bool,
}

fn parse_args() -> Args {
    let mut result = Args {
        config_path: None,
        log_json: false,
    };

    for arg in std::env::args().skip(1) {
        match arg.as_str() {
            "--log-json" => result.log_json = true,
            "--help" | "-h" => {
                print_help();
                std::process::exit(0);
            }
            arg if !arg.starts_with('-') => result.config_path = Some(arg.to_string()),
            _ => eprintln!("Unknown argument: {}", arg),
        }
    }

    result
}

fn print_help() {
    eprintln!(
        r#"vehsync-sim - Vehicle sync simulator

Usage: vehsync-sim [OPTIONS] [sim.toml]

Options:
      --log-json   Emit logs as JSON lines
  -h, --help       Print this help message

Examples:
  # Run the bundled sample vehicle
  vehsync-sim

  # Run with a config file and verbose engine logs
  RUST_LOG=vehsync_engine=debug vehsync-sim my-car.toml
"#
    );
}

fn init_logging(json: bool) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "vehsync_sim=info,vehsync_engine=info".into());
    let registry = tracing_subscriber::registry().with(filter);

    if json {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = parse_args();
    init_logging(args.log_json);

    tracing::info!("Starting vehsync-sim");

    let config = match &args.config_path {
        Some(path) => {
            tracing::info!("Loading config from: {}", path);
            SimConfig::from_file(path)?
        }
        None => {
            tracing::info!("No config file provided, using the bundled sample");
            SimConfig::from_toml(SAMPLE_CONFIG)?
        }
    };

    run(config).await
}

async fn run(config: SimConfig) -> anyhow::Result<()> {
    let cipher = Arc::new(XorHexCipher::new(config.cipher.key.clone()));

    // The host persists the password encrypted
    let mut settings = config.settings.clone();
    settings.password = ConfigResolver::new(cipher.clone())
        .encrypt_password(&config.settings.password)
        .map_err(|e| anyhow::anyhow!("Cannot encrypt password: {}", e))?;
    let vin = settings.vin.trim().to_string();

    let host = Arc::new(
        MemoryHost::new(&config.device.name, &config.device.driver)
            .with_driver_capabilities(config.device.capabilities.clone())
            .with_home(config.device.home)
            .with_settings(settings),
    );

    let factory = Arc::new(MockClientFactory::new());
    factory
        .client()
        .set_snapshot(TelemetrySnapshot::new(json!({ vin: config.telemetry })));

    let capability_map = config
        .engine
        .load_capability_map()
        .map_err(|e| anyhow::anyhow!("{}", e))?;
    tracing::info!(
        tables = capability_map.len(),
        name = ?capability_map.meta().name,
        "Capability map loaded"
    );

    let device = VehicleDevice::new(
        host.clone(),
        factory.clone(),
        cipher,
        Arc::new(capability_map),
        config.engine.clone(),
    );

    device.init().await;
    let status = device.status().await;
    tracing::info!(
        state = ?status.state,
        available = status.available,
        polling = status.polling,
        error = ?status.last_error,
        "Device initialized"
    );

    for command in config.commands {
        let device = device.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(command.after_secs)).await;
            let mut batch = CommandBatch::new();
            batch.insert(command.capability.clone(), command.value);
            match device.on_capability_write(batch).await {
                Ok(outcome) => tracing::info!(
                    capability = %command.capability,
                    issued = ?outcome.issued,
                    force_refresh = outcome.force_refresh,
                    "Scripted command done"
                ),
                Err(e) => tracing::warn!(capability = %command.capability, error = %e, "Scripted command failed"),
            }
        });
    }

    for scripted in config.errors {
        let factory = factory.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(scripted.after_secs)).await;
            if !factory.emit_error(&scripted.line) {
                tracing::warn!(line = %scripted.line, "No live client to emit error from");
            }
        });
    }

    // Wait for Ctrl+C
    tokio::signal::ctrl_c().await?;
    tracing::info!("Shutting down...");

    device.on_deleted().await;

    let status = device.status().await;
    tracing::info!(
        force_update = status.force_update,
        should_restart = status.should_restart,
        last_cycle = ?status.last_cycle.map(|c| c.finished_at),
        "Final device status"
    );
    for name in host.capabilities() {
        if let Some(value) = host.capability_value(&name) {
            tracing::info!(capability = %name, %value, "Final value");
        }
    }

    Ok(())
}
