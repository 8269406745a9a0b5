//! Command dispatcher - capability writes → backend state changes

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, warn};
use vehsync_core::routing::route;
use vehsync_core::{
    CapabilityValue, Command, CommandFailure, HostDevice, Route, StateChange, SyncError,
    SyncResult, VehicleClient, VehicleType,
};

use crate::config::settle;

/// One write event from the host: capability → new value
pub type CommandBatch = BTreeMap<String, CapabilityValue>;

/// Who the batch is for
#[derive(Debug, Clone, Copy)]
pub struct DispatchTarget<'a> {
    pub vin: &'a str,
    pub vehicle_type: VehicleType,
    pub pin: &'a str,
}

/// What a successful dispatch did
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DispatchOutcome {
    /// Backend paths that accepted a state change
    pub issued: Vec<String>,
    /// The batch asked for a forced refresh
    pub force_refresh: bool,
}

/// Remote commands for types that require a PIN are refused without one
pub fn authorize(vehicle_type: VehicleType, pin: &str) -> SyncResult<()> {
    if vehicle_type.is_pin_exempt() || !pin.is_empty() {
        Ok(())
    } else {
        Err(SyncError::Authorization("security code missing".into()))
    }
}

pub struct CommandDispatcher {
    host: Arc<dyn HostDevice>,
    one_shot_reset: Duration,
}

impl CommandDispatcher {
    pub fn new(host: Arc<dyn HostDevice>, one_shot_reset: Duration) -> Self {
        Self {
            host,
            one_shot_reset,
        }
    }

    /// Issue every command in the batch, in routing-table order.
    ///
    /// All commands are attempted; failures are collected into a single
    /// [`SyncError::Command`]. Capabilities that are not commands are ignored.
    pub async fn dispatch(
        &self,
        client: Option<&dyn VehicleClient>,
        target: DispatchTarget<'_>,
        batch: &CommandBatch,
    ) -> SyncResult<DispatchOutcome> {
        authorize(target.vehicle_type, target.pin)?;

        for name in batch.keys() {
            if Command::from_capability(name).is_none() {
                debug!(capability = %name, "Write to non-command capability ignored");
            }
        }

        let mut outcome = DispatchOutcome::default();
        let mut failures = Vec::new();

        for command in Command::ALL {
            let Some(value) = batch.get(command.capability()) else {
                continue;
            };

            match route(command, target.vehicle_type, target.vin) {
                Route::ForceRefresh => {
                    info!("Forced refresh requested");
                    outcome.force_refresh = true;
                }
                Route::State(path) => {
                    let result = match client {
                        Some(client) => client
                            .set_state(&path, StateChange::command(value.clone()))
                            .await
                            .map_err(|e| e.to_string()),
                        None => Err("backend client not connected".to_string()),
                    };
                    match result {
                        Ok(()) => {
                            info!(capability = command.capability(), "Command issued");
                            outcome.issued.push(path.to_string());
                        }
                        Err(message) => {
                            warn!(capability = command.capability(), error = %message, "Command failed");
                            failures.push(CommandFailure {
                                capability: command.capability().to_string(),
                                path: path.to_string(),
                                message,
                            });
                        }
                    }
                }
            }

            if command.is_one_shot() {
                self.schedule_reset(command.capability());
            }
        }

        if failures.is_empty() {
            Ok(outcome)
        } else {
            Err(SyncError::Command(failures))
        }
    }

    /// Put a momentary capability back to `false` after a short delay
    fn schedule_reset(&self, capability: &'static str) {
        let host = self.host.clone();
        let delay = self.one_shot_reset;
        tokio::spawn(async move {
            settle(delay).await;
            if let Err(e) = host
                .set_capability_value(capability, CapabilityValue::Bool(false))
                .await
            {
                warn!(capability, error = %e, "One-shot reset failed");
            }
        });
    }
}
