//! Recovery and escalation from backend error signals
//!
//! The backend client reports problems as free-form log lines. Only two of
//! them call for action; everything else is ignored.

use std::sync::Arc;

use tracing::{debug, info, warn};
use vehsync_core::{HostResult, VehicleClient};

use crate::store::DeviceStore;

const TOKEN_EXPIRING_MARKER: &str = "Refresh Token in 10min";
const RESTART_MARKER: &str = "Restart adapter in";

/// An error signal that calls for recovery
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecoverySignal {
    /// The access token expires soon
    TokenExpiring,
    /// The client gave up and needs to be recreated
    RestartRequired,
}

impl RecoverySignal {
    /// Classify an error line; `None` for lines that need no action
    pub fn classify(line: &str) -> Option<Self> {
        if line.contains(TOKEN_EXPIRING_MARKER) {
            Some(RecoverySignal::TokenExpiring)
        } else if line.contains(RESTART_MARKER) {
            Some(RecoverySignal::RestartRequired)
        } else {
            None
        }
    }
}

/// What the handler did with a signal
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecoveryAction {
    /// A forced token refresh was started in the background
    TokenRefresh,
    /// A restart is now pending for the next tick
    RestartScheduled,
    /// A restart was already pending
    RestartPending,
    /// No client to refresh the token on
    NoClient,
}

/// Reacts to classified error signals
pub struct RecoveryHandler {
    store: DeviceStore,
}

impl RecoveryHandler {
    pub fn new(store: DeviceStore) -> Self {
        Self { store }
    }

    pub async fn handle(
        &self,
        signal: RecoverySignal,
        client: Option<Arc<dyn VehicleClient>>,
    ) -> HostResult<RecoveryAction> {
        match signal {
            RecoverySignal::TokenExpiring => {
                let Some(client) = client else {
                    debug!("Token expiring but no client is connected");
                    return Ok(RecoveryAction::NoClient);
                };
                info!("Token expiring, refreshing");
                tokio::spawn(async move {
                    if let Err(e) = client.refresh_token(true).await {
                        warn!(error = %e, "Token refresh failed");
                    }
                });
                Ok(RecoveryAction::TokenRefresh)
            }
            RecoverySignal::RestartRequired => {
                if self.store.should_restart() {
                    debug!("Restart already pending");
                    return Ok(RecoveryAction::RestartPending);
                }
                self.store.set_should_restart(true).await?;
                info!("Client restart scheduled for next tick");
                Ok(RecoveryAction::RestartScheduled)
            }
        }
    }
}
