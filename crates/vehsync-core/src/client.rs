//! VehicleClient trait - the port to the remote telemetry/command backend

use std::sync::Arc;

use async_trait::async_trait;
use secrecy::SecretString;
use tokio::sync::mpsc;

use crate::error::{ClientError, ClientResult};
use crate::models::{CapabilityValue, TelemetrySnapshot, VehicleType};
use crate::routing::StatePath;

/// Channel on which a client reports its error/log lines.
///
/// The engine scans these lines for recovery signals (token expiry,
/// restart requests); the client never needs to know about them.
pub type ErrorSink = mpsc::UnboundedSender<String>;

/// A requested state change on a backend path
#[derive(Debug, Clone, PartialEq)]
pub struct StateChange {
    /// Whether the value is an acknowledged state (`true`) or a command (`false`)
    pub ack: bool,
    /// Requested value
    pub value: CapabilityValue,
}

impl StateChange {
    /// An unacknowledged change, i.e. a command for the vehicle
    pub fn command(value: CapabilityValue) -> Self {
        Self { ack: false, value }
    }
}

/// Everything a client needs to connect to the vendor backend
#[derive(Clone)]
pub struct ClientOptions {
    pub username: String,
    pub password: Arc<SecretString>,
    pub vehicle_type: VehicleType,
    pub pin: String,
    /// Polling interval in minutes
    pub interval_minutes: u32,
    /// Forward the client's own debug output
    pub debug: bool,
    /// Where the client reports error lines
    pub errors: ErrorSink,
}

impl std::fmt::Debug for ClientOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientOptions")
            .field("username", &"<redacted>")
            .field("password", &"<redacted>")
            .field("vehicle_type", &self.vehicle_type)
            .field("pin", &"<redacted>")
            .field("interval_minutes", &self.interval_minutes)
            .field("debug", &self.debug)
            .finish()
    }
}

/// A live connection to the vendor backend for one account.
///
/// Implementations are expected to hold internal timers and sockets. The
/// engine drives polling itself and calls [`VehicleClient::unload`] after
/// every refresh so the client's own polling loop never runs.
#[async_trait]
pub trait VehicleClient: Send + Sync {
    /// Resolve once the client has logged in and fetched its first state
    async fn wait_ready(&self) -> ClientResult<()>;

    /// Stop internal timers and side effects, keeping the cached state
    async fn unload(&self) -> ClientResult<()>;

    /// Request a state change at a backend path
    async fn set_state(&self, path: &StatePath, change: StateChange) -> ClientResult<()>;

    /// Ask the vehicle to push fresh status data to the backend
    async fn request_status_update(&self, vin: &str) -> ClientResult<()>;

    /// Re-read status data from the backend into the client's cache
    async fn update_status(&self, reason: &str) -> ClientResult<()>;

    /// Current cached state, keyed by VIN
    fn state(&self) -> TelemetrySnapshot;

    /// Refresh the access token
    async fn refresh_token(&self, force: bool) -> ClientResult<()> {
        let _ = force;
        Err(ClientError::NotSupported("refresh_token".to_string()))
    }
}

/// Creates backend clients
#[async_trait]
pub trait ClientFactory: Send + Sync {
    async fn connect(&self, options: ClientOptions) -> ClientResult<Arc<dyn VehicleClient>>;
}
