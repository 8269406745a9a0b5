//! Common error types for the synchronization engine and its ports

use thiserror::Error;

/// Result type for backend client operations
pub type ClientResult<T> = Result<T, ClientError>;

/// Result type for host device operations
pub type HostResult<T> = Result<T, HostError>;

/// Result type for engine operations
pub type SyncResult<T> = Result<T, SyncError>;

/// Errors reported by the remote vehicle client
#[derive(Debug, Error)]
pub enum ClientError {
    /// Login or token exchange failed
    #[error("Authentication failed: {0}")]
    Auth(String),

    /// The client never signalled readiness
    #[error("Client not ready: {0}")]
    NotReady(String),

    /// The backend refused a state change
    #[error("State change rejected: {0}")]
    Rejected(String),

    /// Transport/communication error
    #[error("Transport error: {0}")]
    Transport(String),

    /// Timeout waiting for the backend
    #[error("Operation timed out")]
    Timeout,

    /// Operation not supported by this client
    #[error("Operation not supported: {0}")]
    NotSupported(String),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Errors reported by the automation host's device model
#[derive(Debug, Error)]
pub enum HostError {
    /// Capability is not exposed on the device
    #[error("Capability not found: {0}")]
    CapabilityNotFound(String),

    /// Host refused to add, remove or update a capability
    #[error("Capability rejected by host: {0}")]
    CapabilityRejected(String),

    /// No flow trigger card with that name
    #[error("Flow card not found: {0}")]
    FlowCardNotFound(String),

    /// Settings or store persistence failed
    #[error("Storage error: {0}")]
    Storage(String),
}

/// A single state change the backend refused during a command batch
#[derive(Debug, Clone, PartialEq)]
pub struct CommandFailure {
    /// Capability that triggered the command
    pub capability: String,
    /// Backend path the command was sent to
    pub path: String,
    /// Backend error message
    pub message: String,
}

/// Engine-level error taxonomy
///
/// Only `Authorization` and `Command` ever reach an external caller (the
/// host's capability write flow). The others are caught at the boundary of
/// the task that raised them and logged.
#[derive(Debug, Error)]
pub enum SyncError {
    /// Settings are invalid or the stored secret cannot be decrypted
    #[error("Configuration error: {0}")]
    Config(String),

    /// Backend client construction or readiness failed
    #[error("Connection error: {0}")]
    Connection(String),

    /// A command was issued without the required security PIN
    #[error("Authorization error: {0}")]
    Authorization(String),

    /// One or more state changes of a command batch were rejected
    #[error("Command error: {}", describe_failures(.0))]
    Command(Vec<CommandFailure>),

    /// Telemetry for one capability could not be normalized
    #[error("Mapping error for {capability}: {message}")]
    Mapping { capability: String, message: String },

    /// The host device model refused an operation
    #[error(transparent)]
    Host(#[from] HostError),
}

fn describe_failures(failures: &[CommandFailure]) -> String {
    failures
        .iter()
        .map(|f| format!("{} ({}): {}", f.capability, f.path, f.message))
        .collect::<Vec<_>>()
        .join("; ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn command_error_lists_every_failure() {
        let err = SyncError::Command(vec![
            CommandFailure {
                capability: "locked".to_string(),
                path: "vw-connect.0.VIN.remote.lock".to_string(),
                message: "busy".to_string(),
            },
            CommandFailure {
                capability: "remote_flash".to_string(),
                path: "vw-connect.0.VIN.remote.flash".to_string(),
                message: "offline".to_string(),
            },
        ]);

        let text = err.to_string();
        assert!(text.contains("locked (vw-connect.0.VIN.remote.lock): busy"));
        assert!(text.contains("remote_flash (vw-connect.0.VIN.remote.flash): offline"));
    }

    #[test]
    fn host_errors_convert() {
        let err: SyncError = HostError::CapabilityNotFound("measure_battery".into()).into();
        assert!(matches!(err, SyncError::Host(HostError::CapabilityNotFound(_))));
    }
}
