//! Error types for capability mapping

use thiserror::Error;

/// Errors that can occur while loading maps or normalizing telemetry
#[derive(Debug, Error)]
pub enum ConvError {
    /// Mapping entry does not fit its capability
    #[error("invalid mapping for {capability}: {message}")]
    InvalidMapping { capability: String, message: String },

    /// Telemetry value cannot be converted
    #[error("invalid value for {capability}: {message}")]
    InvalidValue { capability: String, message: String },

    /// TOML parsing error
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl ConvError {
    /// Capability the error belongs to, if any
    pub fn capability(&self) -> Option<&str> {
        match self {
            ConvError::InvalidMapping { capability, .. }
            | ConvError::InvalidValue { capability, .. } => Some(capability),
            _ => None,
        }
    }
}

/// Result type for mapping operations
pub type ConvResult<T> = Result<T, ConvError>;
