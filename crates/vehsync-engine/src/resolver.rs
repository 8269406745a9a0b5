//! Config resolver - host settings → effective configuration

use std::sync::Arc;

use secrecy::SecretString;
use vehsync_core::{ClientOptions, DeviceSettings, ErrorSink, SyncError, SyncResult, VehicleType};

use crate::secret::SecretCipher;

/// Effective configuration for one synchronization run
#[derive(Clone)]
pub struct ResolvedConfig {
    pub vin: String,
    pub vehicle_type: VehicleType,
    pub pin: String,
    pub interval_minutes: u32,
    pub debug: bool,
    pub username: String,
    pub password: Arc<SecretString>,
}

impl ResolvedConfig {
    /// Options for constructing a backend client
    pub fn client_options(&self, errors: ErrorSink) -> ClientOptions {
        ClientOptions {
            username: self.username.clone(),
            password: self.password.clone(),
            vehicle_type: self.vehicle_type,
            pin: self.pin.clone(),
            interval_minutes: self.interval_minutes,
            debug: self.debug,
            errors,
        }
    }
}

impl std::fmt::Debug for ResolvedConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResolvedConfig")
            .field("vin", &"<redacted>")
            .field("vehicle_type", &self.vehicle_type)
            .field("pin", &"<redacted>")
            .field("interval_minutes", &self.interval_minutes)
            .field("debug", &self.debug)
            .field("username", &"<redacted>")
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Derives [`ResolvedConfig`] from the host settings record
pub struct ConfigResolver {
    cipher: Arc<dyn SecretCipher>,
}

impl ConfigResolver {
    pub fn new(cipher: Arc<dyn SecretCipher>) -> Self {
        Self { cipher }
    }

    /// Validate settings and decrypt the stored password
    pub fn resolve(&self, settings: &DeviceSettings) -> SyncResult<ResolvedConfig> {
        let vin = settings.vin.trim();
        if vin.is_empty() {
            return Err(SyncError::Config("VIN is empty".into()));
        }

        let vehicle_type: VehicleType = settings.vehicle_type.parse().map_err(SyncError::Config)?;

        let interval_minutes = u32::try_from(settings.update_interval)
            .ok()
            .filter(|minutes| *minutes >= 1)
            .ok_or_else(|| {
                SyncError::Config(format!(
                    "Update interval must be at least 1 minute, got {}",
                    settings.update_interval
                ))
            })?;

        let password = self.cipher.decrypt(&settings.password)?;

        Ok(ResolvedConfig {
            vin: vin.to_string(),
            vehicle_type,
            pin: settings.pin.clone(),
            interval_minutes,
            debug: settings.debug_logs,
            username: settings.username.clone(),
            password: Arc::new(password),
        })
    }

    /// Encrypt a plaintext password for persisting
    pub fn encrypt_password(&self, plain: &str) -> SyncResult<String> {
        self.cipher.encrypt(&SecretString::from(plain))
    }
}
