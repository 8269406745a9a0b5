//! At-rest obfuscation of the vendor account password
//!
//! The host persists the password field of the settings record as lowercase
//! hex of the password bytes XOR-ed with a key, cycling over the key bytes.
//! This keeps the password out of plain sight in the settings record. It is
//! not encryption: anyone holding the key or a known plaintext recovers it.

use secrecy::{ExposeSecret as _, SecretString};
use vehsync_core::{SyncError, SyncResult};

/// Encrypts passwords for storage and decrypts them for the backend client
pub trait SecretCipher: Send + Sync {
    fn encrypt(&self, plain: &SecretString) -> SyncResult<String>;

    fn decrypt(&self, stored: &str) -> SyncResult<SecretString>;
}

/// Hex-encoded repeating-key XOR.
///
/// Obfuscation only, with no confidentiality or integrity guarantee. Swap in
/// a real [`SecretCipher`] where the stored settings must resist an attacker.
pub struct XorHexCipher {
    key: Vec<u8>,
}

impl XorHexCipher {
    pub fn new(key: impl Into<Vec<u8>>) -> Self {
        Self { key: key.into() }
    }

    fn apply(&self, data: &[u8]) -> Vec<u8> {
        if self.key.is_empty() {
            return data.to_vec();
        }
        data.iter()
            .enumerate()
            .map(|(i, b)| b ^ self.key[i % self.key.len()])
            .collect()
    }
}

impl std::fmt::Debug for XorHexCipher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("XorHexCipher")
            .field("key", &"<redacted>")
            .finish()
    }
}

impl SecretCipher for XorHexCipher {
    fn encrypt(&self, plain: &SecretString) -> SyncResult<String> {
        Ok(hex::encode(self.apply(plain.expose_secret().as_bytes())))
    }

    fn decrypt(&self, stored: &str) -> SyncResult<SecretString> {
        let bytes = hex::decode(stored.trim())
            .map_err(|e| SyncError::Config(format!("Stored password is not valid hex: {}", e)))?;
        let plain = String::from_utf8(self.apply(&bytes))
            .map_err(|_| SyncError::Config("Stored password does not decrypt to text".into()))?;
        Ok(SecretString::from(plain))
    }
}
