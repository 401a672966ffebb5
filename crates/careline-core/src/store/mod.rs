//! Durable key-value storage for secrets.
//!
//! This module provides:
//! - `SecretStore`: the storage contract (set / get / delete, no shape checks)
//! - `KeyringStore`: OS keychain entries via `keyring`
//! - `EncryptedFileStore`: a ChaCha20-Poly1305 sealed file for hosts without a keychain
//! - `MemoryStore`: process-local storage for the mock data source and tests
//!
//! Key names live in [`keys`] so every component agrees on them.

pub mod file;
pub mod keychain;
pub mod memory;

pub use self::file::EncryptedFileStore;
pub use self::keychain::KeyringStore;
pub use self::memory::MemoryStore;

use chrono::{DateTime, TimeZone, Utc};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("{0}")]
    Unavailable(String),

    #[error("Stored data is corrupt: {0}")]
    Corrupt(String),
}

/// Opaque secret persistence. Writes must survive a process restart for the
/// durable implementations; concurrent writers to one key are last-write-wins.
pub trait SecretStore: Send + Sync {
    fn set(&self, key: &str, value: &str) -> Result<(), StoreError>;

    fn get(&self, key: &str) -> Result<Option<String>, StoreError>;

    /// Deleting a key that is not present succeeds.
    fn delete(&self, key: &str) -> Result<(), StoreError>;
}

/// Persisted key names.
pub mod keys {
    pub const PRIMARY_TOKEN: &str = "primary_token";
    pub const PLATFORM_TOKEN: &str = "care_platform_token";
    pub const PLATFORM_TOKEN_EXPIRY: &str = "care_platform_token_expiry";
    pub const BIOMETRIC_ENABLED: &str = "biometric_enabled";
    pub const BIOMETRIC_EMAIL: &str = "biometric_email";
    pub const BIOMETRIC_PASSWORD: &str = "biometric_password";
    pub const BIOMETRIC_PIN: &str = "biometric_pin";
    pub const PIN_ATTEMPTS: &str = "pin_attempts";
    pub const PIN_LOCKOUT_UNTIL: &str = "pin_lockout_until";

    /// Every key tied to biometric enrollment. The enabled flag comes first
    /// so a purge that fails halfway never leaves enrollment looking active.
    pub const BIOMETRIC_KEYS: [&str; 6] = [
        BIOMETRIC_ENABLED,
        BIOMETRIC_EMAIL,
        BIOMETRIC_PASSWORD,
        BIOMETRIC_PIN,
        PIN_ATTEMPTS,
        PIN_LOCKOUT_UNTIL,
    ];
}

/// Instants are persisted as epoch milliseconds.
pub(crate) fn encode_instant(instant: DateTime<Utc>) -> String {
    instant.timestamp_millis().to_string()
}

pub(crate) fn decode_instant(raw: &str) -> Option<DateTime<Utc>> {
    raw.trim()
        .parse::<i64>()
        .ok()
        .and_then(|millis| Utc.timestamp_millis_opt(millis).single())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_instant_encoding() {
        let instant = Utc.timestamp_millis_opt(1_740_823_200_123).single().unwrap();
        assert_eq!(encode_instant(instant), "1740823200123");
        assert_eq!(decode_instant("1740823200123"), Some(instant));
        assert_eq!(decode_instant("not-a-number"), None);
        assert_eq!(decode_instant(""), None);
    }
}
