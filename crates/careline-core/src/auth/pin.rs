use argon2::password_hash::SaltString;
use argon2::{Algorithm, Argon2, Params, PasswordHash, PasswordHasher, PasswordVerifier, Version};
use chrono::{DateTime, Duration, Utc};
use rand::rngs::OsRng;

use crate::error::CareError;
use crate::store::StoreError;

/// Wrong PINs allowed before a lockout.
pub const MAX_PIN_ATTEMPTS: u32 = 3;

/// How long a lockout lasts.
pub const PIN_LOCKOUT_MINUTES: i64 = 60;

pub const MIN_PIN_LENGTH: usize = 4;
pub const MAX_PIN_LENGTH: usize = 6;

/// Argon2 memory cost in KiB. A PIN has little entropy; the lockout is what
/// limits guessing, the hash only keeps the digits off disk.
const PIN_HASH_MEMORY_KIB: u32 = 8 * 1024;
const PIN_HASH_ITERATIONS: u32 = 2;

pub fn lockout_window() -> Duration {
    Duration::minutes(PIN_LOCKOUT_MINUTES)
}

/// A PIN is 4 to 6 ASCII digits.
pub fn validate_pin_format(pin: &str) -> Result<(), CareError> {
    let len_ok = (MIN_PIN_LENGTH..=MAX_PIN_LENGTH).contains(&pin.len());
    if len_ok && pin.bytes().all(|b| b.is_ascii_digit()) {
        Ok(())
    } else {
        Err(CareError::Validation(format!(
            "PIN must be {} to {} digits",
            MIN_PIN_LENGTH, MAX_PIN_LENGTH
        )))
    }
}

fn hasher() -> Result<Argon2<'static>, CareError> {
    let params = Params::new(PIN_HASH_MEMORY_KIB, PIN_HASH_ITERATIONS, 1, None)
        .map_err(|e| StoreError::Unavailable(format!("Invalid PIN hash parameters: {}", e)))?;
    Ok(Argon2::new(Algorithm::Argon2id, Version::V0x13, params))
}

/// Hash a PIN into a PHC string for storage.
pub fn hash_pin(pin: &str) -> Result<String, CareError> {
    let salt = SaltString::generate(&mut OsRng);
    let hash = hasher()?
        .hash_password(pin.as_bytes(), &salt)
        .map_err(|e| StoreError::Unavailable(format!("PIN hashing failed: {}", e)))?;
    Ok(hash.to_string())
}

/// Check a PIN against a stored PHC string. A malformed hash never matches.
pub fn verify_pin(pin: &str, stored_hash: &str) -> bool {
    let Ok(parsed) = PasswordHash::new(stored_hash) else {
        return false;
    };
    hasher()
        .map(|h| h.verify_password(pin.as_bytes(), &parsed).is_ok())
        .unwrap_or(false)
}

/// Runs `hash_pin` on the blocking thread pool.
pub async fn hash_pin_blocking(pin: String) -> Result<String, CareError> {
    tokio::task::spawn_blocking(move || hash_pin(&pin))
        .await
        .map_err(|e| StoreError::Unavailable(format!("PIN hashing task failed: {}", e)))?
}

/// Runs `verify_pin` on the blocking thread pool. A failed task never matches.
pub async fn verify_pin_blocking(pin: String, stored_hash: String) -> bool {
    tokio::task::spawn_blocking(move || verify_pin(&pin, &stored_hash))
        .await
        .unwrap_or(false)
}

/// Attempt counter and lockout as currently persisted.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PinStatus {
    pub attempts: u32,
    pub lockout_until: Option<DateTime<Utc>>,
}

impl PinStatus {
    pub fn remaining_attempts(&self) -> u32 {
        MAX_PIN_ATTEMPTS.saturating_sub(self.attempts)
    }

    /// Time left on an active lockout, if any
    pub fn locked_for(&self, now: DateTime<Utc>) -> Option<Duration> {
        self.lockout_until
            .filter(|until| now < *until)
            .map(|until| until - now)
    }
}
