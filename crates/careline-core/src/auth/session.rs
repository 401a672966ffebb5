//! Primary session lifecycle and the biometric / PIN re-authentication flow.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

use crate::api::CareBackend;
use crate::clock::Clock;
use crate::error::{CareError, CareResult};
use crate::store::{decode_instant, encode_instant, keys, SecretStore, StoreError};

use super::biometric::BiometricAuthenticator;
use super::pin::{
    self, hash_pin_blocking, lockout_window, validate_pin_format, verify_pin_blocking, PinStatus,
    MAX_PIN_ATTEMPTS,
};

/// Prompt text shown by the platform biometric dialog
const BIOMETRIC_PROMPT: &str = "Log in to Careline";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    LoggedOut,
    LoggedIn,
}

/// Owns the primary session token and the biometric enrollment.
///
/// PIN checks are serialised on `pin_lock` from the lockout check through
/// the counter write, so parallel guesses each see the previous one's count.
pub struct SessionManager<B>
where
    B: CareBackend,
{
    backend: Arc<B>,
    store: Arc<dyn SecretStore>,
    biometrics: Arc<dyn BiometricAuthenticator>,
    clock: Arc<dyn Clock>,
    pin_lock: Mutex<()>,
}

impl<B> SessionManager<B>
where
    B: CareBackend,
{
    pub fn new(
        backend: Arc<B>,
        store: Arc<dyn SecretStore>,
        biometrics: Arc<dyn BiometricAuthenticator>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            backend,
            store,
            biometrics,
            clock,
            pin_lock: Mutex::new(()),
        }
    }

    // ===== Password session =====

    /// Log in with email and password. Nothing is persisted unless the
    /// backend accepted the credentials.
    pub async fn login(&self, email: &str, password: &str) -> CareResult<()> {
        if email.trim().is_empty() || password.is_empty() {
            return Err(CareError::Validation(
                "Email and password are required".to_string(),
            ));
        }

        let session = self
            .backend
            .create_session(email.trim(), password)
            .await
            .map_err(|e| {
                warn!(error = %e, "Login failed");
                CareError::from_api(e)
            })?;

        // A platform token derived from an earlier session must not outlive it
        self.store.delete(keys::PLATFORM_TOKEN)?;
        self.store.delete(keys::PLATFORM_TOKEN_EXPIRY)?;
        self.store.set(keys::PRIMARY_TOKEN, &session.token)?;

        info!(
            user_id = session.user.as_ref().map(|u| u.id.as_str()).unwrap_or("unknown"),
            "Logged in"
        );
        Ok(())
    }

    /// Create an account, then log into it with the same password.
    pub async fn signup(&self, name: &str, email: &str, password: &str) -> CareResult<()> {
        if name.trim().is_empty() {
            return Err(CareError::Validation("Name is required".to_string()));
        }
        if email.trim().is_empty() || password.is_empty() {
            return Err(CareError::Validation(
                "Email and password are required".to_string(),
            ));
        }

        self.backend
            .create_user(name.trim(), email.trim(), password)
            .await
            .map_err(|e| {
                warn!(error = %e, "Signup failed");
                CareError::from_api(e)
            })?;
        debug!("Account created, logging in");

        self.login(email, password).await
    }

    /// Forget the primary token and the platform token derived from it.
    /// Safe to call when already logged out.
    pub fn logout(&self) -> CareResult<()> {
        self.store.delete(keys::PRIMARY_TOKEN)?;
        self.store.delete(keys::PLATFORM_TOKEN)?;
        self.store.delete(keys::PLATFORM_TOKEN_EXPIRY)?;
        info!("Logged out");
        Ok(())
    }

    /// Presence check only; the token is not validated against the backend.
    pub fn is_authenticated(&self) -> bool {
        self.primary_token().is_some()
    }

    pub fn state(&self) -> SessionState {
        if self.is_authenticated() {
            SessionState::LoggedIn
        } else {
            SessionState::LoggedOut
        }
    }

    pub fn primary_token(&self) -> Option<String> {
        match self.store.get(keys::PRIMARY_TOKEN) {
            Ok(token) => token.filter(|t| !t.is_empty()),
            Err(e) => {
                warn!(error = %e, "Failed to read primary token");
                None
            }
        }
    }

    // ===== Biometric enrollment =====

    /// Remember credentials for biometric login, gated by a local PIN.
    ///
    /// Returns `Ok(false)` without storing anything when the device has no
    /// biometric capability.
    pub async fn enable_biometric(&self, email: &str, password: &str, pin: &str) -> CareResult<bool> {
        validate_pin_format(pin)?;
        if !self.biometrics.is_available() {
            debug!("Biometric hardware unavailable");
            return Ok(false);
        }

        let pin_hash = hash_pin_blocking(pin.to_string()).await?;
        let _guard = self.pin_lock.lock().await;

        // The flag goes last so a partial write never reads as enrolled
        let result = self
            .store
            .delete(keys::BIOMETRIC_ENABLED)
            .and_then(|_| self.store.set(keys::BIOMETRIC_EMAIL, email.trim()))
            .and_then(|_| self.store.set(keys::BIOMETRIC_PASSWORD, password))
            .and_then(|_| self.store.set(keys::BIOMETRIC_PIN, &pin_hash))
            .and_then(|_| self.store.delete(keys::PIN_ATTEMPTS))
            .and_then(|_| self.store.delete(keys::PIN_LOCKOUT_UNTIL))
            .and_then(|_| self.store.set(keys::BIOMETRIC_ENABLED, "true"));

        if let Err(e) = result {
            warn!(error = %e, "Failed to enable biometric login, rolling back");
            if let Err(rollback) = self.disable_biometric() {
                error!(error = %rollback, "Rollback of biometric enrollment failed, keys may remain");
            }
            return Err(e.into());
        }

        info!("Biometric login enabled");
        Ok(true)
    }

    /// Enrolled means the flag and every backing credential are present.
    pub fn is_biometric_enabled(&self) -> bool {
        let flag = matches!(
            self.store.get(keys::BIOMETRIC_ENABLED),
            Ok(Some(ref v)) if v == "true"
        );
        flag && matches!(self.stored_credentials(), Ok(Some(_)))
            && matches!(self.store.get(keys::BIOMETRIC_PIN), Ok(Some(_)))
    }

    /// Purge everything tied to biometric login. Every key is attempted; the
    /// first storage error is reported.
    pub fn disable_biometric(&self) -> CareResult<()> {
        let mut first_error: Option<StoreError> = None;
        for key in keys::BIOMETRIC_KEYS {
            if let Err(e) = self.store.delete(key) {
                warn!(key, error = %e, "Failed to delete biometric key");
                first_error.get_or_insert(e);
            }
        }
        match first_error {
            Some(e) => Err(e.into()),
            None => {
                info!("Biometric login disabled");
                Ok(())
            }
        }
    }

    /// Log in via the biometric prompt.
    ///
    /// `Ok(false)` means the caller should fall back to PIN entry: biometrics
    /// not enrolled, credentials missing, or the prompt failed or was
    /// cancelled.
    pub async fn authenticate_with_biometric(&self) -> CareResult<bool> {
        if !self.is_biometric_enabled() {
            return Ok(false);
        }
        if !self.biometrics.authenticate(BIOMETRIC_PROMPT).await {
            debug!("Biometric prompt failed or was cancelled");
            return Ok(false);
        }
        let Some((email, password)) = self.stored_credentials()? else {
            return Ok(false);
        };

        self.login(&email, &password).await?;
        Ok(true)
    }

    // ===== PIN fallback =====

    pub fn pin_status(&self) -> CareResult<PinStatus> {
        let attempts = match self.store.get(keys::PIN_ATTEMPTS)? {
            Some(raw) => raw.trim().parse::<u32>().map_err(|_| {
                StoreError::Corrupt(format!("PIN attempt count is not a number: {:?}", raw))
            })?,
            None => 0,
        };
        let lockout_until = match self.store.get(keys::PIN_LOCKOUT_UNTIL)? {
            Some(raw) => Some(decode_instant(&raw).ok_or_else(|| {
                StoreError::Corrupt(format!("PIN lockout is not a timestamp: {:?}", raw))
            })?),
            None => None,
        };
        Ok(PinStatus {
            attempts,
            lockout_until,
        })
    }

    /// Log in with the stored credentials after checking the local PIN.
    ///
    /// An active lockout fails with `Lockout` and does not count as an
    /// attempt. The third consecutive wrong PIN starts a lockout.
    pub async fn authenticate_with_pin(&self, pin: &str) -> CareResult<()> {
        validate_pin_format(pin)?;
        if !self.is_biometric_enabled() {
            return Err(CareError::Authentication(
                "PIN login is not set up on this device".to_string(),
            ));
        }

        let guard = self.pin_lock.lock().await;
        let now = self.clock.now();
        let mut status = self.pin_status()?;

        if let Some(remaining) = status.locked_for(now) {
            return Err(CareError::Lockout {
                retry_after: remaining,
            });
        }
        if status.lockout_until.is_some() {
            debug!("PIN lockout window elapsed, resetting attempts");
            self.reset_pin_attempts()?;
            status = PinStatus::default();
        }

        let stored_hash = self
            .store
            .get(keys::BIOMETRIC_PIN)?
            .ok_or_else(|| CareError::Authentication("No PIN is stored".to_string()))?;

        if !verify_pin_blocking(pin.to_string(), stored_hash).await {
            return Err(self.record_failed_attempt(status.attempts + 1, now)?);
        }

        self.reset_pin_attempts()?;
        drop(guard);
        let (email, password) = self.stored_credentials()?.ok_or_else(|| {
            CareError::Authentication("Stored credentials are missing".to_string())
        })?;
        self.login(&email, &password).await
    }

    /// Persist a failed attempt and return the error to report for it.
    fn record_failed_attempt(&self, attempts: u32, now: DateTime<Utc>) -> CareResult<CareError> {
        self.store.set(keys::PIN_ATTEMPTS, &attempts.to_string())?;

        if attempts >= MAX_PIN_ATTEMPTS {
            let until = now + lockout_window();
            self.store
                .set(keys::PIN_LOCKOUT_UNTIL, &encode_instant(until))?;
            warn!(
                lockout_minutes = pin::PIN_LOCKOUT_MINUTES,
                "Too many incorrect PIN attempts, locking out"
            );
            return Ok(CareError::Lockout {
                retry_after: lockout_window(),
            });
        }

        Ok(CareError::PinRejected {
            remaining_attempts: MAX_PIN_ATTEMPTS - attempts,
        })
    }

    fn reset_pin_attempts(&self) -> Result<(), StoreError> {
        self.store.delete(keys::PIN_ATTEMPTS)?;
        self.store.delete(keys::PIN_LOCKOUT_UNTIL)
    }

    fn stored_credentials(&self) -> Result<Option<(String, String)>, StoreError> {
        let email = self.store.get(keys::BIOMETRIC_EMAIL)?;
        let password = self.store.get(keys::BIOMETRIC_PASSWORD)?;
        Ok(email.zip(password))
    }
}
