//! Authentication module for managing the primary session.
//!
//! This module provides:
//! - `SessionManager`: password login/signup/logout and the biometric + PIN flow
//! - `BiometricAuthenticator`: the device capability behind biometric login
//! - PIN format rules, hashing, and the attempt/lockout policy
//!
//! Three wrong PINs in a row lock PIN login for 60 minutes.

pub mod biometric;
pub mod pin;
pub mod session;

pub use biometric::{BiometricAuthenticator, MockBiometrics, NoBiometrics};
pub use pin::{PinStatus, MAX_PIN_ATTEMPTS, PIN_LOCKOUT_MINUTES};
pub use session::{SessionManager, SessionState};
