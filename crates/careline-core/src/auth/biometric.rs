use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use futures::future::{self, BoxFuture, FutureExt};

/// The device's biometric prompt (Face ID, fingerprint, ...).
///
/// The hardware is a black box: we only ask whether it exists and whether the
/// user passed the prompt.
pub trait BiometricAuthenticator: Send + Sync {
    fn is_available(&self) -> bool;

    /// Show the prompt. Failure and cancellation both resolve to `false`.
    fn authenticate<'a>(&'a self, reason: &'a str) -> BoxFuture<'a, bool>;
}

/// For hosts with no biometric hardware, such as the terminal client.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoBiometrics;

impl BiometricAuthenticator for NoBiometrics {
    fn is_available(&self) -> bool {
        false
    }

    fn authenticate<'a>(&'a self, _reason: &'a str) -> BoxFuture<'a, bool> {
        future::ready(false).boxed()
    }
}

/// Scriptable capability for demos and tests.
#[derive(Debug)]
pub struct MockBiometrics {
    available: AtomicBool,
    approve: AtomicBool,
    prompts: AtomicUsize,
}

impl MockBiometrics {
    pub fn new(available: bool, approve: bool) -> Self {
        Self {
            available: AtomicBool::new(available),
            approve: AtomicBool::new(approve),
            prompts: AtomicUsize::new(0),
        }
    }

    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    /// Whether the next prompts succeed (`true`) or are cancelled (`false`).
    pub fn set_approve(&self, approve: bool) {
        self.approve.store(approve, Ordering::SeqCst);
    }

    pub fn prompts(&self) -> usize {
        self.prompts.load(Ordering::SeqCst)
    }
}

impl Default for MockBiometrics {
    fn default() -> Self {
        Self::new(true, true)
    }
}

impl BiometricAuthenticator for MockBiometrics {
    fn is_available(&self) -> bool {
        self.available.load(Ordering::SeqCst)
    }

    fn authenticate<'a>(&'a self, _reason: &'a str) -> BoxFuture<'a, bool> {
        self.prompts.fetch_add(1, Ordering::SeqCst);
        let passed = self.is_available() && self.approve.load(Ordering::SeqCst);
        future::ready(passed).boxed()
    }
}
