//! Careline core - session, platform tokens, care requests, and messaging.
//!
//! A patient signs in with email and password against the member portal and
//! receives a long-lived primary token. Calls to the patient API need a
//! short-lived platform token, which [`platform::TokenBroker`] exchanges for
//! and caches. [`care::CareClient`] makes the patient API calls, and
//! [`auth::SessionManager`] owns login, logout, and the biometric/PIN
//! re-authentication flow. [`context::CareContext`] wires them together.
//!
//! Front ends choose the data source: [`api::HttpBackend`] for the real
//! service or [`api::MockBackend`] for demos and tests.

pub mod api;
pub mod auth;
pub mod care;
pub mod clock;
pub mod config;
pub mod context;
pub mod error;
pub mod models;
pub mod platform;
pub mod store;

pub use api::{CareBackend, HttpBackend, MockBackend};
pub use auth::SessionManager;
pub use care::CareClient;
pub use config::{Config, CredentialBackend};
pub use context::CareContext;
pub use error::{CareError, CareResult};
pub use platform::TokenBroker;
