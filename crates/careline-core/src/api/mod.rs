//! Data sources for the member portal and patient API.
//!
//! This module provides the `CareBackend` contract and its two
//! implementations:
//! - `HttpBackend`: talks to the real REST endpoints with `reqwest`
//! - `MockBackend`: an in-memory stand-in for development, demos, and tests
//!
//! Member portal calls authenticate with the primary session token; patient
//! API calls carry the short-lived platform token.

pub mod backend;
pub mod error;
pub mod http;
pub mod mock;

pub use backend::{CareBackend, LocalCareBackend};
pub use error::{ApiError, ApiResult};
pub use http::HttpBackend;
pub use mock::MockBackend;
