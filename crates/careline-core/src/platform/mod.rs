//! Short-lived platform tokens derived from the primary session.
//!
//! The patient API does not accept the primary token. `TokenBroker` exchanges
//! it for a platform token, persists the result, and serves it until 60
//! seconds before expiry.

pub mod broker;
pub mod token;

pub use broker::TokenBroker;
pub use token::{PlatformToken, SAFETY_MARGIN_SECS};
