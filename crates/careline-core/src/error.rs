//! Error taxonomy surfaced to front ends.
//!
//! Transport-level failures (`ApiError`) and storage failures (`StoreError`)
//! are translated into `CareError` at the broker/client boundary so the UI
//! only ever sees these conditions.

use chrono::Duration;
use thiserror::Error;

use crate::api::ApiError;
use crate::store::StoreError;

#[derive(Error, Debug)]
pub enum CareError {
    #[error("Authentication required: {0}")]
    Authentication(String),

    #[error("Failed to fetch care platform token: {0}")]
    TokenFetch(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Too many incorrect PIN attempts - try again in {} minutes", minutes_rounded_up(.retry_after))]
    Lockout { retry_after: Duration },

    #[error("Incorrect PIN - {remaining_attempts} attempts remaining")]
    PinRejected { remaining_attempts: u32 },

    #[error("Credential storage unavailable: {0}")]
    Storage(#[from] StoreError),
}

pub type CareResult<T> = Result<T, CareError>;

/// Whole minutes, rounded up, with a floor of one.
pub fn minutes_rounded_up(duration: &Duration) -> i64 {
    let secs = duration.num_seconds().max(0);
    ((secs + 59) / 60).max(1)
}

impl CareError {
    /// Transient conditions the UI may offer a retry for.
    pub fn is_retryable(&self) -> bool {
        matches!(self, CareError::Network(_) | CareError::TokenFetch(_))
    }

    /// Minutes the user must wait, if this is a lockout.
    pub fn retry_after_minutes(&self) -> Option<i64> {
        match self {
            CareError::Lockout { retry_after } => Some(minutes_rounded_up(retry_after)),
            _ => None,
        }
    }

    /// Message suitable for showing to the patient
    pub fn user_message(&self) -> String {
        match self {
            CareError::Authentication(_) => "Please log in again to continue.".to_string(),
            CareError::TokenFetch(_) | CareError::Network(_) => {
                "Something went wrong. Please check your connection and try again.".to_string()
            }
            CareError::Validation(msg) => msg.clone(),
            CareError::Lockout { .. } | CareError::PinRejected { .. } => self.to_string(),
            CareError::Storage(_) => "Secure storage is unavailable on this device.".to_string(),
        }
    }

    /// Translate a failed data call into the taxonomy.
    pub(crate) fn from_api(err: ApiError) -> Self {
        match err {
            ApiError::Unauthorized | ApiError::AccessDenied(_) => {
                CareError::Authentication(err.to_string())
            }
            ApiError::InvalidResponse(msg) => CareError::Validation(msg),
            other => CareError::Network(other.to_string()),
        }
    }

    /// Translate a failed token exchange into the taxonomy.
    pub(crate) fn from_token_exchange(err: ApiError) -> Self {
        match err {
            ApiError::Unauthorized => CareError::Authentication(
                "primary session was rejected by the token exchange".to_string(),
            ),
            other => CareError::TokenFetch(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lockout_message_rounds_minutes_up() {
        let err = CareError::Lockout {
            retry_after: Duration::seconds(61),
        };
        assert_eq!(err.retry_after_minutes(), Some(2));
        assert!(err.to_string().contains("2 minutes"));

        let err = CareError::Lockout {
            retry_after: Duration::seconds(5),
        };
        assert_eq!(err.retry_after_minutes(), Some(1));

        assert_eq!(minutes_rounded_up(&Duration::minutes(60)), 60);
        assert_eq!(minutes_rounded_up(&(Duration::minutes(59) + Duration::seconds(1))), 60);
    }

    #[test]
    fn test_retryable_conditions() {
        assert!(CareError::Network("timeout".into()).is_retryable());
        assert!(CareError::TokenFetch("502".into()).is_retryable());
        assert!(!CareError::Validation("bad pin".into()).is_retryable());
        assert!(!CareError::Lockout {
            retry_after: Duration::minutes(60)
        }
        .is_retryable());
        assert!(!CareError::Authentication("no token".into()).is_retryable());
    }

    #[test]
    fn test_unmatched_client_errors_are_network_errors() {
        use reqwest::StatusCode;

        for status in [
            StatusCode::BAD_REQUEST,
            StatusCode::PAYMENT_REQUIRED,
            StatusCode::CONFLICT,
            StatusCode::UNPROCESSABLE_ENTITY,
        ] {
            let err = CareError::from_api(ApiError::from_status(status, "x"));
            assert!(matches!(err, CareError::Network(_)), "{} -> {:?}", status, err);
            assert!(err.is_retryable());
        }
    }

    #[test]
    fn test_api_error_translation() {
        assert!(matches!(
            CareError::from_api(ApiError::Unauthorized),
            CareError::Authentication(_)
        ));
        assert!(matches!(
            CareError::from_api(ApiError::ServerError("boom".into())),
            CareError::Network(_)
        ));
        assert!(matches!(
            CareError::from_api(ApiError::InvalidResponse("missing field".into())),
            CareError::Validation(_)
        ));
        assert!(matches!(
            CareError::from_token_exchange(ApiError::ServerError("boom".into())),
            CareError::TokenFetch(_)
        ));
        assert!(matches!(
            CareError::from_token_exchange(ApiError::Unauthorized),
            CareError::Authentication(_)
        ));
    }
}
