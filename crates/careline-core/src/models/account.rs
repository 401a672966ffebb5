use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};

#[cfg_attr(feature = "ts", derive(ts_rs::TS), ts(export))]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
    pub email: String,
}

/// Body for `POST /session`
#[derive(Debug, Serialize)]
pub struct LoginRequest<'a> {
    pub email: &'a str,
    pub password: &'a str,
}

/// Response from `POST /session`
#[derive(Debug, Clone, Deserialize)]
pub struct SessionResponse {
    pub token: String,
    #[serde(default)]
    pub user: Option<User>,
}

/// Body for `POST /users`
#[derive(Debug, Serialize)]
pub struct SignupRequest<'a> {
    pub name: &'a str,
    pub email: &'a str,
    pub password: &'a str,
}

/// Response from `GET /care_requests/get_token`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlatformTokenResponse {
    pub access_token: String,
    /// Absolute expiry in epoch milliseconds
    pub expires_at: i64,
}

impl PlatformTokenResponse {
    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        Utc.timestamp_millis_opt(self.expires_at).single()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_token_response_expiry_is_epoch_millis() {
        let json = r#"{"access_token": "plat_abc", "expires_at": 1740823200000}"#;
        let resp: PlatformTokenResponse = serde_json::from_str(json).unwrap();
        let expires = resp.expires_at().unwrap();
        assert_eq!(expires.to_rfc3339(), "2025-03-01T10:00:00+00:00");
    }

    #[test]
    fn test_session_response_without_user() {
        let resp: SessionResponse = serde_json::from_str(r#"{"token": "t"}"#).unwrap();
        assert_eq!(resp.token, "t");
        assert!(resp.user.is_none());
    }
}
