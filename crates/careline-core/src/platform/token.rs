use chrono::{DateTime, Duration, Utc};

/// Seconds before expiry at which a platform token stops being served, so it
/// cannot lapse between the freshness check and the request that uses it.
pub const SAFETY_MARGIN_SECS: i64 = 60;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlatformToken {
    pub token: String,
    pub expires_at: DateTime<Utc>,
}

impl PlatformToken {
    pub fn is_fresh(&self, now: DateTime<Utc>) -> bool {
        now < self.expires_at - Duration::seconds(SAFETY_MARGIN_SECS)
    }

    /// Minutes of use left (for display)
    pub fn minutes_until_expiry(&self, now: DateTime<Utc>) -> i64 {
        (self.expires_at - now).num_minutes().max(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_freshness_honours_safety_margin() {
        let now = Utc::now();
        let token = PlatformToken {
            token: "t".into(),
            expires_at: now + Duration::seconds(SAFETY_MARGIN_SECS + 1),
        };
        assert!(token.is_fresh(now));
        assert!(!token.is_fresh(now + Duration::seconds(1)));
        assert!(!token.is_fresh(now + Duration::minutes(5)));
        assert_eq!(token.minutes_until_expiry(now + Duration::minutes(5)), 0);
    }
}
