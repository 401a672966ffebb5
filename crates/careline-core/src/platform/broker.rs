use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::api::CareBackend;
use crate::auth::SessionManager;
use crate::clock::Clock;
use crate::error::{CareError, CareResult};
use crate::store::{decode_instant, encode_instant, keys, SecretStore};

use super::token::PlatformToken;

/// Hands out platform tokens, exchanging the primary token only when the
/// cached one is missing or inside the safety margin.
///
/// Refreshes are single-flight: callers that find the cache stale queue on
/// `refresh_lock`, and each re-checks the cache once it gets the lock, so a
/// burst of callers during an expired window costs one exchange.
pub struct TokenBroker<B>
where
    B: CareBackend,
{
    session: Arc<SessionManager<B>>,
    backend: Arc<B>,
    store: Arc<dyn SecretStore>,
    clock: Arc<dyn Clock>,
    refresh_lock: Mutex<()>,
}

impl<B> TokenBroker<B>
where
    B: CareBackend,
{
    pub fn new(
        session: Arc<SessionManager<B>>,
        backend: Arc<B>,
        store: Arc<dyn SecretStore>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            session,
            backend,
            store,
            clock,
            refresh_lock: Mutex::new(()),
        }
    }

    /// A platform token valid for at least the safety margin.
    pub async fn token(&self) -> CareResult<String> {
        if let Some(token) = self.fresh_cached()? {
            return Ok(token);
        }

        let _guard = self.refresh_lock.lock().await;
        if let Some(token) = self.fresh_cached()? {
            debug!("Platform token refreshed by a concurrent caller");
            return Ok(token);
        }
        self.exchange().await
    }

    /// Replace a token the backend rejected.
    ///
    /// If another caller already swapped in a different fresh token while
    /// this one waited, that token is returned instead of exchanging again.
    pub async fn refresh_rejected(&self, rejected: &str) -> CareResult<String> {
        let _guard = self.refresh_lock.lock().await;
        if let Some(token) = self.fresh_cached()? {
            if token != rejected {
                return Ok(token);
            }
        }
        self.clear()?;
        self.exchange().await
    }

    /// Drop the cached token and its expiry.
    pub fn clear(&self) -> CareResult<()> {
        self.store.delete(keys::PLATFORM_TOKEN)?;
        self.store.delete(keys::PLATFORM_TOKEN_EXPIRY)?;
        Ok(())
    }

    /// The persisted token, fresh or not. A corrupt or missing expiry reads
    /// as no token.
    pub fn cached(&self) -> CareResult<Option<PlatformToken>> {
        let Some(token) = self.store.get(keys::PLATFORM_TOKEN)? else {
            return Ok(None);
        };
        let Some(raw_expiry) = self.store.get(keys::PLATFORM_TOKEN_EXPIRY)? else {
            return Ok(None);
        };
        match decode_instant(&raw_expiry) {
            Some(expires_at) => Ok(Some(PlatformToken { token, expires_at })),
            None => {
                warn!("Ignoring platform token with unreadable expiry");
                Ok(None)
            }
        }
    }

    fn fresh_cached(&self) -> CareResult<Option<String>> {
        let now = self.clock.now();
        Ok(self
            .cached()?
            .filter(|t| t.is_fresh(now))
            .map(|t| t.token))
    }

    /// Call the exchange endpoint and persist the result. Callers hold
    /// `refresh_lock`.
    async fn exchange(&self) -> CareResult<String> {
        let primary = self.session.primary_token().ok_or_else(|| {
            CareError::Authentication("Not logged in - no primary session token".to_string())
        })?;

        let response = self
            .backend
            .exchange_token(&primary)
            .await
            .map_err(|e| {
                warn!(error = %e, "Platform token exchange failed");
                CareError::from_token_exchange(e)
            })?;

        let expires_at = response.expires_at().ok_or_else(|| {
            CareError::TokenFetch(format!("Invalid token expiry: {}", response.expires_at))
        })?;

        self.store.set(keys::PLATFORM_TOKEN, &response.access_token)?;
        self.store
            .set(keys::PLATFORM_TOKEN_EXPIRY, &encode_instant(expires_at))?;
        debug!(expires_at = %expires_at, "Platform token refreshed");

        Ok(response.access_token)
    }
}
