//! Per-process wiring of the store, data source, session, broker, and client.

use std::sync::Arc;

use tracing::debug;

use crate::api::{CareBackend, MockBackend};
use crate::auth::{BiometricAuthenticator, MockBiometrics, SessionManager};
use crate::care::CareClient;
use crate::clock::{Clock, ManualClock};
use crate::error::CareResult;
use crate::platform::TokenBroker;
use crate::store::{MemoryStore, SecretStore};

/// Everything a front end needs, built once and shared by reference.
pub struct CareContext<B>
where
    B: CareBackend,
{
    store: Arc<dyn SecretStore>,
    backend: Arc<B>,
    clock: Arc<dyn Clock>,
    session: Arc<SessionManager<B>>,
    broker: Arc<TokenBroker<B>>,
    client: CareClient<B>,
}

impl<B> CareContext<B>
where
    B: CareBackend,
{
    pub fn new(
        backend: Arc<B>,
        store: Arc<dyn SecretStore>,
        biometrics: Arc<dyn BiometricAuthenticator>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let session = Arc::new(SessionManager::new(
            backend.clone(),
            store.clone(),
            biometrics,
            clock.clone(),
        ));
        let broker = Arc::new(TokenBroker::new(
            session.clone(),
            backend.clone(),
            store.clone(),
            clock.clone(),
        ));
        let client = CareClient::new(backend.clone(), broker.clone());

        Self {
            store,
            backend,
            clock,
            session,
            broker,
            client,
        }
    }

    pub fn session(&self) -> &SessionManager<B> {
        &self.session
    }

    pub fn broker(&self) -> &TokenBroker<B> {
        &self.broker
    }

    pub fn client(&self) -> &CareClient<B> {
        &self.client
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn store(&self) -> &dyn SecretStore {
        self.store.as_ref()
    }

    pub fn clock(&self) -> &dyn Clock {
        self.clock.as_ref()
    }

    /// End the session and drop the cached platform token.
    pub fn logout(&self) -> CareResult<()> {
        self.session.logout()?;
        self.broker.clear()?;
        debug!("Platform token cleared");
        Ok(())
    }
}

impl CareContext<MockBackend> {
    /// Fully in-memory context on the seeded demo backend.
    pub fn mock() -> Self {
        Self::mock_with(
            Arc::new(ManualClock::default()),
            Arc::new(MockBiometrics::default()),
        )
    }

    pub fn mock_with(clock: Arc<dyn Clock>, biometrics: Arc<dyn BiometricAuthenticator>) -> Self {
        let backend = Arc::new(MockBackend::seeded(clock.clone()));
        Self::new(backend, Arc::new(MemoryStore::new()), biometrics, clock)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::mock::{DEMO_EMAIL, DEMO_PASSWORD};
    use crate::auth::SessionState;
    use crate::error::CareError;
    use crate::store::keys;
    use chrono::Duration;

    #[tokio::test]
    async fn test_login_then_logout() {
        let ctx = CareContext::mock();
        assert_eq!(ctx.session().state(), SessionState::LoggedOut);

        ctx.session().login(DEMO_EMAIL, DEMO_PASSWORD).await.unwrap();
        assert!(ctx.session().is_authenticated());

        let requests = ctx.client().list_care_requests().await.unwrap();
        assert_eq!(requests.len(), 1);
        assert!(ctx.store().get(keys::PLATFORM_TOKEN).unwrap().is_some());

        ctx.logout().unwrap();
        assert!(!ctx.session().is_authenticated());
        assert!(ctx.store().get(keys::PLATFORM_TOKEN).unwrap().is_none());
        assert!(ctx.store().get(keys::PLATFORM_TOKEN_EXPIRY).unwrap().is_none());
        assert!(matches!(
            ctx.client().list_care_requests().await,
            Err(CareError::Authentication(_))
        ));
    }

    #[tokio::test]
    async fn test_session_outlives_platform_token() {
        let clock = Arc::new(ManualClock::default());
        let ctx = CareContext::mock_with(clock.clone(), Arc::new(MockBiometrics::default()));
        ctx.session().login(DEMO_EMAIL, DEMO_PASSWORD).await.unwrap();

        ctx.client().list_care_requests().await.unwrap();
        clock.advance(Duration::hours(3));
        ctx.client().list_care_requests().await.unwrap();
        assert_eq!(ctx.backend().exchange_calls(), 2);
        assert_eq!(ctx.backend().session_calls(), 1);
    }

    #[tokio::test]
    async fn test_biometric_login_round_trip() {
        let ctx = CareContext::mock();
        ctx.session().login(DEMO_EMAIL, DEMO_PASSWORD).await.unwrap();
        assert!(ctx
            .session()
            .enable_biometric(DEMO_EMAIL, DEMO_PASSWORD, "1234")
            .await
            .unwrap());

        ctx.logout().unwrap();
        assert!(ctx.session().is_biometric_enabled());
        assert!(ctx.session().authenticate_with_biometric().await.unwrap());
        assert!(ctx.client().list_activities().await.is_ok());
    }
}
