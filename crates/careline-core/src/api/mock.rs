//! In-memory data source.
//!
//! Behaves like the real backend closely enough to drive every client flow:
//! accounts and passwords are checked, primary and platform tokens are issued
//! and validated, platform tokens expire against the injected clock, and care
//! requests and stacks are scoped to the account that owns them. Test hooks
//! revoke or reject tokens, fail the exchange, take the backend offline, and
//! count calls.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use chrono::{DateTime, Duration, Utc};
use reqwest::StatusCode;
use tracing::debug;

use crate::clock::{Clock, SystemClock};
use crate::models::{
    ActivityStatus, Author, AuthorKind, CareRequest, CareRequestType, Message, MessageType,
    NewCareRequest, NewMessage, PlatformTokenResponse, QuestionSet, Referral, SessionResponse,
    User,
};

use super::{ApiError, ApiResult, CareBackend};

/// Platform token lifetime issued by default
const DEFAULT_PLATFORM_TOKEN_TTL_MINUTES: i64 = 15;

pub const DEMO_NAME: &str = "Demo Patient";
pub const DEMO_EMAIL: &str = "demo@careline.test";
pub const DEMO_PASSWORD: &str = "demo-password";

#[derive(Debug, Clone)]
struct Account {
    user_id: String,
    name: String,
    password: String,
}

#[derive(Debug, Clone)]
struct IssuedPlatformToken {
    email: String,
    expires_at: DateTime<Utc>,
}

#[derive(Debug, Default)]
struct MockState {
    next_id: u64,
    accounts: HashMap<String, Account>,
    sessions: HashMap<String, String>,
    platform_tokens: HashMap<String, IssuedPlatformToken>,
    care_requests: Vec<(String, CareRequest)>,
    stacks: HashMap<String, Vec<Message>>,
    question_sets: HashMap<String, Vec<QuestionSet>>,
    referrals: HashMap<String, Vec<Referral>>,
    reject_platform_tokens: bool,
    exchange_failure: Option<StatusCode>,
    offline: bool,
}

impl MockState {
    fn next_id(&mut self, prefix: &str) -> String {
        self.next_id += 1;
        format!("{}_{}", prefix, self.next_id)
    }

    fn owner_of_platform_token(&self, token: &str, now: DateTime<Utc>) -> ApiResult<String> {
        if self.reject_platform_tokens {
            return Err(ApiError::Unauthorized);
        }
        match self.platform_tokens.get(token) {
            Some(issued) if now < issued.expires_at => Ok(issued.email.clone()),
            _ => Err(ApiError::Unauthorized),
        }
    }

    fn owns_request(&self, email: &str, care_request_id: &str) -> bool {
        self.care_requests
            .iter()
            .any(|(owner, cr)| owner == email && cr.id == care_request_id)
    }
}

pub struct MockBackend {
    state: Mutex<MockState>,
    clock: Arc<dyn Clock>,
    platform_token_ttl: Duration,
    latency: Option<std::time::Duration>,
    session_calls: AtomicUsize,
    exchange_calls: AtomicUsize,
}

impl MockBackend {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            state: Mutex::new(MockState::default()),
            clock,
            platform_token_ttl: Duration::minutes(DEFAULT_PLATFORM_TOKEN_TTL_MINUTES),
            latency: None,
            session_calls: AtomicUsize::new(0),
            exchange_calls: AtomicUsize::new(0),
        }
    }

    /// A backend with the demo account and one care request with some history.
    pub fn seeded(clock: Arc<dyn Clock>) -> Self {
        let backend = Self::new(clock).with_account(DEMO_NAME, DEMO_EMAIL, DEMO_PASSWORD);
        backend.seed_demo_history();
        backend
    }

    pub fn with_account(self, name: &str, email: &str, password: &str) -> Self {
        {
            let mut state = self.state();
            let user_id = state.next_id("user");
            state.accounts.insert(
                email.to_string(),
                Account {
                    user_id,
                    name: name.to_string(),
                    password: password.to_string(),
                },
            );
        }
        self
    }

    pub fn with_platform_token_ttl(mut self, ttl: Duration) -> Self {
        self.platform_token_ttl = ttl;
        self
    }

    /// Delay every call, so concurrent callers overlap.
    pub fn with_latency(mut self, latency: std::time::Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    // ===== Test hooks =====

    /// Forget every issued platform token; the next data call answers 401.
    pub fn revoke_platform_tokens(&self) {
        self.state().platform_tokens.clear();
    }

    /// Answer 401 to every patient API call while set.
    pub fn set_reject_platform_tokens(&self, reject: bool) {
        self.state().reject_platform_tokens = reject;
    }

    /// Make the token exchange fail with `status` while set.
    pub fn set_exchange_failure(&self, status: Option<StatusCode>) {
        self.state().exchange_failure = status;
    }

    /// Fail every call as if the network were down.
    pub fn set_offline(&self, offline: bool) {
        self.state().offline = offline;
    }

    pub fn session_calls(&self) -> usize {
        self.session_calls.load(Ordering::SeqCst)
    }

    pub fn exchange_calls(&self) -> usize {
        self.exchange_calls.load(Ordering::SeqCst)
    }

    pub fn has_account(&self, email: &str) -> bool {
        self.state().accounts.contains_key(email)
    }

    pub fn add_question_set(&self, care_request_id: &str, status: ActivityStatus) -> String {
        let now = self.clock.now();
        let mut state = self.state();
        let id = state.next_id("qs");
        state
            .question_sets
            .entry(care_request_id.to_string())
            .or_default()
            .push(QuestionSet {
                id: id.clone(),
                status,
                care_request_id: care_request_id.to_string(),
                created_at: now,
            });
        id
    }

    pub fn add_referral(&self, care_request_id: &str, unread_messages: bool) -> String {
        let now = self.clock.now();
        let mut state = self.state();
        let id = state.next_id("ref");
        state
            .referrals
            .entry(care_request_id.to_string())
            .or_default()
            .push(Referral {
                id: id.clone(),
                status: "sent".to_string(),
                care_request_id: care_request_id.to_string(),
                created_at: now,
                unread_messages,
            });
        id
    }

    // ===== Internals =====

    fn state(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    async fn simulate_network(&self) -> ApiResult<()> {
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
        if self.state().offline {
            return Err(ApiError::Unreachable("mock backend is offline".to_string()));
        }
        Ok(())
    }

    fn seed_demo_history(&self) {
        let now = self.clock.now();
        let mut state = self.state();
        let request_id = state.next_id("cr");
        let provider = Author {
            id: "prov_1".to_string(),
            kind: AuthorKind::Provider,
            name: "Dr. Rivera".to_string(),
        };
        let welcome = Message {
            id: state.next_id("msg"),
            text: "Hi! How are you feeling today?".to_string(),
            author: provider,
            timestamp: now - Duration::hours(2),
            attachments: vec![],
            reply_to: None,
            message_type: Some(MessageType::Text),
        };
        state.care_requests.push((
            DEMO_EMAIL.to_string(),
            CareRequest {
                id: request_id.clone(),
                request_type: CareRequestType::Checkup,
                title: "checkup".to_string(),
                last_message: None,
                is_locked: false,
                patient_unread_messages: true,
                patient_unread_referral_messages: false,
                providers: vec![],
                inbox_preview_title: "Annual checkup".to_string(),
            },
        ));
        state.stacks.insert(request_id.clone(), vec![welcome]);

        let qs_id = state.next_id("qs");
        state.question_sets.insert(
            request_id.clone(),
            vec![QuestionSet {
                id: qs_id,
                status: ActivityStatus::NotStarted,
                care_request_id: request_id.clone(),
                created_at: now - Duration::hours(1),
            }],
        );
    }
}

impl CareBackend for MockBackend {
    async fn create_session(&self, email: &str, password: &str) -> ApiResult<SessionResponse> {
        self.session_calls.fetch_add(1, Ordering::SeqCst);
        self.simulate_network().await?;

        let mut state = self.state();
        let account = match state.accounts.get(email) {
            Some(account) if account.password == password => account.clone(),
            _ => return Err(ApiError::Unauthorized),
        };
        let token = state.next_id("mock_primary");
        state.sessions.insert(token.clone(), email.to_string());
        debug!(email, "Mock session created");

        Ok(SessionResponse {
            token,
            user: Some(User {
                id: account.user_id,
                name: Some(account.name),
                email: email.to_string(),
            }),
        })
    }

    async fn create_user(&self, name: &str, email: &str, password: &str) -> ApiResult<()> {
        self.simulate_network().await?;

        let mut state = self.state();
        if state.accounts.contains_key(email) {
            return Err(ApiError::from_status(
                StatusCode::UNPROCESSABLE_ENTITY,
                "email has already been taken",
            ));
        }
        let user_id = state.next_id("user");
        state.accounts.insert(
            email.to_string(),
            Account {
                user_id,
                name: name.to_string(),
                password: password.to_string(),
            },
        );
        Ok(())
    }

    async fn exchange_token(&self, primary_token: &str) -> ApiResult<PlatformTokenResponse> {
        self.exchange_calls.fetch_add(1, Ordering::SeqCst);
        self.simulate_network().await?;

        let now = self.clock.now();
        let mut state = self.state();
        if let Some(status) = state.exchange_failure {
            return Err(ApiError::from_status(status, "token exchange failed"));
        }
        let Some(email) = state.sessions.get(primary_token).cloned() else {
            return Err(ApiError::Unauthorized);
        };

        let token = state.next_id("mock_platform");
        let expires_at = now + self.platform_token_ttl;
        state
            .platform_tokens
            .insert(token.clone(), IssuedPlatformToken { email, expires_at });

        Ok(PlatformTokenResponse {
            access_token: token,
            expires_at: expires_at.timestamp_millis(),
        })
    }

    async fn list_care_requests(&self, platform_token: &str) -> ApiResult<Vec<CareRequest>> {
        self.simulate_network().await?;

        let now = self.clock.now();
        let state = self.state();
        let email = state.owner_of_platform_token(platform_token, now)?;
        Ok(state
            .care_requests
            .iter()
            .filter(|(owner, _)| *owner == email)
            .map(|(_, cr)| cr.clone())
            .collect())
    }

    async fn create_care_request(
        &self,
        platform_token: &str,
        request: &NewCareRequest,
    ) -> ApiResult<CareRequest> {
        self.simulate_network().await?;

        let now = self.clock.now();
        let mut state = self.state();
        let email = state.owner_of_platform_token(platform_token, now)?;

        let id = state.next_id("cr");
        let care_request = CareRequest {
            id: id.clone(),
            request_type: request.request_type,
            title: request.title.clone(),
            last_message: None,
            is_locked: false,
            patient_unread_messages: false,
            patient_unread_referral_messages: false,
            providers: vec![],
            inbox_preview_title: request.request_type.label().to_string(),
        };
        let greeting = Message {
            id: state.next_id("msg"),
            text: "Thanks for reaching out. A member of your care team will reply shortly."
                .to_string(),
            author: Author {
                id: "system".to_string(),
                kind: AuthorKind::System,
                name: "Care Team".to_string(),
            },
            timestamp: now,
            attachments: vec![],
            reply_to: None,
            message_type: Some(MessageType::Text),
        };
        state.care_requests.push((email, care_request.clone()));
        state.stacks.insert(id, vec![greeting]);

        Ok(care_request)
    }

    async fn list_messages(
        &self,
        platform_token: &str,
        care_request_id: &str,
    ) -> ApiResult<Vec<Message>> {
        self.simulate_network().await?;

        let now = self.clock.now();
        let state = self.state();
        let email = state.owner_of_platform_token(platform_token, now)?;
        if !state.owns_request(&email, care_request_id) {
            return Err(ApiError::NotFound(format!("care request {}", care_request_id)));
        }
        let mut messages = state.stacks.get(care_request_id).cloned().unwrap_or_default();
        // Server order is not guaranteed
        messages.reverse();
        Ok(messages)
    }

    async fn send_message(
        &self,
        platform_token: &str,
        care_request_id: &str,
        message: &NewMessage,
    ) -> ApiResult<Message> {
        self.simulate_network().await?;

        let now = self.clock.now();
        let mut state = self.state();
        let email = state.owner_of_platform_token(platform_token, now)?;
        if !state.owns_request(&email, care_request_id) {
            return Err(ApiError::NotFound(format!("care request {}", care_request_id)));
        }
        let account = state
            .accounts
            .get(&email)
            .cloned()
            .ok_or(ApiError::Unauthorized)?;

        let message_type = if message
            .attachments
            .iter()
            .any(|a| matches!(a, crate::models::Attachment::Questionnaire { .. }))
        {
            MessageType::Questionnaire
        } else {
            MessageType::Text
        };
        let sent = Message {
            id: state.next_id("msg"),
            text: message.text.clone(),
            author: Author {
                id: account.user_id,
                kind: AuthorKind::Patient,
                name: account.name,
            },
            timestamp: now,
            attachments: message.attachments.clone(),
            reply_to: message.reply_to.clone(),
            message_type: Some(message_type),
        };
        state
            .stacks
            .entry(care_request_id.to_string())
            .or_default()
            .push(sent.clone());

        Ok(sent)
    }

    async fn list_question_sets(
        &self,
        platform_token: &str,
        care_request_id: &str,
    ) -> ApiResult<Vec<QuestionSet>> {
        self.simulate_network().await?;

        let now = self.clock.now();
        let state = self.state();
        state.owner_of_platform_token(platform_token, now)?;
        Ok(state
            .question_sets
            .get(care_request_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn list_referrals(
        &self,
        platform_token: &str,
        care_request_id: &str,
    ) -> ApiResult<Vec<Referral>> {
        self.simulate_network().await?;

        let now = self.clock.now();
        let state = self.state();
        state.owner_of_platform_token(platform_token, now)?;
        Ok(state.referrals.get(care_request_id).cloned().unwrap_or_default())
    }

    async fn update_question_set_status(
        &self,
        platform_token: &str,
        question_set_id: &str,
        status: ActivityStatus,
    ) -> ApiResult<()> {
        self.simulate_network().await?;

        let now = self.clock.now();
        let mut state = self.state();
        state.owner_of_platform_token(platform_token, now)?;
        let question_set = state
            .question_sets
            .values_mut()
            .flatten()
            .find(|qs| qs.id == question_set_id)
            .ok_or_else(|| ApiError::NotFound(format!("question set {}", question_set_id)))?;
        question_set.status = status;
        Ok(())
    }

    async fn mark_referral_message_read(
        &self,
        platform_token: &str,
        referral_message_id: &str,
    ) -> ApiResult<()> {
        self.simulate_network().await?;

        let now = self.clock.now();
        let mut state = self.state();
        state.owner_of_platform_token(platform_token, now)?;
        let referral = state
            .referrals
            .values_mut()
            .flatten()
            .find(|r| r.id == referral_message_id)
            .ok_or_else(|| ApiError::NotFound(format!("referral message {}", referral_message_id)))?;
        referral.unread_messages = false;
        Ok(())
    }
}

impl Default for MockBackend {
    fn default() -> Self {
        Self::new(Arc::new(SystemClock))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;

    #[tokio::test]
    async fn test_wrong_password_is_unauthorized() {
        let backend = MockBackend::default().with_account("Ann", "a@b.com", "pw");
        assert!(backend.create_session("a@b.com", "nope").await.unwrap_err().is_unauthorized());
        assert!(backend.create_session("x@b.com", "pw").await.unwrap_err().is_unauthorized());
        assert!(backend.create_session("a@b.com", "pw").await.is_ok());
        assert_eq!(backend.session_calls(), 3);
    }

    #[tokio::test]
    async fn test_platform_tokens_expire_with_clock() {
        let clock = Arc::new(ManualClock::default());
        let backend = MockBackend::new(clock.clone())
            .with_account("Ann", "a@b.com", "pw")
            .with_platform_token_ttl(Duration::minutes(5));

        let session = backend.create_session("a@b.com", "pw").await.unwrap();
        let token = backend.exchange_token(&session.token).await.unwrap();
        assert!(backend.list_care_requests(&token.access_token).await.is_ok());

        clock.advance(Duration::minutes(6));
        let err = backend.list_care_requests(&token.access_token).await.unwrap_err();
        assert!(err.is_unauthorized());
    }

    #[tokio::test]
    async fn test_exchange_requires_known_primary_token() {
        let backend = MockBackend::default();
        assert!(backend.exchange_token("forged").await.unwrap_err().is_unauthorized());
        assert_eq!(backend.exchange_calls(), 1);
    }

    #[tokio::test]
    async fn test_duplicate_signup_is_rejected() {
        let backend = MockBackend::default();
        backend.create_user("Ann", "a@b.com", "pw").await.unwrap();
        assert!(matches!(
            backend.create_user("Ann", "a@b.com", "pw").await,
            Err(ApiError::Status(StatusCode::UNPROCESSABLE_ENTITY, _))
        ));
    }

    #[tokio::test]
    async fn test_requests_are_scoped_to_owner() {
        let backend = MockBackend::default()
            .with_account("Ann", "ann@b.com", "pw")
            .with_account("Bob", "bob@b.com", "pw");

        let ann = backend.create_session("ann@b.com", "pw").await.unwrap();
        let ann_token = backend.exchange_token(&ann.token).await.unwrap().access_token;
        let created = backend
            .create_care_request(&ann_token, &NewCareRequest::new(CareRequestType::Injury))
            .await
            .unwrap();

        let bob = backend.create_session("bob@b.com", "pw").await.unwrap();
        let bob_token = backend.exchange_token(&bob.token).await.unwrap().access_token;
        assert!(backend.list_care_requests(&bob_token).await.unwrap().is_empty());
        assert!(matches!(
            backend.list_messages(&bob_token, &created.id).await,
            Err(ApiError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_offline_backend_is_unreachable() {
        let backend = MockBackend::default().with_account("Ann", "a@b.com", "pw");
        backend.set_offline(true);
        assert!(matches!(
            backend.create_session("a@b.com", "pw").await,
            Err(ApiError::Unreachable(_))
        ));
    }
}
