//! Care request, messaging, and activity calls against the patient API.

use std::future::Future;
use std::sync::Arc;

use tracing::{debug, warn};

use crate::api::{ApiError, CareBackend};
use crate::error::{CareError, CareResult};
use crate::models::{
    sort_newest_first, Activity, ActivityStatus, CareRequest, CareRequestType, Message,
    NewCareRequest, NewMessage,
};
use crate::platform::TokenBroker;

/// Authenticated access to the patient API.
///
/// Every call carries a platform token from the broker. A 401 forces one
/// token refresh and a single retry; a second 401 is reported as
/// `CareError::Authentication`.
pub struct CareClient<B>
where
    B: CareBackend,
{
    backend: Arc<B>,
    broker: Arc<TokenBroker<B>>,
}

impl<B> CareClient<B>
where
    B: CareBackend,
{
    pub fn new(backend: Arc<B>, broker: Arc<TokenBroker<B>>) -> Self {
        Self { backend, broker }
    }

    /// Run `call` with a platform token, refreshing and retrying once on 401.
    async fn with_platform_token<T, F, Fut>(&self, call: F) -> CareResult<T>
    where
        F: Fn(String) -> Fut,
        Fut: Future<Output = Result<T, ApiError>>,
    {
        let token = self.broker.token().await?;
        match call(token.clone()).await {
            Ok(value) => Ok(value),
            Err(ApiError::Unauthorized) => {
                debug!("Platform token rejected, refreshing and retrying once");
                let fresh = self.broker.refresh_rejected(&token).await?;
                call(fresh).await.map_err(|e| {
                    if e.is_unauthorized() {
                        warn!("Platform token rejected after refresh");
                    }
                    CareError::from_api(e)
                })
            }
            Err(e) => Err(CareError::from_api(e)),
        }
    }

    // ===== Care requests =====

    pub async fn list_care_requests(&self) -> CareResult<Vec<CareRequest>> {
        self.with_platform_token(|token| async move {
            self.backend.list_care_requests(&token).await
        })
        .await
    }

    pub async fn create_care_request(&self, request_type: CareRequestType) -> CareResult<CareRequest> {
        let request = NewCareRequest::new(request_type);
        let created = self
            .with_platform_token(|token| {
                let request = &request;
                async move { self.backend.create_care_request(&token, request).await }
            })
            .await?;
        debug!(care_request_id = %created.id, request_type = %request_type, "Care request created");
        Ok(created)
    }

    // ===== Messages =====

    /// Messages in server order. Use `models::sort_chronologically` before
    /// display.
    pub async fn list_messages(&self, care_request_id: &str) -> CareResult<Vec<Message>> {
        self.with_platform_token(|token| async move {
            self.backend.list_messages(&token, care_request_id).await
        })
        .await
    }

    /// Post to a care request's stack. Questionnaire attachments must be
    /// fully answered; that is checked before anything is sent.
    pub async fn send_message(&self, care_request_id: &str, message: NewMessage) -> CareResult<Message> {
        message.validate()?;
        self.with_platform_token(|token| {
            let message = &message;
            async move {
                self.backend
                    .send_message(&token, care_request_id, message)
                    .await
            }
        })
        .await
    }

    // ===== Activities =====

    /// Question sets and referrals across all care requests, newest first.
    ///
    /// A request whose sub-resources cannot be fetched is skipped rather than
    /// failing the whole feed.
    pub async fn list_activities(&self) -> CareResult<Vec<Activity>> {
        let care_requests = self.list_care_requests().await?;
        let mut activities = Vec::new();

        for request in &care_requests {
            let id = request.id.as_str();

            match self
                .with_platform_token(|token| async move {
                    self.backend.list_question_sets(&token, id).await
                })
                .await
            {
                Ok(sets) => activities.extend(sets.iter().map(Activity::from)),
                Err(e) => warn!(care_request_id = id, error = %e, "Failed to fetch question sets"),
            }

            match self
                .with_platform_token(|token| async move {
                    self.backend.list_referrals(&token, id).await
                })
                .await
            {
                Ok(referrals) => activities.extend(referrals.iter().map(Activity::from)),
                Err(e) => warn!(care_request_id = id, error = %e, "Failed to fetch referrals"),
            }
        }

        sort_newest_first(&mut activities);
        Ok(activities)
    }

    pub async fn update_question_set_status(
        &self,
        question_set_id: &str,
        status: ActivityStatus,
    ) -> CareResult<()> {
        self.with_platform_token(|token| async move {
            self.backend
                .update_question_set_status(&token, question_set_id, status)
                .await
        })
        .await
    }

    pub async fn mark_referral_message_read(&self, referral_message_id: &str) -> CareResult<()> {
        self.with_platform_token(|token| async move {
            self.backend
                .mark_referral_message_read(&token, referral_message_id)
                .await
        })
        .await
    }
}
