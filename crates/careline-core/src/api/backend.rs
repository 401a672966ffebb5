//! The data-source contract.
//!
//! Every backend endpoint the client consumes is one method here. Front ends
//! pick an implementation (`HttpBackend` or `MockBackend`) at construction
//! time instead of branching on a mode flag inside each call.

use crate::models::{
    ActivityStatus, CareRequest, Message, NewCareRequest, NewMessage, PlatformTokenResponse,
    QuestionSet, Referral, SessionResponse,
};

use super::ApiResult;

#[trait_variant::make(CareBackend: Send)]
pub trait LocalCareBackend {
    // ===== Member portal (primary token) =====

    /// Exchange email + password for a primary session token
    async fn create_session(&self, email: &str, password: &str) -> ApiResult<SessionResponse>;

    /// Register a new account
    async fn create_user(&self, name: &str, email: &str, password: &str) -> ApiResult<()>;

    /// Exchange a primary token for a short-lived platform token
    async fn exchange_token(&self, primary_token: &str) -> ApiResult<PlatformTokenResponse>;

    // ===== Patient API (platform token) =====

    async fn list_care_requests(&self, platform_token: &str) -> ApiResult<Vec<CareRequest>>;

    async fn create_care_request(
        &self,
        platform_token: &str,
        request: &NewCareRequest,
    ) -> ApiResult<CareRequest>;

    async fn list_messages(
        &self,
        platform_token: &str,
        care_request_id: &str,
    ) -> ApiResult<Vec<Message>>;

    async fn send_message(
        &self,
        platform_token: &str,
        care_request_id: &str,
        message: &NewMessage,
    ) -> ApiResult<Message>;

    async fn list_question_sets(
        &self,
        platform_token: &str,
        care_request_id: &str,
    ) -> ApiResult<Vec<QuestionSet>>;

    async fn list_referrals(
        &self,
        platform_token: &str,
        care_request_id: &str,
    ) -> ApiResult<Vec<Referral>>;

    async fn update_question_set_status(
        &self,
        platform_token: &str,
        question_set_id: &str,
        status: ActivityStatus,
    ) -> ApiResult<()>;

    async fn mark_referral_message_read(
        &self,
        platform_token: &str,
        referral_message_id: &str,
    ) -> ApiResult<()>;
}
