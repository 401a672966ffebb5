//! HTTP data source for the member portal and patient API.
//!
//! Primary-token calls authenticate with `Authorization: Bearer`; platform
//! calls use the dedicated `X-Care-Platform-Authenticate` header.

use std::time::Duration;

use reqwest::{Client, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use tracing::{debug, warn};

use crate::config::Config;
use crate::models::{
    ActivityStatus, CareRequest, CareRequestResponse, CareRequestsResponse, LoginRequest, Message,
    MessageResponse, MessagesResponse, NewCareRequest, NewMessage, PlatformTokenResponse,
    QuestionSet, QuestionSetStatusBody, QuestionSetsResponse, Referral, ReferralsResponse,
    SendMessageBody, SessionResponse, SignupRequest,
};

use super::{ApiError, ApiResult, CareBackend};

// ============================================================================
// Constants
// ============================================================================

/// Header carrying the platform token on patient API calls
pub const PLATFORM_AUTH_HEADER: &str = "X-Care-Platform-Authenticate";

/// Maximum number of retries for rate-limited (429) requests.
const MAX_RATE_LIMIT_RETRIES: u32 = 3;

/// Initial backoff delay in milliseconds for rate limiting.
const INITIAL_BACKOFF_MS: u64 = 1000;

/// HTTP backend. Clone is cheap - reqwest::Client uses Arc internally for connection pooling.
#[derive(Clone)]
pub struct HttpBackend {
    client: Client,
    member_portal_url: String,
    patient_api_url: String,
    initial_backoff: Duration,
}

impl HttpBackend {
    pub fn new(
        member_portal_url: impl Into<String>,
        patient_api_url: impl Into<String>,
        timeout: Duration,
    ) -> ApiResult<Self> {
        let client = Client::builder().timeout(timeout).build()?;

        Ok(Self {
            client,
            member_portal_url: member_portal_url.into().trim_end_matches('/').to_string(),
            patient_api_url: patient_api_url.into().trim_end_matches('/').to_string(),
            initial_backoff: Duration::from_millis(INITIAL_BACKOFF_MS),
        })
    }

    pub fn from_config(config: &Config) -> ApiResult<Self> {
        Self::new(
            config.member_portal_url.clone(),
            config.patient_api_url.clone(),
            config.request_timeout(),
        )
    }

    fn member_url(&self, path: &str) -> String {
        format!("{}{}", self.member_portal_url, path)
    }

    fn patient_url(&self, path: &str) -> String {
        format!("{}{}", self.patient_api_url, path)
    }

    /// Send a request, backing off and retrying while the server answers 429.
    /// Any other non-2xx status becomes an `ApiError` carrying the body.
    async fn execute<F>(&self, url: &str, build: F) -> ApiResult<Response>
    where
        F: Fn() -> RequestBuilder,
    {
        let mut retries = 0;
        let mut backoff = self.initial_backoff;

        loop {
            let response = build().send().await?;
            let status = response.status();

            if status.is_success() {
                return Ok(response);
            }

            if status.as_u16() == 429 {
                retries += 1;
                if retries > MAX_RATE_LIMIT_RETRIES {
                    return Err(ApiError::RateLimited);
                }
                warn!(
                    url = url,
                    retry = retries,
                    backoff_ms = backoff.as_millis() as u64,
                    "Rate limited, backing off"
                );
                tokio::time::sleep(backoff).await;
                backoff *= 2; // Exponential backoff
                continue;
            }

            let body = response.text().await.unwrap_or_default();
            debug!(url = url, status = %status, "Request failed");
            return Err(ApiError::from_status(status, &body));
        }
    }

    /// Decode a JSON body, reporting shape mismatches as `InvalidResponse`.
    async fn read_json<T: DeserializeOwned>(response: Response, url: &str) -> ApiResult<T> {
        let text = response.text().await?;
        serde_json::from_str(&text).map_err(|e| {
            ApiError::InvalidResponse(format!("Failed to parse JSON response from {}: {}", url, e))
        })
    }

    async fn platform_get<T: DeserializeOwned>(&self, token: &str, url: &str) -> ApiResult<T> {
        let response = self
            .execute(url, || {
                self.client
                    .get(url)
                    .header(PLATFORM_AUTH_HEADER, token)
                    .header(reqwest::header::ACCEPT, "application/json")
            })
            .await?;
        Self::read_json(response, url).await
    }
}

impl CareBackend for HttpBackend {
    async fn create_session(&self, email: &str, password: &str) -> ApiResult<SessionResponse> {
        let url = self.member_url("/session");
        let body = LoginRequest { email, password };
        let response = self
            .execute(&url, || self.client.post(&url).json(&body))
            .await?;
        Self::read_json(response, &url).await
    }

    async fn create_user(&self, name: &str, email: &str, password: &str) -> ApiResult<()> {
        let url = self.member_url("/users");
        let body = SignupRequest {
            name,
            email,
            password,
        };
        self.execute(&url, || self.client.post(&url).json(&body))
            .await?;
        Ok(())
    }

    async fn exchange_token(&self, primary_token: &str) -> ApiResult<PlatformTokenResponse> {
        let url = self.member_url("/care_requests/get_token");
        let response = self
            .execute(&url, || self.client.get(&url).bearer_auth(primary_token))
            .await?;
        Self::read_json(response, &url).await
    }

    async fn list_care_requests(&self, platform_token: &str) -> ApiResult<Vec<CareRequest>> {
        let url = self.patient_url("/care_requests");
        let parsed: CareRequestsResponse = self.platform_get(platform_token, &url).await?;
        Ok(parsed.care_requests.care_requests)
    }

    async fn create_care_request(
        &self,
        platform_token: &str,
        request: &NewCareRequest,
    ) -> ApiResult<CareRequest> {
        let url = self.patient_url("/care_requests");
        let response = self
            .execute(&url, || {
                self.client
                    .post(&url)
                    .header(PLATFORM_AUTH_HEADER, platform_token)
                    .json(request)
            })
            .await?;
        let parsed: CareRequestResponse = Self::read_json(response, &url).await?;
        Ok(parsed.care_request)
    }

    async fn list_messages(
        &self,
        platform_token: &str,
        care_request_id: &str,
    ) -> ApiResult<Vec<Message>> {
        let url = self.patient_url(&format!("/care_requests/{}/stacks", care_request_id));
        let parsed: MessagesResponse = self.platform_get(platform_token, &url).await?;
        Ok(parsed.messages)
    }

    async fn send_message(
        &self,
        platform_token: &str,
        care_request_id: &str,
        message: &NewMessage,
    ) -> ApiResult<Message> {
        let url = self.patient_url(&format!("/care_requests/{}/stacks", care_request_id));
        let body = SendMessageBody { message };
        let response = self
            .execute(&url, || {
                self.client
                    .post(&url)
                    .header(PLATFORM_AUTH_HEADER, platform_token)
                    .json(&body)
            })
            .await?;
        let parsed: MessageResponse = Self::read_json(response, &url).await?;
        Ok(parsed.message)
    }

    async fn list_question_sets(
        &self,
        platform_token: &str,
        care_request_id: &str,
    ) -> ApiResult<Vec<QuestionSet>> {
        let url = self.patient_url(&format!("/care_requests/{}/question_sets", care_request_id));
        let parsed: QuestionSetsResponse = self.platform_get(platform_token, &url).await?;
        Ok(parsed.question_sets)
    }

    async fn list_referrals(
        &self,
        platform_token: &str,
        care_request_id: &str,
    ) -> ApiResult<Vec<Referral>> {
        let url = self.patient_url(&format!("/care_requests/{}/referrals", care_request_id));
        let parsed: ReferralsResponse = self.platform_get(platform_token, &url).await?;
        Ok(parsed.referrals)
    }

    async fn update_question_set_status(
        &self,
        platform_token: &str,
        question_set_id: &str,
        status: ActivityStatus,
    ) -> ApiResult<()> {
        let url = self.patient_url(&format!("/question_sets/{}", question_set_id));
        let body = QuestionSetStatusBody { status };
        self.execute(&url, || {
            self.client
                .patch(&url)
                .header(PLATFORM_AUTH_HEADER, platform_token)
                .json(&body)
        })
        .await?;
        Ok(())
    }

    async fn mark_referral_message_read(
        &self,
        platform_token: &str,
        referral_message_id: &str,
    ) -> ApiResult<()> {
        let url = self.patient_url(&format!("/referral_messages/{}/mark_read", referral_message_id));
        self.execute(&url, || {
            self.client
                .post(&url)
                .header(PLATFORM_AUTH_HEADER, platform_token)
        })
        .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::StatusCode;
    use std::sync::{Arc, Mutex};
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::{TcpListener, TcpStream};

    /// Minimal HTTP/1.1 server answering each connection with the next canned
    /// response and recording the raw request text.
    struct StubServer {
        base_url: String,
        requests: Arc<Mutex<Vec<String>>>,
    }

    impl StubServer {
        async fn start(responses: Vec<(u16, &'static str)>) -> Self {
            let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
            let base_url = format!("http://{}", listener.local_addr().unwrap());
            let requests = Arc::new(Mutex::new(Vec::new()));

            let recorded = requests.clone();
            tokio::spawn(async move {
                for (status, body) in responses {
                    let Ok((mut stream, _)) = listener.accept().await else {
                        return;
                    };
                    let request = read_request(&mut stream).await;
                    recorded.lock().unwrap().push(request);
                    let reply = format!(
                        "HTTP/1.1 {} Stub\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                        status,
                        body.len(),
                        body
                    );
                    let _ = stream.write_all(reply.as_bytes()).await;
                    let _ = stream.shutdown().await;
                }
            });

            Self { base_url, requests }
        }

        fn backend(&self) -> HttpBackend {
            let mut backend = HttpBackend::new(
                format!("{}/member_portal/api", self.base_url),
                format!("{}/patient_api", self.base_url),
                Duration::from_secs(5),
            )
            .unwrap();
            backend.initial_backoff = Duration::from_millis(1);
            backend
        }

        fn requests(&self) -> Vec<String> {
            self.requests.lock().unwrap().clone()
        }
    }

    /// Read the head and, if announced, the body of one request.
    async fn read_request(stream: &mut TcpStream) -> String {
        let mut raw = Vec::new();
        let mut buf = [0u8; 1024];
        loop {
            let n = stream.read(&mut buf).await.unwrap_or(0);
            if n == 0 {
                break;
            }
            raw.extend_from_slice(&buf[..n]);

            let text = String::from_utf8_lossy(&raw);
            if let Some(head_end) = text.find("\r\n\r\n") {
                let content_length = text[..head_end]
                    .lines()
                    .filter_map(|line| line.split_once(':'))
                    .find(|(name, _)| name.eq_ignore_ascii_case("content-length"))
                    .and_then(|(_, value)| value.trim().parse::<usize>().ok())
                    .unwrap_or(0);
                if raw.len() >= head_end + 4 + content_length {
                    break;
                }
            }
        }
        String::from_utf8_lossy(&raw).to_lowercase()
    }

    const MESSAGE_BODY: &str = r#"{"message":{"id":"m_1","text":"Hello","author":{"id":"u_1","type":"patient","name":"Ann"},"timestamp":"2025-03-01T10:00:00Z"}}"#;

    #[tokio::test]
    async fn test_token_exchange_uses_bearer_auth() {
        let server = StubServer::start(vec![(200, r#"{"access_token":"pt_1","expires_at":1740823200000}"#)]).await;

        let token = server.backend().exchange_token("primary_1").await.unwrap();
        assert_eq!(token.access_token, "pt_1");
        assert_eq!(token.expires_at, 1_740_823_200_000);

        let requests = server.requests();
        assert_eq!(requests.len(), 1);
        assert!(requests[0].starts_with("get /member_portal/api/care_requests/get_token "));
        assert!(requests[0].contains("authorization: bearer primary_1"));
        assert!(!requests[0].contains("x-care-platform-authenticate"));
    }

    #[tokio::test]
    async fn test_patient_calls_use_platform_header() {
        let server = StubServer::start(vec![(200, r#"{"care_requests":{"careRequests":[]}}"#)]).await;

        let requests = server.backend().list_care_requests("pt_1").await.unwrap();
        assert!(requests.is_empty());

        let seen = server.requests();
        assert!(seen[0].starts_with("get /patient_api/care_requests "));
        assert!(seen[0].contains("x-care-platform-authenticate: pt_1"));
        assert!(!seen[0].contains("authorization:"));
    }

    #[tokio::test]
    async fn test_send_message_decodes_envelope() {
        let server = StubServer::start(vec![(200, MESSAGE_BODY)]).await;

        let sent = server
            .backend()
            .send_message("pt_1", "cr_1", &NewMessage::text("Hello"))
            .await
            .unwrap();
        assert_eq!(sent.id, "m_1");
        assert_eq!(sent.author.name, "Ann");

        let seen = server.requests();
        assert!(seen[0].starts_with("post /patient_api/care_requests/cr_1/stacks "));
        assert!(seen[0].contains("\"message\""));
        assert!(seen[0].contains("hello"));
    }

    #[tokio::test]
    async fn test_rate_limit_retries_then_succeeds() {
        let server = StubServer::start(vec![(429, ""), (429, ""), (200, MESSAGE_BODY)]).await;

        let sent = server
            .backend()
            .send_message("pt_1", "cr_1", &NewMessage::text("Hello"))
            .await
            .unwrap();
        assert_eq!(sent.id, "m_1");
        assert_eq!(server.requests().len(), 3);
    }

    #[tokio::test]
    async fn test_rate_limit_gives_up_after_max_retries() {
        let responses = vec![(429, ""); MAX_RATE_LIMIT_RETRIES as usize + 1];
        let server = StubServer::start(responses).await;

        let result = server.backend().list_care_requests("pt_1").await;
        assert!(matches!(result, Err(ApiError::RateLimited)));
        assert_eq!(server.requests().len(), MAX_RATE_LIMIT_RETRIES as usize + 1);
    }

    #[tokio::test]
    async fn test_malformed_body_is_invalid_response() {
        let server = StubServer::start(vec![(200, r#"{"care_requests":"nope"}"#)]).await;

        let result = server.backend().list_care_requests("pt_1").await;
        assert!(matches!(result, Err(ApiError::InvalidResponse(_))));
    }

    #[tokio::test]
    async fn test_error_status_carries_body() {
        let server = StubServer::start(vec![
            (401, r#"{"error":"expired"}"#),
            (409, r#"{"error":"already closed"}"#),
        ])
        .await;
        let backend = server.backend();

        let expired = backend.list_care_requests("pt_1").await.unwrap_err();
        assert!(expired.is_unauthorized());

        let conflict = backend
            .mark_referral_message_read("pt_1", "rm_1")
            .await
            .unwrap_err();
        assert!(
            matches!(conflict, ApiError::Status(StatusCode::CONFLICT, ref body) if body.contains("already closed"))
        );
    }

    #[test]
    fn test_urls_are_joined_without_double_slashes() {
        let backend = HttpBackend::new(
            "https://api.example.com/member_portal/api/",
            "https://api.example.com/patient_api",
            Duration::from_secs(5),
        )
        .unwrap();

        assert_eq!(
            backend.member_url("/care_requests/get_token"),
            "https://api.example.com/member_portal/api/care_requests/get_token"
        );
        assert_eq!(
            backend.patient_url("/care_requests/cr_1/stacks"),
            "https://api.example.com/patient_api/care_requests/cr_1/stacks"
        );
    }
}
