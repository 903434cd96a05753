//! Device-code flow against the TV OAuth endpoints.

use std::str::FromStr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures::stream::BoxStream;

use super::clock::{Clock, SystemClock};
use super::credentials::{redact, CredentialDiscovery, OAuthCredentials};
use super::device_code::{DeviceCodeResponse, DeviceCodeSession, PollOutcome};
use super::error::AuthError;
use super::token::{OAuthErrorCode, TokenErrorResponse, TokenResponse};

pub const DEFAULT_DEVICE_CODE_URL: &str = "https://www.youtube.com/o/oauth2/device/code";
pub const DEFAULT_TOKEN_URL: &str = "https://www.youtube.com/o/oauth2/token";
pub const DEFAULT_SCOPE: &str = "https://www.googleapis.com/auth/youtube";

const GRANT_TYPE_DEVICE_CODE: &str = "http://oauth.net/grant_type/device/1.0";
const GRANT_TYPE_REFRESH: &str = "refresh_token";

/// Flat extra delay applied once per `slow_down` response.
pub const SLOW_DOWN_DELAY: Duration = Duration::from_secs(5);

/// OAuth device-code client.
///
/// Client credentials come from a [`CredentialDiscovery`] and are cached in
/// memory for the lifetime of the client. The cache is a plain
/// read-or-fetch: two concurrent first calls may both fetch, which is harmless.
///
/// # Example
/// ```no_run
/// use std::sync::Arc;
/// use tubeauth::auth::{DeviceFlowClient, WebCredentialDiscovery};
///
/// # async fn example() -> Result<(), tubeauth::auth::AuthError> {
/// let http = reqwest::Client::new();
/// let discovery = Arc::new(WebCredentialDiscovery::new(http.clone()));
/// let client = DeviceFlowClient::new(discovery).with_client(http);
/// let session = client.request_device_code().await?;
/// println!("Visit {} and enter {}", session.verification_url, session.user_code);
/// # Ok(())
/// # }
/// ```
pub struct DeviceFlowClient {
    client: reqwest::Client,
    device_code_url: String,
    token_url: String,
    scope: String,
    discovery: Arc<dyn CredentialDiscovery>,
    clock: Arc<dyn Clock>,
    cached_credentials: Mutex<Option<OAuthCredentials>>,
}

impl DeviceFlowClient {
    pub fn new(discovery: Arc<dyn CredentialDiscovery>) -> Self {
        Self {
            client: reqwest::Client::new(),
            device_code_url: DEFAULT_DEVICE_CODE_URL.to_string(),
            token_url: DEFAULT_TOKEN_URL.to_string(),
            scope: DEFAULT_SCOPE.to_string(),
            discovery,
            clock: Arc::new(SystemClock),
            cached_credentials: Mutex::new(None),
        }
    }

    pub fn with_client(mut self, client: reqwest::Client) -> Self {
        self.client = client;
        self
    }

    pub fn with_device_code_url(mut self, url: impl Into<String>) -> Self {
        self.device_code_url = url.into();
        self
    }

    pub fn with_token_url(mut self, url: impl Into<String>) -> Self {
        self.token_url = url.into();
        self
    }

    pub fn with_scope(mut self, scope: impl Into<String>) -> Self {
        self.scope = scope.into();
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Request a device code and user code for a new login attempt.
    pub async fn request_device_code(&self) -> Result<DeviceCodeSession, AuthError> {
        let credentials = self.credentials().await?;
        tracing::debug!(client_id = %redact(&credentials.client_id), "requesting device code");
        let resp = self
            .client
            .post(&self.device_code_url)
            .form(&[
                ("client_id", credentials.client_id.as_str()),
                ("scope", self.scope.as_str()),
            ])
            .send()
            .await
            .map_err(|e| AuthError::DeviceCode(e.to_string()))?;
        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            tracing::warn!(%status, body = %body, "device code request rejected");
            return Err(AuthError::DeviceCode(format!(
                "request failed with status {status}"
            )));
        }
        let payload: DeviceCodeResponse = resp
            .json()
            .await
            .map_err(|e| AuthError::DeviceCode(format!("invalid response: {e}")))?;
        let expires_in_ms = i64::try_from(payload.expires_in)
            .unwrap_or(i64::MAX)
            .saturating_mul(1000);
        Ok(DeviceCodeSession {
            device_code: payload.device_code,
            user_code: payload.user_code,
            verification_url: payload.verification_url,
            interval_secs: payload.interval,
            expires_in_secs: payload.expires_in,
            expires_at_ms: self.clock.now_ms().saturating_add(expires_in_ms),
        })
    }

    /// Poll the token endpoint until a terminal outcome.
    ///
    /// Each iteration sleeps `interval_secs` and then polls once. The stream
    /// yields [`PollOutcome::Pending`] for every non-terminal response and
    /// ends right after the first terminal outcome. When the
    /// `expires_in_secs` deadline passes without one, it yields
    /// [`PollOutcome::Expired`]. Dropping the stream cancels any in-flight
    /// request.
    pub fn poll_for_token(
        &self,
        device_code: &str,
        interval_secs: u64,
        expires_in_secs: u64,
    ) -> BoxStream<'_, PollOutcome> {
        let device_code = device_code.to_string();
        let interval = Duration::from_secs(interval_secs);
        let expires_in_ms = i64::try_from(expires_in_secs)
            .unwrap_or(i64::MAX)
            .saturating_mul(1000);
        let stream = async_stream::stream! {
            let deadline = self.clock.now_ms().saturating_add(expires_in_ms);
            let credentials = match self.credentials().await {
                Ok(credentials) => credentials,
                Err(e) => {
                    tracing::warn!(error = %e, "no credentials for polling");
                    yield PollOutcome::Error(format!("Failed to get credentials: {e}"));
                    return;
                }
            };

            while self.clock.now_ms() < deadline {
                self.clock.sleep(interval).await;

                let body = match self.exchange_device_code(&credentials, &device_code).await {
                    Ok(body) => body,
                    Err(e) => {
                        tracing::warn!(error = %e, "token poll failed");
                        yield PollOutcome::Error(e.to_string());
                        return;
                    }
                };

                match classify_poll_body(&body) {
                    PollStep::Pending => {
                        tracing::debug!("authorization pending");
                        yield PollOutcome::Pending;
                    }
                    PollStep::SlowDown => {
                        tracing::debug!("slow_down requested");
                        self.clock.sleep(SLOW_DOWN_DELAY).await;
                        yield PollOutcome::Pending;
                    }
                    PollStep::Done(outcome) => {
                        tracing::debug!(outcome = %poll_label(&outcome), "poll finished");
                        yield outcome;
                        return;
                    }
                }
            }

            tracing::debug!("device code deadline reached");
            yield PollOutcome::Expired;
        };
        Box::pin(stream)
    }

    /// Exchange a refresh token for a new access token.
    pub async fn refresh_token(&self, refresh_token: &str) -> Result<TokenResponse, AuthError> {
        let credentials = self.credentials().await?;
        tracing::debug!("refreshing access token");
        let resp = self
            .client
            .post(&self.token_url)
            .form(&[
                ("client_id", credentials.client_id.as_str()),
                ("client_secret", credentials.client_secret.as_str()),
                ("refresh_token", refresh_token),
                ("grant_type", GRANT_TYPE_REFRESH),
            ])
            .send()
            .await
            .map_err(|e| AuthError::Refresh(e.to_string()))?;
        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            tracing::warn!(%status, body = %body, "token refresh rejected");
            return Err(AuthError::Refresh(format!(
                "request failed with status {status}"
            )));
        }
        resp.json::<TokenResponse>()
            .await
            .map_err(|e| AuthError::Refresh(format!("invalid response: {e}")))
    }

    /// Forget cached client credentials; the next call re-discovers them.
    pub fn clear_credentials_cache(&self) {
        if let Ok(mut guard) = self.cached_credentials.lock() {
            *guard = None;
        }
    }

    pub fn has_cached_credentials(&self) -> bool {
        self.read_cached_credentials().is_some()
    }

    async fn credentials(&self) -> Result<OAuthCredentials, AuthError> {
        if let Some(cached) = self.read_cached_credentials() {
            return Ok(cached);
        }
        let credentials = self.discovery.fetch_credentials().await?;
        self.write_cached_credentials(credentials.clone());
        Ok(credentials)
    }

    fn read_cached_credentials(&self) -> Option<OAuthCredentials> {
        self.cached_credentials.lock().ok()?.clone()
    }

    fn write_cached_credentials(&self, credentials: OAuthCredentials) {
        if let Ok(mut guard) = self.cached_credentials.lock() {
            *guard = Some(credentials);
        }
    }

    async fn exchange_device_code(
        &self,
        credentials: &OAuthCredentials,
        device_code: &str,
    ) -> Result<String, AuthError> {
        // The endpoint reports OAuth errors in the body, sometimes with 200 and
        // sometimes with 4xx, so the status is not inspected here.
        let resp = self
            .client
            .post(&self.token_url)
            .form(&[
                ("client_id", credentials.client_id.as_str()),
                ("client_secret", credentials.client_secret.as_str()),
                ("code", device_code),
                ("grant_type", GRANT_TYPE_DEVICE_CODE),
            ])
            .send()
            .await
            .map_err(|e| AuthError::Poll(e.to_string()))?;
        resp.text().await.map_err(|e| AuthError::Poll(e.to_string()))
    }
}

/// Classification of one token-endpoint poll body.
#[derive(Debug, Clone, PartialEq, Eq)]
enum PollStep {
    Pending,
    SlowDown,
    Done(PollOutcome),
}

fn classify_poll_body(body: &str) -> PollStep {
    if let Ok(error) = serde_json::from_str::<TokenErrorResponse>(body) {
        return match OAuthErrorCode::from_str(&error.error) {
            Ok(OAuthErrorCode::AuthorizationPending) => PollStep::Pending,
            Ok(OAuthErrorCode::SlowDown) => PollStep::SlowDown,
            Ok(OAuthErrorCode::ExpiredToken) => PollStep::Done(PollOutcome::Expired),
            Ok(OAuthErrorCode::AccessDenied) => {
                PollStep::Done(PollOutcome::Error("Access denied by user".to_string()))
            }
            Err(_) => {
                tracing::warn!(error = %error.error, "unexpected token poll error");
                PollStep::Done(PollOutcome::Error(
                    error
                        .error_description
                        .unwrap_or_else(|| format!("Unknown error: {}", error.error)),
                ))
            }
        };
    }
    match serde_json::from_str::<TokenResponse>(body) {
        Ok(token) => PollStep::Done(PollOutcome::Success(token)),
        Err(_) => PollStep::Done(PollOutcome::Error(
            "Failed to parse server response".to_string(),
        )),
    }
}

fn poll_label(outcome: &PollOutcome) -> &'static str {
    match outcome {
        PollOutcome::Pending => "pending",
        PollOutcome::Success(_) => "success",
        PollOutcome::Error(_) => "error",
        PollOutcome::Expired => "expired",
    }
}
