//! Token lifecycle authority.
//!
//! [`TokenManager`] is the only component that refreshes tokens or publishes
//! the bearer token. Everything that makes authenticated calls holds an
//! `Arc<TokenManager>` and asks it for a token.

use std::sync::Arc;

use tokio::sync::{watch, Mutex};
use tokio_stream::wrappers::WatchStream;

use super::device_flow::DeviceFlowClient;
use super::error::AuthError;
use super::store::TokenRepository;
use super::token::{TokenRecord, TokenResponse};

pub struct TokenManager {
    tokens: Arc<TokenRepository>,
    device_flow: Arc<DeviceFlowClient>,
    refresh_lock: Mutex<()>,
    bearer_tx: watch::Sender<Option<String>>,
}

impl TokenManager {
    pub fn new(tokens: Arc<TokenRepository>, device_flow: Arc<DeviceFlowClient>) -> Self {
        let (bearer_tx, _) = watch::channel(None);
        Self {
            tokens,
            device_flow,
            refresh_lock: Mutex::new(()),
            bearer_tx,
        }
    }

    pub fn tokens(&self) -> &Arc<TokenRepository> {
        &self.tokens
    }

    pub fn device_flow(&self) -> &Arc<DeviceFlowClient> {
        &self.device_flow
    }

    /// Load stored tokens at startup, refreshing if needed, and publish the
    /// resulting bearer.
    pub async fn initialize(&self) -> Option<String> {
        let token = self.get_valid_token().await;
        self.publish(token.clone());
        tracing::info!(logged_in = token.is_some(), "token manager initialized");
        token
    }

    /// A usable access token, or `None` if logged out or the refresh failed.
    pub async fn get_valid_token(&self) -> Option<String> {
        if !self.is_logged_in().await {
            return None;
        }
        let expired = match self.tokens.is_expired().await {
            Ok(expired) => expired,
            Err(e) => {
                tracing::warn!(error = %e, "failed to read token expiry");
                return None;
            }
        };
        if expired && !self.refresh_token().await {
            return None;
        }
        match self.tokens.access_token().await {
            Ok(token) => token,
            Err(e) => {
                tracing::warn!(error = %e, "failed to read access token");
                None
            }
        }
    }

    /// Refresh the access token if it is still expired once the refresh lock
    /// is held.
    ///
    /// At most one refresh request is in flight at a time. Callers that
    /// queued behind a successful refresh return `true` without a request.
    /// A rejected refresh, or one whose result cannot be stored, clears all
    /// stored tokens.
    pub async fn refresh_token(&self) -> bool {
        let _guard = self.refresh_lock.lock().await;
        match self.tokens.is_expired().await {
            Ok(false) => {
                tracing::debug!("token already refreshed by another caller");
                return true;
            }
            Ok(true) => {}
            Err(e) => {
                tracing::warn!(error = %e, "failed to read token expiry");
                return false;
            }
        }
        self.refresh_locked().await
    }

    /// Force a refresh after a downstream 401, ignoring the recorded expiry.
    ///
    /// If the access token changed while waiting for the refresh lock, some
    /// other caller already refreshed and this returns `true` immediately.
    pub async fn handle_unauthorized(&self) -> bool {
        let seen = self.tokens.access_token().await.ok().flatten();
        let _guard = self.refresh_lock.lock().await;
        let current = self.tokens.access_token().await.ok().flatten();
        if current.is_some() && current != seen {
            tracing::debug!("token replaced while waiting; skipping forced refresh");
            return true;
        }
        tracing::info!("forcing token refresh after unauthorized response");
        self.refresh_locked().await
    }

    /// Persist a freshly issued token and publish its bearer.
    pub async fn complete_login(&self, response: &TokenResponse) -> Result<TokenRecord, AuthError> {
        let record = self.tokens.save(response).await?;
        self.publish(Some(record.access_token.clone()));
        tracing::info!("login completed");
        Ok(record)
    }

    /// Clear stored tokens and the published bearer.
    ///
    /// Waits for an in-flight refresh so its result cannot land afterwards.
    /// The bearer is cleared even if the store fails.
    pub async fn logout(&self) -> Result<(), AuthError> {
        let _guard = self.refresh_lock.lock().await;
        let result = self.tokens.clear().await;
        self.publish(None);
        tracing::info!("logged out");
        result
    }

    pub async fn is_logged_in(&self) -> bool {
        match self.tokens.is_logged_in().await {
            Ok(logged_in) => logged_in,
            Err(e) => {
                tracing::warn!(error = %e, "failed to read login state");
                false
            }
        }
    }

    /// Currently published bearer token.
    pub fn bearer(&self) -> Option<String> {
        self.bearer_tx.borrow().clone()
    }

    /// Published bearer: the current value, then every change.
    pub fn watch_bearer(&self) -> WatchStream<Option<String>> {
        WatchStream::new(self.bearer_tx.subscribe())
    }

    // Caller must hold `refresh_lock`.
    async fn refresh_locked(&self) -> bool {
        let refresh_token = match self.tokens.refresh_token().await {
            Ok(Some(token)) => token,
            Ok(None) => {
                tracing::debug!("no refresh token stored");
                return false;
            }
            Err(e) => {
                tracing::warn!(error = %e, "failed to read refresh token");
                return false;
            }
        };

        let response = match self.device_flow.refresh_token(&refresh_token).await {
            Ok(response) => response,
            Err(e) => {
                tracing::warn!(error = %e, "refresh rejected; clearing tokens");
                self.drop_tokens().await;
                return false;
            }
        };

        match self.tokens.save(&response).await {
            Ok(record) => {
                self.publish(Some(record.access_token));
                tracing::info!(expires_at_ms = ?record.expires_at_ms, "access token refreshed");
                true
            }
            Err(e) => {
                // Same as a rejection: queued callers find no refresh token.
                tracing::warn!(error = %e, "failed to persist refreshed token; clearing tokens");
                self.drop_tokens().await;
                false
            }
        }
    }

    async fn drop_tokens(&self) {
        self.publish(None);
        if let Err(e) = self.tokens.clear().await {
            tracing::warn!(error = %e, "failed to clear tokens");
        }
    }

    fn publish(&self, bearer: Option<String>) {
        self.bearer_tx.send_if_modified(|current| {
            if *current == bearer {
                return false;
            }
            *current = bearer;
            true
        });
    }
}
