//! HTTP client that attaches the bearer token from [`TokenManager`].

pub mod account;

use std::sync::Arc;

use reqwest::{RequestBuilder, Response, StatusCode};

use crate::auth::error::AuthError;
use crate::auth::manager::TokenManager;

pub use account::{fetch_account_info, AccountInfo};

/// Sends requests with `Authorization: Bearer <token>`.
///
/// A 401 triggers one forced refresh through
/// [`TokenManager::handle_unauthorized`] and a single retry. Further 401s are
/// returned to the caller as-is.
#[derive(Clone)]
pub struct AuthorizedClient {
    client: reqwest::Client,
    manager: Arc<TokenManager>,
}

impl AuthorizedClient {
    pub fn new(client: reqwest::Client, manager: Arc<TokenManager>) -> Self {
        Self { client, manager }
    }

    pub fn manager(&self) -> &Arc<TokenManager> {
        &self.manager
    }

    /// Build and send a request. `build` may run twice, so it must produce
    /// the same request each time.
    pub async fn send<F>(&self, build: F) -> Result<Response, AuthError>
    where
        F: Fn(&reqwest::Client) -> RequestBuilder,
    {
        let token = self
            .manager
            .get_valid_token()
            .await
            .ok_or(AuthError::NotLoggedIn)?;
        let resp = self.send_with(&build, &token).await?;
        if resp.status() != StatusCode::UNAUTHORIZED {
            return Ok(resp);
        }

        tracing::debug!("request unauthorized; refreshing and retrying once");
        if !self.manager.handle_unauthorized().await {
            return Err(AuthError::NotLoggedIn);
        }
        let token = self
            .manager
            .get_valid_token()
            .await
            .ok_or(AuthError::NotLoggedIn)?;
        self.send_with(&build, &token).await
    }

    async fn send_with<F>(&self, build: &F, token: &str) -> Result<Response, AuthError>
    where
        F: Fn(&reqwest::Client) -> RequestBuilder,
    {
        build(&self.client)
            .bearer_auth(token)
            .send()
            .await
            .map_err(|e| AuthError::Network(e.to_string()))
    }
}
