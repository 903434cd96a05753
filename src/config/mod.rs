//! Endpoint, storage and HTTP configuration.
//!
//! Code defaults are the production endpoints. [`AuthConfig::from_env`]
//! layers `TUBEAUTH_*` environment variables (and `.env`) on top.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use bon::Builder;

use crate::auth::clock::{Clock, SystemClock};
use crate::auth::credentials::{
    CredentialDiscovery, WebCredentialDiscovery, DEFAULT_CREDENTIAL_PAGE_URL,
    DEFAULT_CREDENTIAL_USER_AGENT,
};
use crate::auth::device_flow::{
    DeviceFlowClient, DEFAULT_DEVICE_CODE_URL, DEFAULT_SCOPE, DEFAULT_TOKEN_URL,
};
use crate::auth::error::AuthError;
use crate::auth::manager::TokenManager;
use crate::auth::store::{FileTokenStore, TokenRepository, TokenStore, TokenStoreConfig};

pub const ENV_DEVICE_CODE_URL: &str = "TUBEAUTH_DEVICE_CODE_URL";
pub const ENV_TOKEN_URL: &str = "TUBEAUTH_TOKEN_URL";
pub const ENV_CREDENTIAL_PAGE_URL: &str = "TUBEAUTH_CREDENTIAL_PAGE_URL";
pub const ENV_TOKEN_DIR: &str = "TUBEAUTH_TOKEN_DIR";
pub const ENV_HTTP_TIMEOUT_SECS: &str = "TUBEAUTH_HTTP_TIMEOUT_SECS";

const DEFAULT_HTTP_TIMEOUT: Duration = Duration::from_secs(30);

/// Auth configuration.
///
/// ```
/// use tubeauth::config::AuthConfig;
///
/// let config = AuthConfig::builder()
///     .token_url("http://127.0.0.1:8080/token")
///     .build();
/// assert_eq!(config.token_url, "http://127.0.0.1:8080/token");
/// ```
#[derive(Debug, Clone, Builder)]
pub struct AuthConfig {
    #[builder(into, default = DEFAULT_DEVICE_CODE_URL.to_string())]
    pub device_code_url: String,
    #[builder(into, default = DEFAULT_TOKEN_URL.to_string())]
    pub token_url: String,
    #[builder(into, default = DEFAULT_SCOPE.to_string())]
    pub scope: String,
    #[builder(into, default = DEFAULT_CREDENTIAL_PAGE_URL.to_string())]
    pub credential_page_url: String,
    #[builder(into, default = DEFAULT_CREDENTIAL_USER_AGENT.to_string())]
    pub credential_user_agent: String,
    #[builder(into, default = TokenStoreConfig::default_dir())]
    pub token_dir: PathBuf,
    #[builder(default = DEFAULT_HTTP_TIMEOUT)]
    pub http_timeout: Duration,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self::builder().build()
    }
}

impl AuthConfig {
    /// Defaults overridden by `TUBEAUTH_*` variables. Loads `.env` if present.
    pub fn from_env() -> Result<Self, AuthError> {
        let _ = dotenvy::dotenv(); // .env is optional
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, AuthError> {
        let mut config = Self::default();
        if let Some(url) = lookup(ENV_DEVICE_CODE_URL) {
            config.device_code_url = url;
        }
        if let Some(url) = lookup(ENV_TOKEN_URL) {
            config.token_url = url;
        }
        if let Some(url) = lookup(ENV_CREDENTIAL_PAGE_URL) {
            config.credential_page_url = url;
        }
        if let Some(dir) = lookup(ENV_TOKEN_DIR) {
            config.token_dir = PathBuf::from(dir);
        }
        if let Some(raw) = lookup(ENV_HTTP_TIMEOUT_SECS) {
            let secs = raw.trim().parse::<u64>().map_err(|_| {
                AuthError::Configuration(format!(
                    "{ENV_HTTP_TIMEOUT_SECS} must be a whole number of seconds, got {raw:?}"
                ))
            })?;
            config.http_timeout = Duration::from_secs(secs);
        }
        Ok(config)
    }

    pub fn http_client(&self) -> Result<reqwest::Client, AuthError> {
        reqwest::Client::builder()
            .timeout(self.http_timeout)
            .build()
            .map_err(|e| AuthError::Configuration(format!("failed to build HTTP client: {e}")))
    }

    pub fn credential_discovery(&self, client: reqwest::Client) -> WebCredentialDiscovery {
        WebCredentialDiscovery::new(client)
            .with_page_url(self.credential_page_url.clone())
            .with_user_agent(self.credential_user_agent.clone())
    }

    pub fn device_flow(
        &self,
        client: reqwest::Client,
        discovery: Arc<dyn CredentialDiscovery>,
        clock: Arc<dyn Clock>,
    ) -> DeviceFlowClient {
        DeviceFlowClient::new(discovery)
            .with_client(client)
            .with_device_code_url(self.device_code_url.clone())
            .with_token_url(self.token_url.clone())
            .with_scope(self.scope.clone())
            .with_clock(clock)
    }

    pub fn token_store(&self) -> FileTokenStore {
        FileTokenStore::new(TokenStoreConfig::new(self.token_dir.clone()))
    }

    /// Production wiring: file store, web credential discovery, system clock.
    pub fn token_manager(&self) -> Result<Arc<TokenManager>, AuthError> {
        let store: Arc<dyn TokenStore> = Arc::new(self.token_store());
        self.token_manager_with(store, Arc::new(SystemClock))
    }

    pub fn token_manager_with(
        &self,
        store: Arc<dyn TokenStore>,
        clock: Arc<dyn Clock>,
    ) -> Result<Arc<TokenManager>, AuthError> {
        let client = self.http_client()?;
        let discovery = Arc::new(self.credential_discovery(client.clone()));
        let device_flow = self.device_flow(client, discovery, clock.clone());
        let tokens = TokenRepository::new(store, clock);
        Ok(Arc::new(TokenManager::new(
            Arc::new(tokens),
            Arc::new(device_flow),
        )))
    }
}
