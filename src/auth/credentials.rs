//! OAuth client credential discovery.
//!
//! There is no registered client for the TV device flow, so the client id and
//! secret are mined from the script bundle the TV web app ships. The markup
//! and bundle layout are not under our control; everything brittle about that
//! lives behind [`CredentialDiscovery`].

use std::fmt;
use std::sync::OnceLock;

use async_trait::async_trait;
use regex::Regex;
use reqwest::Url;

use super::error::AuthError;

pub const DEFAULT_CREDENTIAL_PAGE_URL: &str = "https://www.youtube.com/tv";

/// Fire TV Cobalt user agent. Other agents get a bundle without OAuth metadata.
pub const DEFAULT_CREDENTIAL_USER_AGENT: &str = "Mozilla/5.0 (Linux armeabi-v7a; Android 7.1.2; Fire OS 6.0) \
Cobalt/22.lts.3.306369-gold (unlike Gecko) v8/8.8.278.8-jit gles Starboard/13, \
Amazon_ATV_mediatek8695_2019/NS6294 (Amazon, AFTMM, Wireless) com.amazon.firetv.youtube/22.3.r2.v66.0";

/// Known shapes of the script tag that loads the base bundle, in match order.
const SCRIPT_URL_PATTERNS: &[&str] = &[
    r#"id="base-js" src="(.*?)""#,
    r"\.src = '(.*?m=base)'",
    r"\.src = '(.*?)';\s*\w\.id = 'base-js'",
];

const CLIENT_ID_PATTERN: &str =
    r#"clientId:"([-\w]+\.apps\.googleusercontent\.com)",\n?[$\w]+:"\w+""#;
const CLIENT_SECRET_PATTERN: &str =
    r#"clientId:"[-\w]+\.apps\.googleusercontent\.com",\n?[$\w]+:"(\w+)""#;

/// OAuth client id/secret pair. Memory only.
#[derive(Clone, PartialEq, Eq)]
pub struct OAuthCredentials {
    pub client_id: String,
    pub client_secret: String,
}

impl fmt::Debug for OAuthCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OAuthCredentials")
            .field("client_id", &redact(&self.client_id))
            .field("client_secret", &"..")
            .finish()
    }
}

/// Source of OAuth client credentials.
#[async_trait]
pub trait CredentialDiscovery: Send + Sync {
    async fn fetch_credentials(&self) -> Result<OAuthCredentials, AuthError>;
}

/// Scrapes credentials from the public TV page and its base script.
///
/// Stateless; caching is up to the caller.
pub struct WebCredentialDiscovery {
    client: reqwest::Client,
    page_url: String,
    user_agent: String,
}

impl WebCredentialDiscovery {
    pub fn new(client: reqwest::Client) -> Self {
        Self {
            client,
            page_url: DEFAULT_CREDENTIAL_PAGE_URL.to_string(),
            user_agent: DEFAULT_CREDENTIAL_USER_AGENT.to_string(),
        }
    }

    pub fn with_page_url(mut self, url: impl Into<String>) -> Self {
        self.page_url = url.into();
        self
    }

    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = user_agent.into();
        self
    }

    async fn fetch_text(&self, url: &str, what: &str) -> Result<String, AuthError> {
        let resp = self
            .client
            .get(url)
            .header("User-Agent", &self.user_agent)
            .send()
            .await
            .map_err(|e| AuthError::CredentialFetch(format!("{what} fetch failed: {e}")))?;
        if !resp.status().is_success() {
            return Err(AuthError::CredentialFetch(format!(
                "{what} fetch failed with status {}",
                resp.status()
            )));
        }
        resp.text()
            .await
            .map_err(|e| AuthError::CredentialFetch(format!("{what} body unreadable: {e}")))
    }
}

#[async_trait]
impl CredentialDiscovery for WebCredentialDiscovery {
    async fn fetch_credentials(&self) -> Result<OAuthCredentials, AuthError> {
        tracing::debug!(url = %self.page_url, "fetching OAuth credentials");
        let page = self.fetch_text(&self.page_url, "TV page").await?;
        tracing::debug!(len = page.len(), "fetched TV page");

        let script_path = extract_script_url(&page).ok_or_else(|| {
            AuthError::CredentialFetch("no base script URL found in TV page".to_string())
        })?;
        let script_url = resolve_script_url(&self.page_url, &script_path)?;
        tracing::debug!(url = %script_url, "found base script");

        let script = self.fetch_text(script_url.as_str(), "base script").await?;
        tracing::debug!(len = script.len(), "fetched base script");

        let credentials = extract_credentials(&script)?;
        tracing::debug!(
            client_id = %redact(&credentials.client_id),
            "extracted OAuth credentials"
        );
        Ok(credentials)
    }
}

/// First capture of the first script-URL pattern that matches `html`.
pub fn extract_script_url(html: &str) -> Option<String> {
    script_url_regexes()
        .iter()
        .find_map(|re| re.captures(html))
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_string())
}

/// Client id and secret from the base script text.
pub fn extract_credentials(script: &str) -> Result<OAuthCredentials, AuthError> {
    let client_id = capture_first(client_id_regex(), script).ok_or_else(|| {
        AuthError::CredentialFetch("client_id not found in base script".to_string())
    })?;
    let client_secret = capture_first(client_secret_regex(), script).ok_or_else(|| {
        AuthError::CredentialFetch("client_secret not found in base script".to_string())
    })?;
    Ok(OAuthCredentials {
        client_id,
        client_secret,
    })
}

fn capture_first(re: Option<&Regex>, text: &str) -> Option<String> {
    re?.captures(text)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_string())
}

fn resolve_script_url(page_url: &str, script_path: &str) -> Result<Url, AuthError> {
    let base = Url::parse(page_url)
        .map_err(|e| AuthError::Configuration(format!("invalid credential page URL: {e}")))?;
    base.join(script_path)
        .map_err(|e| AuthError::CredentialFetch(format!("invalid base script URL: {e}")))
}

fn script_url_regexes() -> &'static [Regex] {
    static REGEXES: OnceLock<Vec<Regex>> = OnceLock::new();
    REGEXES.get_or_init(|| {
        SCRIPT_URL_PATTERNS
            .iter()
            .filter_map(|pattern| Regex::new(pattern).ok())
            .collect()
    })
}

fn client_id_regex() -> Option<&'static Regex> {
    static ID: OnceLock<Option<Regex>> = OnceLock::new();
    ID.get_or_init(|| Regex::new(CLIENT_ID_PATTERN).ok()).as_ref()
}

fn client_secret_regex() -> Option<&'static Regex> {
    static SECRET: OnceLock<Option<Regex>> = OnceLock::new();
    SECRET
        .get_or_init(|| Regex::new(CLIENT_SECRET_PATTERN).ok())
        .as_ref()
}

pub(crate) fn redact(value: &str) -> String {
    let prefix: String = value.chars().take(20).collect();
    if prefix.len() < value.len() {
        format!("{prefix}...")
    } else {
        prefix
    }
}
