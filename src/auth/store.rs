use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::io::AsyncWriteExt;
use tokio::sync::{watch, Mutex};
use tokio_stream::wrappers::WatchStream;

use super::clock::Clock;
use super::error::AuthError;
use super::token::{TokenRecord, TokenResponse};

const TOKEN_FILE_NAME: &str = "auth_tokens.toml";
const TOKEN_FILE_VERSION: u32 = 1;

/// Durable storage for the single persisted token record.
#[async_trait]
pub trait TokenStore: Send + Sync {
    async fn load(&self) -> Result<Option<TokenRecord>, AuthError>;
    async fn save(&self, record: &TokenRecord) -> Result<(), AuthError>;
    async fn clear(&self) -> Result<(), AuthError>;
}

/// Configuration for file-backed token storage.
#[derive(Debug, Clone)]
pub struct TokenStoreConfig {
    pub base_dir: PathBuf,
}

impl TokenStoreConfig {
    pub fn new(base_dir: PathBuf) -> Self {
        Self { base_dir }
    }

    pub fn default_dir() -> PathBuf {
        default_tubeauth_dir()
    }
}

/// File-backed token store.
///
/// Keeps the record in `auth_tokens.toml` under the configured directory.
/// Saves write a sibling temp file and rename it over the old one, so readers
/// never observe a half-written record.
///
/// # Example
/// ```no_run
/// use tubeauth::auth::{FileTokenStore, TokenRecord, TokenStore};
///
/// # async fn example() -> Result<(), tubeauth::auth::AuthError> {
/// let store = FileTokenStore::new_default();
/// let record = TokenRecord {
///     access_token: "access".to_string(),
///     refresh_token: Some("refresh".to_string()),
///     token_type: "Bearer".to_string(),
///     expires_at_ms: Some(1_700_000_000_000),
/// };
/// store.save(&record).await?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct FileTokenStore {
    base_dir: PathBuf,
}

impl FileTokenStore {
    pub fn new(config: TokenStoreConfig) -> Self {
        Self {
            base_dir: config.base_dir,
        }
    }

    pub fn new_default() -> Self {
        Self {
            base_dir: default_tubeauth_dir(),
        }
    }

    pub fn path(&self) -> PathBuf {
        self.base_dir.join(TOKEN_FILE_NAME)
    }

    async fn ensure_parent(path: &Path) -> Result<(), AuthError> {
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        Ok(())
    }
}

#[async_trait]
impl TokenStore for FileTokenStore {
    async fn load(&self) -> Result<Option<TokenRecord>, AuthError> {
        let path = self.path();
        let raw = match tokio::fs::read_to_string(&path).await {
            Ok(data) => data,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(err) => return Err(AuthError::Io(err.to_string())),
        };
        let file: TokenFile = toml::from_str(&raw)?;
        Ok(Some(file.tokens))
    }

    async fn save(&self, record: &TokenRecord) -> Result<(), AuthError> {
        let path = self.path();
        Self::ensure_parent(&path).await?;
        let file = TokenFile {
            version: TOKEN_FILE_VERSION,
            saved_at: Utc::now(),
            tokens: record.clone(),
        };
        let serialized = toml::to_string(&file)?;
        let tmp = path.with_extension("toml.tmp");
        let mut options = tokio::fs::OpenOptions::new();
        options.write(true).create(true).truncate(true);
        #[cfg(unix)]
        options.mode(0o600);
        let mut out = options.open(&tmp).await?;
        // `mode` only applies on create; a leftover temp file keeps its bits.
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            out.set_permissions(std::fs::Permissions::from_mode(0o600))
                .await?;
        }
        out.write_all(serialized.as_bytes()).await?;
        out.sync_all().await?;
        drop(out);
        tokio::fs::rename(&tmp, &path).await?;
        Ok(())
    }

    async fn clear(&self) -> Result<(), AuthError> {
        match tokio::fs::remove_file(self.path()).await {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(AuthError::Io(err.to_string())),
        }
    }
}

/// In-process token store. Nothing survives a restart.
#[derive(Debug, Default)]
pub struct MemoryTokenStore {
    record: Mutex<Option<TokenRecord>>,
}

impl MemoryTokenStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_record(record: TokenRecord) -> Self {
        Self {
            record: Mutex::new(Some(record)),
        }
    }
}

#[async_trait]
impl TokenStore for MemoryTokenStore {
    async fn load(&self) -> Result<Option<TokenRecord>, AuthError> {
        Ok(self.record.lock().await.clone())
    }

    async fn save(&self, record: &TokenRecord) -> Result<(), AuthError> {
        *self.record.lock().await = Some(record.clone());
        Ok(())
    }

    async fn clear(&self) -> Result<(), AuthError> {
        *self.record.lock().await = None;
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct TokenFile {
    version: u32,
    saved_at: DateTime<Utc>,
    tokens: TokenRecord,
}

/// Token state authority over a [`TokenStore`].
///
/// Computes expiry at save time, applies the expiry buffer, and publishes
/// login-state changes. Writes are serialized so a merge never races another
/// save or clear.
pub struct TokenRepository {
    store: Arc<dyn TokenStore>,
    clock: Arc<dyn Clock>,
    write_lock: Mutex<()>,
    login_tx: watch::Sender<bool>,
}

impl TokenRepository {
    pub fn new(store: Arc<dyn TokenStore>, clock: Arc<dyn Clock>) -> Self {
        let (login_tx, _) = watch::channel(false);
        Self {
            store,
            clock,
            write_lock: Mutex::new(()),
            login_tx,
        }
    }

    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    /// Persist a token response, stamping `expires_at = now + expires_in`.
    pub async fn save(&self, response: &TokenResponse) -> Result<TokenRecord, AuthError> {
        let _guard = self.write_lock.lock().await;
        let previous_refresh = self
            .store
            .load()
            .await?
            .and_then(|record| record.refresh_token)
            .filter(|refresh| !refresh.is_empty());
        let record = TokenRecord::from_response(response, self.clock.now_ms(), previous_refresh);
        self.store.save(&record).await?;
        self.login_tx.send_replace(record.is_complete());
        tracing::debug!(expires_at_ms = ?record.expires_at_ms, "tokens saved");
        Ok(record)
    }

    pub async fn load(&self) -> Result<Option<TokenRecord>, AuthError> {
        self.store.load().await
    }

    pub async fn access_token(&self) -> Result<Option<String>, AuthError> {
        Ok(self
            .store
            .load()
            .await?
            .map(|record| record.access_token)
            .filter(|token| !token.is_empty()))
    }

    pub async fn refresh_token(&self) -> Result<Option<String>, AuthError> {
        Ok(self
            .store
            .load()
            .await?
            .and_then(|record| record.refresh_token)
            .filter(|token| !token.is_empty()))
    }

    pub async fn expires_at_ms(&self) -> Result<Option<i64>, AuthError> {
        Ok(self.store.load().await?.and_then(|record| record.expires_at_ms))
    }

    /// True if no expiry is recorded or the token is within the refresh buffer.
    pub async fn is_expired(&self) -> Result<bool, AuthError> {
        let now = self.clock.now_ms();
        Ok(self
            .store
            .load()
            .await?
            .map_or(true, |record| record.is_expired_at(now)))
    }

    /// True iff both access and refresh tokens are non-empty.
    pub async fn is_logged_in(&self) -> Result<bool, AuthError> {
        Ok(self
            .store
            .load()
            .await?
            .is_some_and(|record| record.is_complete()))
    }

    /// Stream of login state: the current value first, then every change.
    pub async fn observe_login_state(&self) -> Result<WatchStream<bool>, AuthError> {
        let logged_in = self.is_logged_in().await?;
        self.login_tx.send_if_modified(|current| {
            let changed = *current != logged_in;
            *current = logged_in;
            changed
        });
        Ok(WatchStream::new(self.login_tx.subscribe()))
    }

    pub async fn clear(&self) -> Result<(), AuthError> {
        let _guard = self.write_lock.lock().await;
        self.store.clear().await?;
        self.login_tx.send_replace(false);
        tracing::debug!("tokens cleared");
        Ok(())
    }
}

fn default_tubeauth_dir() -> PathBuf {
    directories::UserDirs::new()
        .map(|dirs| dirs.home_dir().join(".tubeauth"))
        .unwrap_or_else(|| PathBuf::from(".tubeauth"))
}
