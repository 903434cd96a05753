//! OAuth device-code login and token lifecycle.
//!
//! The pieces, bottom up:
//!
//! - [`TokenStore`] persists one [`TokenRecord`]; [`TokenRepository`] layers
//!   expiry and login-state rules on top of it.
//! - [`CredentialDiscovery`] supplies the OAuth client id and secret.
//! - [`DeviceFlowClient`] talks to the device-code and token endpoints.
//! - [`TokenManager`] hands out valid tokens and owns refresh.
//! - [`LoginFlow`] drives a login attempt as an [`AuthState`] machine.

pub mod clock;
pub mod credentials;
pub mod device_code;
pub mod device_flow;
pub mod error;
pub mod login;
pub mod manager;
pub mod store;
pub mod token;

pub use clock::{Clock, SystemClock};
pub use credentials::{CredentialDiscovery, OAuthCredentials, WebCredentialDiscovery};
pub use device_code::{DeviceCodeSession, PollOutcome};
pub use device_flow::DeviceFlowClient;
pub use error::AuthError;
pub use login::{AuthState, LoginFlow};
pub use manager::TokenManager;
pub use store::{FileTokenStore, MemoryTokenStore, TokenRepository, TokenStore, TokenStoreConfig};
pub use token::{OAuthErrorCode, TokenErrorResponse, TokenRecord, TokenResponse, EXPIRY_BUFFER_MS};
