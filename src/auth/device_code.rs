//! Device-code session and poll outcome types.

use serde::Deserialize;

use super::token::TokenResponse;

/// One login attempt's device code, as issued by the device-code endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceCodeSession {
    pub device_code: String,
    pub user_code: String,
    pub verification_url: String,
    pub interval_secs: u64,
    pub expires_in_secs: u64,
    pub expires_at_ms: i64,
}

/// Result of a single poll of the token endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollOutcome {
    /// User has not authorized yet; keep polling.
    Pending,
    /// User authorized; the token is ready.
    Success(TokenResponse),
    /// Terminal failure with a displayable message.
    Error(String),
    /// The device code expired before authorization.
    Expired,
}

impl PollOutcome {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Pending)
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct DeviceCodeResponse {
    pub device_code: String,
    pub user_code: String,
    pub verification_url: String,
    pub expires_in: u64,
    pub interval: u64,
}
