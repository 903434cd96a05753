//! OAuth token payloads: wire responses and the persisted record.

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

/// Tokens are treated as expired this long before their recorded expiry.
pub const EXPIRY_BUFFER_MS: i64 = 5 * 60 * 1000;

const DEFAULT_TOKEN_TYPE: &str = "Bearer";

/// Token endpoint success payload (device-code exchange and refresh).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
    pub expires_in: i64,
    #[serde(default = "default_token_type")]
    pub token_type: String,
    #[serde(default)]
    pub scope: Option<String>,
}

/// Token endpoint error payload. The endpoint returns these with HTTP 200.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct TokenErrorResponse {
    pub error: String,
    #[serde(default)]
    pub error_description: Option<String>,
}

/// OAuth error codes the poll loop distinguishes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumString)]
#[strum(serialize_all = "snake_case")]
pub enum OAuthErrorCode {
    AuthorizationPending,
    SlowDown,
    ExpiredToken,
    AccessDenied,
}

/// Persisted token record.
///
/// Field names on disk match the four durable entries: `access_token`,
/// `refresh_token`, `token_expiry` (epoch milliseconds) and `token_type`.
/// Every field tolerates absence so a partially written record still loads.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenRecord {
    #[serde(default)]
    pub access_token: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    #[serde(default = "default_token_type")]
    pub token_type: String,
    #[serde(
        default,
        rename = "token_expiry",
        skip_serializing_if = "Option::is_none"
    )]
    pub expires_at_ms: Option<i64>,
}

impl TokenRecord {
    /// Build the record for a token response received at `now_ms`.
    ///
    /// Refresh grants usually omit `refresh_token`; `previous_refresh` is kept
    /// in that case.
    pub fn from_response(
        response: &TokenResponse,
        now_ms: i64,
        previous_refresh: Option<String>,
    ) -> Self {
        Self {
            access_token: response.access_token.clone(),
            refresh_token: response.refresh_token.clone().or(previous_refresh),
            token_type: response.token_type.clone(),
            expires_at_ms: Some(now_ms.saturating_add(response.expires_in.saturating_mul(1000))),
        }
    }

    /// True when no expiry is recorded or `now_ms` is inside the refresh buffer.
    pub fn is_expired_at(&self, now_ms: i64) -> bool {
        match self.expires_at_ms {
            Some(expires_at) => now_ms >= expires_at - EXPIRY_BUFFER_MS,
            None => true,
        }
    }

    /// Both access and refresh tokens are present and non-empty.
    pub fn is_complete(&self) -> bool {
        !self.access_token.is_empty()
            && self
                .refresh_token
                .as_deref()
                .is_some_and(|refresh| !refresh.is_empty())
    }
}

fn default_token_type() -> String {
    DEFAULT_TOKEN_TYPE.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    fn response(expires_in: i64, refresh: Option<&str>) -> TokenResponse {
        TokenResponse {
            access_token: "AT1".to_string(),
            refresh_token: refresh.map(str::to_string),
            expires_in,
            token_type: "Bearer".to_string(),
            scope: None,
        }
    }

    #[test]
    fn token_response_defaults_token_type() {
        let parsed: TokenResponse =
            serde_json::from_str(r#"{"access_token":"a","expires_in":60}"#).unwrap();
        assert_eq!(parsed.token_type, "Bearer");
        assert!(parsed.refresh_token.is_none());
    }

    #[test]
    fn error_response_requires_error_field() {
        assert!(serde_json::from_str::<TokenErrorResponse>(r#"{"access_token":"a"}"#).is_err());
        let parsed: TokenErrorResponse =
            serde_json::from_str(r#"{"error":"slow_down"}"#).unwrap();
        assert_eq!(parsed.error, "slow_down");
    }

    #[test]
    fn error_codes_parse_from_snake_case() {
        assert_eq!(
            OAuthErrorCode::from_str("authorization_pending").unwrap(),
            OAuthErrorCode::AuthorizationPending
        );
        assert_eq!(OAuthErrorCode::SlowDown.to_string(), "slow_down");
        assert!(OAuthErrorCode::from_str("invalid_client").is_err());
    }

    #[test]
    fn from_response_computes_expiry_once() {
        let record = TokenRecord::from_response(&response(3600, Some("RT1")), 1_000, None);
        assert_eq!(record.expires_at_ms, Some(1_000 + 3_600_000));
        assert_eq!(record.refresh_token.as_deref(), Some("RT1"));
    }

    #[test]
    fn from_response_keeps_previous_refresh_token() {
        let record =
            TokenRecord::from_response(&response(3600, None), 0, Some("RT-old".to_string()));
        assert_eq!(record.refresh_token.as_deref(), Some("RT-old"));
    }

    #[test]
    fn expiry_boundary_counts_as_expired() {
        let record = TokenRecord::from_response(&response(600, Some("RT")), 0, None);
        let edge = 600_000 - EXPIRY_BUFFER_MS;
        assert!(!record.is_expired_at(edge - 1));
        assert!(record.is_expired_at(edge));
    }

    #[test]
    fn missing_expiry_is_expired() {
        let record = TokenRecord {
            access_token: "a".to_string(),
            refresh_token: Some("r".to_string()),
            token_type: "Bearer".to_string(),
            expires_at_ms: None,
        };
        assert!(record.is_expired_at(0));
    }

    #[test]
    fn completeness_needs_both_tokens() {
        let mut record = TokenRecord::from_response(&response(60, Some("RT")), 0, None);
        assert!(record.is_complete());
        record.refresh_token = Some(String::new());
        assert!(!record.is_complete());
        record.refresh_token = None;
        assert!(!record.is_complete());
        record.refresh_token = Some("RT".to_string());
        record.access_token.clear();
        assert!(!record.is_complete());
    }
}
