#![allow(dead_code)]

use std::sync::atomic::{AtomicI64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};
use tubeauth::auth::{
    AuthError, Clock, CredentialDiscovery, DeviceFlowClient, MemoryTokenStore, OAuthCredentials,
    TokenManager, TokenRecord, TokenRepository, TokenStore,
};
use wiremock::{MockServer, Request, Respond, ResponseTemplate};

pub const START_MS: i64 = 1_700_000_000_000;
pub const CLIENT_ID: &str = "123456789012-testclient.apps.googleusercontent.com";
pub const CLIENT_SECRET: &str = "TestSecretValue0123456789";

/// Virtual clock. `sleep` advances time instantly and records the duration.
pub struct ManualClock {
    now: AtomicI64,
    sleeps: Mutex<Vec<Duration>>,
}

impl ManualClock {
    pub fn new(start_ms: i64) -> Self {
        Self {
            now: AtomicI64::new(start_ms),
            sleeps: Mutex::new(Vec::new()),
        }
    }

    pub fn advance(&self, by: Duration) {
        self.now.fetch_add(by.as_millis() as i64, Ordering::SeqCst);
    }

    pub fn sleeps(&self) -> Vec<Duration> {
        self.sleeps.lock().expect("sleeps lock").clone()
    }
}

#[async_trait]
impl Clock for ManualClock {
    fn now_ms(&self) -> i64 {
        self.now.load(Ordering::SeqCst)
    }

    async fn sleep(&self, duration: Duration) {
        self.sleeps.lock().expect("sleeps lock").push(duration);
        self.advance(duration);
        tokio::task::yield_now().await;
    }
}

/// Fixed credentials; counts how often they were requested.
pub struct StaticDiscovery {
    calls: AtomicUsize,
}

impl StaticDiscovery {
    pub fn new() -> Self {
        Self {
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl CredentialDiscovery for StaticDiscovery {
    async fn fetch_credentials(&self) -> Result<OAuthCredentials, AuthError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(OAuthCredentials {
            client_id: CLIENT_ID.to_string(),
            client_secret: CLIENT_SECRET.to_string(),
        })
    }
}

/// Replays `responses` in order, repeating the last one.
pub struct Sequence {
    responses: Vec<ResponseTemplate>,
    next: AtomicUsize,
}

impl Sequence {
    pub fn new(responses: Vec<ResponseTemplate>) -> Self {
        Self {
            responses,
            next: AtomicUsize::new(0),
        }
    }
}

impl Respond for Sequence {
    fn respond(&self, _request: &Request) -> ResponseTemplate {
        let index = self.next.fetch_add(1, Ordering::SeqCst);
        let last = self.responses.len().saturating_sub(1);
        self.responses[index.min(last)].clone()
    }
}

pub fn oauth_error(code: &str) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_json(json!({ "error": code }))
}

pub fn token_body(access: &str, refresh: Option<&str>, expires_in: i64) -> Value {
    let mut body = json!({
        "access_token": access,
        "expires_in": expires_in,
        "token_type": "Bearer",
    });
    if let Some(refresh) = refresh {
        body["refresh_token"] = json!(refresh);
    }
    body
}

pub fn device_code_body(expires_in: u64, interval: u64) -> Value {
    json!({
        "device_code": "D1",
        "user_code": "ABCD-1234",
        "verification_url": "https://example/device",
        "expires_in": expires_in,
        "interval": interval,
    })
}

pub fn record(access: &str, refresh: &str, expires_at_ms: i64) -> TokenRecord {
    TokenRecord {
        access_token: access.to_string(),
        refresh_token: Some(refresh.to_string()),
        token_type: "Bearer".to_string(),
        expires_at_ms: Some(expires_at_ms),
    }
}

pub fn device_flow(server: &MockServer, clock: Arc<ManualClock>) -> DeviceFlowClient {
    DeviceFlowClient::new(Arc::new(StaticDiscovery::new()))
        .with_device_code_url(format!("{}/o/oauth2/device/code", server.uri()))
        .with_token_url(format!("{}/o/oauth2/token", server.uri()))
        .with_clock(clock)
}

pub struct Harness {
    pub clock: Arc<ManualClock>,
    pub store: Arc<MemoryTokenStore>,
    pub manager: Arc<TokenManager>,
}

/// Token manager over an in-memory store and the mock server's endpoints.
pub fn harness(server: &MockServer, seed: Option<TokenRecord>) -> Harness {
    let clock = Arc::new(ManualClock::new(START_MS));
    let store = Arc::new(match seed {
        Some(record) => MemoryTokenStore::with_record(record),
        None => MemoryTokenStore::new(),
    });
    let store_dyn: Arc<dyn TokenStore> = store.clone();
    let tokens = Arc::new(TokenRepository::new(store_dyn, clock.clone()));
    let flow = Arc::new(device_flow(server, clock.clone()));
    Harness {
        clock,
        store,
        manager: Arc::new(TokenManager::new(tokens, flow)),
    }
}
