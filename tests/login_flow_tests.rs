mod auth_support;

use std::time::Duration;

use pretty_assertions::assert_eq;
use tokio::sync::broadcast;
use tokio::sync::broadcast::error::TryRecvError;
use tokio::time::timeout;
use tubeauth::auth::{AuthState, Clock, LoginFlow};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use auth_support::{device_code_body, harness, oauth_error, token_body, Sequence};

const WAIT: Duration = Duration::from_secs(5);

/// Collect transitions until a terminal state.
async fn until_terminal(rx: &mut broadcast::Receiver<AuthState>) -> Vec<AuthState> {
    let mut seen = Vec::new();
    loop {
        let state = timeout(WAIT, rx.recv())
            .await
            .expect("timed out waiting for login state")
            .expect("transition channel closed");
        let terminal = state.is_terminal();
        seen.push(state);
        if terminal {
            return seen;
        }
    }
}

async fn mount_device_code(server: &MockServer, expires_in: u64) {
    Mock::given(method("POST"))
        .and(path("/o/oauth2/device/code"))
        .respond_with(ResponseTemplate::new(200).set_body_json(device_code_body(expires_in, 5)))
        .mount(server)
        .await;
}

fn waiting(expires_in_secs: u64) -> AuthState {
    AuthState::WaitingForAuthorization {
        user_code: "ABCD-1234".to_string(),
        verification_url: "https://example/device".to_string(),
        expires_in_secs,
    }
}

#[tokio::test]
async fn successful_login_drives_full_state_sequence() {
    let server = MockServer::start().await;
    mount_device_code(&server, 1800).await;
    Mock::given(method("POST"))
        .and(path("/o/oauth2/token"))
        .respond_with(Sequence::new(vec![
            oauth_error("authorization_pending"),
            oauth_error("authorization_pending"),
            oauth_error("authorization_pending"),
            ResponseTemplate::new(200).set_body_json(token_body("AT1", Some("RT1"), 3600)),
        ]))
        .expect(4)
        .mount(&server)
        .await;

    let h = harness(&server, None);
    let flow = LoginFlow::new(h.manager.clone());
    assert_eq!(flow.state(), AuthState::Idle);

    let mut rx = flow.subscribe();
    flow.start();
    let states = until_terminal(&mut rx).await;

    assert_eq!(
        states,
        vec![
            AuthState::RequestingCode,
            waiting(1800),
            AuthState::Polling,
            AuthState::Authenticated,
        ]
    );

    let stored = h.manager.tokens().load().await.unwrap().unwrap();
    assert_eq!(stored.access_token, "AT1");
    assert_eq!(stored.refresh_token.as_deref(), Some("RT1"));
    assert_eq!(stored.expires_at_ms, Some(h.clock.now_ms() + 3_600_000));
    assert_eq!(h.manager.bearer().as_deref(), Some("AT1"));
    assert!(h.manager.is_logged_in().await);
}

#[tokio::test]
async fn active_session_is_exposed_while_polling() {
    let server = MockServer::start().await;
    mount_device_code(&server, 1800).await;
    Mock::given(method("POST"))
        .and(path("/o/oauth2/token"))
        .respond_with(Sequence::new(vec![
            oauth_error("authorization_pending"),
            oauth_error("authorization_pending").set_delay(Duration::from_secs(30)),
        ]))
        .mount(&server)
        .await;

    let h = harness(&server, None);
    let flow = LoginFlow::new(h.manager.clone());
    let mut rx = flow.subscribe();
    flow.start();

    assert_eq!(rx.recv().await.unwrap(), AuthState::RequestingCode);
    assert_eq!(rx.recv().await.unwrap(), waiting(1800));
    let session = flow.active_session().expect("session");
    assert_eq!(session.user_code, "ABCD-1234");
    assert_eq!(session.device_code, "D1");

    flow.cancel();
    assert_eq!(flow.state(), AuthState::Idle);
    assert!(flow.active_session().is_none());
}

#[tokio::test]
async fn access_denied_ends_in_error() {
    let server = MockServer::start().await;
    mount_device_code(&server, 1800).await;
    Mock::given(method("POST"))
        .and(path("/o/oauth2/token"))
        .respond_with(oauth_error("access_denied"))
        .mount(&server)
        .await;

    let h = harness(&server, None);
    let flow = LoginFlow::new(h.manager.clone());
    let mut rx = flow.subscribe();
    flow.start();

    let states = until_terminal(&mut rx).await;
    assert_eq!(
        states.last(),
        Some(&AuthState::Error {
            message: "Access denied by user".to_string()
        })
    );
    assert!(!h.manager.is_logged_in().await);
}

#[tokio::test]
async fn deadline_ends_in_expired_and_retry_restarts() {
    let server = MockServer::start().await;
    mount_device_code(&server, 10).await;
    Mock::given(method("POST"))
        .and(path("/o/oauth2/token"))
        .respond_with(oauth_error("authorization_pending"))
        .mount(&server)
        .await;

    let h = harness(&server, None);
    let flow = LoginFlow::new(h.manager.clone());
    let mut rx = flow.subscribe();
    flow.start();

    assert_eq!(
        until_terminal(&mut rx).await,
        vec![
            AuthState::RequestingCode,
            waiting(10),
            AuthState::Polling,
            AuthState::Expired,
        ]
    );

    flow.retry();
    let after_retry = until_terminal(&mut rx).await;
    assert_eq!(after_retry[0], AuthState::Idle);
    assert_eq!(after_retry[1], AuthState::RequestingCode);
    assert_eq!(after_retry.last(), Some(&AuthState::Expired));
}

#[tokio::test]
async fn device_code_failure_is_retryable_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/o/oauth2/device/code"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;

    let h = harness(&server, None);
    let flow = LoginFlow::new(h.manager.clone());
    let mut rx = flow.subscribe();
    flow.start();

    let states = until_terminal(&mut rx).await;
    assert_eq!(states[0], AuthState::RequestingCode);
    let last = states.last().unwrap();
    assert!(matches!(last, AuthState::Error { .. }));
    assert!(last.can_retry());
}

#[tokio::test]
async fn start_is_idempotent_while_running() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/o/oauth2/device/code"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(device_code_body(1800, 5))
                .set_delay(Duration::from_millis(200)),
        )
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/o/oauth2/token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(token_body("AT1", Some("RT1"), 3600)))
        .expect(1)
        .mount(&server)
        .await;

    let h = harness(&server, None);
    let flow = LoginFlow::new(h.manager.clone());
    let mut rx = flow.subscribe();
    flow.start();
    flow.start();
    flow.start();

    let states = until_terminal(&mut rx).await;
    assert_eq!(states.last(), Some(&AuthState::Authenticated));

    // Authenticated: further starts do nothing.
    flow.start();
    assert_eq!(flow.state(), AuthState::Authenticated);
}

#[tokio::test]
async fn start_is_ignored_while_polling() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/o/oauth2/device/code"))
        .respond_with(ResponseTemplate::new(200).set_body_json(device_code_body(1800, 5)))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/o/oauth2/token"))
        .respond_with(oauth_error("authorization_pending").set_delay(Duration::from_secs(30)))
        .mount(&server)
        .await;

    let h = harness(&server, None);
    let flow = LoginFlow::new(h.manager.clone());
    let mut rx = flow.subscribe();
    flow.start();
    loop {
        let state = timeout(WAIT, rx.recv())
            .await
            .expect("timed out waiting for polling")
            .expect("transition channel closed");
        if state == AuthState::Polling {
            break;
        }
    }

    flow.start();
    flow.start();
    tokio::time::sleep(Duration::from_millis(50)).await;

    assert!(matches!(rx.try_recv(), Err(TryRecvError::Empty)));
    assert_eq!(flow.state(), AuthState::Polling);
    flow.cancel();
}

#[tokio::test]
async fn retry_is_ignored_unless_failed() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(500))
        .expect(0)
        .mount(&server)
        .await;

    let h = harness(&server, None);
    let flow = LoginFlow::new(h.manager.clone());
    flow.retry();
    assert_eq!(flow.state(), AuthState::Idle);
}
