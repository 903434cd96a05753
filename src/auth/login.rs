//! Login state machine driving the device-code flow for a UI.

use std::sync::{Arc, Mutex, MutexGuard};

use futures::StreamExt;
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tokio_stream::wrappers::WatchStream;

use super::device_code::{DeviceCodeSession, PollOutcome};
use super::manager::TokenManager;

const TRANSITION_CAPACITY: usize = 32;

/// Login screen state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthState {
    Idle,
    RequestingCode,
    /// Show `user_code` and `verification_url` to the user.
    WaitingForAuthorization {
        user_code: String,
        verification_url: String,
        expires_in_secs: u64,
    },
    /// Token endpoint has answered at least once with "pending". The session
    /// from [`LoginFlow::active_session`] is still the one to display.
    Polling,
    Authenticated,
    Error {
        message: String,
    },
    Expired,
}

impl AuthState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Authenticated | Self::Error { .. } | Self::Expired)
    }

    pub fn can_retry(&self) -> bool {
        matches!(self, Self::Error { .. } | Self::Expired)
    }
}

/// Runs one login attempt at a time on a background task.
///
/// State is published on a watch channel for "latest value" consumers and on
/// a broadcast channel that sees every transition. Dropping the flow aborts
/// the attempt, including any in-flight request.
pub struct LoginFlow {
    manager: Arc<TokenManager>,
    shared: Arc<Shared>,
    task: Mutex<Option<JoinHandle<()>>>,
}

struct Shared {
    // Bumped on every new attempt and on cancel; a task only publishes while
    // its generation is current.
    generation: Mutex<u64>,
    state_tx: watch::Sender<AuthState>,
    transitions: broadcast::Sender<AuthState>,
    session: Mutex<Option<DeviceCodeSession>>,
}

impl LoginFlow {
    pub fn new(manager: Arc<TokenManager>) -> Self {
        let (state_tx, _) = watch::channel(AuthState::Idle);
        let (transitions, _) = broadcast::channel(TRANSITION_CAPACITY);
        Self {
            manager,
            shared: Arc::new(Shared {
                generation: Mutex::new(0),
                state_tx,
                transitions,
                session: Mutex::new(None),
            }),
            task: Mutex::new(None),
        }
    }

    /// Begin a login attempt.
    ///
    /// No-op while an attempt is running (requesting a code, waiting, or
    /// polling) and once authenticated. Use [`cancel`](Self::cancel) to
    /// return to `Idle` first.
    pub fn start(&self) {
        let mut task = lock(&self.task);
        let state = self.state();
        if state == AuthState::Authenticated {
            tracing::debug!("already authenticated");
            return;
        }
        // A task that published a terminal state may not have exited yet.
        if !state.is_terminal() && task.as_ref().is_some_and(|handle| !handle.is_finished()) {
            tracing::debug!("login already in progress");
            return;
        }
        if let Some(previous) = task.take() {
            previous.abort();
        }

        let generation = self.shared.begin_attempt();
        let manager = self.manager.clone();
        let shared = self.shared.clone();
        *task = Some(tokio::spawn(run_attempt(manager, shared, generation)));
    }

    /// From `Error` or `Expired`: reset to `Idle` and start again.
    pub fn retry(&self) {
        if !self.state().can_retry() {
            tracing::debug!(state = ?self.state(), "retry ignored");
            return;
        }
        if let Some(previous) = lock(&self.task).take() {
            previous.abort();
        }
        let generation = self.shared.current_generation();
        self.shared.transition(generation, AuthState::Idle);
        self.start();
    }

    /// Abort the current attempt and return to `Idle`.
    pub fn cancel(&self) {
        if let Some(handle) = lock(&self.task).take() {
            handle.abort();
        }
        self.shared.reset();
        tracing::debug!("login cancelled");
    }

    pub fn state(&self) -> AuthState {
        self.shared.state_tx.borrow().clone()
    }

    /// Latest state: the current value, then every change.
    pub fn watch_state(&self) -> WatchStream<AuthState> {
        WatchStream::new(self.shared.state_tx.subscribe())
    }

    /// Every transition from now on, in order.
    pub fn subscribe(&self) -> broadcast::Receiver<AuthState> {
        self.shared.transitions.subscribe()
    }

    /// Device code session of the running attempt, if one was issued.
    pub fn active_session(&self) -> Option<DeviceCodeSession> {
        lock(&self.shared.session).clone()
    }
}

impl Drop for LoginFlow {
    fn drop(&mut self) {
        if let Some(handle) = lock(&self.task).take() {
            handle.abort();
        }
    }
}

impl Shared {
    fn current_generation(&self) -> u64 {
        *lock(&self.generation)
    }

    fn begin_attempt(&self) -> u64 {
        let mut generation = lock(&self.generation);
        *generation += 1;
        *lock(&self.session) = None;
        self.publish(AuthState::RequestingCode);
        *generation
    }

    fn reset(&self) {
        let mut generation = lock(&self.generation);
        *generation += 1;
        *lock(&self.session) = None;
        self.publish(AuthState::Idle);
    }

    /// Publish `state` if `generation` is still current. Returns false for a
    /// stale attempt.
    fn transition(&self, generation: u64, state: AuthState) -> bool {
        let current = lock(&self.generation);
        if *current != generation {
            return false;
        }
        self.publish(state);
        true
    }

    fn set_session(&self, generation: u64, session: DeviceCodeSession) {
        let current = lock(&self.generation);
        if *current == generation {
            *lock(&self.session) = Some(session);
        }
    }

    fn publish(&self, state: AuthState) {
        let changed = self.state_tx.send_if_modified(|current| {
            if *current == state {
                return false;
            }
            *current = state.clone();
            true
        });
        if changed {
            tracing::debug!(state = ?state, "login state changed");
            // No receivers is fine.
            let _ = self.transitions.send(state);
        }
    }
}

async fn run_attempt(manager: Arc<TokenManager>, shared: Arc<Shared>, generation: u64) {
    let device_flow = manager.device_flow().clone();

    let session = match device_flow.request_device_code().await {
        Ok(session) => session,
        Err(e) => {
            tracing::warn!(error = %e, "device code request failed");
            shared.transition(
                generation,
                AuthState::Error {
                    message: e.to_string(),
                },
            );
            return;
        }
    };
    tracing::info!(
        verification_url = %session.verification_url,
        expires_in_secs = session.expires_in_secs,
        "device code issued"
    );
    shared.set_session(generation, session.clone());
    let waiting = AuthState::WaitingForAuthorization {
        user_code: session.user_code.clone(),
        verification_url: session.verification_url.clone(),
        expires_in_secs: session.expires_in_secs,
    };
    if !shared.transition(generation, waiting) {
        return;
    }

    let mut polls = device_flow.poll_for_token(
        &session.device_code,
        session.interval_secs,
        session.expires_in_secs,
    );
    while let Some(outcome) = polls.next().await {
        let next = match outcome {
            PollOutcome::Pending => AuthState::Polling,
            PollOutcome::Success(token) => match manager.complete_login(&token).await {
                Ok(_) => AuthState::Authenticated,
                Err(e) => {
                    tracing::warn!(error = %e, "failed to persist login");
                    AuthState::Error {
                        message: e.to_string(),
                    }
                }
            },
            PollOutcome::Error(message) => AuthState::Error { message },
            PollOutcome::Expired => AuthState::Expired,
        };
        let terminal = next.is_terminal();
        if !shared.transition(generation, next) || terminal {
            return;
        }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
