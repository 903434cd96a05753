//! tubeauth: OAuth device-code login for the YouTube TV client.
//!
//! Handles the whole token lifecycle for a limited-input device: discovering
//! the TV client's OAuth credentials, running the device-code flow, storing
//! tokens, refreshing them single-flight, and handing a bearer token to
//! authenticated callers.
//!
//! # Quick Start
//!
//! ```no_run
//! use tubeauth::auth::{AuthState, LoginFlow};
//! use tubeauth::config::AuthConfig;
//! use futures::StreamExt;
//!
//! # async fn example() -> Result<(), tubeauth::auth::AuthError> {
//! let manager = AuthConfig::from_env()?.token_manager()?;
//! if manager.initialize().await.is_none() {
//!     let flow = LoginFlow::new(manager.clone());
//!     let mut states = flow.watch_state();
//!     flow.start();
//!     while let Some(state) = states.next().await {
//!         if let AuthState::WaitingForAuthorization { user_code, verification_url, .. } = &state {
//!             println!("Go to {verification_url} and enter {user_code}");
//!         }
//!         if state.is_terminal() {
//!             break;
//!         }
//!     }
//! }
//! let _bearer = manager.get_valid_token().await;
//! # Ok(())
//! # }
//! ```

pub mod auth;
pub mod client;
pub mod config;

#[cfg(feature = "cli")]
pub mod cli;

pub use auth::error::{AuthError, Result};
