//! CLI command handlers.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::broadcast::error::RecvError;

use crate::auth::login::{AuthState, LoginFlow};
use crate::auth::manager::TokenManager;
use crate::client::{fetch_account_info, AuthorizedClient};
use crate::config::AuthConfig;

type CliResult = Result<(), Box<dyn std::error::Error>>;

/// Handle `tubeauth login`.
pub async fn handle_login(config: &AuthConfig) -> CliResult {
    let manager = config.token_manager()?;
    if manager.is_logged_in().await {
        println!("Already logged in. Run `tubeauth logout` first to switch accounts.");
        return Ok(());
    }

    let flow = LoginFlow::new(manager);
    let mut transitions = flow.subscribe();
    flow.start();

    loop {
        let state = match transitions.recv().await {
            Ok(state) => state,
            Err(RecvError::Lagged(_)) => continue,
            Err(RecvError::Closed) => break,
        };
        match state {
            AuthState::RequestingCode => println!("Requesting device code..."),
            AuthState::WaitingForAuthorization {
                user_code,
                verification_url,
                expires_in_secs,
            } => {
                println!("Visit: {verification_url}");
                println!("Enter code: {user_code}");
                println!("Waiting for authorization (code valid for {expires_in_secs}s)...");
            }
            AuthState::Authenticated => {
                println!("Login successful.");
                return Ok(());
            }
            AuthState::Error { message } => return Err(message.into()),
            AuthState::Expired => return Err("device code expired, please try again".into()),
            AuthState::Idle | AuthState::Polling => {}
        }
    }
    Err("login ended unexpectedly".into())
}

/// Handle `tubeauth status`.
pub async fn handle_status(config: &AuthConfig) -> CliResult {
    let manager = config.token_manager()?;
    let tokens = manager.tokens();
    println!("Token file: {}", config.token_store().path().display());
    if !tokens.is_logged_in().await? {
        println!("Status: not logged in");
        return Ok(());
    }
    let expiry = tokens
        .expires_at_ms()
        .await?
        .and_then(DateTime::<Utc>::from_timestamp_millis)
        .map_or_else(|| "unknown".to_string(), |at| at.to_rfc3339());
    let state = if tokens.is_expired().await? {
        "expired (will refresh on next use)"
    } else {
        "valid"
    };
    println!("Status: logged in");
    println!("Access token: {state}, expires {expiry}");
    Ok(())
}

/// Handle `tubeauth token`.
pub async fn handle_token(config: &AuthConfig) -> CliResult {
    let manager = config.token_manager()?;
    match manager.get_valid_token().await {
        Some(token) => {
            println!("{token}");
            Ok(())
        }
        None => Err("not logged in; run `tubeauth login`".into()),
    }
}

/// Handle `tubeauth account`.
pub async fn handle_account(config: &AuthConfig) -> CliResult {
    let manager: Arc<TokenManager> = config.token_manager()?;
    let client = AuthorizedClient::new(config.http_client()?, manager);
    let info = fetch_account_info(&client).await?;
    println!("Name: {}", info.name);
    if let Some(email) = info.email {
        println!("Email: {email}");
    }
    if let Some(url) = info.thumbnail_url {
        println!("Photo: {url}");
    }
    Ok(())
}

/// Handle `tubeauth logout`.
pub async fn handle_logout(config: &AuthConfig) -> CliResult {
    let manager = config.token_manager()?;
    manager.logout().await?;
    println!("Logged out.");
    Ok(())
}
