use std::path::Path;

use quire_core::crypto::EncryptionKey;
use quire_core::models::settings::SYNC_NUMBER;
use quire_core::models::{Preferences, User};
use serde::Serialize;

use crate::commands::common::open_store;
use crate::error::CliError;

#[derive(Debug, Serialize)]
pub struct StatusReport {
    pub username: Option<String>,
    pub demo: bool,
    pub pending: usize,
    pub sync_number: Option<i64>,
    pub preferences: Preferences,
}

/// Build the session record for `quire login`.
///
/// Returns the user and whether the key was generated here.
pub fn build_user(
    username: &str,
    token: &str,
    key: Option<&str>,
    demo: bool,
) -> Result<(User, bool), CliError> {
    let username = username.trim();
    let token = token.trim();
    if username.is_empty() || token.is_empty() {
        return Err(quire_core::Error::InvalidInput(
            "username and token must not be empty".to_string(),
        )
        .into());
    }

    let (key, generated) = match key {
        Some(encoded) => (EncryptionKey::from_base64(encoded)?, false),
        None => (EncryptionKey::generate(), true),
    };

    Ok((
        User {
            username: username.to_string(),
            token: token.to_string(),
            encryption_key: key.to_base64(),
            demo,
        },
        generated,
    ))
}

pub async fn run_login(
    username: &str,
    token: &str,
    key: Option<&str>,
    demo: bool,
    db_path: &Path,
) -> Result<(), CliError> {
    let (user, generated) = build_user(username, token, key, demo)?;
    let store = open_store(db_path).await?;
    store.sign_in(&user).await?;

    println!("Signed in as {}", user.username);
    if generated {
        println!("Generated a new encryption key. Use it to sign in on your other devices:");
        println!("  {}", user.encryption_key);
    }
    Ok(())
}

pub async fn run_logout(db_path: &Path) -> Result<(), CliError> {
    let store = open_store(db_path).await?;
    store.sign_out().await?;
    println!("Signed out");
    Ok(())
}

pub async fn status_report(db_path: &Path) -> Result<StatusReport, CliError> {
    let store = open_store(db_path).await?;
    let user = store.user().await?;

    Ok(StatusReport {
        demo: user.as_ref().is_some_and(|user| user.demo),
        username: user.map(|user| user.username),
        pending: store.pending_count().await?,
        sync_number: store.get_setting(&SYNC_NUMBER).await?,
        preferences: store.load_preferences().await?,
    })
}

pub async fn run_status(as_json: bool, db_path: &Path) -> Result<(), CliError> {
    let report = status_report(db_path).await?;

    if as_json {
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    match (&report.username, report.demo) {
        (Some(username), true) => println!("Signed in as {username} (demo, sync disabled)"),
        (Some(username), false) => println!("Signed in as {username}"),
        (None, _) => println!("Not signed in"),
    }
    println!("Pending changes: {}", report.pending);
    match report.sync_number {
        Some(sync_number) => println!("Sync counter: {sync_number}"),
        None => println!("Sync counter: not synced yet"),
    }
    Ok(())
}
