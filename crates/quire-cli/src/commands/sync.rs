use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use quire_core::notify::{Notification, NotificationBus, RefreshReason};
use quire_core::state::ClientState;
use quire_core::sync::{HttpTransport, SkipReason, SyncCoordinator, SyncOutcome, SyncScheduler};
use tokio::sync::broadcast::error::RecvError;

use crate::commands::common::{open_store, require_user, sync_config};
use crate::error::CliError;

pub async fn run_sync(full: bool, server_url: Option<&str>, db_path: &Path) -> Result<(), CliError> {
    let config = sync_config(server_url)?;
    let store = open_store(db_path).await?;
    require_user(&store).await?;

    let transport = HttpTransport::new(&config)?;
    let coordinator = SyncCoordinator::new(store, transport, NotificationBus::new());
    let outcome = if full {
        coordinator.force_queue_sync().await
    } else {
        coordinator.request_sync().await
    };

    println!("{}", describe_outcome(outcome)?);
    Ok(())
}

/// User-facing summary of a finished sync, or the error to exit with.
pub fn describe_outcome(outcome: SyncOutcome) -> Result<String, CliError> {
    match outcome {
        SyncOutcome::Completed(report) => {
            let mut summary = format!(
                "Sync completed: sent {}, received {}",
                report.sent, report.received
            );
            if report.queue_resynced {
                summary.push_str(" (full resync)");
            }
            Ok(summary)
        }
        SyncOutcome::Skipped(SkipReason::Demo) => Ok("Demo session; nothing to sync".to_string()),
        SyncOutcome::Skipped(SkipReason::NotSignedIn) => Err(CliError::NotSignedIn),
        SyncOutcome::Deferred => Ok("Sync already running; queued another round".to_string()),
        SyncOutcome::Offline => Err(CliError::SyncFailed(
            "server unreachable; local changes stay queued".to_string(),
        )),
        SyncOutcome::SignedOut => Err(CliError::SyncFailed(
            "session rejected by server; run `quire login` again".to_string(),
        )),
        SyncOutcome::UpdateRequired => Err(CliError::SyncFailed(
            "the server requires a newer version of quire".to_string(),
        )),
        SyncOutcome::Failed(message) => Err(CliError::SyncFailed(message)),
    }
}

/// Status line for a notification.
pub fn describe_notification(state: &ClientState, notification: &Notification) -> String {
    match notification {
        Notification::SyncStatus { .. } => {
            format!("[{}] pending: {}", state.sync.label(), state.pending)
        }
        Notification::NotesChanged => "Notes updated from another device".to_string(),
        Notification::Error(message) => format!("Sync error: {message}"),
        Notification::RefreshPage(RefreshReason::SessionExpired) => {
            "Session expired; run `quire login` again".to_string()
        }
        Notification::RefreshPage(RefreshReason::UpdateAvailable) => {
            "A newer version of quire is required".to_string()
        }
    }
}

pub async fn run_watch(
    interval_secs: u64,
    server_url: Option<&str>,
    db_path: &Path,
) -> Result<(), CliError> {
    let config =
        sync_config(server_url)?.with_sync_interval(Duration::from_secs(interval_secs.max(1)));
    let store = open_store(db_path).await?;
    let user = require_user(&store).await?;
    if user.demo {
        println!("Demo session; nothing to sync");
        return Ok(());
    }

    let bus = NotificationBus::new();
    let mut notifications = bus.subscribe();
    let transport = HttpTransport::new(&config)?;
    let coordinator = Arc::new(SyncCoordinator::new(store, transport, bus));
    let scheduler = SyncScheduler::start(coordinator, &config);
    scheduler.trigger().sync_now();

    println!("Watching for changes; press Ctrl-C to stop");
    let mut state = ClientState::default();
    loop {
        tokio::select! {
            signal = tokio::signal::ctrl_c() => {
                signal?;
                break;
            }
            received = notifications.recv() => {
                let notification = match received {
                    Ok(notification) => notification,
                    Err(RecvError::Lagged(_)) => continue,
                    Err(RecvError::Closed) => break,
                };
                state = state.reduce(&notification);
                println!("{}", describe_notification(&state, &notification));
                if state.notes_stale {
                    state = state.notes_reloaded();
                }
                if state.reload_required.is_some() {
                    break;
                }
            }
        }
    }

    scheduler.shutdown();
    match state.reload_required {
        Some(RefreshReason::SessionExpired) => Err(CliError::NotSignedIn),
        Some(RefreshReason::UpdateAvailable) => Err(CliError::SyncFailed(
            "the server requires a newer version of quire".to_string(),
        )),
        None => Ok(()),
    }
}
