//! Shared client state types.

use crate::notify::{Notification, RefreshReason};

/// Unified sync state shown by every client.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum SyncState {
    #[default]
    Offline,
    Syncing,
    Synced,
    Error,
}

impl SyncState {
    /// Short label for status lines
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Offline => "offline",
            Self::Syncing => "syncing",
            Self::Synced => "synced",
            Self::Error => "error",
        }
    }
}

/// What a client shows about sync, derived from bus notifications.
///
/// Each notification produces a new value; nothing is mutated in place, so a
/// state can be handed across tasks freely.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ClientState {
    /// Latest sync state
    pub sync: SyncState,
    /// Size of the outgoing queue at the last status update
    pub pending: usize,
    /// Last error message, cleared by the next successful sync
    pub last_error: Option<String>,
    /// Set when a sync imported notes and the visible list should reload
    pub notes_stale: bool,
    /// Set when the client must restart (session expired or update available)
    pub reload_required: Option<RefreshReason>,
}

impl ClientState {
    /// Apply one notification.
    #[must_use]
    pub fn reduce(self, notification: &Notification) -> Self {
        match notification {
            Notification::SyncStatus { state, pending } => Self {
                sync: *state,
                pending: *pending,
                last_error: if *state == SyncState::Synced {
                    None
                } else {
                    self.last_error
                },
                ..self
            },
            Notification::NotesChanged => Self {
                notes_stale: true,
                ..self
            },
            Notification::Error(message) => Self {
                last_error: Some(message.clone()),
                ..self
            },
            Notification::RefreshPage(reason) => Self {
                reload_required: Some(*reason),
                ..self
            },
        }
    }

    /// Acknowledge a list reload.
    #[must_use]
    pub fn notes_reloaded(self) -> Self {
        Self {
            notes_stale: false,
            ..self
        }
    }
}
