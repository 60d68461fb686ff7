//! Client half of the sync engine.
//!
//! [`SyncCoordinator`] runs sync cycles against a [`SyncTransport`];
//! [`SyncScheduler`] decides when. [`HttpTransport`] is the production
//! transport.

mod coordinator;
mod http;
mod scheduler;
mod transport;

use std::time::Duration;

use thiserror::Error;

use crate::util::{is_http_url, normalize_text_option};

pub use coordinator::{SkipReason, SyncCoordinator, SyncOutcome, SyncReport};
pub use http::HttpTransport;
pub use scheduler::{SyncScheduler, SyncTrigger};
pub use transport::SyncTransport;

/// Result type for sync operations.
pub type SyncResult<T> = std::result::Result<T, SyncError>;

/// Errors that can end a sync cycle.
#[derive(Debug, Error)]
pub enum SyncError {
    /// The server could not be reached.
    #[error("Server unreachable: {0}")]
    Offline(String),

    /// The server rejected the session token.
    #[error("Session rejected by server")]
    Unauthorized,

    /// The server requires a newer protocol version.
    #[error("Client is outdated; an update is required")]
    ClientOutdated,

    /// The server answered with an error status.
    #[error("Sync API error: {message}")]
    Server { status: u16, message: String },

    /// The exchange did not follow the protocol.
    #[error("Sync protocol error: {0}")]
    Protocol(String),

    /// Invalid client configuration.
    #[error("Invalid sync configuration: {0}")]
    InvalidConfiguration(String),

    /// Local store failure.
    #[error(transparent)]
    Store(#[from] crate::Error),
}

impl SyncError {
    /// Whether a later attempt may succeed without user action.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        match self {
            Self::Offline(_) => true,
            Self::Server { status, .. } => *status >= 500,
            _ => false,
        }
    }
}

/// Client sync configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncConfig {
    /// Base URL of the sync server, without a trailing slash
    pub server_url: String,
    /// Periodic sync interval (default: 60 seconds), `None` disables it
    pub sync_interval: Option<Duration>,
    /// Quiet period after a local edit before syncing (default: 2 seconds)
    pub debounce: Duration,
    /// Longest a burst of edits can postpone a sync (default: 10 seconds)
    pub max_debounce_wait: Duration,
    /// HTTP request timeout (default: 30 seconds)
    pub request_timeout: Duration,
}

impl SyncConfig {
    /// Create a configuration for the given server.
    pub fn new(server_url: impl Into<String>) -> SyncResult<Self> {
        Ok(Self {
            server_url: normalize_server_url(server_url.into())?,
            sync_interval: Some(Duration::from_secs(60)),
            debounce: Duration::from_secs(2),
            max_debounce_wait: Duration::from_secs(10),
            request_timeout: Duration::from_secs(30),
        })
    }

    /// Set the periodic sync interval
    #[must_use]
    pub const fn with_sync_interval(mut self, interval: Duration) -> Self {
        self.sync_interval = Some(interval);
        self
    }

    /// Disable periodic sync (edits and manual triggers only)
    #[must_use]
    pub const fn without_periodic_sync(mut self) -> Self {
        self.sync_interval = None;
        self
    }

    /// Set the debounce quiet period and its cap
    #[must_use]
    pub const fn with_debounce(mut self, debounce: Duration, max_wait: Duration) -> Self {
        self.debounce = debounce;
        self.max_debounce_wait = max_wait;
        self
    }

    /// Set the HTTP request timeout
    #[must_use]
    pub const fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }
}

fn normalize_server_url(raw: String) -> SyncResult<String> {
    let url = normalize_text_option(Some(raw)).ok_or_else(|| {
        SyncError::InvalidConfiguration("server URL must not be empty".to_string())
    })?;
    if is_http_url(&url) {
        Ok(url.trim_end_matches('/').to_string())
    } else {
        Err(SyncError::InvalidConfiguration(
            "server URL must include http:// or https://".to_string(),
        ))
    }
}
