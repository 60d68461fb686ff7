//! Device-local notification bus.
//!
//! The sync coordinator publishes here; UI layers subscribe to keep their
//! view current. Delivery is best effort: a slow subscriber that falls more
//! than the channel capacity behind skips the oldest notifications.

use std::fmt;
use std::future::Future;

use tokio::sync::broadcast;
use tokio::task::JoinHandle;

use crate::state::SyncState;

const DEFAULT_CAPACITY: usize = 64;

/// Notification categories subscribers can filter on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Topic {
    SyncStatus,
    NotesChanged,
    Error,
    RefreshPage,
}

impl Topic {
    /// Wire-style tag of the topic
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::SyncStatus => "syncStatus",
            Self::NotesChanged => "notesInStorageChangedExternally",
            Self::Error => "error",
            Self::RefreshPage => "refreshPage",
        }
    }
}

impl fmt::Display for Topic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why a client must reload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshReason {
    /// The server rejected the session; the user is signed out
    SessionExpired,
    /// The server requires a newer client
    UpdateAvailable,
}

/// A message on the bus.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notification {
    /// Sync state plus the outgoing queue size
    SyncStatus { state: SyncState, pending: usize },
    /// A sync stored notes that did not originate on this device
    NotesChanged,
    /// A sync failed with a message worth showing
    Error(String),
    /// The client has to reload
    RefreshPage(RefreshReason),
}

impl Notification {
    /// Topic this notification is published under
    #[must_use]
    pub const fn topic(&self) -> Topic {
        match self {
            Self::SyncStatus { .. } => Topic::SyncStatus,
            Self::NotesChanged => Topic::NotesChanged,
            Self::Error(_) => Topic::Error,
            Self::RefreshPage(_) => Topic::RefreshPage,
        }
    }
}

/// Broadcast bus scoped to one device.
#[derive(Clone)]
pub struct NotificationBus {
    sender: broadcast::Sender<Notification>,
}

impl Default for NotificationBus {
    fn default() -> Self {
        Self::new()
    }
}

impl NotificationBus {
    /// Create a bus with the default capacity
    #[must_use]
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    /// Create a bus buffering up to `capacity` notifications per subscriber
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    /// Publish a notification to every current subscriber.
    pub fn publish(&self, notification: Notification) {
        let topic = notification.topic();
        if self.sender.send(notification).is_err() {
            tracing::trace!(%topic, "No subscribers for notification");
        }
    }

    /// Receive every notification published from now on.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<Notification> {
        self.sender.subscribe()
    }

    /// Receive only notifications of one topic.
    #[must_use]
    pub fn subscribe_filtered(&self, topic: Topic) -> TopicReceiver {
        TopicReceiver {
            receiver: self.sender.subscribe(),
            topic,
        }
    }

    /// Run `handler` for each notification of `topic` on a spawned task.
    ///
    /// The task ends when the bus is dropped; abort the handle to stop early.
    pub fn subscribe_topic<F, Fut>(&self, topic: Topic, mut handler: F) -> JoinHandle<()>
    where
        F: FnMut(Notification) -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let mut receiver = self.subscribe_filtered(topic);
        tokio::spawn(async move {
            while let Some(notification) = receiver.recv().await {
                handler(notification).await;
            }
        })
    }

    /// Number of live subscribers
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

/// Receiver that yields only one topic.
pub struct TopicReceiver {
    receiver: broadcast::Receiver<Notification>,
    topic: Topic,
}

impl TopicReceiver {
    /// Wait for the next matching notification; `None` once the bus is gone.
    pub async fn recv(&mut self) -> Option<Notification> {
        loop {
            match self.receiver.recv().await {
                Ok(notification) if notification.topic() == self.topic => {
                    return Some(notification)
                }
                Ok(_) => {}
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::warn!(topic = %self.topic, skipped, "Notification subscriber lagged");
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }
}
