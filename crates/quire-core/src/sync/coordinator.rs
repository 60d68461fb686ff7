//! Sync cycle state machine.
//!
//! A cycle is a delta phase (push queued notes, pull notes queued for this
//! device), preceded by a queue phase (exchange every head so the server can
//! rebuild this device's queue) when the device has never synced, when the
//! caller forces it, or when the server reports that the sync counters
//! diverged. Every merge runs in one local transaction.

use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};

use crate::crypto::{AesGcmCipher, EncryptionKey, NoteCipher};
use crate::db::{
    NoteRepository, QueueRepository, SettingsRepository, SqliteNoteRepository,
    SqliteQueueRepository, SqliteSettingsRepository, TransactionMode,
};
use crate::models::settings::SYNC_NUMBER;
use crate::models::{Note, NoteHead, NoteId, User};
use crate::notify::{Notification, NotificationBus, RefreshReason};
use crate::protocol::{DeltaSyncRequest, DeltaSyncResponse, QueueSyncRequest};
use crate::state::SyncState;
use crate::store::NoteStore;

use super::{SyncError, SyncResult, SyncTransport};

/// Queue resyncs allowed per cycle before divergence is reported as an error.
const MAX_ROUNDS: usize = 3;

/// Why a cycle did nothing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    NotSignedIn,
    Demo,
}

/// Counts from one completed cycle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SyncReport {
    /// Notes pushed to the server
    pub sent: usize,
    /// Notes pulled from the server and stored locally
    pub received: usize,
    /// Notes queued for upload by a queue phase
    pub enqueued: usize,
    /// Whether a queue phase ran
    pub queue_resynced: bool,
}

/// How a sync request ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncOutcome {
    /// Nothing to do for this session
    Skipped(SkipReason),
    /// A cycle was already running; it runs once more when it finishes
    Deferred,
    /// The cycle merged successfully
    Completed(SyncReport),
    /// The server was unreachable
    Offline,
    /// The server rejected the session, which has been cleared
    SignedOut,
    /// The server requires a newer client
    UpdateRequired,
    /// Any other failure, already published on the bus
    Failed(String),
}

#[derive(Debug, Default)]
struct RunState {
    running: bool,
    rerun: bool,
    force_queue: bool,
}

/// Releases the running flag however the cycle ends.
struct RunGuard<'a> {
    state: &'a Mutex<RunState>,
    released: bool,
}

impl RunGuard<'_> {
    /// Claim a rerun requested while running, or release the running flag.
    ///
    /// Returns the forced-queue flag for the next round, `None` when done.
    fn next_round(&mut self) -> Option<bool> {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        if state.rerun {
            state.rerun = false;
            Some(std::mem::take(&mut state.force_queue))
        } else {
            state.running = false;
            self.released = true;
            None
        }
    }
}

impl Drop for RunGuard<'_> {
    fn drop(&mut self) {
        if !self.released {
            let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
            state.running = false;
            state.rerun = false;
        }
    }
}

enum DeltaOutcome {
    Merged { sent: usize, received: usize },
    RequireFullSync,
}

/// Runs sync cycles for one device, at most one at a time.
pub struct SyncCoordinator<T, C = AesGcmCipher> {
    store: NoteStore,
    transport: T,
    cipher: C,
    bus: NotificationBus,
    run_state: Mutex<RunState>,
}

impl<T: SyncTransport> SyncCoordinator<T> {
    /// Create a coordinator using AES-GCM note encryption.
    pub fn new(store: NoteStore, transport: T, bus: NotificationBus) -> Self {
        Self::with_cipher(store, transport, AesGcmCipher, bus)
    }
}

impl<T, C> SyncCoordinator<T, C>
where
    T: SyncTransport,
    C: NoteCipher,
{
    /// Create a coordinator with a custom cipher.
    pub fn with_cipher(store: NoteStore, transport: T, cipher: C, bus: NotificationBus) -> Self {
        Self {
            store,
            transport,
            cipher,
            bus,
            run_state: Mutex::new(RunState::default()),
        }
    }

    #[cfg(test)]
    pub(crate) const fn transport(&self) -> &T {
        &self.transport
    }

    /// Whether a cycle is in flight.
    pub fn is_syncing(&self) -> bool {
        self.run_state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .running
    }

    /// Run a sync cycle, or schedule one more if a cycle is in flight.
    pub async fn request_sync(&self) -> SyncOutcome {
        self.run(false).await
    }

    /// Like [`Self::request_sync`], but always starts with a queue phase.
    pub async fn force_queue_sync(&self) -> SyncOutcome {
        self.run(true).await
    }

    async fn run(&self, force_queue: bool) -> SyncOutcome {
        {
            let mut state = self
                .run_state
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            if state.running {
                state.rerun = true;
                state.force_queue |= force_queue;
                tracing::debug!(force_queue, "Sync already running; scheduled another round");
                return SyncOutcome::Deferred;
            }
            state.running = true;
        }

        let mut guard = RunGuard {
            state: &self.run_state,
            released: false,
        };
        let mut force = force_queue;
        loop {
            let outcome = self.run_cycle(force).await;
            match guard.next_round() {
                Some(next_force) => force = next_force,
                None => return outcome,
            }
        }
    }

    async fn run_cycle(&self, force_queue: bool) -> SyncOutcome {
        let user = match self.store.user().await {
            Ok(Some(user)) => user,
            Ok(None) => return SyncOutcome::Skipped(SkipReason::NotSignedIn),
            Err(error) => return self.handle_error(error.into()).await,
        };
        if user.demo {
            return SyncOutcome::Skipped(SkipReason::Demo);
        }

        self.publish_status(SyncState::Syncing).await;
        match self.sync_session(&user, force_queue).await {
            Ok(report) => {
                tracing::info!(
                    sent = report.sent,
                    received = report.received,
                    enqueued = report.enqueued,
                    queue_resynced = report.queue_resynced,
                    "Sync completed"
                );
                let pending = match self.store.pending_count().await {
                    Ok(pending) => pending,
                    Err(error) => return self.handle_error(error.into()).await,
                };
                if pending == 0 {
                    self.bus.publish(Notification::SyncStatus {
                        state: SyncState::Synced,
                        pending,
                    });
                } else {
                    tracing::debug!(pending, "Changes made during sync are still queued; running another round");
                    self.schedule_rerun();
                }
                SyncOutcome::Completed(report)
            }
            Err(error) => self.handle_error(error).await,
        }
    }

    fn schedule_rerun(&self) {
        self.run_state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .rerun = true;
    }

    async fn sync_session(&self, user: &User, force_queue: bool) -> SyncResult<SyncReport> {
        let key = EncryptionKey::from_base64(&user.encryption_key)?;
        let mut report = SyncReport::default();
        let mut need_queue =
            force_queue || self.store.get_setting(&SYNC_NUMBER).await?.is_none();

        for _ in 0..MAX_ROUNDS {
            if need_queue {
                report.enqueued += self.queue_phase(user).await?;
                report.queue_resynced = true;
            }

            match self.delta_phase(user, &key).await? {
                DeltaOutcome::Merged { sent, received } => {
                    report.sent += sent;
                    report.received += received;
                    return Ok(report);
                }
                DeltaOutcome::RequireFullSync => {
                    tracing::info!("Server reported diverged sync counter; resyncing queue");
                    need_queue = true;
                }
            }
        }

        Err(SyncError::Protocol(format!(
            "sync counter still diverged after {MAX_ROUNDS} queue resyncs"
        )))
    }

    async fn delta_phase(&self, user: &User, key: &EncryptionKey) -> SyncResult<DeltaOutcome> {
        let (sync_number, notes, orphans) = self
            .store
            .transaction(TransactionMode::ReadOnly, |tx| {
                let sync_number = SqliteSettingsRepository::new(tx)
                    .get_setting(&SYNC_NUMBER)?
                    .unwrap_or(0);
                let note_repo = SqliteNoteRepository::new(tx);
                let mut notes = Vec::new();
                let mut orphans = Vec::new();
                for head in SqliteQueueRepository::new(tx).list()? {
                    match note_repo.get(&head.id)? {
                        Some(note) => notes.push(note),
                        None => orphans.push(head.id),
                    }
                }
                Ok((sync_number, notes, orphans))
            })
            .await?;

        let sent_heads: Vec<NoteHead> = notes.iter().map(Note::head).collect();
        let request = DeltaSyncRequest {
            notes: notes
                .iter()
                .map(|note| self.cipher.encrypt(note, key))
                .collect::<crate::Result<_>>()?,
            sync_number,
        };

        let (incoming, new_sync_number) =
            match self.transport.delta_sync(&user.token, &request).await? {
                DeltaSyncResponse::Ok { notes, sync_number } => (notes, sync_number),
                DeltaSyncResponse::RequireFullSync => return Ok(DeltaOutcome::RequireFullSync),
            };

        let received: Vec<Note> = incoming
            .iter()
            .map(|record| self.cipher.decrypt(record, key))
            .collect::<crate::Result<_>>()?;

        let stored = self
            .store
            .transaction(TransactionMode::ReadWrite, |tx| {
                merge_delta(tx, &sent_heads, &orphans, &received, new_sync_number)
            })
            .await?;

        if stored > 0 {
            self.bus.publish(Notification::NotesChanged);
        }
        tracing::debug!(
            sent = sent_heads.len(),
            received = received.len(),
            stored,
            sync_number = new_sync_number,
            "Delta sync merged"
        );

        Ok(DeltaOutcome::Merged {
            sent: sent_heads.len(),
            received: stored,
        })
    }

    async fn queue_phase(&self, user: &User) -> SyncResult<usize> {
        let (sync_number, heads) = self
            .store
            .transaction(TransactionMode::ReadOnly, |tx| {
                let sync_number = SqliteSettingsRepository::new(tx)
                    .get_setting(&SYNC_NUMBER)?
                    .unwrap_or(0);
                let heads = SqliteNoteRepository::new(tx).heads()?;
                Ok((sync_number, heads))
            })
            .await?;

        let request = QueueSyncRequest {
            note_heads: heads,
            sync_number,
        };
        let response = self.transport.queue_sync(&user.token, &request).await?;

        let server_heads: HashMap<NoteId, &str> = response
            .note_heads
            .iter()
            .map(|head| (head.id, head.modification_date.as_str()))
            .collect();

        let enqueued = self
            .store
            .transaction(TransactionMode::ReadWrite, |tx| {
                let queue = SqliteQueueRepository::new(tx);
                let mut enqueued = 0;
                for head in &request.note_heads {
                    match server_heads.get(&head.id) {
                        Some(server_date) if !head.is_newer_than(server_date) => {
                            queue.dequeue_acknowledged(&NoteHead::new(head.id, *server_date))?;
                        }
                        _ => {
                            queue.enqueue(head)?;
                            enqueued += 1;
                        }
                    }
                }
                SqliteSettingsRepository::new(tx).set_setting(&SYNC_NUMBER, &response.sync_number)?;
                Ok(enqueued)
            })
            .await?;

        tracing::debug!(
            local = request.note_heads.len(),
            server = response.note_heads.len(),
            enqueued,
            sync_number = response.sync_number,
            "Queue sync merged"
        );
        Ok(enqueued)
    }

    async fn handle_error(&self, error: SyncError) -> SyncOutcome {
        match error {
            SyncError::Offline(reason) => {
                tracing::info!(%reason, "Sync skipped; server unreachable");
                self.publish_status(SyncState::Offline).await;
                SyncOutcome::Offline
            }
            SyncError::Unauthorized => {
                tracing::warn!("Session rejected by server; signing out");
                if let Err(error) = self.store.sign_out().await {
                    tracing::error!(%error, "Failed to clear rejected session");
                }
                self.bus
                    .publish(Notification::RefreshPage(RefreshReason::SessionExpired));
                self.publish_status(SyncState::Offline).await;
                SyncOutcome::SignedOut
            }
            SyncError::ClientOutdated => {
                tracing::warn!("Server requires a newer client");
                self.bus
                    .publish(Notification::RefreshPage(RefreshReason::UpdateAvailable));
                self.publish_status(SyncState::Error).await;
                SyncOutcome::UpdateRequired
            }
            error => {
                let message = error.to_string();
                tracing::error!(%message, retryable = error.is_retryable(), "Sync failed");
                self.bus.publish(Notification::Error(message.clone()));
                self.publish_status(SyncState::Error).await;
                SyncOutcome::Failed(message)
            }
        }
    }

    async fn publish_status(&self, state: SyncState) {
        let pending = match self.store.pending_count().await {
            Ok(pending) => pending,
            Err(error) => {
                tracing::warn!(%error, "Failed to count pending changes");
                0
            }
        };
        self.bus.publish(Notification::SyncStatus { state, pending });
    }
}

/// Apply a delta response; returns how many received notes were stored.
fn merge_delta(
    tx: &rusqlite::Transaction<'_>,
    sent_heads: &[NoteHead],
    orphans: &[NoteId],
    received: &[Note],
    sync_number: i64,
) -> crate::Result<usize> {
    let notes = SqliteNoteRepository::new(tx);
    let queue = SqliteQueueRepository::new(tx);

    for head in sent_heads {
        queue.dequeue_acknowledged(head)?;
    }
    for id in orphans {
        queue.dequeue(id)?;
    }

    let mut stored = 0;
    for note in received {
        let head = note.head();
        let is_newer = notes
            .get(&note.id)?
            .map_or(true, |existing| head.is_newer_than(&existing.modification_date));
        if is_newer {
            notes.put(note)?;
            queue.dequeue_acknowledged(&head)?;
            stored += 1;
        }
    }

    SqliteSettingsRepository::new(tx).set_setting(&SYNC_NUMBER, &sync_number)?;
    Ok(stored)
}
