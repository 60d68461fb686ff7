//! Shared note store used by clients and the sync coordinator.

use std::path::PathBuf;
use std::sync::Arc;

use rusqlite::Transaction;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::sync::Mutex;

use crate::db::{
    Database, NoteFilter, NoteRepository, QueueRepository, SettingsRepository,
    SqliteNoteRepository, SqliteQueueRepository, SqliteSettingsRepository, TransactionMode,
};
use crate::models::settings::{SYNC_NUMBER, USER};
use crate::models::{Note, NoteHead, NoteId, Preferences, SettingKey, User};
use crate::{Error, Result};

/// Thread-safe handle over the local database.
///
/// Every editing operation writes the note and its outgoing queue entry in
/// one transaction, so a change is either stored and pending or not stored.
#[derive(Clone)]
pub struct NoteStore {
    db: Arc<Mutex<Database>>,
    db_path: Option<PathBuf>,
}

impl NoteStore {
    /// Open a store at the given filesystem path, creating parent directories.
    pub async fn open_path(db_path: impl Into<PathBuf>) -> Result<Self> {
        let db_path = db_path.into();
        if let Some(parent) = db_path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let db = Database::open(&db_path)?;
        tracing::debug!(path = %db_path.display(), "Opened local note store");
        Ok(Self {
            db: Arc::new(Mutex::new(db)),
            db_path: Some(db_path),
        })
    }

    /// Open an in-memory store (primarily for tests).
    pub fn open_in_memory() -> Result<Self> {
        let db = Database::open_in_memory()?;
        Ok(Self {
            db: Arc::new(Mutex::new(db)),
            db_path: None,
        })
    }

    /// Path of the backing database file, `None` when in memory.
    pub fn path(&self) -> Option<&std::path::Path> {
        self.db_path.as_deref()
    }

    /// Run `body` as one atomic unit of work across notes, queue, and settings.
    pub async fn transaction<T, F>(&self, mode: TransactionMode, body: F) -> Result<T>
    where
        F: FnOnce(&Transaction<'_>) -> Result<T>,
    {
        let mut db = self.db.lock().await;
        db.transaction(mode, body)
    }

    /// Fetch a note by id, tombstones included.
    pub async fn get(&self, id: &NoteId) -> Result<Option<Note>> {
        let db = self.db.lock().await;
        SqliteNoteRepository::new(db.connection()).get(id)
    }

    /// List live notes matching `filter`.
    pub async fn get_all(&self, filter: &NoteFilter) -> Result<Vec<Note>> {
        let db = self.db.lock().await;
        SqliteNoteRepository::new(db.connection()).list(filter)
    }

    /// Live notes whose id starts with `prefix`.
    pub async fn find_by_prefix(&self, prefix: &str) -> Result<Vec<Note>> {
        let db = self.db.lock().await;
        SqliteNoteRepository::new(db.connection()).find_by_prefix(prefix)
    }

    /// Store a note as-is without queueing it.
    pub async fn put(&self, note: &Note) -> Result<()> {
        let db = self.db.lock().await;
        SqliteNoteRepository::new(db.connection()).put(note)
    }

    /// Queue a head for upload.
    pub async fn enqueue(&self, head: &NoteHead) -> Result<()> {
        let db = self.db.lock().await;
        SqliteQueueRepository::new(db.connection()).enqueue(head)
    }

    /// Drop a queue entry.
    pub async fn dequeue(&self, id: &NoteId) -> Result<bool> {
        let db = self.db.lock().await;
        SqliteQueueRepository::new(db.connection()).dequeue(id)
    }

    /// Pending queue entries.
    pub async fn pending(&self) -> Result<Vec<NoteHead>> {
        let db = self.db.lock().await;
        SqliteQueueRepository::new(db.connection()).list()
    }

    /// Number of local changes not yet acknowledged by the server.
    pub async fn pending_count(&self) -> Result<usize> {
        let db = self.db.lock().await;
        SqliteQueueRepository::new(db.connection()).count()
    }

    /// Heads of every stored note, tombstones included.
    pub async fn all_heads(&self) -> Result<Vec<NoteHead>> {
        let db = self.db.lock().await;
        SqliteNoteRepository::new(db.connection()).heads()
    }

    /// Read a typed setting.
    pub async fn get_setting<T>(&self, key: &SettingKey<T>) -> Result<Option<T>>
    where
        T: Serialize + DeserializeOwned,
    {
        let db = self.db.lock().await;
        SqliteSettingsRepository::new(db.connection()).get_setting(key)
    }

    /// Write a typed setting.
    pub async fn set_setting<T>(&self, key: &SettingKey<T>, value: &T) -> Result<()>
    where
        T: Serialize + DeserializeOwned,
    {
        let db = self.db.lock().await;
        SqliteSettingsRepository::new(db.connection()).set_setting(key, value)
    }

    /// Create a note and queue it.
    pub async fn create_note(&self, text: &str) -> Result<Note> {
        let note = Note::new(text);
        self.save_and_enqueue(&note).await?;
        tracing::debug!(id = %note.id, "Created note");
        Ok(note)
    }

    /// Replace a note's text.
    pub async fn update_text(&self, id: &NoteId, text: &str) -> Result<Note> {
        self.modify(id, |note| note.set_text(text)).await
    }

    /// Turn a note into a tombstone.
    pub async fn delete_note(&self, id: &NoteId) -> Result<Note> {
        self.modify(id, Note::tombstone).await
    }

    /// Archive or unarchive a note.
    pub async fn set_archived(&self, id: &NoteId, archived: bool) -> Result<Note> {
        self.modify(id, |note| note.set_archived(archived)).await
    }

    /// Pin or unpin a note.
    pub async fn set_pinned(&self, id: &NoteId, pinned: bool) -> Result<Note> {
        self.modify(id, |note| note.set_pinned(pinned)).await
    }

    /// Move a note to a new display rank.
    pub async fn set_order(&self, id: &NoteId, order: i64) -> Result<Note> {
        self.modify(id, |note| note.set_order(order)).await
    }

    async fn save_and_enqueue(&self, note: &Note) -> Result<()> {
        self.transaction(TransactionMode::ReadWrite, |tx| {
            SqliteNoteRepository::new(tx).put(note)?;
            SqliteQueueRepository::new(tx).enqueue(&note.head())
        })
        .await
    }

    /// Load a live note, apply `change`, and store it with its queue entry.
    async fn modify<F>(&self, id: &NoteId, change: F) -> Result<Note>
    where
        F: FnOnce(&mut Note),
    {
        self.transaction(TransactionMode::ReadWrite, |tx| {
            let notes = SqliteNoteRepository::new(tx);
            let mut note = notes
                .get(id)?
                .filter(|note| !note.is_deleted())
                .ok_or_else(|| Error::NotFound(format!("Note {id} not found")))?;

            change(&mut note);
            notes.put(&note)?;
            SqliteQueueRepository::new(tx).enqueue(&note.head())?;
            Ok(note)
        })
        .await
    }

    /// The signed-in user, if any.
    pub async fn user(&self) -> Result<Option<User>> {
        self.get_setting(&USER).await
    }

    /// Store a session produced by the login flow.
    ///
    /// The sync counter is reset so the first sync starts with a queue resync.
    pub async fn sign_in(&self, user: &User) -> Result<()> {
        self.transaction(TransactionMode::ReadWrite, |tx| {
            let settings = SqliteSettingsRepository::new(tx);
            settings.set_setting(&USER, user)?;
            settings.remove_setting(&SYNC_NUMBER)
        })
        .await?;
        tracing::info!(username = %user.username, demo = user.demo, "Signed in");
        Ok(())
    }

    /// Clear the session and the sync counter.
    pub async fn sign_out(&self) -> Result<()> {
        self.transaction(TransactionMode::ReadWrite, |tx| {
            let settings = SqliteSettingsRepository::new(tx);
            settings.remove_setting(&USER)?;
            settings.remove_setting(&SYNC_NUMBER)
        })
        .await?;
        tracing::info!("Signed out");
        Ok(())
    }

    /// Load list preferences.
    pub async fn load_preferences(&self) -> Result<Preferences> {
        let db = self.db.lock().await;
        SqliteSettingsRepository::new(db.connection()).load_preferences()
    }

    /// Save list preferences.
    pub async fn save_preferences(&self, preferences: &Preferences) -> Result<()> {
        let db = self.db.lock().await;
        SqliteSettingsRepository::new(db.connection()).save_preferences(preferences)
    }
}
