//! Authoritative merge engine.
//!
//! The server stores every user's notes in encrypted form and keeps one
//! queue per client token listing the notes that client has not seen yet.
//! Conflicts resolve by last writer wins on the cleartext modification date;
//! ties keep the stored version. Each request runs in one transaction.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use quire_core::protocol::{
    DeltaSyncRequest, DeltaSyncResponse, QueueSyncRequest, QueueSyncResponse,
};
use quire_core::util::{is_canonical_timestamp, timestamp_now};
use quire_core::{EncryptedNote, NoteHead, NoteId};
use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension, Transaction, TransactionBehavior};
use thiserror::Error;
use tokio::sync::Mutex;

use crate::schema;

/// Result type for merge engine operations.
pub type EngineResult<T> = Result<T, EngineError>;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("Unknown client token")]
    Unauthorized,
    #[error("Invalid input: {0}")]
    InvalidInput(String),
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// A client resolved from its bearer token.
#[derive(Clone, PartialEq, Eq)]
pub struct AuthenticatedClient {
    pub token: String,
    pub username: String,
}

impl std::fmt::Debug for AuthenticatedClient {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter
            .debug_struct("AuthenticatedClient")
            .field("token", &"[REDACTED]")
            .field("username", &self.username)
            .finish()
    }
}

/// Thread-safe handle to the server database.
#[derive(Clone)]
pub struct MergeEngine {
    conn: Arc<Mutex<Connection>>,
}

impl MergeEngine {
    /// Open the server database at `path`, creating it if needed.
    pub fn open(path: impl AsRef<Path>) -> EngineResult<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        Self::initialize(Connection::open(path)?)
    }

    /// Open an in-memory database (useful for testing).
    pub fn open_in_memory() -> EngineResult<Self> {
        Self::initialize(Connection::open_in_memory()?)
    }

    fn initialize(mut conn: Connection) -> EngineResult<Self> {
        conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| {
            row.get::<_, String>(0)
        })
        .ok();
        conn.pragma_update(None, "synchronous", "NORMAL").ok();
        schema::run(&mut conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    async fn write<T, F>(&self, body: F) -> EngineResult<T>
    where
        F: FnOnce(&Transaction<'_>) -> EngineResult<T>,
    {
        let mut conn = self.conn.lock().await;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let value = body(&tx)?;
        tx.commit()?;
        Ok(value)
    }

    /// Create or re-associate a client token with a user.
    ///
    /// Called by the credential issuance flow after a successful login. The
    /// client starts with counter 0 and an empty queue, so its first sync is
    /// answered with a divergence signal unless it also starts at 0.
    pub async fn register_client(&self, username: &str, token: &str) -> EngineResult<()> {
        let (username, token) = validate_credential(username, token)?;
        self.write(|tx| reset_client(tx, username, token)).await?;
        tracing::info!(username, "Registered sync client");
        Ok(())
    }

    /// Register the client unless the token already belongs to `username`.
    ///
    /// Returns whether the client was (re)registered. Existing clients keep
    /// their counter and queue, so this is safe to run at every startup.
    pub async fn ensure_client(&self, username: &str, token: &str) -> EngineResult<bool> {
        let (username, token) = validate_credential(username, token)?;
        let registered = self
            .write(|tx| {
                let current: Option<String> = tx
                    .query_row(
                        "SELECT username FROM clients WHERE token = ?",
                        params![token],
                        |row| row.get(0),
                    )
                    .optional()?;
                if current.as_deref() == Some(username) {
                    return Ok(false);
                }
                reset_client(tx, username, token)?;
                Ok(true)
            })
            .await?;
        if registered {
            tracing::info!(username, "Registered sync client");
        }
        Ok(registered)
    }

    /// Resolve a bearer token to its client and record the activity.
    pub async fn authenticate(&self, token: &str) -> EngineResult<AuthenticatedClient> {
        self.write(|tx| {
            let username: String = tx
                .query_row(
                    "SELECT username FROM clients WHERE token = ?",
                    params![token],
                    |row| row.get(0),
                )
                .optional()?
                .ok_or(EngineError::Unauthorized)?;
            tx.execute(
                "UPDATE clients SET last_activity_date = ? WHERE token = ?",
                params![timestamp_now(), token],
            )?;
            Ok(AuthenticatedClient {
                token: token.to_string(),
                username,
            })
        })
        .await
    }

    /// Merge a client's queued notes and hand back the notes queued for it.
    pub async fn delta_sync(
        &self,
        client: &AuthenticatedClient,
        request: &DeltaSyncRequest,
    ) -> EngineResult<DeltaSyncResponse> {
        validate_dates(request.notes.iter().map(|note| note.modification_date.as_str()))?;
        self.write(|tx| {
            let stored = client_sync_number(tx, &client.token)?;
            if stored != request.sync_number {
                tracing::info!(
                    username = %client.username,
                    stored,
                    submitted = request.sync_number,
                    "Sync counter diverged; requiring queue sync"
                );
                return Ok(DeltaSyncResponse::RequireFullSync);
            }

            let mut accepted = 0;
            for note in &request.notes {
                if store_if_newer(tx, &client.username, note)? {
                    fan_out(tx, client, &note.head())?;
                    accepted += 1;
                }
                tx.execute(
                    "DELETE FROM notes_queue WHERE token = ? AND id = ? AND modification_date <= ?",
                    params![client.token, note.id.as_str(), note.modification_date],
                )?;
            }

            let notes = take_queue(tx, client)?;
            let sync_number = stored + 1;
            set_client_sync_number(tx, &client.token, sync_number)?;

            tracing::debug!(
                username = %client.username,
                submitted = request.notes.len(),
                accepted,
                returned = notes.len(),
                sync_number,
                "Delta sync merged"
            );
            Ok(DeltaSyncResponse::Ok { notes, sync_number })
        })
        .await
    }

    /// Rebuild a client's queue from its full list of heads.
    pub async fn queue_sync(
        &self,
        client: &AuthenticatedClient,
        request: &QueueSyncRequest,
    ) -> EngineResult<QueueSyncResponse> {
        validate_dates(request.note_heads.iter().map(|head| head.modification_date.as_str()))?;
        self.write(|tx| {
            let stored = client_sync_number(tx, &client.token)?;
            let client_heads: HashMap<NoteId, &str> = request
                .note_heads
                .iter()
                .map(|head| (head.id, head.modification_date.as_str()))
                .collect();

            let server_heads = user_heads(tx, &client.username)?;
            let mut queued = 0;
            for head in &server_heads {
                let client_has_it = client_heads
                    .get(&head.id)
                    .is_some_and(|client_date| !head.is_newer_than(client_date));
                if client_has_it {
                    tx.execute(
                        "DELETE FROM notes_queue WHERE token = ? AND id = ?",
                        params![client.token, head.id.as_str()],
                    )?;
                } else {
                    tx.execute(
                        "INSERT INTO notes_queue (token, id, modification_date) VALUES (?, ?, ?)
                         ON CONFLICT(token, id) DO UPDATE SET modification_date = excluded.modification_date",
                        params![client.token, head.id.as_str(), head.modification_date],
                    )?;
                    queued += 1;
                }
            }

            let sync_number = stored.max(request.sync_number) + 1;
            set_client_sync_number(tx, &client.token, sync_number)?;

            tracing::info!(
                username = %client.username,
                client_notes = request.note_heads.len(),
                server_notes = server_heads.len(),
                queued,
                sync_number,
                "Queue sync rebuilt client queue"
            );
            Ok(QueueSyncResponse {
                note_heads: server_heads,
                sync_number,
            })
        })
        .await
    }
}

fn validate_credential<'a>(username: &'a str, token: &'a str) -> EngineResult<(&'a str, &'a str)> {
    let username = username.trim();
    let token = token.trim();
    if username.is_empty() || token.is_empty() {
        return Err(EngineError::InvalidInput(
            "username and token must not be empty".to_string(),
        ));
    }
    Ok((username, token))
}

/// Last writer wins compares dates as strings, so only the fixed-width form is accepted.
fn validate_dates<'a>(mut dates: impl Iterator<Item = &'a str>) -> EngineResult<()> {
    match dates.find(|date| !is_canonical_timestamp(date)) {
        Some(date) => Err(EngineError::InvalidInput(format!(
            "modification date '{date}' must look like 2024-01-01T00:00:00.000Z"
        ))),
        None => Ok(()),
    }
}

fn reset_client(tx: &Transaction<'_>, username: &str, token: &str) -> EngineResult<()> {
    tx.execute(
        "INSERT INTO clients (token, username, sync_number, last_activity_date)
         VALUES (?, ?, 0, ?)
         ON CONFLICT(token) DO UPDATE SET
             username = excluded.username,
             sync_number = 0,
             last_activity_date = excluded.last_activity_date",
        params![token, username, timestamp_now()],
    )?;
    tx.execute("DELETE FROM notes_queue WHERE token = ?", params![token])?;
    Ok(())
}

fn client_sync_number(tx: &Transaction<'_>, token: &str) -> EngineResult<i64> {
    tx.query_row(
        "SELECT sync_number FROM clients WHERE token = ?",
        params![token],
        |row| row.get(0),
    )
    .optional()?
    .ok_or(EngineError::Unauthorized)
}

fn set_client_sync_number(tx: &Transaction<'_>, token: &str, sync_number: i64) -> EngineResult<()> {
    tx.execute(
        "UPDATE clients SET sync_number = ?, last_activity_date = ? WHERE token = ?",
        params![sync_number, timestamp_now(), token],
    )?;
    Ok(())
}

/// Store `note` unless the stored version is the same age or newer.
fn store_if_newer(tx: &Transaction<'_>, username: &str, note: &EncryptedNote) -> EngineResult<bool> {
    let changed = tx.execute(
        "INSERT INTO notes (username, id, modification_date, encrypted_base64, iv)
         VALUES (?, ?, ?, ?, ?)
         ON CONFLICT(username, id) DO UPDATE SET
             modification_date = excluded.modification_date,
             encrypted_base64 = excluded.encrypted_base64,
             iv = excluded.iv
         WHERE excluded.modification_date > notes.modification_date",
        params![
            username,
            note.id.as_str(),
            note.modification_date,
            note.encrypted_base64,
            note.iv
        ],
    )?;
    Ok(changed > 0)
}

/// Queue an accepted note for every other client of the same user.
fn fan_out(tx: &Transaction<'_>, client: &AuthenticatedClient, head: &NoteHead) -> EngineResult<()> {
    tx.execute(
        "INSERT INTO notes_queue (token, id, modification_date)
         SELECT token, ?1, ?2 FROM clients WHERE username = ?3 AND token != ?4
         ON CONFLICT(token, id) DO UPDATE SET modification_date = excluded.modification_date
         WHERE excluded.modification_date > notes_queue.modification_date",
        params![
            head.id.as_str(),
            head.modification_date,
            client.username,
            client.token
        ],
    )?;
    Ok(())
}

/// Return the stored notes queued for `client` and clear its queue.
fn take_queue(tx: &Transaction<'_>, client: &AuthenticatedClient) -> EngineResult<Vec<EncryptedNote>> {
    let notes = {
        let mut stmt = tx.prepare(
            "SELECT n.id, n.modification_date, n.encrypted_base64, n.iv
             FROM notes_queue q
             JOIN notes n ON n.username = ?1 AND n.id = q.id
             WHERE q.token = ?2
             ORDER BY n.modification_date, n.id",
        )?;
        let rows = stmt.query_map(params![client.username, client.token], |row| {
            Ok(EncryptedNote {
                id: parse_id(row, 0)?,
                modification_date: row.get(1)?,
                encrypted_base64: row.get(2)?,
                iv: row.get(3)?,
            })
        })?;
        rows.collect::<rusqlite::Result<Vec<_>>>()?
    };

    tx.execute(
        "DELETE FROM notes_queue WHERE token = ?",
        params![client.token],
    )?;
    Ok(notes)
}

fn user_heads(tx: &Transaction<'_>, username: &str) -> EngineResult<Vec<NoteHead>> {
    let mut stmt =
        tx.prepare("SELECT id, modification_date FROM notes WHERE username = ? ORDER BY id")?;
    let heads = stmt
        .query_map(params![username], |row| {
            Ok(NoteHead {
                id: parse_id(row, 0)?,
                modification_date: row.get(1)?,
            })
        })?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(heads)
}

fn parse_id(row: &rusqlite::Row<'_>, index: usize) -> rusqlite::Result<NoteId> {
    let raw: String = row.get(index)?;
    raw.parse().map_err(|error| {
        rusqlite::Error::FromSqlConversionFailure(index, Type::Text, Box::new(error))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn record(id: NoteId, modification_date: &str, payload: &str) -> EncryptedNote {
        EncryptedNote {
            id,
            modification_date: modification_date.to_string(),
            encrypted_base64: payload.to_string(),
            iv: "aXY=".to_string(),
        }
    }

    async fn engine_with_clients() -> (MergeEngine, AuthenticatedClient, AuthenticatedClient) {
        let engine = MergeEngine::open_in_memory().unwrap();
        engine.register_client("alice", "token-a").await.unwrap();
        engine.register_client("alice", "token-b").await.unwrap();
        let a = engine.authenticate("token-a").await.unwrap();
        let b = engine.authenticate("token-b").await.unwrap();
        (engine, a, b)
    }

    fn delta(notes: Vec<EncryptedNote>, sync_number: i64) -> DeltaSyncRequest {
        DeltaSyncRequest { notes, sync_number }
    }

    fn unwrap_ok(response: DeltaSyncResponse) -> (Vec<EncryptedNote>, i64) {
        match response {
            DeltaSyncResponse::Ok { notes, sync_number } => (notes, sync_number),
            DeltaSyncResponse::RequireFullSync => panic!("unexpected require_full_sync"),
        }
    }

    #[tokio::test]
    async fn unknown_token_is_unauthorized() {
        let engine = MergeEngine::open_in_memory().unwrap();
        assert!(matches!(
            engine.authenticate("nope").await,
            Err(EngineError::Unauthorized)
        ));
        assert!(engine.register_client(" ", "token").await.is_err());
    }

    #[tokio::test]
    async fn authenticated_client_debug_redacts_token() {
        let (_, a, _) = engine_with_clients().await;
        assert_eq!(a.username, "alice");
        assert!(!format!("{a:?}").contains("token-a"));
    }

    #[tokio::test]
    async fn counter_mismatch_requires_full_sync_without_merging() {
        let (engine, a, b) = engine_with_clients().await;
        let id = NoteId::new();

        let response = engine
            .delta_sync(&a, &delta(vec![record(id, "2024-01-01T00:00:00.000Z", "x")], 7))
            .await
            .unwrap();
        assert_eq!(response, DeltaSyncResponse::RequireFullSync);

        let (notes, _) = unwrap_ok(engine.delta_sync(&b, &delta(Vec::new(), 0)).await.unwrap());
        assert!(notes.is_empty());
    }

    #[tokio::test]
    async fn accepted_notes_fan_out_to_other_clients() {
        let (engine, a, b) = engine_with_clients().await;
        let note = record(NoteId::new(), "2024-01-01T00:00:00.000Z", "milk");

        let (returned, sync_number) =
            unwrap_ok(engine.delta_sync(&a, &delta(vec![note.clone()], 0)).await.unwrap());
        assert!(returned.is_empty());
        assert_eq!(sync_number, 1);

        let (received, sync_number) =
            unwrap_ok(engine.delta_sync(&b, &delta(Vec::new(), 0)).await.unwrap());
        assert_eq!(received, vec![note]);
        assert_eq!(sync_number, 1);

        let (again, _) = unwrap_ok(engine.delta_sync(&b, &delta(Vec::new(), 1)).await.unwrap());
        assert!(again.is_empty());
    }

    #[tokio::test]
    async fn older_or_equal_versions_are_rejected() {
        let (engine, a, b) = engine_with_clients().await;
        let id = NoteId::new();
        let newer = record(id, "2024-01-01T00:00:02.000Z", "newer");

        unwrap_ok(engine.delta_sync(&a, &delta(vec![newer.clone()], 0)).await.unwrap());
        unwrap_ok(engine.delta_sync(&b, &delta(Vec::new(), 0)).await.unwrap());

        let older = record(id, "2024-01-01T00:00:01.000Z", "older");
        let tie = record(id, "2024-01-01T00:00:02.000Z", "same date");
        unwrap_ok(engine.delta_sync(&b, &delta(vec![older, tie], 1)).await.unwrap());

        let response = engine
            .queue_sync(
                &b,
                &QueueSyncRequest {
                    note_heads: Vec::new(),
                    sync_number: 2,
                },
            )
            .await
            .unwrap();
        assert_eq!(response.note_heads, vec![newer.head()]);

        let (pulled, _) = unwrap_ok(
            engine
                .delta_sync(&b, &delta(Vec::new(), response.sync_number))
                .await
                .unwrap(),
        );
        assert_eq!(pulled, vec![newer]);

        // Rejected versions are not fanned out to the other device
        let (for_a, _) = unwrap_ok(engine.delta_sync(&a, &delta(Vec::new(), 1)).await.unwrap());
        assert!(for_a.is_empty());
    }

    #[tokio::test]
    async fn non_canonical_dates_are_rejected() {
        let (engine, a, b) = engine_with_clients().await;
        let id = NoteId::new();

        let short = record(id, "2024-01-01T00:00:00Z", "short form");
        assert!(matches!(
            engine.delta_sync(&a, &delta(vec![short.clone()], 0)).await,
            Err(EngineError::InvalidInput(_))
        ));
        assert!(matches!(
            engine
                .queue_sync(
                    &a,
                    &QueueSyncRequest {
                        note_heads: vec![short.head()],
                        sync_number: 0,
                    },
                )
                .await,
            Err(EngineError::InvalidInput(_))
        ));

        // The rejected request left the counter alone and stored nothing
        let later = record(id, "2024-01-01T00:00:00.500Z", "later");
        unwrap_ok(engine.delta_sync(&b, &delta(vec![later.clone()], 0)).await.unwrap());
        let (for_a, sync_number) =
            unwrap_ok(engine.delta_sync(&a, &delta(Vec::new(), 0)).await.unwrap());
        assert_eq!(for_a, vec![later]);
        assert_eq!(sync_number, 1);
    }

    #[tokio::test]
    async fn merging_the_same_note_twice_is_idempotent() {
        let (engine, a, b) = engine_with_clients().await;
        let note = record(NoteId::new(), "2024-01-01T00:00:00.000Z", "once");

        unwrap_ok(engine.delta_sync(&a, &delta(vec![note.clone()], 0)).await.unwrap());
        unwrap_ok(engine.delta_sync(&a, &delta(vec![note.clone()], 1)).await.unwrap());

        let (received, _) = unwrap_ok(engine.delta_sync(&b, &delta(Vec::new(), 0)).await.unwrap());
        assert_eq!(received, vec![note]);
    }

    #[tokio::test]
    async fn sending_a_note_clears_own_stale_queue_entry() {
        let (engine, a, b) = engine_with_clients().await;
        let id = NoteId::new();

        unwrap_ok(
            engine
                .delta_sync(&b, &delta(vec![record(id, "2024-01-01T00:00:00.000Z", "b")], 0))
                .await
                .unwrap(),
        );
        let edited = record(id, "2024-01-01T00:00:05.000Z", "a");
        let (returned, _) =
            unwrap_ok(engine.delta_sync(&a, &delta(vec![edited.clone()], 0)).await.unwrap());
        assert!(returned.is_empty());

        let (for_b, _) = unwrap_ok(engine.delta_sync(&b, &delta(Vec::new(), 1)).await.unwrap());
        assert_eq!(for_b, vec![edited]);
    }

    #[tokio::test]
    async fn queue_sync_queues_what_the_client_lacks() {
        let (engine, a, b) = engine_with_clients().await;
        let shared = record(NoteId::new(), "2024-01-01T00:00:00.000Z", "shared");
        let missing = record(NoteId::new(), "2024-01-01T00:00:01.000Z", "missing");
        unwrap_ok(
            engine
                .delta_sync(&a, &delta(vec![shared.clone(), missing.clone()], 0))
                .await
                .unwrap(),
        );

        let response = engine
            .queue_sync(
                &b,
                &QueueSyncRequest {
                    note_heads: vec![shared.head()],
                    sync_number: 42,
                },
            )
            .await
            .unwrap();
        assert_eq!(response.sync_number, 43);
        assert_eq!(response.note_heads.len(), 2);

        let (pulled, sync_number) = unwrap_ok(
            engine
                .delta_sync(&b, &delta(Vec::new(), response.sync_number))
                .await
                .unwrap(),
        );
        assert_eq!(pulled, vec![missing]);
        assert_eq!(sync_number, 44);
    }

    #[tokio::test]
    async fn register_client_resets_counter_and_queue() {
        let (engine, a, b) = engine_with_clients().await;
        let note = record(NoteId::new(), "2024-01-01T00:00:00.000Z", "queued");
        unwrap_ok(engine.delta_sync(&a, &delta(vec![note], 0)).await.unwrap());
        unwrap_ok(engine.delta_sync(&b, &delta(Vec::new(), 0)).await.unwrap());

        engine.register_client("alice", "token-b").await.unwrap();
        let (notes, sync_number) =
            unwrap_ok(engine.delta_sync(&b, &delta(Vec::new(), 0)).await.unwrap());
        assert!(notes.is_empty());
        assert_eq!(sync_number, 1);
    }

    #[tokio::test]
    async fn ensure_client_keeps_existing_state() {
        let (engine, a, b) = engine_with_clients().await;
        let note = record(NoteId::new(), "2024-01-01T00:00:00.000Z", "queued");
        unwrap_ok(engine.delta_sync(&a, &delta(vec![note.clone()], 0)).await.unwrap());

        assert!(!engine.ensure_client("alice", "token-b").await.unwrap());
        let (notes, _) = unwrap_ok(engine.delta_sync(&b, &delta(Vec::new(), 0)).await.unwrap());
        assert_eq!(notes, vec![note]);

        assert!(engine.ensure_client("carol", "token-c").await.unwrap());
        assert_eq!(engine.authenticate("token-c").await.unwrap().username, "carol");
    }

    #[tokio::test]
    async fn users_are_isolated() {
        let (engine, a, _) = engine_with_clients().await;
        engine.register_client("bob", "token-bob").await.unwrap();
        let bob = engine.authenticate("token-bob").await.unwrap();

        let note = record(NoteId::new(), "2024-01-01T00:00:00.000Z", "private");
        unwrap_ok(engine.delta_sync(&a, &delta(vec![note], 0)).await.unwrap());

        let response = engine
            .queue_sync(
                &bob,
                &QueueSyncRequest {
                    note_heads: Vec::new(),
                    sync_number: 0,
                },
            )
            .await
            .unwrap();
        assert!(response.note_heads.is_empty());
    }

    #[tokio::test]
    async fn open_creates_database_file() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("data").join("server.db");
        let engine = MergeEngine::open(&path).unwrap();
        engine.register_client("alice", "token").await.unwrap();
        assert!(path.exists());
    }
}
