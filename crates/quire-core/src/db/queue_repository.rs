//! Outgoing queue repository
//!
//! One row per note with local changes the server has not acknowledged yet.
//! A row only ever moves forward in time: re-enqueueing with an older date
//! leaves the newer entry in place.

use crate::error::Result;
use crate::models::{NoteHead, NoteId};
use rusqlite::{params, Connection, OptionalExtension};

use super::repository::parse_id;

/// Trait for outgoing queue operations
pub trait QueueRepository {
    /// Record a pending upload, keeping the later of the old and new dates
    fn enqueue(&self, head: &NoteHead) -> Result<()>;

    /// Remove the entry for `id` unconditionally; returns whether one existed
    fn dequeue(&self, id: &NoteId) -> Result<bool>;

    /// Remove the entry for `head.id` if it is not newer than `head`
    ///
    /// Used once the server has seen `head`: an edit made after the upload
    /// was built keeps its later entry and goes out on the next sync.
    fn dequeue_acknowledged(&self, head: &NoteHead) -> Result<bool>;

    /// Get the pending entry for a note
    fn get(&self, id: &NoteId) -> Result<Option<NoteHead>>;

    /// All pending entries, oldest change first
    fn list(&self) -> Result<Vec<NoteHead>>;

    /// Number of pending entries
    fn count(&self) -> Result<usize>;
}

/// `SQLite` implementation of `QueueRepository`
pub struct SqliteQueueRepository<'a> {
    conn: &'a Connection,
}

impl<'a> SqliteQueueRepository<'a> {
    /// Create a new repository with the given connection
    pub const fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }

    fn parse_head(row: &rusqlite::Row<'_>) -> rusqlite::Result<NoteHead> {
        Ok(NoteHead {
            id: parse_id(row, 0)?,
            modification_date: row.get(1)?,
        })
    }
}

impl QueueRepository for SqliteQueueRepository<'_> {
    fn enqueue(&self, head: &NoteHead) -> Result<()> {
        self.conn.execute(
            "INSERT INTO outgoing_queue (id, modification_date) VALUES (?, ?)
             ON CONFLICT(id) DO UPDATE SET modification_date = excluded.modification_date
             WHERE excluded.modification_date >= outgoing_queue.modification_date",
            params![head.id.as_str(), head.modification_date],
        )?;
        Ok(())
    }

    fn dequeue(&self, id: &NoteId) -> Result<bool> {
        let removed = self.conn.execute(
            "DELETE FROM outgoing_queue WHERE id = ?",
            params![id.as_str()],
        )?;
        Ok(removed > 0)
    }

    fn dequeue_acknowledged(&self, head: &NoteHead) -> Result<bool> {
        let removed = self.conn.execute(
            "DELETE FROM outgoing_queue WHERE id = ? AND modification_date <= ?",
            params![head.id.as_str(), head.modification_date],
        )?;
        Ok(removed > 0)
    }

    fn get(&self, id: &NoteId) -> Result<Option<NoteHead>> {
        let head = self
            .conn
            .query_row(
                "SELECT id, modification_date FROM outgoing_queue WHERE id = ?",
                params![id.as_str()],
                Self::parse_head,
            )
            .optional()?;
        Ok(head)
    }

    fn list(&self) -> Result<Vec<NoteHead>> {
        let mut stmt = self
            .conn
            .prepare("SELECT id, modification_date FROM outgoing_queue ORDER BY modification_date, id")?;
        let heads = stmt
            .query_map([], Self::parse_head)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(heads)
    }

    fn count(&self) -> Result<usize> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM outgoing_queue", [], |row| row.get(0))?;
        Ok(usize::try_from(count).unwrap_or_default())
    }
}
