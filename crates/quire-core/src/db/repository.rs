//! Note repository implementation

#![allow(clippy::cast_possible_wrap)] // SQLite uses i64 for LIMIT

use crate::error::Result;
use crate::models::{Note, NoteHead, NoteId};
use rusqlite::types::{Type, Value};
use rusqlite::{params, params_from_iter, Connection, OptionalExtension};

const NOTE_COLUMNS: &str =
    r#"id, text, creation_date, modification_date, not_deleted, not_archived, pinned, "order""#;

/// Listing filter for [`NoteRepository::list`].
///
/// Deleted notes are never listed. `None` fields don't constrain the result.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NoteFilter {
    /// Maximum number of notes returned
    pub limit: Option<usize>,
    /// Words the text must contain, each matched as a word prefix
    pub search: Option<String>,
    /// Only archived (`Some(true)`) or only active (`Some(false)`) notes
    pub archived: Option<bool>,
    /// Only pinned (`Some(true)`) or only unpinned (`Some(false)`) notes
    pub pinned: Option<bool>,
}

impl NoteFilter {
    /// Limit the number of notes returned
    #[must_use]
    pub const fn with_limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Only list notes whose text contains every word of `query`
    #[must_use]
    pub fn with_search(mut self, query: impl Into<String>) -> Self {
        self.search = Some(query.into());
        self
    }

    /// Restrict by archive state
    #[must_use]
    pub const fn with_archived(mut self, archived: bool) -> Self {
        self.archived = Some(archived);
        self
    }

    /// Restrict by pin state
    #[must_use]
    pub const fn with_pinned(mut self, pinned: bool) -> Self {
        self.pinned = Some(pinned);
        self
    }
}

/// Trait for note storage operations
pub trait NoteRepository {
    /// Get a note by ID, tombstones included
    fn get(&self, id: &NoteId) -> Result<Option<Note>>;

    /// Insert or fully replace a note
    fn put(&self, note: &Note) -> Result<()>;

    /// List live notes matching `filter`, highest order first
    fn list(&self, filter: &NoteFilter) -> Result<Vec<Note>>;

    /// Heads of every stored note, tombstones included
    fn heads(&self) -> Result<Vec<NoteHead>>;

    /// Live notes whose ID starts with `prefix`
    fn find_by_prefix(&self, prefix: &str) -> Result<Vec<Note>>;
}

/// `SQLite` implementation of `NoteRepository`
pub struct SqliteNoteRepository<'a> {
    conn: &'a Connection,
}

impl<'a> SqliteNoteRepository<'a> {
    /// Create a new repository with the given connection
    pub const fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }

    /// Parse a note from a database row
    fn parse_note(row: &rusqlite::Row<'_>) -> rusqlite::Result<Note> {
        Ok(Note {
            id: parse_id(row, 0)?,
            text: row.get(1)?,
            creation_date: row.get(2)?,
            modification_date: row.get(3)?,
            not_deleted: row.get::<_, i32>(4)? != 0,
            not_archived: row.get::<_, i32>(5)? != 0,
            pinned: row.get::<_, i32>(6)? != 0,
            order: row.get(7)?,
        })
    }
}

/// Parse a note ID column, surfacing malformed IDs as conversion errors
pub(crate) fn parse_id(row: &rusqlite::Row<'_>, index: usize) -> rusqlite::Result<NoteId> {
    let raw: String = row.get(index)?;
    raw.parse()
        .map_err(|error| rusqlite::Error::FromSqlConversionFailure(index, Type::Text, Box::new(error)))
}

/// FTS5 expression requiring every word of `query` as a quoted prefix term,
/// so user input never reaches the query syntax. `None` when nothing is searchable.
fn fts_query(query: &str) -> Option<String> {
    let terms: Vec<String> = query
        .split_whitespace()
        .filter(|term| term.chars().any(char::is_alphanumeric))
        .map(|term| format!("\"{}\"*", term.replace('"', "\"\"")))
        .collect();

    if terms.is_empty() {
        None
    } else {
        Some(terms.join(" "))
    }
}

impl NoteRepository for SqliteNoteRepository<'_> {
    fn get(&self, id: &NoteId) -> Result<Option<Note>> {
        let note = self
            .conn
            .query_row(
                &format!("SELECT {NOTE_COLUMNS} FROM notes WHERE id = ?"),
                params![id.as_str()],
                Self::parse_note,
            )
            .optional()?;
        Ok(note)
    }

    fn put(&self, note: &Note) -> Result<()> {
        self.conn.execute(
            r#"INSERT INTO notes (id, text, creation_date, modification_date, not_deleted, not_archived, pinned, "order")
               VALUES (?, ?, ?, ?, ?, ?, ?, ?)
               ON CONFLICT(id) DO UPDATE SET
                   text = excluded.text,
                   creation_date = excluded.creation_date,
                   modification_date = excluded.modification_date,
                   not_deleted = excluded.not_deleted,
                   not_archived = excluded.not_archived,
                   pinned = excluded.pinned,
                   "order" = excluded."order""#,
            params![
                note.id.as_str(),
                note.text,
                note.creation_date,
                note.modification_date,
                i32::from(note.not_deleted),
                i32::from(note.not_archived),
                i32::from(note.pinned),
                note.order
            ],
        )?;
        Ok(())
    }

    fn list(&self, filter: &NoteFilter) -> Result<Vec<Note>> {
        let mut sql = format!("SELECT {NOTE_COLUMNS} FROM notes WHERE not_deleted = 1");
        let mut values: Vec<Value> = Vec::new();

        if let Some(archived) = filter.archived {
            sql.push_str(" AND not_archived = ?");
            values.push(Value::Integer(i64::from(!archived)));
        }
        if let Some(pinned) = filter.pinned {
            sql.push_str(" AND pinned = ?");
            values.push(Value::Integer(i64::from(pinned)));
        }
        if let Some(expression) = filter.search.as_deref().and_then(fts_query) {
            sql.push_str(" AND rowid IN (SELECT rowid FROM notes_fts WHERE notes_fts MATCH ?)");
            values.push(Value::Text(expression));
        }

        sql.push_str(r#" ORDER BY "order" DESC, id"#);
        if let Some(limit) = filter.limit {
            sql.push_str(" LIMIT ?");
            values.push(Value::Integer(limit as i64));
        }

        let mut stmt = self.conn.prepare(&sql)?;
        let notes = stmt
            .query_map(params_from_iter(values.iter()), Self::parse_note)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(notes)
    }

    fn heads(&self) -> Result<Vec<NoteHead>> {
        let mut stmt = self
            .conn
            .prepare("SELECT id, modification_date FROM notes ORDER BY id")?;
        let heads = stmt
            .query_map([], |row| {
                Ok(NoteHead {
                    id: parse_id(row, 0)?,
                    modification_date: row.get(1)?,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(heads)
    }

    fn find_by_prefix(&self, prefix: &str) -> Result<Vec<Note>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {NOTE_COLUMNS} FROM notes WHERE not_deleted = 1 AND substr(id, 1, length(?1)) = ?1 ORDER BY id"
        ))?;
        let notes = stmt
            .query_map(params![prefix.to_ascii_lowercase()], Self::parse_note)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(notes)
    }
}
