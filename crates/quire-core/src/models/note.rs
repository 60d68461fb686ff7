//! Note model

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::util::{format_timestamp, next_modification_date};

/// A unique identifier for a note, using UUID v7 (time-sortable)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NoteId(Uuid);

impl NoteId {
    /// Create a new unique note ID using UUID v7
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }

    /// Get the string representation of this ID
    #[must_use]
    pub fn as_str(&self) -> String {
        self.0.to_string()
    }
}

impl Default for NoteId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for NoteId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for NoteId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

/// A note in the system.
///
/// Notes are never removed from storage: deleting one turns it into a
/// tombstone (`text = None`, `not_deleted = false`) that syncs like any other
/// edit. The `0|1` flags keep their integer form on the wire.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Note {
    /// Unique identifier
    pub id: NoteId,
    /// Plain text content, `None` for tombstones
    pub text: Option<String>,
    /// Creation timestamp (ISO-8601, UTC, millisecond precision)
    pub creation_date: String,
    /// Last modification timestamp (ISO-8601, UTC, millisecond precision)
    pub modification_date: String,
    /// Cleared when the note is deleted
    #[serde(with = "flag")]
    pub not_deleted: bool,
    /// Cleared when the note is archived
    #[serde(with = "flag")]
    pub not_archived: bool,
    /// Pinned notes are listed separately by clients
    #[serde(with = "flag")]
    pub pinned: bool,
    /// Display rank, higher is listed first
    pub order: i64,
}

impl Note {
    /// Create a new note with the given content
    #[must_use]
    pub fn new(text: impl Into<String>) -> Self {
        let now = chrono::Utc::now();
        let timestamp = format_timestamp(now);
        Self {
            id: NoteId::new(),
            text: Some(text.into()),
            creation_date: timestamp.clone(),
            modification_date: timestamp,
            not_deleted: true,
            not_archived: true,
            pinned: false,
            order: now.timestamp_millis(),
        }
    }

    /// The `{id, modification_date}` projection used for queueing and
    /// staleness checks.
    #[must_use]
    pub fn head(&self) -> NoteHead {
        NoteHead {
            id: self.id,
            modification_date: self.modification_date.clone(),
        }
    }

    /// Replace the text and mark the note as modified.
    pub fn set_text(&mut self, text: impl Into<String>) {
        self.text = Some(text.into());
        self.touch();
    }

    /// Turn the note into a tombstone.
    pub fn tombstone(&mut self) {
        self.text = None;
        self.not_deleted = false;
        self.touch();
    }

    /// Archive or unarchive the note.
    pub fn set_archived(&mut self, archived: bool) {
        self.not_archived = !archived;
        self.touch();
    }

    /// Pin or unpin the note.
    pub fn set_pinned(&mut self, pinned: bool) {
        self.pinned = pinned;
        self.touch();
    }

    /// Move the note to a new display rank.
    pub fn set_order(&mut self, order: i64) {
        self.order = order;
        self.touch();
    }

    /// Advance the modification date past its current value.
    pub fn touch(&mut self) {
        self.modification_date = next_modification_date(&self.modification_date);
    }

    /// Whether the note has been deleted
    #[must_use]
    pub const fn is_deleted(&self) -> bool {
        !self.not_deleted
    }

    /// Whether the note has been archived
    #[must_use]
    pub const fn is_archived(&self) -> bool {
        !self.not_archived
    }

    /// First line with whitespace collapsed, cut to `max_len` characters
    /// with a trailing `...` when it is longer
    #[must_use]
    pub fn title_preview(&self, max_len: usize) -> String {
        let first_line = self.text.as_deref().unwrap_or("").lines().next().unwrap_or("");
        let collapsed = first_line.split_whitespace().collect::<Vec<_>>().join(" ");

        if collapsed.chars().count() <= max_len {
            collapsed
        } else {
            let mut truncated: String = collapsed.chars().take(max_len.saturating_sub(3)).collect();
            truncated.push_str("...");
            truncated
        }
    }
}

/// Lightweight `{id, modification_date}` projection of a note.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NoteHead {
    /// Note identifier
    pub id: NoteId,
    /// Modification date of the version this head describes
    pub modification_date: String,
}

impl NoteHead {
    /// Create a head for the given note version
    pub fn new(id: NoteId, modification_date: impl Into<String>) -> Self {
        Self {
            id,
            modification_date: modification_date.into(),
        }
    }

    /// Whether this head describes a strictly newer version than `other`.
    ///
    /// Ties are not newer: re-merging an identical version is a no-op.
    #[must_use]
    pub fn is_newer_than(&self, other: &str) -> bool {
        self.modification_date.as_str() > other
    }
}

/// Wire and server-storage form of a note.
///
/// Only `id` and `modification_date` are readable by the server; everything
/// else lives in the ciphertext.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncryptedNote {
    /// Note identifier (cleartext)
    pub id: NoteId,
    /// Modification date (cleartext)
    pub modification_date: String,
    /// Base64-encoded ciphertext of the serialized note
    pub encrypted_base64: String,
    /// Base64-encoded initialization vector
    pub iv: String,
}

impl EncryptedNote {
    /// The cleartext head of this record
    #[must_use]
    pub fn head(&self) -> NoteHead {
        NoteHead {
            id: self.id,
            modification_date: self.modification_date.clone(),
        }
    }
}

/// Serde adapter storing booleans as `0|1` integers.
mod flag {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(value: &bool, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u8(u8::from(*value))
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<bool, D::Error>
    where
        D: Deserializer<'de>,
    {
        match u8::deserialize(deserializer)? {
            0 => Ok(false),
            1 => Ok(true),
            other => Err(serde::de::Error::custom(format!(
                "expected 0 or 1, got {other}"
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_note_id_unique() {
        let id1 = NoteId::new();
        let id2 = NoteId::new();
        assert_ne!(id1, id2);
    }

    #[test]
    fn test_note_id_parse() {
        let id = NoteId::new();
        let parsed: NoteId = id.as_str().parse().unwrap();
        assert_eq!(id, parsed);
    }

    #[test]
    fn test_note_new() {
        let note = Note::new("Hello world");
        assert_eq!(note.text.as_deref(), Some("Hello world"));
        assert!(note.not_deleted);
        assert!(note.not_archived);
        assert!(!note.pinned);
        assert!(note.order > 0);
        assert_eq!(note.creation_date, note.modification_date);
    }

    #[test]
    fn test_mutations_advance_modification_date() {
        let mut note = Note::new("draft");
        let created = note.modification_date.clone();

        note.set_text("first");
        let first = note.modification_date.clone();
        note.set_text("second");

        assert!(first > created);
        assert!(note.modification_date > first);
    }

    #[test]
    fn test_tombstone() {
        let mut note = Note::new("secret");
        let before = note.modification_date.clone();
        note.tombstone();

        assert!(note.text.is_none());
        assert!(note.is_deleted());
        assert_eq!(note.title_preview(10), "");
        assert!(note.modification_date > before);
    }

    #[test]
    fn test_flags_serialize_as_integers() {
        let mut note = Note::new("flags");
        note.set_pinned(true);
        let json = serde_json::to_value(&note).unwrap();

        assert_eq!(json["not_deleted"], 1);
        assert_eq!(json["pinned"], 1);
        assert_eq!(json["not_archived"], 1);

        let parsed: Note = serde_json::from_value(json).unwrap();
        assert_eq!(parsed, note);
    }

    #[test]
    fn test_flags_reject_other_integers() {
        let mut json = serde_json::to_value(Note::new("x")).unwrap();
        json["pinned"] = serde_json::json!(2);
        assert!(serde_json::from_value::<Note>(json).is_err());
    }

    #[test]
    fn test_head_ordering_ties_are_not_newer() {
        let head = NoteHead::new(NoteId::new(), "2024-01-01T00:00:00.000Z");
        assert!(!head.is_newer_than("2024-01-01T00:00:00.000Z"));
        assert!(head.is_newer_than("2023-12-31T23:59:59.999Z"));
        assert!(!head.is_newer_than("2024-01-01T00:00:00.001Z"));
    }

    #[test]
    fn test_title_preview() {
        let note = Note::new("First line\nSecond line\nThird line");
        assert_eq!(note.title_preview(50), "First line");
        assert_eq!(note.title_preview(8), "First...");

        let spaced = Note::new("  lots   of\tspace  ");
        assert_eq!(spaced.title_preview(50), "lots of space");
    }
}
