//! Database layer for the device-local store

mod connection;
mod migrations;
mod queue_repository;
mod repository;
mod settings_repository;

pub use connection::{Database, TransactionMode};
pub use queue_repository::{QueueRepository, SqliteQueueRepository};
pub use repository::{NoteFilter, NoteRepository, SqliteNoteRepository};
pub use settings_repository::{SettingsRepository, SqliteSettingsRepository};
