//! Data models for Quire

mod note;
pub mod settings;

pub use note::{EncryptedNote, Note, NoteHead, NoteId};
pub use settings::{Preferences, SettingKey, User};
