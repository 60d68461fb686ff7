//! quire-core - Core library for Quire
//!
//! This crate contains the shared models, the local note store, and the
//! client half of the sync engine used by every Quire client. The server half
//! of the protocol lives in `quire-server` and shares the wire types defined
//! in [`protocol`].

pub mod crypto;
pub mod db;
pub mod error;
pub mod models;
pub mod notify;
pub mod protocol;
pub mod state;
pub mod store;
pub mod sync;
pub mod util;

pub use error::{Error, Result};
pub use models::{EncryptedNote, Note, NoteHead, NoteId};
