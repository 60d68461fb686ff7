pub mod add;
pub mod common;
pub mod delete;
pub mod edit;
pub mod flags;
pub mod list;
pub mod prefs;
pub mod search;
pub mod session;
pub mod sync;
