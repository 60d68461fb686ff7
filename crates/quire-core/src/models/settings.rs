//! Device settings and session models

use std::fmt;
use std::marker::PhantomData;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

/// A typed key into the settings table.
///
/// The value type travels with the key, so `get_setting(&SYNC_NUMBER)` can
/// only ever yield an `i64`.
pub struct SettingKey<T> {
    name: &'static str,
    _value: PhantomData<fn() -> T>,
}

impl<T> SettingKey<T>
where
    T: Serialize + DeserializeOwned,
{
    /// Declare a setting stored under `name`
    pub const fn new(name: &'static str) -> Self {
        Self {
            name,
            _value: PhantomData,
        }
    }

    /// Name of the settings row
    pub const fn name(&self) -> &'static str {
        self.name
    }
}

impl<T> fmt::Debug for SettingKey<T> {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.debug_tuple("SettingKey").field(&self.name).finish()
    }
}

/// Sync counter last agreed with the server
pub const SYNC_NUMBER: SettingKey<i64> = SettingKey::new("syncNumber");
/// Signed-in user, absent when signed out
pub const USER: SettingKey<User> = SettingKey::new("user");
/// Whether archived notes are listed
pub const SHOW_ARCHIVE: SettingKey<bool> = SettingKey::new("showArchive");
/// Whether pinned notes are hidden from the main list
pub const HIDE_PINNED_NOTES: SettingKey<bool> = SettingKey::new("hidePinnedNotes");

/// Signed-in account on this device.
///
/// Produced by the login flow, which is outside this crate. The encryption
/// key is the base64 form of the 32-byte symmetric key.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    /// Account name
    pub username: String,
    /// Per-device token issued at login
    pub token: String,
    /// Base64-encoded symmetric key
    pub encryption_key: String,
    /// Read-only demo profile; never synced
    #[serde(default)]
    pub demo: bool,
}

impl fmt::Debug for User {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("User")
            .field("username", &self.username)
            .field("token", &"[REDACTED]")
            .field("encryption_key", &"[REDACTED]")
            .field("demo", &self.demo)
            .finish()
    }
}

/// List display preferences
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Preferences {
    /// List archived notes
    pub show_archive: bool,
    /// Hide pinned notes from the main list
    pub hide_pinned_notes: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_preferences_default() {
        let preferences = Preferences::default();
        assert!(!preferences.show_archive);
        assert!(!preferences.hide_pinned_notes);
    }

    #[test]
    fn test_user_debug_redacts_secrets() {
        let user = User {
            username: "alice".to_string(),
            token: "secret-token".to_string(),
            encryption_key: "secret-key".to_string(),
            demo: false,
        };
        let debug = format!("{user:?}");
        assert!(debug.contains("alice"));
        assert!(!debug.contains("secret-token"));
        assert!(!debug.contains("secret-key"));
    }

    #[test]
    fn test_setting_key_names() {
        assert_eq!(SYNC_NUMBER.name(), "syncNumber");
        assert_eq!(USER.name(), "user");
        assert_eq!(SHOW_ARCHIVE.name(), "showArchive");
        assert_eq!(HIDE_PINNED_NOTES.name(), "hidePinnedNotes");
    }
}
