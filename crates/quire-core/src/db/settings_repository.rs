//! Settings repository implementation

use crate::error::Result;
use crate::models::settings::{HIDE_PINNED_NOTES, SHOW_ARCHIVE};
use crate::models::{Preferences, SettingKey};
use rusqlite::{params, Connection, OptionalExtension};
use serde::de::DeserializeOwned;
use serde::Serialize;

/// Trait for settings storage operations
pub trait SettingsRepository {
    /// Read a typed setting, `None` when unset
    fn get_setting<T>(&self, key: &SettingKey<T>) -> Result<Option<T>>
    where
        T: Serialize + DeserializeOwned;

    /// Write a typed setting
    fn set_setting<T>(&self, key: &SettingKey<T>, value: &T) -> Result<()>
    where
        T: Serialize + DeserializeOwned;

    /// Remove a setting; a no-op when unset
    fn remove_setting<T>(&self, key: &SettingKey<T>) -> Result<()>
    where
        T: Serialize + DeserializeOwned;

    /// Load list preferences, falling back to defaults
    fn load_preferences(&self) -> Result<Preferences>;

    /// Save list preferences
    fn save_preferences(&self, preferences: &Preferences) -> Result<()>;
}

/// `SQLite` implementation of `SettingsRepository`
///
/// Values are stored as JSON text.
pub struct SqliteSettingsRepository<'a> {
    conn: &'a Connection,
}

impl<'a> SqliteSettingsRepository<'a> {
    /// Create a new repository with the given connection
    pub const fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }
}

impl SettingsRepository for SqliteSettingsRepository<'_> {
    fn get_setting<T>(&self, key: &SettingKey<T>) -> Result<Option<T>>
    where
        T: Serialize + DeserializeOwned,
    {
        let raw: Option<String> = self
            .conn
            .query_row(
                "SELECT value FROM settings WHERE key = ?",
                params![key.name()],
                |row| row.get(0),
            )
            .optional()?;

        match raw {
            Some(raw) => Ok(Some(serde_json::from_str(&raw)?)),
            None => Ok(None),
        }
    }

    fn set_setting<T>(&self, key: &SettingKey<T>, value: &T) -> Result<()>
    where
        T: Serialize + DeserializeOwned,
    {
        let raw = serde_json::to_string(value)?;
        self.conn.execute(
            "INSERT INTO settings (key, value) VALUES (?, ?)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value",
            params![key.name(), raw],
        )?;
        Ok(())
    }

    fn remove_setting<T>(&self, key: &SettingKey<T>) -> Result<()>
    where
        T: Serialize + DeserializeOwned,
    {
        self.conn
            .execute("DELETE FROM settings WHERE key = ?", params![key.name()])?;
        Ok(())
    }

    fn load_preferences(&self) -> Result<Preferences> {
        let mut preferences = Preferences::default();

        if let Some(value) = self.get_setting(&SHOW_ARCHIVE)? {
            preferences.show_archive = value;
        }
        if let Some(value) = self.get_setting(&HIDE_PINNED_NOTES)? {
            preferences.hide_pinned_notes = value;
        }

        Ok(preferences)
    }

    fn save_preferences(&self, preferences: &Preferences) -> Result<()> {
        self.set_setting(&SHOW_ARCHIVE, &preferences.show_archive)?;
        self.set_setting(&HIDE_PINNED_NOTES, &preferences.hide_pinned_notes)?;
        Ok(())
    }
}
