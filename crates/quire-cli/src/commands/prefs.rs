use std::path::Path;

use crate::commands::common::open_store;
use crate::error::CliError;

pub async fn run_prefs(
    show_archive: Option<bool>,
    hide_pinned: Option<bool>,
    db_path: &Path,
) -> Result<(), CliError> {
    let store = open_store(db_path).await?;
    let mut preferences = store.load_preferences().await?;

    if show_archive.is_some() || hide_pinned.is_some() {
        if let Some(show_archive) = show_archive {
            preferences.show_archive = show_archive;
        }
        if let Some(hide_pinned) = hide_pinned {
            preferences.hide_pinned_notes = hide_pinned;
        }
        store.save_preferences(&preferences).await?;
    }

    println!("show-archive: {}", preferences.show_archive);
    println!("hide-pinned:  {}", preferences.hide_pinned_notes);
    Ok(())
}
