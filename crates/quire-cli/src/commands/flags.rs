use std::path::Path;

use crate::commands::common::{normalize_note_identifier, open_store, resolve_note_for_edit};
use crate::error::CliError;

pub async fn run_archive(id: &str, undo: bool, db_path: &Path) -> Result<(), CliError> {
    let normalized_id = normalize_note_identifier(id)?;
    let store = open_store(db_path).await?;
    let note = resolve_note_for_edit(&normalized_id, &store).await?;

    let archive = !undo;
    if note.is_archived() != archive {
        store.set_archived(&note.id, archive).await?;
    }
    println!("{}", note.id);
    Ok(())
}

pub async fn run_pin(id: &str, undo: bool, db_path: &Path) -> Result<(), CliError> {
    let normalized_id = normalize_note_identifier(id)?;
    let store = open_store(db_path).await?;
    let note = resolve_note_for_edit(&normalized_id, &store).await?;

    let pin = !undo;
    if note.pinned != pin {
        store.set_pinned(&note.id, pin).await?;
    }
    println!("{}", note.id);
    Ok(())
}
