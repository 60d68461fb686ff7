use std::path::Path;

use crate::commands::common::{
    capture_editor_input_with_initial, normalize_note_identifier, open_store,
    resolve_note_for_edit,
};
use crate::error::CliError;

pub async fn run_edit(id: &str, db_path: &Path) -> Result<(), CliError> {
    let normalized_id = normalize_note_identifier(id)?;
    let store = open_store(db_path).await?;
    let note = resolve_note_for_edit(&normalized_id, &store).await?;
    let current = note.text.as_deref().unwrap_or("");

    let Some(edited_text) = capture_editor_input_with_initial(current)? else {
        return Err(CliError::EmptyEditedContent);
    };

    if edited_text == current {
        println!("{}", note.id);
        return Ok(());
    }

    let updated = store.update_text(&note.id, &edited_text).await?;
    println!("{}", updated.id);
    Ok(())
}
