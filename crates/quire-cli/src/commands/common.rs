use std::env;
use std::io::{self, IsTerminal, Read};
use std::path::{Path, PathBuf};
use std::process::Command;
use std::time::{SystemTime, UNIX_EPOCH};

use chrono::{DateTime, Utc};
use quire_core::db::NoteFilter;
use quire_core::models::User;
use quire_core::store::NoteStore;
use quire_core::sync::SyncConfig;
use quire_core::util::normalize_text_option;
use quire_core::{Note, NoteId};
use serde::Serialize;

use crate::error::CliError;

#[derive(Debug, Serialize)]
pub struct NoteListItem {
    pub id: String,
    pub preview: String,
    pub text: Option<String>,
    pub creation_date: String,
    pub modification_date: String,
    pub relative_time: String,
    pub pinned: bool,
    pub archived: bool,
}

pub async fn open_store(path: &Path) -> Result<NoteStore, CliError> {
    Ok(NoteStore::open_path(path.to_path_buf()).await?)
}

pub async fn require_user(store: &NoteStore) -> Result<User, CliError> {
    store.user().await?.ok_or(CliError::NotSignedIn)
}

/// Flags win; without them the stored list preferences decide.
pub async fn list_notes(
    limit: usize,
    archived: bool,
    pinned: bool,
    db_path: &Path,
) -> Result<Vec<Note>, CliError> {
    let store = open_store(db_path).await?;
    let preferences = store.load_preferences().await?;

    let mut filter = NoteFilter::default()
        .with_limit(limit)
        .with_archived(archived || preferences.show_archive);
    if pinned {
        filter = filter.with_pinned(true);
    } else if preferences.hide_pinned_notes {
        filter = filter.with_pinned(false);
    }
    Ok(store.get_all(&filter).await?)
}

pub async fn search_notes(
    query: &str,
    limit: usize,
    db_path: &Path,
) -> Result<Vec<Note>, CliError> {
    let store = open_store(db_path).await?;
    let filter = NoteFilter::default().with_limit(limit).with_search(query);
    Ok(store.get_all(&filter).await?)
}

pub async fn resolve_note_for_edit(note_query: &str, store: &NoteStore) -> Result<Note, CliError> {
    if let Ok(note_id) = note_query.parse::<NoteId>() {
        if let Some(note) = store.get(&note_id).await? {
            if !note.is_deleted() {
                return Ok(note);
            }
        }
    }

    let mut matches = store.find_by_prefix(note_query).await?;

    match matches.len() {
        0 => Err(CliError::NoteNotFound(note_query.to_string())),
        1 => Ok(matches.remove(0)),
        _ => {
            let options = matches
                .iter()
                .take(3)
                .map(|note| short_id(&note.id))
                .collect::<Vec<_>>()
                .join(", ");

            Err(CliError::AmbiguousNoteId(format!(
                "ID prefix '{note_query}' is ambiguous; matches: {options}"
            )))
        }
    }
}

pub fn short_id(id: &NoteId) -> String {
    id.to_string().chars().take(13).collect()
}

pub fn format_note_lines(notes: &[Note]) -> Vec<String> {
    let now_ms = Utc::now().timestamp_millis();
    notes
        .iter()
        .map(|note| {
            let short_id = short_id(&note.id);
            let preview = note.title_preview(40);
            let relative_time =
                format_relative_time(timestamp_millis(&note.modification_date), now_ms);
            let markers = render_markers(note);

            if markers.is_empty() {
                format!("{short_id:<13}  {preview:<40}  {relative_time}")
            } else {
                format!("{short_id:<13}  {preview:<40}  {relative_time:<10}  {markers}")
            }
        })
        .collect()
}

pub fn note_to_list_item(note: &Note) -> NoteListItem {
    let now_ms = Utc::now().timestamp_millis();

    NoteListItem {
        id: note.id.to_string(),
        preview: note.title_preview(80),
        text: note.text.clone(),
        creation_date: note.creation_date.clone(),
        modification_date: note.modification_date.clone(),
        relative_time: format_relative_time(timestamp_millis(&note.modification_date), now_ms),
        pinned: note.pinned,
        archived: note.is_archived(),
    }
}

pub fn render_markers(note: &Note) -> String {
    let mut markers = Vec::new();
    if note.pinned {
        markers.push("[pinned]");
    }
    if note.is_archived() {
        markers.push("[archived]");
    }
    markers.join(" ")
}

/// Milliseconds since the epoch for a stored timestamp, 0 when unparseable.
pub fn timestamp_millis(timestamp: &str) -> i64 {
    DateTime::parse_from_rfc3339(timestamp).map_or(0, |parsed| parsed.timestamp_millis())
}

pub fn format_relative_time(timestamp_ms: i64, now_ms: i64) -> String {
    let diff = now_ms.saturating_sub(timestamp_ms);
    let minute = 60_000;
    let hour = 60 * minute;
    let day = 24 * hour;
    let week = 7 * day;
    let month = 30 * day;
    let year = 365 * day;

    if diff < minute {
        "just now".to_string()
    } else if diff < hour {
        format!("{}m ago", diff / minute)
    } else if diff < day {
        format!("{}h ago", diff / hour)
    } else if diff < week {
        format!("{}d ago", diff / day)
    } else if diff < month {
        format!("{}w ago", diff / week)
    } else if diff < year {
        format!("{}mo ago", diff / month)
    } else {
        format!("{}y ago", diff / year)
    }
}

pub fn resolve_note_content(content_parts: &[String]) -> Result<String, CliError> {
    if let Some(content) = normalize_content(&content_parts.join(" ")) {
        return Ok(content);
    }

    if let Some(content) = read_piped_stdin()? {
        return Ok(content);
    }

    if let Some(content) = capture_editor_input()? {
        return Ok(content);
    }

    Err(CliError::EmptyContent)
}

pub fn normalize_content(content: &str) -> Option<String> {
    let trimmed = content.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

pub fn normalize_search_query(query: &str) -> Result<String, CliError> {
    let trimmed = query.trim();
    if trimmed.is_empty() {
        Err(CliError::EmptySearchQuery)
    } else {
        Ok(trimmed.to_string())
    }
}

pub fn normalize_note_identifier(id: &str) -> Result<String, CliError> {
    let trimmed = id.trim();
    if trimmed.is_empty() {
        Err(CliError::EmptyNoteId)
    } else {
        Ok(trimmed.to_string())
    }
}

pub fn read_piped_stdin() -> Result<Option<String>, CliError> {
    let stdin = io::stdin();
    if stdin.is_terminal() {
        return Ok(None);
    }

    let mut buffer = String::new();
    stdin.lock().read_to_string(&mut buffer)?;
    Ok(normalize_content(&buffer))
}

pub fn capture_editor_input() -> Result<Option<String>, CliError> {
    capture_editor_input_with_initial("")
}

pub fn capture_editor_input_with_initial(
    initial_content: &str,
) -> Result<Option<String>, CliError> {
    let editor = preferred_editor();
    let temp_file = create_temp_note_file_path();
    std::fs::write(&temp_file, initial_content)?;

    let launch_result = launch_editor(&editor, &temp_file);
    let note_content = std::fs::read_to_string(&temp_file)?;
    let _ = std::fs::remove_file(&temp_file);

    launch_result?;
    Ok(normalize_content(&note_content))
}

pub fn launch_editor(editor: &str, file_path: &Path) -> Result<(), CliError> {
    match Command::new(editor).arg(file_path).status() {
        Ok(status) => {
            if status.success() {
                Ok(())
            } else {
                Err(CliError::EditorFailed(format!(
                    "`{editor}` exited with status {status}"
                )))
            }
        }
        // EDITOR may carry arguments, e.g. `code --wait`
        Err(err) if err.kind() == io::ErrorKind::NotFound => {
            let mut parts = editor.split_whitespace();
            let Some(program) = parts.next() else {
                return Err(CliError::EditorFailed("empty EDITOR command".into()));
            };

            let mut command = Command::new(program);
            command.args(parts).arg(file_path);

            let status = command.status()?;
            if status.success() {
                Ok(())
            } else {
                Err(CliError::EditorFailed(format!(
                    "`{editor}` exited with status {status}"
                )))
            }
        }
        Err(err) => Err(CliError::Io(err)),
    }
}

pub fn preferred_editor() -> String {
    env::var("VISUAL")
        .or_else(|_| env::var("EDITOR"))
        .unwrap_or_else(|_| default_editor().to_string())
}

pub const fn default_editor() -> &'static str {
    if cfg!(windows) {
        "notepad"
    } else {
        "vi"
    }
}

pub fn create_temp_note_file_path() -> PathBuf {
    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |duration| duration.as_nanos());
    env::temp_dir().join(format!("quire-note-{}-{now}.md", std::process::id()))
}

pub fn resolve_db_path(cli_db_path: Option<PathBuf>) -> PathBuf {
    cli_db_path
        .or_else(|| env::var_os("QUIRE_DB_PATH").map(PathBuf::from))
        .unwrap_or_else(default_db_path)
}

pub fn default_db_path() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(env::temp_dir)
        .join("quire")
        .join("quire.db")
}

pub fn resolve_server_url(cli_server_url: Option<String>) -> Option<String> {
    normalize_text_option(cli_server_url)
        .or_else(|| normalize_text_option(env::var("QUIRE_SERVER_URL").ok()))
}

pub fn sync_config(server_url: Option<&str>) -> Result<SyncConfig, CliError> {
    let server_url = server_url.ok_or(CliError::SyncNotConfigured)?;
    Ok(SyncConfig::new(server_url)?)
}
