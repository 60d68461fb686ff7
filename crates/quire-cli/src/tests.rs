use std::path::PathBuf;

use pretty_assertions::assert_eq;
use quire_core::crypto::EncryptionKey;
use quire_core::models::settings::SYNC_NUMBER;
use quire_core::models::Preferences;
use quire_core::notify::{Notification, RefreshReason};
use quire_core::state::{ClientState, SyncState};
use quire_core::store::NoteStore;
use quire_core::sync::{SkipReason, SyncOutcome, SyncReport};
use quire_core::Note;
use tempfile::TempDir;

use crate::commands::common::{
    default_editor, format_note_lines, format_relative_time, list_notes, normalize_content,
    normalize_note_identifier, normalize_search_query, note_to_list_item,
    resolve_note_for_edit, search_notes, sync_config, timestamp_millis,
};
use crate::commands::delete::run_delete;
use crate::commands::flags::{run_archive, run_pin};
use crate::commands::session::{build_user, status_report};
use crate::commands::sync::{describe_notification, describe_outcome, run_sync};
use crate::error::CliError;

fn test_db() -> (TempDir, PathBuf) {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("quire.db");
    (dir, path)
}

#[test]
fn normalize_content_trims_and_rejects_empty() {
    assert_eq!(normalize_content("  hello  "), Some("hello".to_string()));
    assert_eq!(normalize_content(" \n\t "), None);
}

#[test]
fn normalize_content_keeps_multiline_text() {
    assert_eq!(
        normalize_content("line 1\nline 2\n"),
        Some("line 1\nline 2".to_string())
    );
}

#[test]
fn identifiers_and_queries_reject_blank_input() {
    assert!(matches!(
        normalize_note_identifier("  "),
        Err(CliError::EmptyNoteId)
    ));
    assert!(matches!(
        normalize_search_query(""),
        Err(CliError::EmptySearchQuery)
    ));
    assert_eq!(normalize_search_query(" milk ").unwrap(), "milk");
}

#[test]
fn default_editor_is_defined() {
    assert!(!default_editor().is_empty());
}

#[test]
fn format_relative_time_units() {
    let now = 10_000_000;
    assert_eq!(format_relative_time(now - 30_000, now), "just now");
    assert_eq!(format_relative_time(now - 120_000, now), "2m ago");
    assert_eq!(format_relative_time(now - 2 * 60 * 60_000, now), "2h ago");
}

#[test]
fn timestamp_millis_parses_stored_dates() {
    assert_eq!(timestamp_millis("1970-01-01T00:00:01.500Z"), 1_500);
    assert_eq!(timestamp_millis("garbage"), 0);
}

#[test]
fn note_preview_truncates_with_ellipsis() {
    let note = Note::new("This is a very long sentence that should be shortened");
    let preview = note.title_preview(20);
    assert_eq!(preview, "This is a very lo...");
}

#[test]
fn note_lines_mark_pinned_and_archived() {
    let mut note = Note::new("groceries");
    note.pinned = true;
    note.not_archived = false;

    let lines = format_note_lines(&[note.clone()]);
    assert!(lines[0].contains("groceries"));
    assert!(lines[0].contains("[pinned] [archived]"));

    let item = note_to_list_item(&note);
    assert!(item.pinned);
    assert!(item.archived);
    assert_eq!(item.preview, "groceries");
    assert_eq!(item.text.as_deref(), Some("groceries"));
}

#[test]
fn sync_requires_a_server_url() {
    assert!(matches!(sync_config(None), Err(CliError::SyncNotConfigured)));
    assert!(matches!(
        sync_config(Some("ftp://example.com")),
        Err(CliError::Sync(_))
    ));
    assert_eq!(
        sync_config(Some("https://sync.example.com/"))
            .unwrap()
            .server_url,
        "https://sync.example.com"
    );
}

#[test]
fn build_user_generates_or_validates_keys() {
    let (user, generated) = build_user(" alice ", "device", None, false).unwrap();
    assert!(generated);
    assert_eq!(user.username, "alice");
    assert!(EncryptionKey::from_base64(&user.encryption_key).is_ok());

    let key = EncryptionKey::generate().to_base64();
    let (user, generated) = build_user("alice", "device", Some(&key), true).unwrap();
    assert!(!generated);
    assert!(user.demo);
    assert_eq!(user.encryption_key, key);

    assert!(build_user("alice", "device", Some("not a key"), false).is_err());
    assert!(build_user("", "device", None, false).is_err());
}

#[test]
fn outcomes_map_to_messages_or_errors() {
    let completed = describe_outcome(SyncOutcome::Completed(SyncReport {
        sent: 2,
        received: 1,
        enqueued: 0,
        queue_resynced: true,
    }))
    .unwrap();
    assert_eq!(completed, "Sync completed: sent 2, received 1 (full resync)");

    assert!(describe_outcome(SyncOutcome::Skipped(SkipReason::Demo)).is_ok());
    assert!(matches!(
        describe_outcome(SyncOutcome::Skipped(SkipReason::NotSignedIn)),
        Err(CliError::NotSignedIn)
    ));
    assert!(matches!(
        describe_outcome(SyncOutcome::Offline),
        Err(CliError::SyncFailed(_))
    ));
    assert!(matches!(
        describe_outcome(SyncOutcome::Failed("boom".to_string())),
        Err(CliError::SyncFailed(message)) if message == "boom"
    ));
}

#[test]
fn notifications_render_status_lines() {
    let status = Notification::SyncStatus {
        state: SyncState::Synced,
        pending: 3,
    };
    let state = ClientState::default().reduce(&status);
    assert_eq!(describe_notification(&state, &status), "[synced] pending: 3");

    let expired = Notification::RefreshPage(RefreshReason::SessionExpired);
    assert!(describe_notification(&state, &expired).contains("quire login"));
}

#[tokio::test]
async fn list_notes_respects_limit_and_preferences() {
    let (_dir, db_path) = test_db();
    {
        let store = NoteStore::open_path(db_path.clone()).await.unwrap();
        let first = store.create_note("first").await.unwrap();
        let second = store.create_note("second").await.unwrap();
        let third = store.create_note("third").await.unwrap();
        store.set_order(&first.id, 1).await.unwrap();
        store.set_order(&second.id, 2).await.unwrap();
        store.set_order(&third.id, 3).await.unwrap();
        store.set_pinned(&second.id, true).await.unwrap();
        store.set_archived(&first.id, true).await.unwrap();
    }

    let recent = list_notes(10, false, false, &db_path).await.unwrap();
    let texts: Vec<_> = recent.iter().filter_map(|note| note.text.clone()).collect();
    assert_eq!(texts, vec!["third".to_string(), "second".to_string()]);

    let limited = list_notes(1, false, false, &db_path).await.unwrap();
    assert_eq!(limited.len(), 1);

    let pinned = list_notes(10, false, true, &db_path).await.unwrap();
    assert_eq!(pinned.len(), 1);
    assert_eq!(pinned[0].text.as_deref(), Some("second"));

    let archived = list_notes(10, true, false, &db_path).await.unwrap();
    assert_eq!(archived.len(), 1);
    assert_eq!(archived[0].text.as_deref(), Some("first"));

    {
        let store = NoteStore::open_path(db_path.clone()).await.unwrap();
        store
            .save_preferences(&Preferences {
                show_archive: false,
                hide_pinned_notes: true,
            })
            .await
            .unwrap();
    }
    let without_pinned = list_notes(10, false, false, &db_path).await.unwrap();
    assert_eq!(without_pinned.len(), 1);
    assert_eq!(without_pinned[0].text.as_deref(), Some("third"));
}

#[tokio::test]
async fn search_notes_finds_matches_with_limit() {
    let (_dir, db_path) = test_db();
    {
        let store = NoteStore::open_path(db_path.clone()).await.unwrap();
        store.create_note("Buy milk").await.unwrap();
        store.create_note("buy oat MILK").await.unwrap();
        store.create_note("call mom").await.unwrap();
    }

    let matches = search_notes("milk", 10, &db_path).await.unwrap();
    assert_eq!(matches.len(), 2);

    let limited = search_notes("milk", 1, &db_path).await.unwrap();
    assert_eq!(limited.len(), 1);
}

#[tokio::test]
async fn resolve_note_accepts_full_ids_and_prefixes() {
    let (_dir, db_path) = test_db();
    let store = NoteStore::open_path(db_path).await.unwrap();
    let note = store.create_note("target").await.unwrap();
    let id = note.id.to_string();

    let by_id = resolve_note_for_edit(&id, &store).await.unwrap();
    assert_eq!(by_id.id, note.id);

    let by_prefix = resolve_note_for_edit(&id[..30], &store).await.unwrap();
    assert_eq!(by_prefix.id, note.id);

    assert!(matches!(
        resolve_note_for_edit("zzzz", &store).await,
        Err(CliError::NoteNotFound(_))
    ));
}

#[tokio::test]
async fn resolve_note_reports_ambiguous_prefixes() {
    let (_dir, db_path) = test_db();
    let store = NoteStore::open_path(db_path).await.unwrap();
    store.create_note("one").await.unwrap();
    store.create_note("two").await.unwrap();

    // UUIDv7 ids created in the same run share the leading timestamp digit
    assert!(matches!(
        resolve_note_for_edit("0", &store).await,
        Err(CliError::AmbiguousNoteId(_))
    ));
}

#[tokio::test]
async fn delete_tombstones_and_hides_the_note() {
    let (_dir, db_path) = test_db();
    let id = {
        let store = NoteStore::open_path(db_path.clone()).await.unwrap();
        store.create_note("to delete").await.unwrap().id
    };

    run_delete(&id.to_string(), &db_path).await.unwrap();

    let store = NoteStore::open_path(db_path.clone()).await.unwrap();
    let tombstone = store.get(&id).await.unwrap().unwrap();
    assert!(tombstone.is_deleted());
    assert_eq!(tombstone.text, None);
    assert!(list_notes(10, false, false, &db_path).await.unwrap().is_empty());
    assert!(matches!(
        run_delete(&id.to_string(), &db_path).await,
        Err(CliError::NoteNotFound(_))
    ));
}

#[tokio::test]
async fn archive_and_pin_toggle_flags() {
    let (_dir, db_path) = test_db();
    let id = {
        let store = NoteStore::open_path(db_path.clone()).await.unwrap();
        store.create_note("flagged").await.unwrap().id
    };

    run_archive(&id.to_string(), false, &db_path).await.unwrap();
    run_pin(&id.to_string(), false, &db_path).await.unwrap();
    {
        let store = NoteStore::open_path(db_path.clone()).await.unwrap();
        let note = store.get(&id).await.unwrap().unwrap();
        assert!(note.is_archived());
        assert!(note.pinned);
    }

    run_archive(&id.to_string(), true, &db_path).await.unwrap();
    let store = NoteStore::open_path(db_path.clone()).await.unwrap();
    assert!(!store.get(&id).await.unwrap().unwrap().is_archived());
}

#[tokio::test]
async fn status_reports_session_and_queue() {
    let (_dir, db_path) = test_db();
    {
        let store = NoteStore::open_path(db_path.clone()).await.unwrap();
        let (user, _) = build_user("alice", "device", None, false).unwrap();
        store.sign_in(&user).await.unwrap();
        store.create_note("queued").await.unwrap();
        store.set_setting(&SYNC_NUMBER, &4).await.unwrap();
    }

    let report = status_report(&db_path).await.unwrap();
    assert_eq!(report.username.as_deref(), Some("alice"));
    assert!(!report.demo);
    assert_eq!(report.pending, 1);
    assert_eq!(report.sync_number, Some(4));
}

#[tokio::test]
async fn sync_requires_sign_in() {
    let (_dir, db_path) = test_db();
    let result = run_sync(false, Some("http://127.0.0.1:9"), &db_path).await;
    assert!(matches!(result, Err(CliError::NotSignedIn)));
}
