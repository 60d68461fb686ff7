use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "quire")]
#[command(about = "Encrypted notes that sync across your devices")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,

    /// Optional path to local database file
    #[arg(long, global = true, value_name = "PATH")]
    pub db_path: Option<PathBuf>,

    /// Sync server base URL (falls back to `QUIRE_SERVER_URL`)
    #[arg(long, global = true, value_name = "URL")]
    pub server_url: Option<String>,

    /// Quick capture: quire "my note here"
    #[arg(trailing_var_arg = true)]
    pub note: Vec<String>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Create a new note
    #[command(alias = "new")]
    Add {
        /// Note content
        content: Vec<String>,
    },
    /// List notes, highest order first
    List {
        /// Number of notes to show
        #[arg(short, long, default_value = "10")]
        limit: usize,
        /// Show archived notes instead of active ones
        #[arg(long)]
        archived: bool,
        /// Only show pinned notes
        #[arg(long)]
        pinned: bool,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Search note text
    Search {
        /// Search query
        query: String,
        /// Number of notes to show
        #[arg(short, long, default_value = "10")]
        limit: usize,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Edit an existing note
    Edit {
        /// Note ID or unique ID prefix
        id: String,
    },
    /// Delete an existing note
    Delete {
        /// Note ID or unique ID prefix
        id: String,
    },
    /// Archive a note
    Archive {
        /// Note ID or unique ID prefix
        id: String,
        /// Unarchive instead
        #[arg(long)]
        undo: bool,
    },
    /// Pin a note
    Pin {
        /// Note ID or unique ID prefix
        id: String,
        /// Unpin instead
        #[arg(long)]
        undo: bool,
    },
    /// Show or change list preferences
    Prefs {
        /// List archived notes by default
        #[arg(long, value_name = "BOOL")]
        show_archive: Option<bool>,
        /// Hide pinned notes from the default list
        #[arg(long, value_name = "BOOL")]
        hide_pinned: Option<bool>,
    },
    /// Store a session issued by the account service
    Login {
        /// Account name
        #[arg(long, value_name = "NAME")]
        username: String,
        /// Per-device sync token
        #[arg(long, value_name = "TOKEN")]
        token: String,
        /// Base64 encryption key shared by your devices (generated when omitted)
        #[arg(long, value_name = "KEY")]
        key: Option<String>,
        /// Local-only demo session that never syncs
        #[arg(long)]
        demo: bool,
    },
    /// Clear the stored session
    Logout,
    /// Show session and sync status
    Status {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Run one sync cycle
    Sync {
        /// Start with a full queue resync
        #[arg(long)]
        full: bool,
    },
    /// Keep syncing in the background until interrupted
    Watch {
        /// Seconds between periodic syncs
        #[arg(long, default_value = "60", value_name = "SECS")]
        interval: u64,
    },
}
