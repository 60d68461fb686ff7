//! Quire CLI - encrypted notes from the command line
//!
//! Notes are written to the local store first; `quire sync` and
//! `quire watch` reconcile them with the server.

mod cli;
mod commands;
mod error;

#[cfg(test)]
mod tests;

use clap::{CommandFactory, Parser};

use crate::cli::{Cli, Commands};
use crate::commands::add::run_add;
use crate::commands::common::{resolve_db_path, resolve_server_url};
use crate::commands::delete::run_delete;
use crate::commands::edit::run_edit;
use crate::commands::flags::{run_archive, run_pin};
use crate::commands::list::run_list;
use crate::commands::prefs::run_prefs;
use crate::commands::search::run_search;
use crate::commands::session::{run_login, run_logout, run_status};
use crate::commands::sync::{run_sync, run_watch};
use crate::error::CliError;

#[tokio::main]
async fn main() {
    if let Err(error) = run().await {
        eprintln!("Error: {error}");
        std::process::exit(1);
    }
}

async fn run() -> Result<(), CliError> {
    dotenvy::dotenv().ok();

    let mut filter = tracing_subscriber::EnvFilter::from_default_env();
    if let Ok(directive) = "quire=warn".parse() {
        filter = filter.add_directive(directive);
    }
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let db_path = resolve_db_path(cli.db_path);
    let server_url = resolve_server_url(cli.server_url);

    match cli.command {
        Some(Commands::Add { content }) => run_add(&content, &db_path).await?,
        Some(Commands::List {
            limit,
            archived,
            pinned,
            json,
        }) => run_list(limit, archived, pinned, json, &db_path).await?,
        Some(Commands::Search { query, limit, json }) => {
            run_search(&query, limit, json, &db_path).await?;
        }
        Some(Commands::Edit { id }) => run_edit(&id, &db_path).await?,
        Some(Commands::Delete { id }) => run_delete(&id, &db_path).await?,
        Some(Commands::Archive { id, undo }) => run_archive(&id, undo, &db_path).await?,
        Some(Commands::Pin { id, undo }) => run_pin(&id, undo, &db_path).await?,
        Some(Commands::Prefs {
            show_archive,
            hide_pinned,
        }) => run_prefs(show_archive, hide_pinned, &db_path).await?,
        Some(Commands::Login {
            username,
            token,
            key,
            demo,
        }) => run_login(&username, &token, key.as_deref(), demo, &db_path).await?,
        Some(Commands::Logout) => run_logout(&db_path).await?,
        Some(Commands::Status { json }) => run_status(json, &db_path).await?,
        Some(Commands::Sync { full }) => run_sync(full, server_url.as_deref(), &db_path).await?,
        Some(Commands::Watch { interval }) => {
            run_watch(interval, server_url.as_deref(), &db_path).await?;
        }
        None => {
            // Quick capture mode: quire "my note"
            if cli.note.is_empty() {
                Cli::command().print_help().map_err(CliError::Io)?;
                println!();
            } else {
                run_add(&cli.note, &db_path).await?;
            }
        }
    }

    Ok(())
}
