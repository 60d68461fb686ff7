//! Server database migrations

use rusqlite::{Connection, OptionalExtension};

use crate::engine::EngineResult;

/// Current schema version
const CURRENT_VERSION: i32 = 1;

/// Run all pending migrations
pub fn run(conn: &mut Connection) -> EngineResult<()> {
    let version = get_version(conn)?;

    if version < 1 {
        migrate_v1(conn)?;
    }

    Ok(())
}

fn get_version(conn: &Connection) -> EngineResult<i32> {
    let exists: bool = conn.query_row(
        "SELECT EXISTS(SELECT 1 FROM sqlite_master WHERE type='table' AND name='schema_version')",
        [],
        |row| row.get(0),
    )?;

    if !exists {
        return Ok(0);
    }

    let version = conn
        .query_row("SELECT MAX(version) FROM schema_version", [], |row| {
            row.get::<_, Option<i32>>(0)
        })
        .optional()?
        .flatten()
        .unwrap_or(0);

    Ok(version)
}

/// Migration to version 1: clients, encrypted notes, per-client queues
fn migrate_v1(conn: &mut Connection) -> EngineResult<()> {
    let tx = conn.transaction()?;

    tx.execute_batch(
        r"
        CREATE TABLE IF NOT EXISTS schema_version (
            version INTEGER PRIMARY KEY
        );

        CREATE TABLE IF NOT EXISTS clients (
            token TEXT PRIMARY KEY,
            username TEXT NOT NULL,
            sync_number INTEGER NOT NULL DEFAULT 0,
            last_activity_date TEXT NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_clients_username ON clients(username);

        CREATE TABLE IF NOT EXISTS notes (
            username TEXT NOT NULL,
            id TEXT NOT NULL,
            modification_date TEXT NOT NULL,
            encrypted_base64 TEXT NOT NULL,
            iv TEXT NOT NULL,
            PRIMARY KEY (username, id)
        );

        CREATE TABLE IF NOT EXISTS notes_queue (
            token TEXT NOT NULL,
            id TEXT NOT NULL,
            modification_date TEXT NOT NULL,
            PRIMARY KEY (token, id)
        );

        INSERT INTO schema_version (version) VALUES (1);
        ",
    )?;

    tx.commit()?;

    tracing::info!("Migrated server database to version {CURRENT_VERSION}");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn migrations_are_idempotent() {
        let mut conn = Connection::open_in_memory().unwrap();
        run(&mut conn).unwrap();
        run(&mut conn).unwrap();

        assert_eq!(get_version(&conn).unwrap(), CURRENT_VERSION);
        let tables: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name IN ('clients', 'notes', 'notes_queue')",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(tables, 3);
    }
}
