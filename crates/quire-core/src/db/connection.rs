//! Database connection management

use crate::error::Result;
use rusqlite::{Connection, Transaction, TransactionBehavior};
use std::path::Path;

use super::migrations;

/// Access mode of a scoped transaction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionMode {
    /// Reads only; takes no write lock up front
    ReadOnly,
    /// Reads and writes; takes the write lock immediately so a merge never
    /// interleaves with another writer
    ReadWrite,
}

impl TransactionMode {
    const fn behavior(self) -> TransactionBehavior {
        match self {
            Self::ReadOnly => TransactionBehavior::Deferred,
            Self::ReadWrite => TransactionBehavior::Immediate,
        }
    }
}

/// Database wrapper for the device-local `SQLite` store
pub struct Database {
    conn: Connection,
}

impl Database {
    /// Open a database at the given path, creating it if it doesn't exist
    ///
    /// Runs migrations automatically.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let conn = Connection::open(path)?;
        Self::initialize(conn)
    }

    /// Open an in-memory database (useful for testing)
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        Self::initialize(conn)
    }

    fn initialize(conn: Connection) -> Result<Self> {
        let mut database = Self { conn };
        database.configure();
        migrations::run(&mut database.conn)?;
        Ok(database)
    }

    /// Configure `SQLite` for a single-writer local store
    fn configure(&self) {
        // In-memory databases report "memory" and keep their journal mode
        self.conn
            .pragma_update_and_check(None, "journal_mode", "WAL", |row| {
                row.get::<_, String>(0)
            })
            .ok();
        self.conn
            .pragma_update(None, "synchronous", "NORMAL")
            .ok();
    }

    /// Run `body` inside one atomic unit of work.
    ///
    /// Everything `body` reads and writes commits together when it returns
    /// `Ok`. Any error (or an unwinding panic) drops the transaction, which
    /// rolls it back, so the store never observes a partial merge.
    pub fn transaction<T, F>(&mut self, mode: TransactionMode, body: F) -> Result<T>
    where
        F: FnOnce(&Transaction<'_>) -> Result<T>,
    {
        let tx = self.conn.transaction_with_behavior(mode.behavior())?;
        let value = body(&tx)?;
        tx.commit()?;
        Ok(value)
    }

    /// Get a reference to the underlying connection
    pub const fn connection(&self) -> &Connection {
        &self.conn
    }
}
