//! `SQLite` database connection.
//!
//! The database is stored at `~/.tillsync/tillsync.db` and contains:
//! - `sync_queue`: queued write operations
//! - `cache_entries`: reference data snapshots readable while offline

use std::sync::{Mutex, MutexGuard};

use rusqlite::Connection;

use crate::config::Paths;
use crate::error::SyncError;

use super::migrations;

/// Database connection wrapper.
///
/// The connection sits behind a mutex so the queue can be shared between the
/// orchestrator task and producers. Every caller holds the lock for one
/// statement or one transaction and never across an `.await`.
pub struct Database {
    conn: Mutex<Connection>,
}

impl Database {
    /// Open the database at the default location.
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be opened or migrations fail.
    pub fn open() -> Result<Self, SyncError> {
        let paths = Paths::new()?;
        paths.ensure_dirs()?;
        Self::open_at(&paths.database)
    }

    /// Open the database at a specific path.
    ///
    /// Creates the database file and runs migrations if necessary.
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be opened or migrations fail.
    pub fn open_at(path: &std::path::Path) -> Result<Self, SyncError> {
        let conn = Connection::open(path).map_err(|e| {
            SyncError::Storage(format!("Failed to open database {}: {e}", path.display()))
        })?;

        // WAL keeps producers from blocking behind a long read
        conn.query_row("PRAGMA journal_mode = WAL", [], |row| row.get::<_, String>(0))
            .map_err(|e| SyncError::Storage(format!("Failed to enable WAL: {e}")))?;
        conn.pragma_update(None, "synchronous", "FULL")
            .map_err(|e| SyncError::Storage(format!("Failed to configure database: {e}")))?;

        Self::init(conn)
    }

    /// Open an in-memory database (useful for testing).
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be opened or migrations fail.
    pub fn open_in_memory() -> Result<Self, SyncError> {
        let conn = Connection::open_in_memory().map_err(|e| {
            SyncError::Storage(format!("Failed to open in-memory database: {e}"))
        })?;

        Self::init(conn)
    }

    fn init(conn: Connection) -> Result<Self, SyncError> {
        migrations::run(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Get the current schema version.
    ///
    /// # Errors
    ///
    /// Returns an error if the version cannot be read.
    pub fn schema_version(&self) -> Result<i32, SyncError> {
        let conn = self.connection()?;
        migrations::get_version(&conn)
    }

    /// Lock and return the underlying connection.
    ///
    /// # Errors
    ///
    /// Returns a storage error if a previous holder panicked mid-write.
    pub fn connection(&self) -> Result<MutexGuard<'_, Connection>, SyncError> {
        self.conn
            .lock()
            .map_err(|_| SyncError::Storage("database connection lock poisoned".to_string()))
    }
}
