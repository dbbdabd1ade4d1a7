//! Reference-data cache.
//!
//! Last known remote snapshot per `(entity_type, key)`, read by the app while
//! offline. Entries are overwritten on refresh; there is no lifecycle.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use rusqlite::{params, OptionalExtension, Row};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::clock::{Clock, SystemClock};
use crate::error::SyncError;
use crate::storage::{format_timestamp, parse_timestamp, Database};

/// One cached snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry {
    /// Entity type tag
    pub entity_type: String,
    /// Key within the entity type
    pub key: String,
    /// Snapshot as returned by the remote
    pub data: Value,
    /// When the snapshot was stored
    pub updated_at: DateTime<Utc>,
}

/// Storage for cached snapshots.
pub struct CacheStore {
    db: Arc<Database>,
    clock: Arc<dyn Clock>,
}

impl CacheStore {
    /// Create a cache over an existing database.
    #[must_use]
    pub fn with_database(db: Arc<Database>) -> Self {
        Self::with_clock(db, Arc::new(SystemClock))
    }

    /// Create a cache with an explicit clock.
    #[must_use]
    pub fn with_clock(db: Arc<Database>, clock: Arc<dyn Clock>) -> Self {
        Self { db, clock }
    }

    /// Store a snapshot, replacing any previous one for the same key.
    ///
    /// # Errors
    ///
    /// Returns an error if the write fails.
    pub fn put(&self, entity_type: &str, key: &str, data: &Value) -> Result<CacheEntry, SyncError> {
        let now = self.clock.now();
        let conn = self.db.connection()?;

        conn.execute(
            r"INSERT INTO cache_entries (entity_type, key, data, updated_at)
              VALUES (?1, ?2, ?3, ?4)
              ON CONFLICT(entity_type, key) DO UPDATE SET
                data = excluded.data,
                updated_at = excluded.updated_at",
            params![entity_type, key, serde_json::to_string(data)?, format_timestamp(now)],
        )
        .map_err(|e| SyncError::Storage(format!("Failed to cache {entity_type}/{key}: {e}")))?;

        Ok(CacheEntry {
            entity_type: entity_type.to_string(),
            key: key.to_string(),
            data: data.clone(),
            updated_at: now,
        })
    }

    /// Get a snapshot.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn get(&self, entity_type: &str, key: &str) -> Result<Option<CacheEntry>, SyncError> {
        let conn = self.db.connection()?;
        conn.query_row(
            "SELECT entity_type, key, data, updated_at FROM cache_entries
             WHERE entity_type = ?1 AND key = ?2",
            params![entity_type, key],
            row_to_entry,
        )
        .optional()
        .map_err(|e| SyncError::Storage(format!("Failed to read {entity_type}/{key}: {e}")))
    }

    /// All snapshots of an entity type, by key.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn list(&self, entity_type: &str) -> Result<Vec<CacheEntry>, SyncError> {
        let conn = self.db.connection()?;
        let mut stmt = conn
            .prepare(
                "SELECT entity_type, key, data, updated_at FROM cache_entries
                 WHERE entity_type = ?1
                 ORDER BY key ASC",
            )
            .map_err(|e| SyncError::Storage(format!("Failed to prepare query: {e}")))?;

        let rows = stmt
            .query_map([entity_type], row_to_entry)
            .map_err(|e| SyncError::Storage(format!("Failed to list cache: {e}")))?;

        rows.map(|row| row.map_err(|e| SyncError::Storage(e.to_string())))
            .collect()
    }

    /// Remove a snapshot. Returns whether one existed.
    ///
    /// # Errors
    ///
    /// Returns an error if the delete fails.
    pub fn remove(&self, entity_type: &str, key: &str) -> Result<bool, SyncError> {
        let conn = self.db.connection()?;
        let rows = conn
            .execute(
                "DELETE FROM cache_entries WHERE entity_type = ?1 AND key = ?2",
                params![entity_type, key],
            )
            .map_err(|e| SyncError::Storage(format!("Failed to remove {entity_type}/{key}: {e}")))?;

        Ok(rows > 0)
    }

    /// Remove every snapshot of an entity type. Returns how many were removed.
    ///
    /// # Errors
    ///
    /// Returns an error if the delete fails.
    pub fn clear(&self, entity_type: &str) -> Result<usize, SyncError> {
        let conn = self.db.connection()?;
        conn.execute(
            "DELETE FROM cache_entries WHERE entity_type = ?1",
            [entity_type],
        )
        .map_err(|e| SyncError::Storage(format!("Failed to clear {entity_type}: {e}")))
    }
}

fn row_to_entry(row: &Row<'_>) -> Result<CacheEntry, rusqlite::Error> {
    let data: String = row.get(2)?;
    let updated_at: String = row.get(3)?;

    Ok(CacheEntry {
        entity_type: row.get(0)?,
        key: row.get(1)?,
        data: serde_json::from_str(&data).map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(2, rusqlite::types::Type::Text, Box::new(e))
        })?,
        updated_at: parse_timestamp(&updated_at).unwrap_or_default(),
    })
}
