//! Sync queue storage and management.
//!
//! Persists queued items in `SQLite` and enforces the state machine on every
//! status change. All mutation goes through this type.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use rusqlite::{params, OptionalExtension, Row, Transaction, TransactionBehavior};
use serde::Serialize;
use serde_json::Value;

use super::item::{QueueItem, QueueStatus};
use super::state::{self, Resolution};
use crate::clock::{Clock, SystemClock};
use crate::error::SyncError;
use crate::storage::{format_timestamp, parse_timestamp, Database};

const COLUMNS: &str = "id, entity_type, payload, status, priority, attempt_count, max_retries,
                       last_error, next_attempt_at, created_at, updated_at";

/// Durable queue of write operations.
pub struct SyncQueue {
    db: Arc<Database>,
    clock: Arc<dyn Clock>,
}

impl SyncQueue {
    /// Open the queue in the default database.
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be opened.
    pub fn new() -> Result<Self, SyncError> {
        let db = Database::open()?;
        Ok(Self::with_database(Arc::new(db)))
    }

    /// Create a queue over an existing database, using the system clock.
    #[must_use]
    pub fn with_database(db: Arc<Database>) -> Self {
        Self::with_clock(db, Arc::new(SystemClock))
    }

    /// Create a queue with an explicit clock.
    #[must_use]
    pub fn with_clock(db: Arc<Database>, clock: Arc<dyn Clock>) -> Self {
        Self { db, clock }
    }

    /// Current time according to the queue's clock.
    #[must_use]
    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    /// Add an item to the queue.
    ///
    /// The item is stored as `pending` with no attempts, whatever state the
    /// passed value carries, and its `id` and timestamps are filled in.
    ///
    /// # Errors
    ///
    /// Returns `SyncError::Storage` if the write is not accepted; the item is
    /// then not queued.
    pub fn enqueue(&self, item: &mut QueueItem) -> Result<i64, SyncError> {
        let payload = serde_json::to_string(&item.payload)?;
        let now = self.now();
        let conn = self.db.connection()?;

        conn.execute(
            r"INSERT INTO sync_queue
                (entity_type, payload, status, priority, attempt_count, max_retries,
                 last_error, next_attempt_at, created_at, updated_at)
              VALUES (?1, ?2, 'pending', ?3, 0, ?4, NULL, NULL, ?5, ?5)",
            params![
                item.entity_type,
                payload,
                item.priority,
                item.max_retries,
                format_timestamp(now),
            ],
        )
        .map_err(|e| SyncError::Storage(format!("Failed to enqueue item: {e}")))?;

        let id = conn.last_insert_rowid();
        item.id = Some(id);
        item.status = QueueStatus::Pending;
        item.attempt_count = 0;
        item.last_error = None;
        item.next_attempt_at = None;
        item.created_at = now;
        item.updated_at = now;

        Ok(id)
    }

    /// Get a specific item by ID.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn get(&self, id: i64) -> Result<Option<QueueItem>, SyncError> {
        let conn = self.db.connection()?;
        fetch(&conn, id)
    }

    /// Get items with a given status, oldest first.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn get_by_status(
        &self,
        status: QueueStatus,
        limit: usize,
    ) -> Result<Vec<QueueItem>, SyncError> {
        let conn = self.db.connection()?;
        let mut stmt = conn
            .prepare(&format!(
                "SELECT {COLUMNS} FROM sync_queue
                 WHERE status = ?1
                 ORDER BY created_at ASC, id ASC
                 LIMIT ?2"
            ))
            .map_err(|e| SyncError::Storage(format!("Failed to prepare query: {e}")))?;

        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        let rows = stmt
            .query_map(params![status.as_str(), limit], row_to_item)
            .map_err(|e| SyncError::Storage(format!("Failed to query items: {e}")))?;

        collect_rows(rows)
    }

    /// All pending items in processing order.
    ///
    /// Ordered by priority, then enqueue time, then id, so items enqueued
    /// within the same clock tick keep their enqueue order.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn list_pending_ordered(&self) -> Result<Vec<QueueItem>, SyncError> {
        let conn = self.db.connection()?;
        let mut stmt = conn
            .prepare(&format!(
                "SELECT {COLUMNS} FROM sync_queue
                 WHERE status = 'pending'
                 ORDER BY priority ASC, created_at ASC, id ASC"
            ))
            .map_err(|e| SyncError::Storage(format!("Failed to prepare query: {e}")))?;

        let rows = stmt
            .query_map([], row_to_item)
            .map_err(|e| SyncError::Storage(format!("Failed to query pending items: {e}")))?;

        collect_rows(rows)
    }

    /// Pending items whose backoff has elapsed, in processing order.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn list_due(&self) -> Result<Vec<QueueItem>, SyncError> {
        let now = format_timestamp(self.now());
        let conn = self.db.connection()?;
        let mut stmt = conn
            .prepare(&format!(
                "SELECT {COLUMNS} FROM sync_queue
                 WHERE status = 'pending'
                   AND (next_attempt_at IS NULL OR next_attempt_at <= ?1)
                 ORDER BY priority ASC, created_at ASC, id ASC"
            ))
            .map_err(|e| SyncError::Storage(format!("Failed to prepare query: {e}")))?;

        let rows = stmt
            .query_map([now], row_to_item)
            .map_err(|e| SyncError::Storage(format!("Failed to query due items: {e}")))?;

        collect_rows(rows)
    }

    /// Claim a pending item for processing (`pending -> syncing`).
    ///
    /// Returns `false` if the item is no longer pending, which means another
    /// claim won.
    ///
    /// # Errors
    ///
    /// Returns an error if the update fails.
    pub fn claim(&self, id: i64) -> Result<bool, SyncError> {
        let now = format_timestamp(self.now());
        let conn = self.db.connection()?;

        let rows = conn
            .execute(
                "UPDATE sync_queue SET status = 'syncing', updated_at = ?1
                 WHERE id = ?2 AND status = 'pending'",
                params![now, id],
            )
            .map_err(|e| SyncError::Storage(format!("Failed to claim item {id}: {e}")))?;

        Ok(rows == 1)
    }

    /// Move an item to a new status without touching its attempt count.
    ///
    /// Only the status, `updated_at` and (when given) `last_error` change.
    /// Items in `syncing` are refused: the end of an attempt always goes
    /// through [`SyncQueue::record_outcome`].
    ///
    /// # Errors
    ///
    /// Returns `SyncError::NotFound` for an unknown id and
    /// `SyncError::InvalidTransition` if the item is `syncing` or the state
    /// machine forbids the move.
    pub fn transition(
        &self,
        id: i64,
        to: QueueStatus,
        error: Option<&str>,
    ) -> Result<QueueItem, SyncError> {
        let now = format_timestamp(self.now());
        let mut conn = self.db.connection()?;
        let tx = begin(&mut conn)?;

        let current = fetch_status(&tx, id)?;
        if current == QueueStatus::Syncing {
            return Err(SyncError::InvalidTransition { id, from: current, to });
        }
        state::validate(id, current, to)?;

        tx.execute(
            "UPDATE sync_queue SET status = ?1, last_error = COALESCE(?2, last_error), updated_at = ?3
             WHERE id = ?4",
            params![to.as_str(), error, now, id],
        )
        .map_err(|e| SyncError::Storage(format!("Failed to update item {id}: {e}")))?;

        let item = fetch(&tx, id)?.ok_or_else(|| SyncError::NotFound(format!("Item {id}")))?;
        commit(tx)?;
        Ok(item)
    }

    /// Persist the result of an apply attempt on a `syncing` item.
    ///
    /// # Errors
    ///
    /// Returns `SyncError::InvalidTransition` if the item is not `syncing` or
    /// the resolution would lower its attempt count.
    pub fn record_outcome(&self, id: i64, resolution: &Resolution) -> Result<(), SyncError> {
        let now = format_timestamp(self.now());
        let mut conn = self.db.connection()?;
        let tx = begin(&mut conn)?;

        let (current, attempts): (String, u32) = tx
            .query_row(
                "SELECT status, attempt_count FROM sync_queue WHERE id = ?1",
                [id],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()
            .map_err(|e| SyncError::Storage(format!("Failed to read item {id}: {e}")))?
            .ok_or_else(|| SyncError::NotFound(format!("Item {id}")))?;
        let current: QueueStatus = current.parse()?;

        if current != QueueStatus::Syncing || resolution.attempt_count < attempts {
            return Err(SyncError::InvalidTransition {
                id,
                from: current,
                to: resolution.status,
            });
        }
        state::validate(id, current, resolution.status)?;

        tx.execute(
            r"UPDATE sync_queue SET
              status = ?1,
              attempt_count = ?2,
              last_error = ?3,
              next_attempt_at = ?4,
              updated_at = ?5
              WHERE id = ?6",
            params![
                resolution.status.as_str(),
                resolution.attempt_count,
                resolution.last_error,
                resolution.next_attempt_at.map(format_timestamp),
                now,
                id,
            ],
        )
        .map_err(|e| SyncError::Storage(format!("Failed to record outcome for {id}: {e}")))?;

        commit(tx)
    }

    /// Fail a pending item without attempting it (`pending -> failed`).
    ///
    /// Used when no processor exists for the item's entity type. The
    /// attempt count is left untouched.
    ///
    /// # Errors
    ///
    /// Returns an error if the item is not pending or the update fails.
    pub fn reject(&self, id: i64, error: &str) -> Result<QueueItem, SyncError> {
        self.transition(id, QueueStatus::Failed, Some(error))
    }

    /// Re-arm a failed item (`failed -> pending`).
    ///
    /// The attempt count is kept; the retry ceiling is raised to allow
    /// `extra_attempts` more tries, and any backoff is cleared.
    ///
    /// # Errors
    ///
    /// Returns an error if the item is not failed, `extra_attempts` is zero,
    /// or the update fails.
    pub fn rearm(&self, id: i64, extra_attempts: u32) -> Result<QueueItem, SyncError> {
        if extra_attempts == 0 {
            return Err(SyncError::Config(
                "Re-arming needs at least one extra attempt".to_string(),
            ));
        }

        let now = format_timestamp(self.now());
        let mut conn = self.db.connection()?;
        let tx = begin(&mut conn)?;

        let current = fetch(&tx, id)?.ok_or_else(|| SyncError::NotFound(format!("Item {id}")))?;
        if current.status != QueueStatus::Failed {
            return Err(SyncError::InvalidTransition {
                id,
                from: current.status,
                to: QueueStatus::Pending,
            });
        }
        let max_retries = current
            .attempt_count
            .checked_add(extra_attempts)
            .ok_or_else(|| {
                SyncError::Config(format!(
                    "Cannot re-arm item {id}: {extra_attempts} extra attempts exceeds the retry limit"
                ))
            })?;

        tx.execute(
            r"UPDATE sync_queue SET
              status = 'pending',
              max_retries = ?1,
              next_attempt_at = NULL,
              updated_at = ?2
              WHERE id = ?3",
            params![max_retries, now, id],
        )
        .map_err(|e| SyncError::Storage(format!("Failed to re-arm item {id}: {e}")))?;

        let item = fetch(&tx, id)?.ok_or_else(|| SyncError::NotFound(format!("Item {id}")))?;
        commit(tx)?;
        Ok(item)
    }

    /// Replace a failed or conflicting item with a fresh one.
    ///
    /// The new item keeps the entity type, priority and retry ceiling; its
    /// payload is either the original or `corrected_payload`. The original
    /// is removed in the same transaction. Returns the new id.
    ///
    /// # Errors
    ///
    /// Returns an error if the item does not need attention or the write
    /// fails.
    pub fn requeue(&self, id: i64, corrected_payload: Option<&Value>) -> Result<i64, SyncError> {
        let now = format_timestamp(self.now());
        let mut conn = self.db.connection()?;
        let tx = begin(&mut conn)?;

        let original = fetch(&tx, id)?.ok_or_else(|| SyncError::NotFound(format!("Item {id}")))?;
        if !original.status.needs_attention() {
            return Err(SyncError::InvalidTransition {
                id,
                from: original.status,
                to: QueueStatus::Pending,
            });
        }

        let payload = serde_json::to_string(corrected_payload.unwrap_or(&original.payload))?;
        tx.execute(
            r"INSERT INTO sync_queue
                (entity_type, payload, status, priority, attempt_count, max_retries,
                 last_error, next_attempt_at, created_at, updated_at)
              VALUES (?1, ?2, 'pending', ?3, 0, ?4, NULL, NULL, ?5, ?5)",
            params![
                original.entity_type,
                payload,
                original.priority,
                original.max_retries,
                now,
            ],
        )
        .map_err(|e| SyncError::Storage(format!("Failed to requeue item {id}: {e}")))?;
        let new_id = tx.last_insert_rowid();

        tx.execute("DELETE FROM sync_queue WHERE id = ?1", [id])
            .map_err(|e| SyncError::Storage(format!("Failed to remove item {id}: {e}")))?;

        commit(tx)?;
        Ok(new_id)
    }

    /// Delete a failed or conflicting item after a human acknowledged it.
    ///
    /// # Errors
    ///
    /// Returns an error if the item does not exist, does not need attention,
    /// or the delete fails.
    pub fn discard(&self, id: i64) -> Result<(), SyncError> {
        let conn = self.db.connection()?;
        let current = fetch_status(&conn, id)?;
        if !current.needs_attention() {
            return Err(SyncError::Config(format!(
                "Item {id} is {current}; only failed or conflict items can be discarded"
            )));
        }

        conn.execute(
            "DELETE FROM sync_queue WHERE id = ?1 AND status IN ('failed', 'conflict')",
            [id],
        )
        .map_err(|e| SyncError::Storage(format!("Failed to discard item {id}: {e}")))?;

        Ok(())
    }

    /// Return every `syncing` item to `pending`.
    ///
    /// Called at startup: a `syncing` row left by a previous process has no
    /// worker behind it. Attempt counts are not changed.
    ///
    /// # Errors
    ///
    /// Returns an error if the update fails.
    pub fn recover_in_flight(&self) -> Result<usize, SyncError> {
        let now = format_timestamp(self.now());
        let conn = self.db.connection()?;

        conn.execute(
            "UPDATE sync_queue SET status = 'pending', updated_at = ?1 WHERE status = 'syncing'",
            [now],
        )
        .map_err(|e| SyncError::Storage(format!("Failed to recover in-flight items: {e}")))
    }

    /// Delete synced items last updated before `now - retention`.
    ///
    /// Failed and conflict items are never removed here.
    ///
    /// # Errors
    ///
    /// Returns an error if the delete fails.
    pub fn cleanup(&self, retention: chrono::Duration) -> Result<usize, SyncError> {
        let cutoff = self
            .now()
            .checked_sub_signed(retention)
            .ok_or_else(|| SyncError::Config("Retention window out of range".to_string()))?;
        let conn = self.db.connection()?;

        conn.execute(
            "DELETE FROM sync_queue WHERE status = 'synced' AND updated_at < ?1",
            [format_timestamp(cutoff)],
        )
        .map_err(|e| SyncError::Storage(format!("Failed to clean up items: {e}")))
    }

    /// Get queue statistics.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn stats(&self) -> Result<QueueStats, SyncError> {
        let conn = self.db.connection()?;
        let mut stats = QueueStats::default();

        let mut stmt = conn
            .prepare("SELECT status, COUNT(*) FROM sync_queue GROUP BY status")
            .map_err(|e| SyncError::Storage(format!("Failed to prepare stats query: {e}")))?;
        let rows = stmt
            .query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?)))
            .map_err(|e| SyncError::Storage(format!("Failed to count items: {e}")))?;

        for row in rows {
            let (status, count) = row.map_err(|e| SyncError::Storage(e.to_string()))?;
            match status.parse::<QueueStatus>()? {
                QueueStatus::Pending => stats.pending = count,
                QueueStatus::Syncing => stats.syncing = count,
                QueueStatus::Synced => stats.synced = count,
                QueueStatus::Failed => stats.failed = count,
                QueueStatus::Conflict => stats.conflict = count,
            }
        }

        let oldest_pending: Option<String> = conn
            .query_row(
                "SELECT MIN(created_at) FROM sync_queue WHERE status = 'pending'",
                [],
                |row| row.get(0),
            )
            .map_err(|e| SyncError::Storage(format!("Failed to get oldest pending: {e}")))?;
        stats.oldest_pending = oldest_pending.as_deref().and_then(parse_timestamp);

        Ok(stats)
    }

    /// Check if there are any pending items.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn has_pending(&self) -> Result<bool, SyncError> {
        let conn = self.db.connection()?;
        let count: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM sync_queue WHERE status = 'pending'",
                [],
                |row| row.get(0),
            )
            .map_err(|e| SyncError::Storage(format!("Failed to check pending: {e}")))?;

        Ok(count > 0)
    }
}

/// Queue statistics.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct QueueStats {
    /// Waiting to be applied
    pub pending: i64,
    /// Claimed by a pass
    pub syncing: i64,
    /// Applied and not yet cleaned up
    pub synced: i64,
    /// Gave up, awaiting acknowledgment
    pub failed: i64,
    /// Conflicting, awaiting acknowledgment
    pub conflict: i64,
    /// Enqueue time of the oldest pending item
    pub oldest_pending: Option<DateTime<Utc>>,
}

impl QueueStats {
    /// Items still held by the queue.
    #[must_use]
    pub const fn total(&self) -> i64 {
        self.pending + self.syncing + self.synced + self.failed + self.conflict
    }

    /// Items a human needs to look at.
    #[must_use]
    pub const fn needs_attention(&self) -> i64 {
        self.failed + self.conflict
    }
}

fn begin(conn: &mut rusqlite::Connection) -> Result<Transaction<'_>, SyncError> {
    conn.transaction_with_behavior(TransactionBehavior::Immediate)
        .map_err(|e| SyncError::Storage(format!("Failed to begin transaction: {e}")))
}

fn commit(tx: Transaction<'_>) -> Result<(), SyncError> {
    tx.commit()
        .map_err(|e| SyncError::Storage(format!("Failed to commit: {e}")))
}

fn fetch(conn: &rusqlite::Connection, id: i64) -> Result<Option<QueueItem>, SyncError> {
    conn.query_row(
        &format!("SELECT {COLUMNS} FROM sync_queue WHERE id = ?1"),
        [id],
        row_to_item,
    )
    .optional()
    .map_err(|e| SyncError::Storage(format!("Failed to query item {id}: {e}")))
}

fn fetch_status(conn: &rusqlite::Connection, id: i64) -> Result<QueueStatus, SyncError> {
    let status: String = conn
        .query_row("SELECT status FROM sync_queue WHERE id = ?1", [id], |row| {
            row.get(0)
        })
        .optional()
        .map_err(|e| SyncError::Storage(format!("Failed to read item {id}: {e}")))?
        .ok_or_else(|| SyncError::NotFound(format!("Item {id}")))?;

    status.parse()
}

fn collect_rows<I>(rows: I) -> Result<Vec<QueueItem>, SyncError>
where
    I: Iterator<Item = Result<QueueItem, rusqlite::Error>>,
{
    rows.map(|row| row.map_err(|e| SyncError::Storage(e.to_string())))
        .collect()
}

fn conversion_error(
    column: usize,
    e: impl std::error::Error + Send + Sync + 'static,
) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(column, rusqlite::types::Type::Text, Box::new(e))
}

fn timestamp_column(row: &Row<'_>, column: usize) -> Result<DateTime<Utc>, rusqlite::Error> {
    let raw: String = row.get(column)?;
    DateTime::parse_from_rfc3339(&raw)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| conversion_error(column, e))
}

fn row_to_item(row: &Row<'_>) -> Result<QueueItem, rusqlite::Error> {
    let payload: String = row.get(2)?;
    let status: String = row.get(3)?;
    let next_attempt_at: Option<String> = row.get(8)?;

    Ok(QueueItem {
        id: Some(row.get(0)?),
        entity_type: row.get(1)?,
        payload: serde_json::from_str(&payload).map_err(|e| conversion_error(2, e))?,
        status: status.parse().map_err(|e| conversion_error(3, e))?,
        priority: row.get(4)?,
        attempt_count: row.get(5)?,
        max_retries: row.get(6)?,
        last_error: row.get(7)?,
        next_attempt_at: next_attempt_at.as_deref().and_then(parse_timestamp),
        created_at: timestamp_column(row, 9)?,
        updated_at: timestamp_column(row, 10)?,
    })
}
