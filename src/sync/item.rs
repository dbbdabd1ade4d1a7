//! Queue item types.
//!
//! A [`QueueItem`] is one pending write against the remote store. The queue
//! never looks inside its payload; only the processor registered for its
//! entity type does.

use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::SyncError;

/// Well-known entity type tags.
///
/// The set is open: any string can be enqueued, but only tags with a
/// registered processor will ever sync.
pub mod entity {
    /// A completed sale.
    pub const SALE: &str = "sale";
    /// A stock adjustment or transfer.
    pub const STOCK_MOVEMENT: &str = "stock_movement";
    /// A cash drawer deposit or withdrawal.
    pub const CASH_MOVEMENT: &str = "cash_movement";
}

/// Priority given to items built without an explicit one.
pub const DEFAULT_PRIORITY: i32 = 5;

/// Retry ceiling given to items built without an explicit one.
pub const DEFAULT_MAX_RETRIES: u32 = 3;

/// Status of a queued item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueueStatus {
    /// Waiting to be applied
    Pending,
    /// Claimed by a pass and being applied
    Syncing,
    /// Applied to the remote store
    Synced,
    /// Gave up; needs a human to re-arm, requeue or discard it
    Failed,
    /// The remote holds a colliding record; needs a human decision
    Conflict,
}

impl QueueStatus {
    /// Every status, in lifecycle order.
    pub const ALL: [Self; 5] = [
        Self::Pending,
        Self::Syncing,
        Self::Synced,
        Self::Failed,
        Self::Conflict,
    ];

    /// Storage and display name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Syncing => "syncing",
            Self::Synced => "synced",
            Self::Failed => "failed",
            Self::Conflict => "conflict",
        }
    }

    /// Check if this status is terminal (no automatic action will follow).
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Synced | Self::Failed | Self::Conflict)
    }

    /// Check if this status needs explicit acknowledgment.
    #[must_use]
    pub const fn needs_attention(self) -> bool {
        matches!(self, Self::Failed | Self::Conflict)
    }
}

impl std::fmt::Display for QueueStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for QueueStatus {
    type Err = SyncError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "pending" => Ok(Self::Pending),
            "syncing" => Ok(Self::Syncing),
            "synced" => Ok(Self::Synced),
            "failed" => Ok(Self::Failed),
            "conflict" => Ok(Self::Conflict),
            other => Err(SyncError::Parse(format!("unknown queue status '{other}'"))),
        }
    }
}

/// A queued write operation with its sync metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueueItem {
    /// Unique ID, assigned by the queue on enqueue
    pub id: Option<i64>,
    /// Tag selecting the processor
    pub entity_type: String,
    /// Opaque processor input
    pub payload: Value,
    /// Current status
    pub status: QueueStatus,
    /// Lower is applied first
    pub priority: i32,
    /// Apply attempts made so far
    pub attempt_count: u32,
    /// Attempts allowed before a transient failure becomes permanent
    pub max_retries: u32,
    /// Diagnostic from the most recent failed attempt
    pub last_error: Option<String>,
    /// Not due before this time (backoff)
    pub next_attempt_at: Option<DateTime<Utc>>,
    /// When the item was enqueued
    pub created_at: DateTime<Utc>,
    /// Last status change
    pub updated_at: DateTime<Utc>,
}

impl QueueItem {
    /// Create a new pending item with default priority and retry ceiling.
    #[must_use]
    pub fn new(entity_type: impl Into<String>, payload: Value) -> Self {
        let now = Utc::now();
        Self {
            id: None,
            entity_type: entity_type.into(),
            payload,
            status: QueueStatus::Pending,
            priority: DEFAULT_PRIORITY,
            attempt_count: 0,
            max_retries: DEFAULT_MAX_RETRIES,
            last_error: None,
            next_attempt_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Create a sale item.
    #[must_use]
    pub fn sale(payload: Value) -> Self {
        Self::new(entity::SALE, payload)
    }

    /// Create a stock movement item.
    #[must_use]
    pub fn stock_movement(payload: Value) -> Self {
        Self::new(entity::STOCK_MOVEMENT, payload)
    }

    /// Create a cash movement item.
    #[must_use]
    pub fn cash_movement(payload: Value) -> Self {
        Self::new(entity::CASH_MOVEMENT, payload)
    }

    /// Set the priority.
    #[must_use]
    pub const fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    /// Set the retry ceiling.
    #[must_use]
    pub const fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// Check if the item may be picked up at `now`.
    #[must_use]
    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        self.status == QueueStatus::Pending && self.next_attempt_at.map_or(true, |t| t <= now)
    }

    /// Attempts left before a transient failure marks the item failed.
    #[must_use]
    pub const fn attempts_remaining(&self) -> u32 {
        self.max_retries.saturating_sub(self.attempt_count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_status_round_trips_through_str() {
        for status in QueueStatus::ALL {
            assert_eq!(status.as_str().parse::<QueueStatus>().unwrap(), status);
        }
        assert!("completed".parse::<QueueStatus>().is_err());
    }

    #[test]
    fn test_status_terminal() {
        assert!(QueueStatus::Synced.is_terminal());
        assert!(QueueStatus::Failed.is_terminal());
        assert!(QueueStatus::Conflict.is_terminal());
        assert!(!QueueStatus::Pending.is_terminal());
        assert!(!QueueStatus::Syncing.is_terminal());
    }

    #[test]
    fn test_status_needs_attention() {
        assert!(QueueStatus::Failed.needs_attention());
        assert!(QueueStatus::Conflict.needs_attention());
        assert!(!QueueStatus::Synced.needs_attention());
    }

    #[test]
    fn test_new_item_defaults() {
        let item = QueueItem::sale(json!({"total": 1250, "lines": 3}));

        assert_eq!(item.entity_type, entity::SALE);
        assert_eq!(item.status, QueueStatus::Pending);
        assert_eq!(item.priority, DEFAULT_PRIORITY);
        assert_eq!(item.max_retries, DEFAULT_MAX_RETRIES);
        assert_eq!(item.attempt_count, 0);
        assert!(item.id.is_none());
    }

    #[test]
    fn test_builder_overrides() {
        let item = QueueItem::cash_movement(json!({"amount": -500}))
            .with_priority(1)
            .with_max_retries(10);

        assert_eq!(item.priority, 1);
        assert_eq!(item.max_retries, 10);
        assert_eq!(item.attempts_remaining(), 10);
    }

    #[test]
    fn test_is_due_respects_backoff_gate() {
        let mut item = QueueItem::stock_movement(json!({"sku": "A-1", "delta": -2}));
        let now = Utc::now();
        assert!(item.is_due(now));

        item.next_attempt_at = Some(now + chrono::Duration::seconds(10));
        assert!(!item.is_due(now));
        assert!(item.is_due(now + chrono::Duration::seconds(10)));

        item.status = QueueStatus::Failed;
        assert!(!item.is_due(now + chrono::Duration::hours(1)));
    }

    #[test]
    fn test_status_serializes_snake_case() {
        let json = serde_json::to_string(&QueueStatus::Conflict).unwrap();
        assert_eq!(json, "\"conflict\"");
    }
}
