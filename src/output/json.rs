//! JSON output formatting for tillsync.

use serde::Serialize;
use serde_json::json;

use crate::cache::CacheEntry;
use crate::error::SyncError;
use crate::sync::{QueueItem, QueueStats, QueueStatus};

/// Format queue items as JSON
///
/// # Errors
///
/// Returns `SyncError::Parse` if JSON serialization fails.
pub fn format_items_json(items: &[QueueItem], status: QueueStatus) -> Result<String, SyncError> {
    let output = json!({
        "status": status,
        "count": items.len(),
        "items": items
    });
    Ok(serde_json::to_string_pretty(&output)?)
}

/// Format queue statistics as JSON
///
/// # Errors
///
/// Returns `SyncError::Parse` if JSON serialization fails.
pub fn format_stats_json(stats: &QueueStats) -> Result<String, SyncError> {
    let output = json!({
        "pending": stats.pending,
        "syncing": stats.syncing,
        "synced": stats.synced,
        "failed": stats.failed,
        "conflict": stats.conflict,
        "total": stats.total(),
        "needs_attention": stats.needs_attention(),
        "oldest_pending": stats.oldest_pending.map(|t| t.to_rfc3339()),
    });
    Ok(serde_json::to_string_pretty(&output)?)
}

/// Format cache entries as JSON
///
/// # Errors
///
/// Returns `SyncError::Parse` if JSON serialization fails.
pub fn format_cache_entries_json(
    entries: &[CacheEntry],
    entity_type: &str,
) -> Result<String, SyncError> {
    let output = json!({
        "entity_type": entity_type,
        "count": entries.len(),
        "entries": entries
    });
    Ok(serde_json::to_string_pretty(&output)?)
}

/// Serialize any value as pretty JSON
///
/// # Errors
///
/// Returns `SyncError::Parse` if JSON serialization fails.
pub fn to_json<T: Serialize>(value: &T) -> Result<String, SyncError> {
    Ok(serde_json::to_string_pretty(value)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_items_json() {
        let mut item = QueueItem::sale(json!({"total": 1500}));
        item.id = Some(12);
        let out = format_items_json(&[item], QueueStatus::Pending).unwrap();
        let parsed: serde_json::Value = serde_json::from_str(&out).unwrap();

        assert_eq!(parsed["status"], "pending");
        assert_eq!(parsed["count"], 1);
        assert_eq!(parsed["items"][0]["id"], 12);
        assert_eq!(parsed["items"][0]["payload"]["total"], 1500);
    }

    #[test]
    fn test_format_stats_json() {
        let stats = QueueStats {
            pending: 2,
            failed: 1,
            conflict: 1,
            ..QueueStats::default()
        };
        let parsed: serde_json::Value =
            serde_json::from_str(&format_stats_json(&stats).unwrap()).unwrap();

        assert_eq!(parsed["pending"], 2);
        assert_eq!(parsed["total"], 4);
        assert_eq!(parsed["needs_attention"], 2);
        assert!(parsed["oldest_pending"].is_null());
    }
}
