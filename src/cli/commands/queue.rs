//! Queue command implementations.
//!
//! Inspection and manual resolution of queued items.

use colored::Colorize;
use serde_json::{json, Value};

use crate::cli::args::{EnqueueArgs, OutputFormat};
use crate::config::{retention_window, SyncConfig};
use crate::error::SyncError;
use crate::output::{format_item, format_items, format_stats, to_json};
use crate::sync::{QueueItem, QueueStatus, SyncQueue};

fn parse_json(raw: &str, what: &str) -> Result<Value, SyncError> {
    serde_json::from_str(raw).map_err(|e| SyncError::Parse(format!("Invalid {what} JSON: {e}")))
}

fn load(queue: &SyncQueue, id: i64) -> Result<QueueItem, SyncError> {
    queue
        .get(id)?
        .ok_or_else(|| SyncError::NotFound(format!("Item {id}")))
}

/// Show queue counts.
///
/// # Errors
///
/// Returns an error if the stats query or formatting fails.
pub fn status(queue: &SyncQueue, format: OutputFormat) -> Result<String, SyncError> {
    format_stats(&queue.stats()?, format)
}

/// List items with a status.
///
/// # Errors
///
/// Returns an error if the status is unknown or the query fails.
pub fn list(
    queue: &SyncQueue,
    status: &str,
    limit: usize,
    format: OutputFormat,
) -> Result<String, SyncError> {
    let status: QueueStatus = status.parse()?;

    let items = if status == QueueStatus::Pending {
        let mut items = queue.list_pending_ordered()?;
        items.truncate(limit);
        items
    } else {
        queue.get_by_status(status, limit)?
    };

    format_items(&items, status, format)
}

/// Show one item.
///
/// # Errors
///
/// Returns `SyncError::NotFound` for an unknown id.
pub fn show(queue: &SyncQueue, id: i64, format: OutputFormat) -> Result<String, SyncError> {
    format_item(&load(queue, id)?, format)
}

/// Queue an item by hand.
///
/// # Errors
///
/// Returns an error if the payload is not valid JSON or the write fails.
pub fn enqueue(
    queue: &SyncQueue,
    args: EnqueueArgs,
    defaults: &SyncConfig,
    format: OutputFormat,
) -> Result<String, SyncError> {
    let payload = parse_json(&args.payload, "payload")?;
    let mut item = QueueItem::new(args.entity_type, payload)
        .with_priority(args.priority.unwrap_or(defaults.default_priority))
        .with_max_retries(args.max_retries.unwrap_or(defaults.default_max_retries));

    let id = queue.enqueue(&mut item)?;

    match format {
        OutputFormat::Json => to_json(&item),
        OutputFormat::Pretty => Ok(format!(
            "{} Queued {} item {}",
            "✓".green(),
            item.entity_type.bold(),
            format!("#{id}").dimmed()
        )),
    }
}

/// Re-arm a failed item.
///
/// # Errors
///
/// Returns an error if the item is not failed.
pub fn rearm(
    queue: &SyncQueue,
    id: i64,
    attempts: u32,
    format: OutputFormat,
) -> Result<String, SyncError> {
    let item = queue.rearm(id, attempts)?;

    match format {
        OutputFormat::Json => to_json(&item),
        OutputFormat::Pretty => Ok(format!(
            "{} Item #{id} is pending again ({} of {} attempts used)",
            "✓".green(),
            item.attempt_count,
            item.max_retries
        )),
    }
}

/// Replace a failed or conflict item.
///
/// # Errors
///
/// Returns an error if the corrected payload is not valid JSON or the item
/// does not need attention.
pub fn requeue(
    queue: &SyncQueue,
    id: i64,
    payload: Option<&str>,
    format: OutputFormat,
) -> Result<String, SyncError> {
    let corrected = payload.map(|raw| parse_json(raw, "payload")).transpose()?;
    let new_id = queue.requeue(id, corrected.as_ref())?;

    match format {
        OutputFormat::Json => to_json(&json!({ "replaced": id, "id": new_id })),
        OutputFormat::Pretty => Ok(format!(
            "{} Item #{id} replaced by #{new_id}{}",
            "✓".green(),
            if corrected.is_some() {
                " with corrected payload".dimmed()
            } else {
                "".normal()
            }
        )),
    }
}

/// Discard a failed or conflict item.
///
/// # Errors
///
/// Returns an error if the item does not need attention.
pub fn discard(queue: &SyncQueue, id: i64, format: OutputFormat) -> Result<String, SyncError> {
    let item = load(queue, id)?;
    queue.discard(id)?;

    match format {
        OutputFormat::Json => to_json(&json!({ "discarded": id, "status": item.status })),
        OutputFormat::Pretty => Ok(format!(
            "{} Discarded {} item #{id}",
            "✓".green(),
            item.status
        )),
    }
}

/// Delete old synced items.
///
/// # Errors
///
/// Returns an error if the delete fails.
pub fn cleanup(
    queue: &SyncQueue,
    older_than_hours: i64,
    format: OutputFormat,
) -> Result<String, SyncError> {
    let removed = queue.cleanup(retention_window(older_than_hours)?)?;

    match format {
        OutputFormat::Json => to_json(&json!({ "removed": removed })),
        OutputFormat::Pretty => Ok(format!(
            "Removed {removed} synced item(s) older than {older_than_hours}h"
        )),
    }
}

/// Return interrupted items to pending.
///
/// # Errors
///
/// Returns an error if the update fails.
pub fn recover(queue: &SyncQueue, format: OutputFormat) -> Result<String, SyncError> {
    let recovered = queue.recover_in_flight()?;

    match format {
        OutputFormat::Json => to_json(&json!({ "recovered": recovered })),
        OutputFormat::Pretty => Ok(format!("Returned {recovered} item(s) to pending")),
    }
}
