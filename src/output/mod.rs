//! Output formatting for tillsync.
//!
//! This module renders queue items, statistics and cache entries either as
//! colored text for a terminal or as JSON for scripts.

mod json;
mod pretty;

use clap::ValueEnum;
use serde::{Deserialize, Serialize};

use crate::cache::CacheEntry;
use crate::error::SyncError;
use crate::sync::{QueueItem, QueueStats, QueueStatus};

pub use json::*;
pub use pretty::*;

/// Output format for command results.
#[derive(ValueEnum, Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// Human-readable colored output.
    #[default]
    Pretty,
    /// Machine-readable JSON output.
    Json,
}

/// Format queue items based on output format
///
/// # Errors
///
/// Returns `SyncError::Parse` if JSON serialization fails.
pub fn format_items(
    items: &[QueueItem],
    status: QueueStatus,
    format: OutputFormat,
) -> Result<String, SyncError> {
    match format {
        OutputFormat::Pretty => Ok(format_items_pretty(items, status)),
        OutputFormat::Json => format_items_json(items, status),
    }
}

/// Format a single queue item based on output format
///
/// # Errors
///
/// Returns `SyncError::Parse` if JSON serialization fails.
pub fn format_item(item: &QueueItem, format: OutputFormat) -> Result<String, SyncError> {
    match format {
        OutputFormat::Pretty => Ok(format_item_pretty(item)),
        OutputFormat::Json => to_json(item),
    }
}

/// Format queue statistics based on output format
///
/// # Errors
///
/// Returns `SyncError::Parse` if JSON serialization fails.
pub fn format_stats(stats: &QueueStats, format: OutputFormat) -> Result<String, SyncError> {
    match format {
        OutputFormat::Pretty => Ok(format_stats_pretty(stats, chrono::Utc::now())),
        OutputFormat::Json => format_stats_json(stats),
    }
}

/// Format cache entries based on output format
///
/// # Errors
///
/// Returns `SyncError::Parse` if JSON serialization fails.
pub fn format_cache_entries(
    entries: &[CacheEntry],
    entity_type: &str,
    format: OutputFormat,
) -> Result<String, SyncError> {
    match format {
        OutputFormat::Pretty => Ok(format_cache_entries_pretty(entries, entity_type)),
        OutputFormat::Json => format_cache_entries_json(entries, entity_type),
    }
}

/// Format a single cache entry based on output format
///
/// # Errors
///
/// Returns `SyncError::Parse` if JSON serialization fails.
pub fn format_cache_entry(entry: &CacheEntry, format: OutputFormat) -> Result<String, SyncError> {
    match format {
        OutputFormat::Pretty => Ok(format_cache_entry_pretty(entry)),
        OutputFormat::Json => to_json(entry),
    }
}
