//! Storage layer for tillsync.
//!
//! This module provides SQLite-based persistence for:
//! - The sync queue (pending write operations)
//! - The reference-data cache

mod database;
mod migrations;

pub use database::Database;

use chrono::{DateTime, SecondsFormat, Utc};

/// Format a timestamp for storage.
///
/// Fixed width, so lexical order in SQL matches chronological order.
#[must_use]
pub fn format_timestamp(t: DateTime<Utc>) -> String {
    t.to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// Parse a stored timestamp.
pub fn parse_timestamp(s: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .map(|t| t.with_timezone(&Utc))
        .ok()
}
