use chrono::{DateTime, Utc};
use colored::{ColoredString, Colorize};

use crate::cache::CacheEntry;
use crate::sync::{QueueItem, QueueStats, QueueStatus};

fn status_icon(status: QueueStatus) -> ColoredString {
    match status {
        QueueStatus::Pending => "[ ]".white(),
        QueueStatus::Syncing => "[~]".cyan(),
        QueueStatus::Synced => "[x]".green(),
        QueueStatus::Failed => "[!]".red(),
        QueueStatus::Conflict => "[?]".yellow(),
    }
}

fn age(since: DateTime<Utc>, now: DateTime<Utc>) -> String {
    let age = now.signed_duration_since(since);
    if age.num_days() > 0 {
        format!("{} days ago", age.num_days())
    } else if age.num_hours() > 0 {
        format!("{} hours ago", age.num_hours())
    } else if age.num_minutes() > 0 {
        format!("{} minutes ago", age.num_minutes())
    } else {
        "just now".to_string()
    }
}

/// Format queue items as a table
pub fn format_items_pretty(items: &[QueueItem], status: QueueStatus) -> String {
    let title = format!("{} items", status.as_str().to_uppercase());
    if items.is_empty() {
        return format!("{title} (0)\n  No items");
    }

    let mut output = format!("{} ({})\n", title.bold(), items.len());
    output.push_str(&format!(
        "{:<4} {:<6} {:<16} {:>4} {:>9} {}\n",
        "", "ID", "Entity", "Prio", "Attempts", "Created"
    ));
    output.push_str(&"─".repeat(60));
    output.push('\n');

    for item in items {
        let id = item.id.map(|i| i.to_string()).unwrap_or_default();
        let attempts = format!("{}/{}", item.attempt_count, item.max_retries);
        output.push_str(&format!(
            "{:<4} {:<6} {:<16} {:>4} {:>9} {}\n",
            status_icon(item.status),
            id,
            item.entity_type,
            item.priority,
            attempts,
            item.created_at.format("%Y-%m-%d %H:%M").to_string().dimmed()
        ));

        if let Some(error) = &item.last_error {
            output.push_str(&format!("       {}\n", error.red()));
        }
    }

    output
}

/// Format a single queue item with all its fields
pub fn format_item_pretty(item: &QueueItem) -> String {
    let id = item.id.map(|i| i.to_string()).unwrap_or_default();
    let mut output = format!(
        "{} {} {}\n",
        status_icon(item.status),
        item.entity_type.bold(),
        format!("#{id}").dimmed()
    );

    output.push_str(&format!("  {}: {}\n", "Status".dimmed(), item.status));
    output.push_str(&format!("  {}: {}\n", "Priority".dimmed(), item.priority));
    output.push_str(&format!(
        "  {}: {} of {}\n",
        "Attempts".dimmed(),
        item.attempt_count,
        item.max_retries
    ));
    output.push_str(&format!(
        "  {}: {}\n",
        "Created".dimmed(),
        item.created_at.to_rfc3339()
    ));
    output.push_str(&format!(
        "  {}: {}\n",
        "Updated".dimmed(),
        item.updated_at.to_rfc3339()
    ));

    if let Some(next) = item.next_attempt_at {
        output.push_str(&format!("  {}: {}\n", "Next attempt".dimmed(), next.to_rfc3339()));
    }

    if let Some(error) = &item.last_error {
        output.push_str(&format!("  {}: {}\n", "Last error".dimmed(), error.red()));
    }

    let payload =
        serde_json::to_string_pretty(&item.payload).unwrap_or_else(|_| item.payload.to_string());
    output.push_str(&format!("  {}:\n", "Payload".dimmed()));
    for line in payload.lines() {
        output.push_str(&format!("    {line}\n"));
    }

    if item.status.needs_attention() {
        output.push('\n');
        output.push_str(
            &format!("Resolve with 'tillsync requeue {id}' or 'tillsync discard {id}'")
                .dimmed()
                .to_string(),
        );
        output.push('\n');
    }

    output
}

/// Format queue statistics
pub fn format_stats_pretty(stats: &QueueStats, now: DateTime<Utc>) -> String {
    let mut lines = Vec::new();

    lines.push("Sync Queue Status".bold().to_string());
    lines.push("─".repeat(40));

    lines.push(format!(
        "  Pending:    {} {}",
        stats.pending,
        if stats.pending > 0 {
            "waiting to sync".dimmed()
        } else {
            "".dimmed()
        }
    ));
    lines.push(format!("  Syncing:    {}", stats.syncing));
    lines.push(format!("  Synced:     {}", stats.synced));
    lines.push(format!(
        "  Failed:     {} {}",
        stats.failed,
        if stats.failed > 0 {
            "need attention".red()
        } else {
            "".normal()
        }
    ));
    lines.push(format!(
        "  Conflict:   {} {}",
        stats.conflict,
        if stats.conflict > 0 {
            "need a decision".yellow()
        } else {
            "".normal()
        }
    ));

    if let Some(oldest) = stats.oldest_pending {
        lines.push(format!("  Oldest:     {}", age(oldest, now).dimmed()));
    }

    if stats.needs_attention() > 0 {
        lines.push(String::new());
        lines.push(
            "Run 'tillsync list --status failed' or '--status conflict' to review"
                .dimmed()
                .to_string(),
        );
    }

    lines.join("\n")
}

/// Format cache entries as a list
pub fn format_cache_entries_pretty(entries: &[CacheEntry], entity_type: &str) -> String {
    if entries.is_empty() {
        return format!("{entity_type} (0 entries)\n  No entries");
    }

    let mut output = format!("{} ({} entries)\n", entity_type.bold(), entries.len());
    output.push_str(&"─".repeat(60));
    output.push('\n');

    for entry in entries {
        output.push_str(&format!(
            "{}  {}\n",
            entry.key.cyan(),
            entry.updated_at.format("%Y-%m-%d %H:%M").to_string().dimmed()
        ));
    }

    output
}

/// Format a single cache entry
pub fn format_cache_entry_pretty(entry: &CacheEntry) -> String {
    let mut output = format!(
        "{}/{}  {}\n",
        entry.entity_type.bold(),
        entry.key.cyan(),
        entry.updated_at.to_rfc3339().dimmed()
    );
    let data =
        serde_json::to_string_pretty(&entry.data).unwrap_or_else(|_| entry.data.to_string());
    for line in data.lines() {
        output.push_str(&format!("  {line}\n"));
    }
    output
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn make_item(entity_type: &str, status: QueueStatus) -> QueueItem {
        let mut item = QueueItem::new(entity_type, json!({"total": 1250}));
        item.id = Some(7);
        item.status = status;
        item
    }

    #[test]
    fn test_format_items_pretty_empty() {
        let output = format_items_pretty(&[], QueueStatus::Failed);
        assert!(output.contains("FAILED items (0)"));
        assert!(output.contains("No items"));
    }

    #[test]
    fn test_format_items_pretty_rows() {
        let mut failed = make_item("sale", QueueStatus::Failed);
        failed.last_error = Some("validation: negative total".to_string());
        let output = format_items_pretty(&[failed], QueueStatus::Failed);

        assert!(output.contains("FAILED items"));
        assert!(output.contains("[!]"));
        assert!(output.contains("sale"));
        assert!(output.contains("0/3"));
        assert!(output.contains("negative total"));
    }

    #[test]
    fn test_format_item_pretty_shows_payload() {
        let output = format_item_pretty(&make_item("stock_movement", QueueStatus::Pending));

        assert!(output.contains("stock_movement"));
        assert!(output.contains("#7"));
        assert!(output.contains("\"total\": 1250"));
        assert!(!output.contains("requeue"));
    }

    #[test]
    fn test_format_item_pretty_conflict_hint() {
        let output = format_item_pretty(&make_item("sale", QueueStatus::Conflict));
        assert!(output.contains("[?]"));
        assert!(output.contains("tillsync requeue 7"));
        assert!(output.contains("tillsync discard 7"));
    }

    #[test]
    fn test_format_stats_pretty() {
        let now = Utc::now();
        let stats = QueueStats {
            pending: 4,
            conflict: 1,
            oldest_pending: Some(now - chrono::Duration::hours(3)),
            ..QueueStats::default()
        };
        let output = format_stats_pretty(&stats, now);

        assert!(output.contains("Sync Queue Status"));
        assert!(output.contains("Pending:    4"));
        assert!(output.contains("3 hours ago"));
        assert!(output.contains("--status conflict"));
    }

    #[test]
    fn test_format_stats_pretty_all_clear() {
        let output = format_stats_pretty(&QueueStats::default(), Utc::now());
        assert!(!output.contains("Oldest"));
        assert!(!output.contains("review"));
    }

    #[test]
    fn test_age_buckets() {
        let now = Utc::now();
        assert_eq!(age(now, now), "just now");
        assert_eq!(age(now - chrono::Duration::minutes(5), now), "5 minutes ago");
        assert_eq!(age(now - chrono::Duration::days(2), now), "2 days ago");
    }

    #[test]
    fn test_format_cache_entries_pretty() {
        let entry = CacheEntry {
            entity_type: "product".to_string(),
            key: "sku-1".to_string(),
            data: json!({"price": 250}),
            updated_at: Utc::now(),
        };
        let output = format_cache_entries_pretty(&[entry.clone()], "product");
        assert!(output.contains("(1 entries)"));
        assert!(output.contains("sku-1"));

        assert!(format_cache_entry_pretty(&entry).contains("\"price\": 250"));
        assert!(format_cache_entries_pretty(&[], "product").contains("No entries"));
    }
}
