//! Cache command implementations.

use colored::Colorize;
use serde_json::json;

use crate::cache::CacheStore;
use crate::cli::args::{CacheCommands, OutputFormat};
use crate::error::SyncError;
use crate::output::{format_cache_entries, format_cache_entry, to_json};

/// Execute cache subcommands.
///
/// # Errors
///
/// Returns an error if the entry is missing, the data is not valid JSON, or
/// storage fails.
pub fn cache(
    store: &CacheStore,
    cmd: CacheCommands,
    format: OutputFormat,
) -> Result<String, SyncError> {
    match cmd {
        CacheCommands::Get { entity_type, key } => {
            let entry = store
                .get(&entity_type, &key)?
                .ok_or_else(|| SyncError::NotFound(format!("Cache entry {entity_type}/{key}")))?;
            format_cache_entry(&entry, format)
        },
        CacheCommands::Put {
            entity_type,
            key,
            data,
        } => {
            let data = serde_json::from_str(&data)
                .map_err(|e| SyncError::Parse(format!("Invalid data JSON: {e}")))?;
            let entry = store.put(&entity_type, &key, &data)?;
            match format {
                OutputFormat::Json => to_json(&entry),
                OutputFormat::Pretty => Ok(format!(
                    "{} Cached {}/{}",
                    "✓".green(),
                    entity_type.bold(),
                    key.cyan()
                )),
            }
        },
        CacheCommands::List { entity_type } => {
            format_cache_entries(&store.list(&entity_type)?, &entity_type, format)
        },
        CacheCommands::Remove { entity_type, key } => {
            if !store.remove(&entity_type, &key)? {
                return Err(SyncError::NotFound(format!(
                    "Cache entry {entity_type}/{key}"
                )));
            }
            match format {
                OutputFormat::Json => to_json(&json!({ "removed": format!("{entity_type}/{key}") })),
                OutputFormat::Pretty => Ok(format!("Removed {entity_type}/{key}")),
            }
        },
    }
}
