//! Config command implementation.

use colored::Colorize;
use serde_json::json;

use crate::cli::args::OutputFormat;
use crate::config::{Config, Paths};
use crate::error::SyncError;
use crate::output::to_json;

/// Show the effective configuration and where it was read from.
///
/// # Errors
///
/// Returns an error if the configuration cannot be serialized.
pub fn show_config(paths: &Paths, config: &Config, format: OutputFormat) -> Result<String, SyncError> {
    match format {
        OutputFormat::Json => to_json(&json!({
            "paths": {
                "root": paths.root,
                "config_file": paths.config_file,
                "database": paths.database,
            },
            "config": config,
        })),
        OutputFormat::Pretty => {
            let yaml = serde_yaml::to_string(config)
                .map_err(|e| SyncError::Config(format!("Failed to serialize config: {e}")))?;

            let mut lines = vec![
                "Paths".bold().to_string(),
                format!("  {}: {}", "Root".dimmed(), paths.root.display()),
                format!(
                    "  {}: {}{}",
                    "Config".dimmed(),
                    paths.config_file.display(),
                    if paths.config_file.exists() {
                        "".normal()
                    } else {
                        " (not created, using defaults)".dimmed()
                    }
                ),
                format!("  {}: {}", "Database".dimmed(), paths.database.display()),
                String::new(),
                "Settings".bold().to_string(),
            ];
            lines.extend(yaml.lines().map(|l| format!("  {l}")));

            Ok(lines.join("\n"))
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_show_config_json() {
        let temp_dir = TempDir::new().unwrap();
        let paths = Paths::with_root(temp_dir.path().to_path_buf());

        let out = show_config(&paths, &Config::default(), OutputFormat::Json).unwrap();
        let parsed: serde_json::Value = serde_json::from_str(&out).unwrap();

        assert_eq!(parsed["config"]["sync"]["interval_secs"], 30);
        assert!(parsed["paths"]["database"]
            .as_str()
            .unwrap()
            .ends_with("tillsync.db"));
    }

    #[test]
    fn test_show_config_pretty_mentions_defaults() {
        let temp_dir = TempDir::new().unwrap();
        let paths = Paths::with_root(temp_dir.path().to_path_buf());

        let out = show_config(&paths, &Config::default(), OutputFormat::Pretty).unwrap();
        assert!(out.contains("using defaults"));
        assert!(out.contains("retention_hours: 168"));
    }
}
