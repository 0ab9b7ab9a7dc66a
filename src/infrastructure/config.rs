//! Configuration file management.
//!
//! Handles loading and saving TOML configuration files.

use std::fs;
use std::path::Path;

use crate::domain::{AppConfig, ArchiveError, Result};

/// Default configuration file content.
const DEFAULT_CONFIG: &str = r#"# Conversation Archiver Configuration
# Auto-generated - edit as needed

[page]
# Origin the archiver works against
origin = "https://chatgpt.com/"

# Title suffix stripped from captured page titles
title_suffix = "ChatGPT"

# How long to wait for a single page request in milliseconds
request_timeout_ms = 30000

[export]
# Folder prefix under which exported files are delivered
folder = "ChatGPT"

# Custom output directory (optional, defaults to ~/.conversation-archiver/exports)
# output_dir = "/custom/exports"

# Custom snapshot directory (optional, defaults to ~/.conversation-archiver/snapshots)
# snapshot_dir = "/custom/snapshots"

[retry]
# Extraction attempts per conversation (default: 3)
max_attempts = 3

# Base delay before a retry in milliseconds, doubled each attempt
base_delay_ms = 800

# Upper bound on the retry delay in milliseconds
max_delay_ms = 3500

# Random extra delay added to each retry in milliseconds
jitter_ms = 250

[readiness]
# Poll interval while waiting for a page in milliseconds
poll_interval_ms = 500

# How long to wait for a page before the first request in milliseconds
initial_timeout_ms = 12000

# How long to wait for a page after re-injecting the agent in milliseconds
recovery_timeout_ms = 8000

[agent]
# Poll interval while waiting for conversation content in milliseconds
conversation_poll_ms = 300

# How long to wait for conversation content in milliseconds
conversation_timeout_ms = 20000

# Maximum number of history scroll rounds
history_max_rounds = 18

# Idle rounds without new history entries before scrolling stops
history_idle_rounds = 3

# Delay between history scroll rounds in milliseconds
history_round_wait_ms = 350

# Overall time budget for history scrolling in milliseconds
history_budget_ms = 15000

# [selectors] overrides the page query lists; defaults track the
# current page layout

[paths]
# Custom data directory (optional, defaults to ~/.conversation-archiver)
# data_dir = "/custom/path"
"#;

/// Load configuration from file or create default.
///
/// # Errors
/// Returns error if file exists but cannot be read or parsed.
pub fn load_config() -> Result<AppConfig> {
    let config_path = config_file_path();

    if config_path.exists() {
        load_config_from_file(&config_path)
    } else {
        Ok(AppConfig::default())
    }
}

/// Load configuration from a specific file.
///
/// # Errors
/// Returns error if file cannot be read or parsed.
pub fn load_config_from_file(path: &Path) -> Result<AppConfig> {
    let content = fs::read_to_string(path).map_err(|e| {
        ArchiveError::io(format!("Failed to read config file: {}", path.display()), e)
    })?;

    toml::from_str(&content).map_err(|e| ArchiveError::Config {
        message: format!("Failed to parse config file: {e}"),
    })
}

/// Save configuration to file.
///
/// # Errors
/// Returns error if file cannot be written.
pub fn save_config(config: &AppConfig) -> Result<()> {
    let config_path = config.config_file_path();

    // Ensure parent directory exists
    if let Some(parent) = config_path.parent() {
        fs::create_dir_all(parent)
            .map_err(|e| ArchiveError::io("Failed to create config directory", e))?;
    }

    let content = toml::to_string_pretty(config).map_err(|e| ArchiveError::Config {
        message: format!("Failed to serialize config: {e}"),
    })?;

    fs::write(&config_path, content).map_err(|e| {
        ArchiveError::io(
            format!("Failed to write config file: {}", config_path.display()),
            e,
        )
    })?;

    tracing::info!(path = %config_path.display(), "Configuration saved");

    Ok(())
}

/// Create default configuration file if it doesn't exist.
///
/// # Errors
/// Returns error if file cannot be created.
pub fn ensure_config_exists() -> Result<()> {
    let config_path = config_file_path();

    if !config_path.exists() {
        // Ensure parent directory exists
        if let Some(parent) = config_path.parent() {
            fs::create_dir_all(parent)
                .map_err(|e| ArchiveError::io("Failed to create config directory", e))?;
        }

        fs::write(&config_path, DEFAULT_CONFIG)
            .map_err(|e| ArchiveError::io("Failed to create default config", e))?;

        tracing::info!(path = %config_path.display(), "Created default configuration");
    }

    Ok(())
}

/// Get the path to the configuration file.
#[must_use]
pub fn config_file_path() -> std::path::PathBuf {
    AppConfig::default_data_dir().join("config.toml")
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_default_config_parses() {
        let config: AppConfig = toml::from_str(DEFAULT_CONFIG).unwrap();
        let defaults = AppConfig::default();

        assert_eq!(config.page.origin, defaults.page.origin);
        assert_eq!(config.retry.max_attempts, defaults.retry.max_attempts);
        assert_eq!(
            config.agent.history_max_rounds,
            defaults.agent.history_max_rounds
        );
        assert_eq!(
            config.selectors.turn_articles,
            defaults.selectors.turn_articles
        );
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempdir().unwrap();
        let config_path = dir.path().join("config.toml");

        let config = AppConfig::default();

        // Save
        let content = toml::to_string_pretty(&config).unwrap();
        fs::write(&config_path, content).unwrap();

        // Load
        let loaded = load_config_from_file(&config_path).unwrap();

        assert_eq!(loaded.retry.base_delay_ms, config.retry.base_delay_ms);
        assert_eq!(
            loaded.readiness.poll_interval_ms,
            config.readiness.poll_interval_ms
        );
        assert_eq!(loaded.export.folder, config.export.folder);
    }

    #[test]
    fn test_unreadable_file_reports_path() {
        let dir = tempdir().unwrap();
        let missing = dir.path().join("nope.toml");

        let err = load_config_from_file(&missing).unwrap_err();
        assert!(err.to_string().contains("IO error"));
    }
}
