//! Application configuration model.
//!
//! Every timing constant and page selector the exporter relies on lives
//! here, so behavior against a changed page layout can be adjusted without
//! rebuilding. Values deserialize from TOML with per-field defaults.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Where conversations are read from.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PageConfig {
    /// Origin the exporter works against. Pages on other origins are ignored.
    #[serde(default = "default_origin")]
    pub origin: String,

    /// Suffix the site appends to document titles, stripped during export.
    #[serde(default = "default_title_suffix")]
    pub title_suffix: String,

    /// Upper bound on waiting for a single page request to answer.
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,
}

impl Default for PageConfig {
    fn default() -> Self {
        Self {
            origin: default_origin(),
            title_suffix: default_title_suffix(),
            request_timeout_ms: default_request_timeout_ms(),
        }
    }
}

impl PageConfig {
    #[must_use]
    pub const fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}

fn default_origin() -> String {
    "https://chatgpt.com/".to_string()
}

fn default_title_suffix() -> String {
    "ChatGPT".to_string()
}

const fn default_request_timeout_ms() -> u64 {
    30_000
}

/// Where exports are written and how archives are named.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExportConfig {
    /// Folder prefix for export filenames and archive entries.
    #[serde(default = "default_folder")]
    pub folder: String,

    /// Output directory for exported files (defaults to `<data>/exports`).
    #[serde(default)]
    pub output_dir: Option<PathBuf>,

    /// Directory of captured page snapshots (defaults to `<data>/snapshots`).
    #[serde(default)]
    pub snapshot_dir: Option<PathBuf>,
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            folder: default_folder(),
            output_dir: None,
            snapshot_dir: None,
        }
    }
}

fn default_folder() -> String {
    "ChatGPT".to_string()
}

/// Retry behavior for failed extraction attempts.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Attempts per conversation before giving up.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Base delay before the second attempt, doubled each attempt after.
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,

    /// Ceiling on the computed backoff delay.
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,

    /// Random extra delay added to each backoff, 0 disables jitter.
    #[serde(default = "default_jitter_ms")]
    pub jitter_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            base_delay_ms: default_base_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
            jitter_ms: default_jitter_ms(),
        }
    }
}

const fn default_max_attempts() -> u32 {
    3
}

const fn default_base_delay_ms() -> u64 {
    800
}

const fn default_max_delay_ms() -> u64 {
    3500
}

const fn default_jitter_ms() -> u64 {
    250
}

/// Page readiness polling.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReadinessConfig {
    /// Interval between readiness polls.
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    /// Readiness deadline for a freshly opened page.
    #[serde(default = "default_initial_timeout_ms")]
    pub initial_timeout_ms: u64,

    /// Readiness deadline when recovering a lost agent connection.
    #[serde(default = "default_recovery_timeout_ms")]
    pub recovery_timeout_ms: u64,
}

impl Default for ReadinessConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: default_poll_interval_ms(),
            initial_timeout_ms: default_initial_timeout_ms(),
            recovery_timeout_ms: default_recovery_timeout_ms(),
        }
    }
}

impl ReadinessConfig {
    #[must_use]
    pub const fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    #[must_use]
    pub const fn initial_timeout(&self) -> Duration {
        Duration::from_millis(self.initial_timeout_ms)
    }

    #[must_use]
    pub const fn recovery_timeout(&self) -> Duration {
        Duration::from_millis(self.recovery_timeout_ms)
    }
}

const fn default_poll_interval_ms() -> u64 {
    500
}

const fn default_initial_timeout_ms() -> u64 {
    12_000
}

const fn default_recovery_timeout_ms() -> u64 {
    8_000
}

/// In-page extraction loops.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    /// Interval between checks for a rendered conversation.
    #[serde(default = "default_conversation_poll_ms")]
    pub conversation_poll_ms: u64,

    /// How long to wait for conversation turns to render.
    #[serde(default = "default_conversation_timeout_ms")]
    pub conversation_timeout_ms: u64,

    /// Maximum scroll-and-collect rounds over the history sidebar.
    #[serde(default = "default_history_max_rounds")]
    pub history_max_rounds: u32,

    /// Consecutive rounds without new items before stopping.
    #[serde(default = "default_history_idle_rounds")]
    pub history_idle_rounds: u32,

    /// Pause between history rounds, letting lazy content load.
    #[serde(default = "default_history_round_wait_ms")]
    pub history_round_wait_ms: u64,

    /// Total time budget for history collection.
    #[serde(default = "default_history_budget_ms")]
    pub history_budget_ms: u64,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            conversation_poll_ms: default_conversation_poll_ms(),
            conversation_timeout_ms: default_conversation_timeout_ms(),
            history_max_rounds: default_history_max_rounds(),
            history_idle_rounds: default_history_idle_rounds(),
            history_round_wait_ms: default_history_round_wait_ms(),
            history_budget_ms: default_history_budget_ms(),
        }
    }
}

impl AgentConfig {
    #[must_use]
    pub const fn conversation_poll(&self) -> Duration {
        Duration::from_millis(self.conversation_poll_ms)
    }

    #[must_use]
    pub const fn conversation_timeout(&self) -> Duration {
        Duration::from_millis(self.conversation_timeout_ms)
    }

    #[must_use]
    pub const fn history_round_wait(&self) -> Duration {
        Duration::from_millis(self.history_round_wait_ms)
    }

    #[must_use]
    pub const fn history_budget(&self) -> Duration {
        Duration::from_millis(self.history_budget_ms)
    }
}

const fn default_conversation_poll_ms() -> u64 {
    300
}

const fn default_conversation_timeout_ms() -> u64 {
    20_000
}

const fn default_history_max_rounds() -> u32 {
    18
}

const fn default_history_idle_rounds() -> u32 {
    3
}

const fn default_history_round_wait_ms() -> u64 {
    350
}

const fn default_history_budget_ms() -> u64 {
    15_000
}

/// Page structure lookup. Each entry is an ordered fallback list; the first
/// selector that matches anything wins.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SelectorConfig {
    /// History sidebar containers, most specific first.
    #[serde(default = "default_history_containers")]
    pub history_containers: Vec<String>,

    /// Conversation links inside the history sidebar.
    #[serde(default = "default_history_anchors")]
    pub history_anchors: Vec<String>,

    /// Top-level conversation turn articles.
    #[serde(default = "default_turn_articles")]
    pub turn_articles: Vec<String>,

    /// Nodes carrying the message author role.
    #[serde(default = "default_role_nodes")]
    pub role_nodes: Vec<String>,

    /// Rendered markdown body inside a turn.
    #[serde(default = "default_assistant_markdown")]
    pub assistant_markdown: Vec<String>,
}

impl Default for SelectorConfig {
    fn default() -> Self {
        Self {
            history_containers: default_history_containers(),
            history_anchors: default_history_anchors(),
            turn_articles: default_turn_articles(),
            role_nodes: default_role_nodes(),
            assistant_markdown: default_assistant_markdown(),
        }
    }
}

fn default_history_containers() -> Vec<String> {
    vec![
        r#"nav[aria-label="Chat history"] #history"#.to_string(),
        "#history".to_string(),
        r#"nav[aria-label="Chat history"]"#.to_string(),
    ]
}

fn default_history_anchors() -> Vec<String> {
    vec![
        r#"a[href^="/c/"]"#.to_string(),
        r#"a[href*="/c/"]"#.to_string(),
    ]
}

fn default_turn_articles() -> Vec<String> {
    vec![r#"article[data-testid^="conversation-turn-"]"#.to_string()]
}

fn default_role_nodes() -> Vec<String> {
    vec!["[data-message-author-role]".to_string()]
}

fn default_assistant_markdown() -> Vec<String> {
    vec![
        ".markdown.prose".to_string(),
        ".markdown".to_string(),
        "[class*='markdown']".to_string(),
    ]
}

/// Path configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct PathConfig {
    /// Base data directory.
    #[serde(default)]
    pub data_dir: Option<PathBuf>,
}

/// Complete application configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct AppConfig {
    /// Page access configuration.
    #[serde(default)]
    pub page: PageConfig,

    /// Export destination configuration.
    #[serde(default)]
    pub export: ExportConfig,

    /// Retry configuration.
    #[serde(default)]
    pub retry: RetryConfig,

    /// Page readiness configuration.
    #[serde(default)]
    pub readiness: ReadinessConfig,

    /// In-page extraction configuration.
    #[serde(default)]
    pub agent: AgentConfig,

    /// Page structure selectors.
    #[serde(default)]
    pub selectors: SelectorConfig,

    /// Path configuration.
    #[serde(default)]
    pub paths: PathConfig,
}

impl AppConfig {
    /// Get the data directory, using default if not configured.
    #[must_use]
    pub fn data_dir(&self) -> PathBuf {
        self.paths
            .data_dir
            .clone()
            .unwrap_or_else(Self::default_data_dir)
    }

    /// Get the default data directory path.
    #[must_use]
    pub fn default_data_dir() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".conversation-archiver")
    }

    /// Get the config file path.
    #[must_use]
    pub fn config_file_path(&self) -> PathBuf {
        self.data_dir().join("config.toml")
    }

    /// Directory exported files are delivered to.
    #[must_use]
    pub fn exports_dir(&self) -> PathBuf {
        self.export
            .output_dir
            .clone()
            .unwrap_or_else(|| self.data_dir().join("exports"))
    }

    /// Directory page snapshots are read from.
    #[must_use]
    pub fn snapshots_dir(&self) -> PathBuf {
        self.export
            .snapshot_dir
            .clone()
            .unwrap_or_else(|| self.data_dir().join("snapshots"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_carries_page_constants() {
        let config = AppConfig::default();
        assert_eq!(config.page.origin, "https://chatgpt.com/");
        assert_eq!(config.page.title_suffix, "ChatGPT");
        assert_eq!(config.retry.max_attempts, 3);
        assert_eq!(config.retry.base_delay_ms, 800);
        assert_eq!(config.readiness.initial_timeout_ms, 12_000);
        assert_eq!(config.agent.history_max_rounds, 18);
        assert_eq!(config.selectors.turn_articles.len(), 1);
    }

    #[test]
    fn partial_toml_fills_remaining_fields_with_defaults() {
        let config: AppConfig = toml::from_str(
            r#"
            [retry]
            max_attempts = 5

            [export]
            folder = "Chats"
            "#,
        )
        .unwrap();

        assert_eq!(config.retry.max_attempts, 5);
        assert_eq!(config.retry.base_delay_ms, 800);
        assert_eq!(config.export.folder, "Chats");
        assert_eq!(config.page.origin, "https://chatgpt.com/");
    }

    #[test]
    fn duration_helpers_convert_milliseconds() {
        let config = AppConfig::default();
        assert_eq!(config.readiness.poll_interval(), Duration::from_millis(500));
        assert_eq!(config.agent.conversation_timeout(), Duration::from_secs(20));
    }
}
