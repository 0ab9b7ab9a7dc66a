//! Domain-level error types for conversation-archiver.
//!
//! All errors are typed with `thiserror` and carry enough context to decide
//! whether an extraction attempt may be retried.

use thiserror::Error;

use crate::domain::models::BatchFailure;

/// Phrases that identify a broken coordinator-to-page channel.
const CONNECTION_PHRASES: &[&str] = &[
    "receiving end does not exist",
    "message port closed",
    "could not establish connection",
];

/// Free-text failure classes that another attempt can plausibly fix.
const RETRYABLE_PHRASES: &[&str] = &[
    "no conversation messages found",
    "timed out waiting",
    "execution context was destroyed",
    "frame was detached",
    "page was closed",
    "cannot access contents",
    "navigation",
    "network",
    "timeout",
];

/// Free-text failure classes that retrying can never fix.
const NON_RETRYABLE_PHRASES: &[&str] = &[
    "invalid conversation url",
    "not a conversation route",
    "no eligible page",
];

/// Application-level errors across extraction, encoding and delivery.
#[derive(Error, Debug)]
pub enum ArchiveError {
    /// A conversation URL did not contain a parseable conversation id.
    #[error("Invalid conversation URL: {url}")]
    InvalidConversationUrl { url: String },

    /// The page being extracted is not on a conversation route.
    #[error("Not a conversation route: {url}")]
    NotConversationRoute { url: String },

    /// No open page on the required origin was found.
    #[error("No eligible page found for origin: {origin}")]
    NoEligiblePage { origin: String },

    /// The page never reached a usable state within the deadline.
    #[error("Timed out waiting for page to become ready (last state: {last_state}, url: {last_url})")]
    ReadinessTimeout { last_state: String, last_url: String },

    /// The messaging channel to the page agent is gone.
    #[error("Page connection lost: {message}")]
    Connection { message: String },

    /// The page rendered no extractable conversation turns.
    #[error(
        "No conversation messages found on the page \
         (url: {url}, title: {}, readyState: {ready_state}, turns: {turn_count})",
        non_empty(.title, "unknown")
    )]
    NoMessagesFound {
        url: String,
        title: String,
        ready_state: String,
        turn_count: usize,
    },

    /// A request to the page agent did not answer in time.
    #[error("Page request timed out after {waited_ms}ms")]
    RequestTimeout { waited_ms: u64 },

    /// The page agent answered with a different reply than the request asks for.
    #[error("Unexpected reply from page agent (expected {expected})")]
    UnexpectedReply { expected: &'static str },

    /// The page agent reported a failure it could only describe as text.
    #[error("Page agent error: {message}")]
    PageScript { message: String },

    /// No captured snapshot matches the requested conversation.
    #[error("No page snapshot found for: {wanted}")]
    SnapshotMissing { wanted: String },

    /// Batch export invoked with nothing to export.
    #[error("No conversations selected for batch export")]
    EmptyBatch,

    /// Every item of a batch export failed. Carries the per-item failures so
    /// callers can show what went wrong where.
    #[error("{}", all_failed_message(.total, .failures))]
    BatchFailed {
        total: usize,
        failures: Vec<BatchFailure>,
    },

    /// All extraction attempts for one conversation were spent.
    #[error("Extraction failed for conversation {conversation_id} after {attempts} attempt(s)")]
    RetriesExhausted {
        conversation_id: String,
        attempts: u32,
        #[source]
        source: Box<ArchiveError>,
    },

    /// Configuration or environment error.
    #[error("Configuration error: {message}")]
    Config { message: String },

    /// JSON parsing failed.
    #[error("JSON parse error: {message}")]
    JsonParse {
        message: String,
        #[source]
        source: Option<serde_json::Error>,
    },

    /// IO operation failed.
    #[error("IO error: {message}")]
    Io {
        message: String,
        #[source]
        source: Option<std::io::Error>,
    },

    /// Writing an export file to its destination failed.
    #[error("Failed to deliver {name}")]
    Delivery {
        name: String,
        #[source]
        source: std::io::Error,
    },
}

impl ArchiveError {
    /// Create a configuration error.
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Create a JSON parse error.
    pub fn json_parse(err: serde_json::Error) -> Self {
        Self::JsonParse {
            message: err.to_string(),
            source: Some(err),
        }
    }

    /// Create an IO error with context.
    pub fn io(message: impl Into<String>, err: std::io::Error) -> Self {
        Self::Io {
            message: message.into(),
            source: Some(err),
        }
    }

    /// Whether this failure indicates a dead messaging channel, which the
    /// orchestrator answers with agent re-injection rather than plain retry.
    #[must_use]
    pub fn is_connection(&self) -> bool {
        match self {
            Self::Connection { .. } => true,
            Self::PageScript { message } => contains_any(message, CONNECTION_PHRASES),
            _ => false,
        }
    }

    /// Whether another extraction attempt can plausibly succeed.
    ///
    /// Structured variants carry their own classification. Free-text page
    /// failures are scanned against the known phrase classes; text matching
    /// none of them is treated as fatal, so unrecognized conditions abort
    /// instead of spending the remaining attempts.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::ReadinessTimeout { .. }
            | Self::Connection { .. }
            | Self::NoMessagesFound { .. }
            | Self::RequestTimeout { .. } => true,
            Self::PageScript { message } => classify_message(message),
            _ => false,
        }
    }
}

fn contains_any(message: &str, phrases: &[&str]) -> bool {
    let lower = message.to_lowercase();
    phrases.iter().any(|p| lower.contains(p))
}

fn classify_message(message: &str) -> bool {
    if contains_any(message, CONNECTION_PHRASES) {
        return true;
    }
    if contains_any(message, NON_RETRYABLE_PHRASES) {
        return false;
    }
    contains_any(message, RETRYABLE_PHRASES)
}

/// How many failures the all-failed message details before truncating.
const FAILURE_DETAIL_CAP: usize = 10;

fn all_failed_message(total: &usize, failures: &[BatchFailure]) -> String {
    let mut lines = vec![format!("All {total} exports failed.")];

    if !failures.is_empty() {
        lines.push(String::new());
        lines.push("Failure details:".to_string());
        for failure in failures.iter().take(FAILURE_DETAIL_CAP) {
            let label = non_empty(&failure.title, &failure.id);
            lines.push(format!("- {label}: {}", failure.error));
        }
        if failures.len() > FAILURE_DETAIL_CAP {
            lines.push(format!(
                "- ... and {} more",
                failures.len() - FAILURE_DETAIL_CAP
            ));
        }
    }

    lines.join("\n")
}

fn non_empty<'a>(value: &'a str, fallback: &'a str) -> &'a str {
    if value.is_empty() {
        fallback
    } else {
        value
    }
}

/// Result type alias using `ArchiveError`.
pub type Result<T> = std::result::Result<T, ArchiveError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn readiness_timeout_is_retryable() {
        let err = ArchiveError::ReadinessTimeout {
            last_state: "loading".to_string(),
            last_url: "https://chatgpt.com/c/abc".to_string(),
        };
        assert!(err.is_retryable());
        assert!(!err.is_connection());
    }

    #[test]
    fn invalid_url_is_fatal() {
        let err = ArchiveError::InvalidConversationUrl {
            url: "https://chatgpt.com/settings".to_string(),
        };
        assert!(!err.is_retryable());
    }

    #[test]
    fn connection_phrases_detected_in_free_text() {
        let err = ArchiveError::PageScript {
            message: "Could not establish connection. Receiving end does not exist.".to_string(),
        };
        assert!(err.is_connection());
        assert!(err.is_retryable());
    }

    #[test]
    fn navigation_text_is_retryable() {
        let err = ArchiveError::PageScript {
            message: "Frame was detached during navigation".to_string(),
        };
        assert!(err.is_retryable());
    }

    #[test]
    fn fatal_phrase_wins_over_default() {
        let err = ArchiveError::PageScript {
            message: "Invalid conversation URL: about:blank".to_string(),
        };
        assert!(!err.is_retryable());
    }

    #[test]
    fn unknown_free_text_is_fatal() {
        let err = ArchiveError::PageScript {
            message: "quota exceeded while rendering".to_string(),
        };
        assert!(!err.is_retryable());
    }

    #[test]
    fn exhausted_retries_are_terminal() {
        let err = ArchiveError::RetriesExhausted {
            conversation_id: "abc-123".to_string(),
            attempts: 3,
            source: Box::new(ArchiveError::ReadinessTimeout {
                last_state: "loading".to_string(),
                last_url: String::new(),
            }),
        };
        assert!(!err.is_retryable());
        assert!(err.to_string().contains("3 attempt(s)"));
    }

    #[test]
    fn all_failed_error_details_a_capped_failure_list() {
        let failures: Vec<BatchFailure> = (0..12)
            .map(|n| BatchFailure {
                id: format!("id-{n}"),
                title: format!("Chat {n}"),
                error: "boom".to_string(),
            })
            .collect();
        let err = ArchiveError::BatchFailed { total: 12, failures };

        let message = err.to_string();
        assert!(message.starts_with("All 12 exports failed."));
        assert!(message.contains("Failure details:"));
        assert!(message.contains("- Chat 0: boom"));
        assert!(message.contains("- Chat 9: boom"));
        assert!(!message.contains("- Chat 10: boom"));
        assert!(message.contains("- ... and 2 more"));
        assert!(!err.is_retryable());
    }
}
