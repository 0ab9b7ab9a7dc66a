//! Domain models for extracted conversation data.
//!
//! These are the shapes that cross the coordinator/page boundary, so the
//! serde representation matches the capture-side JSON (camelCase keys,
//! lowercase role strings).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Author of a conversation turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Role {
    /// Message written by the person.
    User,
    /// Message produced by the assistant.
    Assistant,
    /// Any other or missing author attribute.
    Unknown,
}

impl From<Role> for String {
    fn from(role: Role) -> Self {
        match role {
            Role::User => "user".to_string(),
            Role::Assistant => "assistant".to_string(),
            Role::Unknown => "unknown".to_string(),
        }
    }
}

impl TryFrom<String> for Role {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Ok(Self::from_attr(&value))
    }
}

impl Role {
    /// Parse the page's author attribute; anything unrecognized is `Unknown`.
    #[must_use]
    pub fn from_attr(value: &str) -> Self {
        match value.to_lowercase().as_str() {
            "user" => Self::User,
            "assistant" => Self::Assistant,
            _ => Self::Unknown,
        }
    }

    /// Section heading used in exported documents.
    #[must_use]
    pub const fn heading(self) -> &'static str {
        match self {
            Self::Assistant => "Assistant",
            Self::User | Self::Unknown => "User",
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::User => write!(f, "User"),
            Self::Assistant => write!(f, "Assistant"),
            Self::Unknown => write!(f, "Unknown"),
        }
    }
}

/// An image attached to a turn.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attachment {
    /// Resolved image URL.
    pub src: String,
    /// Alternative text, empty when the page provides none.
    #[serde(default)]
    pub alt: String,
}

/// One message of a conversation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Turn {
    pub role: Role,
    /// Visible text content.
    #[serde(default)]
    pub text: String,
    /// Markdown rendition when structured content was found, otherwise empty.
    #[serde(default)]
    pub markdown: String,
    #[serde(default)]
    pub attachments: Vec<Attachment>,
}

impl Turn {
    /// Body used in exported documents: markdown when present, text otherwise.
    #[must_use]
    pub fn content(&self) -> &str {
        if self.markdown.is_empty() {
            &self.text
        } else {
            &self.markdown
        }
    }

    /// Whether the turn carries anything worth exporting.
    #[must_use]
    pub fn has_content(&self) -> bool {
        !self.text.is_empty() || !self.attachments.is_empty()
    }
}

/// A fully extracted conversation.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversationRecord {
    /// Conversation id taken from the page URL.
    pub id: String,
    /// Page title with the site suffix stripped.
    pub title: String,
    /// URL the conversation was extracted from.
    pub source_url: String,
    /// When the extraction happened.
    pub exported_at: DateTime<Utc>,
    /// Turns in page order.
    pub turns: Vec<Turn>,
}

impl ConversationRecord {
    /// Total turn count.
    #[must_use]
    pub fn turn_count(&self) -> usize {
        self.turns.len()
    }

    /// Turns authored by the user.
    #[must_use]
    pub fn user_turn_count(&self) -> usize {
        self.turns.iter().filter(|t| t.role == Role::User).count()
    }

    /// Turns authored by the assistant.
    #[must_use]
    pub fn assistant_turn_count(&self) -> usize {
        self.turns
            .iter()
            .filter(|t| t.role == Role::Assistant)
            .count()
    }
}

/// One entry of the sidebar history list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryItem {
    pub id: String,
    pub title: String,
    pub url: String,
}

/// Result of a single-conversation export.
#[derive(Debug, Clone)]
pub struct ExportOutcome {
    pub filename: String,
    pub turn_count: usize,
    pub conversation_id: String,
}

/// One failed item of a batch export.
#[derive(Debug, Clone)]
pub struct BatchFailure {
    pub id: String,
    pub title: String,
    pub error: String,
}

/// Result of a batch export; partial failure is a normal outcome.
#[derive(Debug, Clone)]
pub struct BatchOutcome {
    pub filename: String,
    pub total: usize,
    pub success_count: usize,
    pub failed_count: usize,
    pub failures: Vec<BatchFailure>,
}

/// Extract the conversation id from a URL path matching `/c/<id>`.
///
/// The id alphabet is hex digits and dashes, matched case-insensitively and
/// captured verbatim. Returns `None` when no such segment exists.
#[must_use]
pub fn parse_conversation_id(url: &str) -> Option<String> {
    let mut rest = url;
    while let Some(pos) = rest.find("/c/") {
        let tail = &rest[pos + 3..];
        let id: String = tail
            .chars()
            .take_while(|c| c.is_ascii_hexdigit() || *c == '-')
            .collect();
        if !id.is_empty() {
            return Some(id);
        }
        rest = tail;
    }
    None
}

/// Clean up raw history selections: fill missing URLs from ids, drop items
/// not on the conversation route of `origin`, and deduplicate by id keeping
/// first-seen order.
#[must_use]
pub fn normalize_history_items(items: &[HistoryItem], origin: &str) -> Vec<HistoryItem> {
    let base = origin.trim_end_matches('/');
    let route_prefix = format!("{base}/c/");

    let mut seen = std::collections::HashSet::new();
    let mut deduped = Vec::new();

    for item in items {
        let raw_id = item.id.trim();
        let mut url = item.url.trim().to_string();
        if url.is_empty() && !raw_id.is_empty() {
            url = format!("{base}/c/{raw_id}");
        }
        if url.is_empty() || !url.starts_with(&route_prefix) {
            continue;
        }

        let id = parse_conversation_id(&url)
            .or_else(|| (!raw_id.is_empty()).then(|| raw_id.to_string()))
            .unwrap_or_else(|| url.clone());
        if !seen.insert(id.clone()) {
            continue;
        }

        let title = item.title.trim();
        deduped.push(HistoryItem {
            id,
            title: if title.is_empty() {
                "Untitled".to_string()
            } else {
                title.to_string()
            },
            url,
        });
    }

    deduped
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item(id: &str, title: &str, url: &str) -> HistoryItem {
        HistoryItem {
            id: id.to_string(),
            title: title.to_string(),
            url: url.to_string(),
        }
    }

    #[test]
    fn role_round_trips_through_serde() {
        let role: Role = serde_json::from_str("\"assistant\"").unwrap();
        assert_eq!(role, Role::Assistant);
        assert_eq!(serde_json::to_string(&role).unwrap(), "\"assistant\"");

        let odd: Role = serde_json::from_str("\"system\"").unwrap();
        assert_eq!(odd, Role::Unknown);
    }

    #[test]
    fn non_assistant_roles_head_as_user() {
        assert_eq!(Role::User.heading(), "User");
        assert_eq!(Role::Unknown.heading(), "User");
        assert_eq!(Role::Assistant.heading(), "Assistant");
    }

    #[test]
    fn parses_conversation_id_from_paths_and_full_urls() {
        assert_eq!(
            parse_conversation_id("https://chatgpt.com/c/abc-123def"),
            Some("abc-123def".to_string())
        );
        assert_eq!(parse_conversation_id("/c/00ff"), Some("00ff".to_string()));
        assert_eq!(
            parse_conversation_id("https://chatgpt.com/c/ABC-12?x=1"),
            Some("ABC-12".to_string())
        );
        assert_eq!(parse_conversation_id("https://chatgpt.com/settings"), None);
        assert_eq!(parse_conversation_id("https://chatgpt.com/c/zzz"), None);
    }

    #[test]
    fn turn_prefers_markdown_content() {
        let turn = Turn {
            role: Role::Assistant,
            text: "plain".to_string(),
            markdown: "**rich**".to_string(),
            attachments: Vec::new(),
        };
        assert_eq!(turn.content(), "**rich**");

        let bare = Turn {
            role: Role::User,
            text: "plain".to_string(),
            markdown: String::new(),
            attachments: Vec::new(),
        };
        assert_eq!(bare.content(), "plain");
    }

    #[test]
    fn normalize_dedupes_by_id_keeping_first_seen() {
        let origin = "https://chatgpt.com/";
        let items = vec![
            item("aaa", "First", "https://chatgpt.com/c/aaa"),
            item("", "Duplicate", "https://chatgpt.com/c/aaa"),
            item("bbb", "Second", ""),
        ];
        let normalized = normalize_history_items(&items, origin);
        assert_eq!(normalized.len(), 2);
        assert_eq!(normalized[0].title, "First");
        assert_eq!(normalized[1].url, "https://chatgpt.com/c/bbb");
    }

    #[test]
    fn normalize_drops_foreign_and_empty_items() {
        let origin = "https://chatgpt.com/";
        let items = vec![
            item("x", "Elsewhere", "https://example.com/c/abc"),
            item("", "No URL no id", ""),
            item("ccc", "  ", "https://chatgpt.com/c/ccc"),
        ];
        let normalized = normalize_history_items(&items, origin);
        assert_eq!(normalized.len(), 1);
        assert_eq!(normalized[0].title, "Untitled");
    }

    #[test]
    fn record_counts_turns_by_role() {
        let record = ConversationRecord {
            id: "abc".to_string(),
            title: "T".to_string(),
            source_url: "https://chatgpt.com/c/abc".to_string(),
            exported_at: Utc::now(),
            turns: vec![
                Turn {
                    role: Role::User,
                    text: "q".to_string(),
                    markdown: String::new(),
                    attachments: Vec::new(),
                },
                Turn {
                    role: Role::Assistant,
                    text: "a".to_string(),
                    markdown: "a".to_string(),
                    attachments: Vec::new(),
                },
            ],
        };
        assert_eq!(record.turn_count(), 2);
        assert_eq!(record.user_turn_count(), 1);
        assert_eq!(record.assistant_turn_count(), 1);
    }
}
