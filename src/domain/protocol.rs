//! Typed messages exchanged between the coordinator and the page agent.
//!
//! Exactly one reply answers one request; nothing else crosses the page
//! boundary. The wire encoding is JSON with a `type` tag on requests and a
//! `status` tag on replies.

use serde::{Deserialize, Serialize};

use crate::domain::models::{ConversationRecord, HistoryItem};

/// A request sent to the page agent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PageRequest {
    /// Liveness probe; answered immediately.
    Ping,
    /// Extract the conversation currently rendered on the page.
    ExtractCurrentConversation,
    /// Collect sidebar history links, scrolling to load more.
    ExtractHistoryLinks,
}

/// The page agent's answer to a [`PageRequest`].
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "status", content = "data", rename_all = "snake_case")]
pub enum PageReply {
    /// Probe answer with the page's current location and load state.
    Pong(PongInfo),
    /// A successfully extracted conversation.
    Conversation(ConversationRecord),
    /// Discovered history links, deduplicated by conversation id.
    HistoryLinks(Vec<HistoryItem>),
    /// The agent failed and can only describe why as text.
    Failure { error: String },
}

/// Location and readiness reported by a liveness probe.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PongInfo {
    pub url: String,
    pub ready_state: DocumentReadyState,
}

/// Document load state as the page reports it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DocumentReadyState {
    Loading,
    Interactive,
    Complete,
}

impl std::fmt::Display for DocumentReadyState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Loading => write!(f, "loading"),
            Self::Interactive => write!(f, "interactive"),
            Self::Complete => write!(f, "complete"),
        }
    }
}
