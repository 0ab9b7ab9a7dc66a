//! Domain layer - core business logic and types.
//!
//! This layer contains pure domain models, the markup tree, the messaging
//! protocol and error types without any external dependencies (IO, pages).

pub mod config;
pub mod error;
pub mod markup;
pub mod models;
pub mod protocol;
pub mod selector;

pub use config::{
    AgentConfig, AppConfig, ExportConfig, PageConfig, ReadinessConfig, RetryConfig, SelectorConfig,
};
pub use error::{ArchiveError, Result};
pub use markup::MarkupNode;
pub use models::{
    normalize_history_items, parse_conversation_id, Attachment, BatchFailure, BatchOutcome,
    ConversationRecord, ExportOutcome, HistoryItem, Role, Turn,
};
pub use protocol::{DocumentReadyState, PageReply, PageRequest, PongInfo};
pub use selector::{Selector, SelectorChain};
