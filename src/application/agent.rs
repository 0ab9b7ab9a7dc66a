//! In-page extraction agent.
//!
//! Works entirely over a [`PageView`]: finds conversation turns, serializes
//! their content to Markdown, and walks the history sidebar collecting
//! conversation links. The agent is the page-side half of the messaging
//! protocol and answers requests from the orchestration side.

use std::collections::HashSet;

use async_trait::async_trait;
use chrono::Utc;
use tokio::time::Instant;
use tracing::debug;

use crate::application::serializer;
use crate::domain::config::{AgentConfig, AppConfig};
use crate::domain::error::{ArchiveError, Result};
use crate::domain::markup::MarkupNode;
use crate::domain::models::{
    parse_conversation_id, Attachment, ConversationRecord, HistoryItem, Role, Turn,
};
use crate::domain::protocol::{PageReply, PageRequest, PongInfo};
use crate::domain::selector::SelectorChain;
use crate::infrastructure::page_host::{AgentRuntime, PageView};

/// Extracts conversations and history links from a page.
pub struct PageAgent {
    config: AgentConfig,
    title_suffix: String,
    selectors: CompiledSelectors,
}

struct CompiledSelectors {
    history_containers: SelectorChain,
    history_anchors: SelectorChain,
    turn_articles: SelectorChain,
    role_nodes: SelectorChain,
    assistant_markdown: SelectorChain,
}

impl PageAgent {
    /// Build an agent from configuration, compiling its selectors.
    ///
    /// # Errors
    /// Returns error if any configured selector fails to parse.
    pub fn new(config: &AppConfig) -> Result<Self> {
        Ok(Self {
            config: config.agent.clone(),
            title_suffix: config.page.title_suffix.clone(),
            selectors: CompiledSelectors {
                history_containers: SelectorChain::compile(&config.selectors.history_containers)?,
                history_anchors: SelectorChain::compile(&config.selectors.history_anchors)?,
                turn_articles: SelectorChain::compile(&config.selectors.turn_articles)?,
                role_nodes: SelectorChain::compile(&config.selectors.role_nodes)?,
                assistant_markdown: SelectorChain::compile(&config.selectors.assistant_markdown)?,
            },
        })
    }

    /// Extract the current conversation, polling until its turns render.
    ///
    /// Conversation pages build up asynchronously, so a route match alone is
    /// not enough; extraction starts only once at least one turn node exists.
    ///
    /// # Errors
    /// Returns [`ArchiveError::NoMessagesFound`] when no turns render within
    /// the deadline, or when every rendered turn is empty of content, with
    /// the page state at that moment for diagnostics.
    pub async fn extract_when_ready(&self, view: &dyn PageView) -> Result<ConversationRecord> {
        let deadline = Instant::now() + self.config.conversation_timeout();

        loop {
            let tree = view.markup();
            if parse_conversation_id(url_path(&view.url())).is_some()
                && !self.turn_nodes(&tree).is_empty()
            {
                return self.extract_conversation(view, &tree);
            }
            if Instant::now() >= deadline {
                break;
            }
            tokio::time::sleep(self.config.conversation_poll()).await;
        }

        let turn_count = self.turn_nodes(&view.markup()).len();
        Err(ArchiveError::NoMessagesFound {
            url: view.url(),
            title: view.title(),
            ready_state: view.ready_state().to_string(),
            turn_count,
        })
    }

    fn extract_conversation(
        &self,
        view: &dyn PageView,
        tree: &MarkupNode,
    ) -> Result<ConversationRecord> {
        let url = view.url();
        let Some(id) = parse_conversation_id(url_path(&url)) else {
            return Err(ArchiveError::NotConversationRoute { url });
        };

        let turns: Vec<Turn> = self
            .turn_nodes(tree)
            .into_iter()
            .map(|node| self.extract_turn(node, &url))
            .filter(Turn::has_content)
            .collect();
        // Zero surviving turns reads the same as a page that rendered none.
        if turns.is_empty() {
            return Err(ArchiveError::NoMessagesFound {
                url,
                title: view.title(),
                ready_state: view.ready_state().to_string(),
                turn_count: 0,
            });
        }
        debug!(id = %id, turns = turns.len(), "conversation extracted");

        Ok(ConversationRecord {
            id,
            title: self.normalize_title(&view.title()),
            source_url: url,
            exported_at: Utc::now(),
            turns,
        })
    }

    /// Turn nodes in document order. Prefers the role node inside each turn
    /// article; falls back to bare role nodes when no articles match.
    fn turn_nodes<'a>(&self, tree: &'a MarkupNode) -> Vec<&'a MarkupNode> {
        let article_turns: Vec<&MarkupNode> = self
            .selectors
            .turn_articles
            .query_all(tree)
            .into_iter()
            .filter_map(|article| self.selectors.role_nodes.find_first(article))
            .collect();

        if article_turns.is_empty() {
            self.selectors.role_nodes.query_all(tree)
        } else {
            article_turns
        }
    }

    fn extract_turn(&self, node: &MarkupNode, page_url: &str) -> Turn {
        let role = Role::from_attr(node.attr("data-message-author-role").unwrap_or("unknown"));
        let (text, markdown) = self.turn_content(node, role);
        let attachments = turn_attachments(node, page_url);
        Turn {
            role,
            text,
            markdown,
            attachments,
        }
    }

    /// Serialized markdown when the turn carries a rendered markdown body,
    /// otherwise flattened text. Non-user turns without a markdown body keep
    /// the markdown field empty rather than passing raw text off as markup.
    fn turn_content(&self, node: &MarkupNode, role: Role) -> (String, String) {
        if let Some(markdown_node) = self.selectors.assistant_markdown.find_first(node) {
            let markdown = serializer::clean_text(&serializer::serialize(markdown_node));
            if !markdown.is_empty() {
                return (markdown.clone(), markdown);
            }
        }

        let text = serializer::clean_text(&node.flatten_text());
        if role == Role::User {
            (text.clone(), text)
        } else {
            (text, String::new())
        }
    }

    /// Strip the site suffix (`... - ChatGPT`) from a document title.
    fn normalize_title(&self, raw: &str) -> String {
        let stripped = strip_title_suffix(raw, &self.title_suffix).trim();
        if stripped.is_empty() {
            "Untitled Conversation".to_string()
        } else {
            stripped.to_string()
        }
    }

    /// Collect conversation links from the history sidebar, scrolling to the
    /// bottom between rounds so lazily loaded items appear. Stops on several
    /// idle rounds in a row, on an unscrollable sidebar that stopped giving
    /// new items, or when the time budget runs out.
    pub async fn collect_history_links(&self, view: &dyn PageView) -> Vec<HistoryItem> {
        let started = Instant::now();
        let mut idle_rounds: u32 = 0;
        let mut previous_count = 0usize;

        for round in 0..self.config.history_max_rounds {
            let before = self.history_links(&view.markup(), &view.url());
            if before.len() > previous_count {
                previous_count = before.len();
                idle_rounds = 0;
            } else {
                idle_rounds += 1;
            }

            if idle_rounds >= self.config.history_idle_rounds {
                return before;
            }
            if started.elapsed() > self.config.history_budget() {
                debug!(round, items = before.len(), "history budget spent");
                return before;
            }

            let scrolled = view.scroll_history_to_bottom();
            if !scrolled && idle_rounds >= 1 {
                return before;
            }

            tokio::time::sleep(self.config.history_round_wait()).await;
            let after_count = self.history_links(&view.markup(), &view.url()).len();
            if after_count > previous_count {
                previous_count = after_count;
                idle_rounds = 0;
            }
        }

        self.history_links(&view.markup(), &view.url())
    }

    /// One pass over the sidebar: anchors inside the scoped history container
    /// (the whole page when no container matches, or when the container holds
    /// no links), deduplicated by conversation id in first-seen order.
    fn history_links(&self, tree: &MarkupNode, page_url: &str) -> Vec<HistoryItem> {
        let anchors = match self.selectors.history_containers.find_first(tree) {
            Some(container) => {
                let scoped = self.selectors.history_anchors.query_all(container);
                if scoped.is_empty() {
                    self.selectors.history_anchors.query_all(tree)
                } else {
                    scoped
                }
            }
            None => self.selectors.history_anchors.query_all(tree),
        };

        let mut seen = HashSet::new();
        let mut items = Vec::new();
        for anchor in anchors {
            let Some(href) = anchor.attr("href") else {
                continue;
            };
            let Some(id) = parse_conversation_id(href) else {
                continue;
            };
            if !seen.insert(id.clone()) {
                continue;
            }

            let title = serializer::clean_text(&anchor.raw_text());
            items.push(HistoryItem {
                id,
                title: if title.is_empty() {
                    "Untitled".to_string()
                } else {
                    title
                },
                url: resolve_href(href, page_url),
            });
        }
        items
    }
}

#[async_trait]
impl AgentRuntime for PageAgent {
    async fn answer(&self, view: &dyn PageView, request: PageRequest) -> PageReply {
        match request {
            PageRequest::Ping => PageReply::Pong(PongInfo {
                url: view.url(),
                ready_state: view.ready_state(),
            }),
            PageRequest::ExtractCurrentConversation => match self.extract_when_ready(view).await {
                Ok(record) => PageReply::Conversation(record),
                Err(e) => PageReply::Failure {
                    error: e.to_string(),
                },
            },
            PageRequest::ExtractHistoryLinks => {
                PageReply::HistoryLinks(self.collect_history_links(view).await)
            }
        }
    }
}

fn turn_attachments(node: &MarkupNode, page_url: &str) -> Vec<Attachment> {
    node.descendants()
        .skip(1)
        .filter(|n| n.is_element("img"))
        .filter_map(|img| {
            let src = img.attr("src")?;
            if src.is_empty() {
                return None;
            }
            Some(Attachment {
                src: resolve_href(src, page_url),
                alt: img.attr("alt").unwrap_or_default().to_string(),
            })
        })
        .collect()
}

/// Title without its trailing ` - {suffix}`, matched case-insensitively.
/// Returns the input unchanged when the suffix is not there.
fn strip_title_suffix<'a>(raw: &'a str, suffix: &str) -> &'a str {
    if suffix.is_empty() {
        return raw;
    }
    let trimmed = raw.trim_end();
    let Some(head_len) = trimmed.len().checked_sub(suffix.len()) else {
        return raw;
    };
    if !trimmed.is_char_boundary(head_len) {
        return raw;
    }
    let (head, tail) = trimmed.split_at(head_len);
    if !tail.eq_ignore_ascii_case(suffix) {
        return raw;
    }
    match head.trim_end().strip_suffix('-') {
        Some(before_dash) => before_dash,
        None => raw,
    }
}

/// Origin (scheme plus host) of an absolute URL, without a trailing slash.
fn url_origin(url: &str) -> Option<&str> {
    let scheme_end = url.find("://")? + 3;
    let rest = &url[scheme_end..];
    let host_len = rest.find(['/', '?', '#']).unwrap_or(rest.len());
    Some(&url[..scheme_end + host_len])
}

/// Path component of a URL, without query or fragment.
fn url_path(url: &str) -> &str {
    let rest = url_origin(url).map_or(url, |origin| &url[origin.len()..]);
    let end = rest.find(['?', '#']).unwrap_or(rest.len());
    &rest[..end]
}

/// Resolve an href the way pages do: absolute URLs pass through, everything
/// else resolves against the page's origin.
fn resolve_href(href: &str, page_url: &str) -> String {
    if href.is_empty() || href.contains("://") {
        return href.to_string();
    }
    let Some(origin) = url_origin(page_url) else {
        return href.to_string();
    };
    if let Some(rest) = href.strip_prefix("//") {
        if let Some(scheme_end) = origin.find("://") {
            return format!("{}://{rest}", &origin[..scheme_end]);
        }
        return href.to_string();
    }
    if href.starts_with('/') {
        format!("{origin}{href}")
    } else {
        format!("{origin}/{href}")
    }
}
