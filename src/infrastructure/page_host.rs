//! Contracts between the export pipeline and the pages it reads.
//!
//! A [`PageHost`] owns pages and the messaging channel to the agent running
//! inside them. A [`PageView`] is what that agent can see of one page. The
//! split keeps the orchestration logic independent of where pages actually
//! come from, so captured snapshots and scripted test hosts plug in the
//! same way a live browser bridge would.

use async_trait::async_trait;

use crate::domain::error::Result;
use crate::domain::markup::MarkupNode;
use crate::domain::protocol::{DocumentReadyState, PageReply, PageRequest};

/// Host-assigned identifier of an open page.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PageId(pub u32);

impl std::fmt::Display for PageId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Page-level load state reported by the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageLoadState {
    Loading,
    Complete,
}

impl std::fmt::Display for PageLoadState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Loading => write!(f, "loading"),
            Self::Complete => write!(f, "complete"),
        }
    }
}

/// What the host reports about one of its pages.
#[derive(Debug, Clone)]
pub struct PageStatus {
    /// Current page URL.
    pub url: String,
    /// Whether the page has finished loading.
    pub load_state: PageLoadState,
    /// Discarded pages keep their id but have no live document.
    pub discarded: bool,
}

/// Access to pages and the agents inside them.
#[async_trait]
pub trait PageHost: Send + Sync {
    /// The page currently in the foreground, if it is on the working origin.
    async fn active_page(&self) -> Result<PageId>;

    /// Open a background page on `url`.
    async fn open_page(&self, url: &str) -> Result<PageId>;

    /// Close a page. Closing an unknown page is an error.
    async fn close_page(&self, page: PageId) -> Result<()>;

    /// Reload a page in place.
    async fn reload_page(&self, page: PageId) -> Result<()>;

    /// Current status of a page.
    async fn page_status(&self, page: PageId) -> Result<PageStatus>;

    /// (Re-)inject the extraction agent into a page. Injecting into a page
    /// whose agent is already live is harmless.
    async fn inject_agent(&self, page: PageId) -> Result<()>;

    /// Send one request to a page's agent and wait for its reply.
    async fn send(&self, page: PageId, request: PageRequest) -> Result<PageReply>;
}

/// One page as seen from inside, by the extraction agent.
pub trait PageView: Send + Sync {
    /// Current location of the page.
    fn url(&self) -> String;

    /// Document title.
    fn title(&self) -> String;

    /// Document readiness.
    fn ready_state(&self) -> DocumentReadyState;

    /// Snapshot of the rendered markup tree.
    fn markup(&self) -> MarkupNode;

    /// Scroll the history sidebar to its bottom. Returns whether anything
    /// actually moved, so callers can tell a loaded-everything sidebar from
    /// one still paging in items.
    fn scroll_history_to_bottom(&self) -> bool;
}

/// The page-side request handler a host dispatches [`PageHost::send`] to.
#[async_trait]
pub trait AgentRuntime: Send + Sync {
    /// Answer one request against a page. Extraction failures come back as
    /// failure replies, matching what a remote agent would put on the wire.
    async fn answer(&self, view: &dyn PageView, request: PageRequest) -> PageReply;
}
