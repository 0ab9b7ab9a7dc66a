//! Snapshot-backed page host.
//!
//! A snapshot directory holds captured pages as JSON documents: location,
//! document state and the rendered markup tree. The host serves them through
//! the [`PageHost`] contract, dispatching agent requests to an in-process
//! [`AgentRuntime`], so the whole export pipeline runs against captures the
//! same way it would against live pages.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::domain::error::{ArchiveError, Result};
use crate::domain::markup::MarkupNode;
use crate::domain::models::parse_conversation_id;
use crate::domain::protocol::{DocumentReadyState, PageReply, PageRequest};
use crate::infrastructure::page_host::{
    AgentRuntime, PageHost, PageId, PageLoadState, PageStatus, PageView,
};

/// A captured page.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageSnapshot {
    /// Location the page was captured at.
    pub url: String,

    /// Document title at capture time.
    #[serde(default)]
    pub title: String,

    /// Document readiness at capture time.
    #[serde(default = "default_ready_state")]
    pub ready_state: DocumentReadyState,

    /// Rendered markup tree.
    pub tree: MarkupNode,
}

const fn default_ready_state() -> DocumentReadyState {
    DocumentReadyState::Complete
}

impl PageSnapshot {
    /// Load a snapshot from a JSON file.
    ///
    /// # Errors
    /// Returns error if the file cannot be read or parsed.
    pub fn load(path: &Path) -> Result<Self> {
        let raw = fs::read_to_string(path)
            .map_err(|e| ArchiveError::io(format!("Failed to read snapshot {}", path.display()), e))?;
        serde_json::from_str(&raw).map_err(ArchiveError::json_parse)
    }
}

/// A single capture viewed through the [`PageView`] contract.
pub struct SnapshotView {
    snapshot: PageSnapshot,
}

impl SnapshotView {
    #[must_use]
    pub fn new(snapshot: PageSnapshot) -> Self {
        Self { snapshot }
    }
}

impl PageView for SnapshotView {
    fn url(&self) -> String {
        self.snapshot.url.clone()
    }

    fn title(&self) -> String {
        self.snapshot.title.clone()
    }

    fn ready_state(&self) -> DocumentReadyState {
        self.snapshot.ready_state
    }

    fn markup(&self) -> MarkupNode {
        self.snapshot.tree.clone()
    }

    fn scroll_history_to_bottom(&self) -> bool {
        false
    }
}

struct HostState {
    library: Vec<Arc<SnapshotView>>,
    pages: HashMap<PageId, Arc<SnapshotView>>,
    active: Option<PageId>,
    next_id: u32,
}

impl HostState {
    fn allocate(&mut self) -> PageId {
        self.next_id += 1;
        PageId(self.next_id)
    }
}

/// Serves a directory of page snapshots as openable pages.
pub struct SnapshotPageHost {
    runtime: Box<dyn AgentRuntime>,
    origin: String,
    state: Mutex<HostState>,
}

impl SnapshotPageHost {
    /// Load every `.json` snapshot under `snapshot_dir`, in filename order.
    /// The active page is `active_snapshot` when given, otherwise the first
    /// snapshot on the working origin.
    ///
    /// # Errors
    /// Returns error if the directory cannot be listed or a snapshot fails
    /// to parse.
    pub fn new(
        snapshot_dir: &Path,
        active_snapshot: Option<&Path>,
        origin: &str,
        runtime: Box<dyn AgentRuntime>,
    ) -> Result<Self> {
        let mut library = Vec::new();
        for path in snapshot_files(snapshot_dir)? {
            library.push(Arc::new(SnapshotView {
                snapshot: PageSnapshot::load(&path)?,
            }));
        }
        debug!(count = library.len(), dir = %snapshot_dir.display(), "snapshots loaded");

        let mut state = HostState {
            active: None,
            pages: HashMap::new(),
            next_id: 0,
            library,
        };

        let active_view = match active_snapshot {
            Some(path) => Some(Arc::new(SnapshotView {
                snapshot: PageSnapshot::load(path)?,
            })),
            None => state
                .library
                .iter()
                .find(|view| view.snapshot.url.starts_with(origin))
                .cloned(),
        };
        if let Some(view) = active_view {
            let id = state.allocate();
            state.pages.insert(id, view);
            state.active = Some(id);
        }

        Ok(Self {
            runtime,
            origin: origin.to_string(),
            state: Mutex::new(state),
        })
    }

    fn lookup(&self, page: PageId) -> Result<Arc<SnapshotView>> {
        self.state
            .lock()
            .map_err(|_| ArchiveError::config("snapshot host state poisoned"))?
            .pages
            .get(&page)
            .cloned()
            .ok_or_else(|| page_gone(page))
    }

    fn locked(&self) -> Result<std::sync::MutexGuard<'_, HostState>> {
        self.state
            .lock()
            .map_err(|_| ArchiveError::config("snapshot host state poisoned"))
    }
}

fn page_gone(page: PageId) -> ArchiveError {
    ArchiveError::Connection {
        message: format!("receiving end does not exist (page {page} is closed)"),
    }
}

fn snapshot_files(dir: &Path) -> Result<Vec<PathBuf>> {
    if !dir.is_dir() {
        return Ok(Vec::new());
    }
    let entries = fs::read_dir(dir)
        .map_err(|e| ArchiveError::io(format!("Failed to list {}", dir.display()), e))?;

    let mut paths = Vec::new();
    for entry in entries {
        let entry =
            entry.map_err(|e| ArchiveError::io(format!("Failed to list {}", dir.display()), e))?;
        let path = entry.path();
        if path.extension().is_some_and(|ext| ext == "json") {
            paths.push(path);
        }
    }
    paths.sort();
    Ok(paths)
}

#[async_trait]
impl PageHost for SnapshotPageHost {
    async fn active_page(&self) -> Result<PageId> {
        let state = self.locked()?;
        let eligible = state.active.and_then(|id| {
            state
                .pages
                .get(&id)
                .filter(|view| view.snapshot.url.starts_with(&self.origin))
                .map(|_| id)
        });
        eligible.ok_or_else(|| ArchiveError::NoEligiblePage {
            origin: self.origin.clone(),
        })
    }

    async fn open_page(&self, url: &str) -> Result<PageId> {
        let wanted = parse_conversation_id(url);
        let mut state = self.locked()?;

        let view = state
            .library
            .iter()
            .find(|view| match (&wanted, parse_conversation_id(&view.snapshot.url)) {
                (Some(want), Some(have)) => *want == have,
                _ => view.snapshot.url == url,
            })
            .cloned();

        let Some(view) = view else {
            return Err(ArchiveError::SnapshotMissing {
                wanted: url.to_string(),
            });
        };
        let id = state.allocate();
        state.pages.insert(id, view);
        Ok(id)
    }

    async fn close_page(&self, page: PageId) -> Result<()> {
        let mut state = self.locked()?;
        if state.pages.remove(&page).is_none() {
            return Err(page_gone(page));
        }
        if state.active == Some(page) {
            state.active = None;
        }
        Ok(())
    }

    async fn reload_page(&self, page: PageId) -> Result<()> {
        // Snapshots are immutable, a reload just has to find the page alive.
        self.lookup(page).map(|_| ())
    }

    async fn page_status(&self, page: PageId) -> Result<PageStatus> {
        let view = self.lookup(page)?;
        let load_state = if view.snapshot.ready_state == DocumentReadyState::Complete {
            PageLoadState::Complete
        } else {
            PageLoadState::Loading
        };
        Ok(PageStatus {
            url: view.snapshot.url.clone(),
            load_state,
            discarded: false,
        })
    }

    async fn inject_agent(&self, page: PageId) -> Result<()> {
        self.lookup(page).map(|_| ())
    }

    async fn send(&self, page: PageId, request: PageRequest) -> Result<PageReply> {
        let view = self.lookup(page)?;
        Ok(self.runtime.answer(view.as_ref(), request).await)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::protocol::PongInfo;
    use tempfile::tempdir;

    struct PongRuntime;

    #[async_trait]
    impl AgentRuntime for PongRuntime {
        async fn answer(&self, view: &dyn PageView, request: PageRequest) -> PageReply {
            match request {
                PageRequest::Ping => PageReply::Pong(PongInfo {
                    url: view.url(),
                    ready_state: view.ready_state(),
                }),
                _ => PageReply::Failure {
                    error: "not supported here".to_string(),
                },
            }
        }
    }

    fn write_snapshot(dir: &Path, name: &str, url: &str, title: &str) {
        let body = serde_json::json!({
            "url": url,
            "title": title,
            "readyState": "complete",
            "tree": {
                "kind": "element",
                "tag": "body",
                "children": [
                    { "kind": "text", "content": "hello" }
                ]
            }
        });
        fs::write(dir.join(name), body.to_string()).unwrap();
    }

    fn host(dir: &Path) -> SnapshotPageHost {
        SnapshotPageHost::new(dir, None, "https://chatgpt.com/", Box::new(PongRuntime)).unwrap()
    }

    #[tokio::test]
    async fn first_snapshot_on_the_origin_becomes_the_active_page() {
        let dir = tempdir().unwrap();
        write_snapshot(dir.path(), "a.json", "https://chatgpt.com/c/aaa-111", "First");
        write_snapshot(dir.path(), "b.json", "https://chatgpt.com/c/bbb-222", "Second");
        let host = host(dir.path());

        let page = host.active_page().await.unwrap();
        let status = host.page_status(page).await.unwrap();
        assert_eq!(status.url, "https://chatgpt.com/c/aaa-111");
        assert_eq!(status.load_state, PageLoadState::Complete);

        match host.send(page, PageRequest::Ping).await.unwrap() {
            PageReply::Pong(info) => assert_eq!(info.url, status.url),
            other => panic!("unexpected reply: {other:?}"),
        }
    }

    #[tokio::test]
    async fn open_page_matches_snapshots_by_conversation_id() {
        let dir = tempdir().unwrap();
        write_snapshot(dir.path(), "a.json", "https://chatgpt.com/c/aaa-111", "First");
        write_snapshot(dir.path(), "b.json", "https://chatgpt.com/c/bbb-222", "Second");
        let host = host(dir.path());

        let page = host
            .open_page("https://chatgpt.com/c/bbb-222?from=history")
            .await
            .unwrap();
        let status = host.page_status(page).await.unwrap();
        assert_eq!(status.url, "https://chatgpt.com/c/bbb-222");

        let err = host
            .open_page("https://chatgpt.com/c/ccc-333")
            .await
            .unwrap_err();
        assert!(matches!(err, ArchiveError::SnapshotMissing { .. }));
    }

    #[tokio::test]
    async fn closed_pages_lose_their_channel() {
        let dir = tempdir().unwrap();
        write_snapshot(dir.path(), "a.json", "https://chatgpt.com/c/aaa-111", "First");
        let host = host(dir.path());

        let page = host.active_page().await.unwrap();
        host.close_page(page).await.unwrap();

        let err = host.send(page, PageRequest::Ping).await.unwrap_err();
        assert!(err.is_connection());
        assert!(host.close_page(page).await.is_err());
        assert!(host.active_page().await.is_err());
    }

    #[tokio::test]
    async fn off_origin_snapshots_are_not_eligible() {
        let dir = tempdir().unwrap();
        write_snapshot(dir.path(), "a.json", "https://example.com/other", "Elsewhere");
        let host = host(dir.path());

        let err = host.active_page().await.unwrap_err();
        assert!(matches!(err, ArchiveError::NoEligiblePage { .. }));
    }

    #[test]
    fn snapshots_parse_from_their_wire_shape() {
        let dir = tempdir().unwrap();
        write_snapshot(dir.path(), "a.json", "https://chatgpt.com/c/aaa-111", "First");

        let snapshot = PageSnapshot::load(&dir.path().join("a.json")).unwrap();
        assert_eq!(snapshot.title, "First");
        assert_eq!(snapshot.ready_state, DocumentReadyState::Complete);
        assert_eq!(snapshot.tree.children().len(), 1);
    }
}
