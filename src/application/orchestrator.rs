//! Extraction orchestration.
//!
//! Drives the page-side agent through a [`PageHost`]: waits for pages to
//! become ready, probes the agent and revives it when the messaging channel
//! drops, and retries failed extractions on freshly reloaded pages with
//! exponential backoff. Fatal failures are never retried.

use std::time::Duration;

use rand::Rng;
use tokio::time::Instant;
use tracing::{debug, info, trace, warn};

use crate::domain::config::{AppConfig, PageConfig, ReadinessConfig, RetryConfig};
use crate::domain::error::{ArchiveError, Result};
use crate::domain::models::{parse_conversation_id, ConversationRecord, HistoryItem};
use crate::domain::protocol::{PageReply, PageRequest};
use crate::infrastructure::page_host::{PageHost, PageId, PageLoadState, PageStatus};

/// Coordinates extraction requests against pages of one host.
pub struct ExtractionOrchestrator<H: PageHost> {
    host: H,
    page: PageConfig,
    retry: RetryConfig,
    readiness: ReadinessConfig,
}

impl<H: PageHost> ExtractionOrchestrator<H> {
    pub fn new(host: H, config: &AppConfig) -> Self {
        Self {
            host,
            page: config.page.clone(),
            retry: config.retry.clone(),
            readiness: config.readiness.clone(),
        }
    }

    /// Extract the conversation shown on the active page.
    ///
    /// # Errors
    /// Returns error when no eligible page is active, the agent cannot be
    /// reached, or the page carries no extractable conversation.
    pub async fn extract_from_active_page(&self) -> Result<ConversationRecord> {
        let page = self.host.active_page().await?;
        let status = self.host.page_status(page).await?;
        let expected_path = parse_conversation_id(&status.url)
            .map_or_else(String::new, |id| format!("/c/{id}"));

        let reply = self
            .request_with_recovery(page, PageRequest::ExtractCurrentConversation, &expected_path)
            .await?;
        conversation_reply(reply)
    }

    /// Collect history links through the active page.
    ///
    /// # Errors
    /// Returns error when no eligible page is active or the agent cannot be
    /// reached.
    pub async fn history_from_active_page(&self) -> Result<Vec<HistoryItem>> {
        let page = self.host.active_page().await?;
        let reply = self
            .request_with_recovery(page, PageRequest::ExtractHistoryLinks, "")
            .await?;

        match reply {
            PageReply::HistoryLinks(items) => Ok(items),
            PageReply::Failure { error } => Err(ArchiveError::PageScript { message: error }),
            _ => Err(ArchiveError::UnexpectedReply {
                expected: "history links",
            }),
        }
    }

    /// Open a conversation URL on a background page, extract it with
    /// retries, and close the page again whatever the outcome.
    ///
    /// # Errors
    /// Returns [`ArchiveError::InvalidConversationUrl`] for URLs without a
    /// conversation id, the underlying failure when it is fatal, and
    /// [`ArchiveError::RetriesExhausted`] once every attempt is spent.
    pub async fn extract_from_url(&self, url: &str) -> Result<ConversationRecord> {
        let Some(conversation_id) = parse_conversation_id(url) else {
            return Err(ArchiveError::InvalidConversationUrl {
                url: url.to_string(),
            });
        };

        let page = self.host.open_page(url).await?;
        debug!(page = %page, url, "opened background page");

        let result = self.extract_with_retry(page, &conversation_id).await;

        if let Err(close_error) = self.host.close_page(page).await {
            warn!(page = %page, error = %close_error, "failed to close background page");
        }
        result
    }

    async fn extract_with_retry(
        &self,
        page: PageId,
        conversation_id: &str,
    ) -> Result<ConversationRecord> {
        let expected_path = format!("/c/{conversation_id}");
        let max_attempts = self.retry.max_attempts.max(1);
        let mut attempt = 1u32;

        loop {
            match self.extract_attempt(page, &expected_path).await {
                Ok(record) => return Ok(record),
                Err(error) if !error.is_retryable() => return Err(error),
                Err(error) if attempt >= max_attempts => {
                    return Err(ArchiveError::RetriesExhausted {
                        conversation_id: conversation_id.to_string(),
                        attempts: attempt,
                        source: Box::new(error),
                    });
                }
                Err(error) => {
                    warn!(
                        page = %page,
                        attempt,
                        error = %error,
                        "extraction attempt failed, reloading page"
                    );
                    if let Err(reload_error) = self.host.reload_page(page).await {
                        debug!(page = %page, error = %reload_error, "page reload failed");
                    }
                    tokio::time::sleep(self.backoff_delay(attempt)).await;
                    attempt += 1;
                }
            }
        }
    }

    async fn extract_attempt(
        &self,
        page: PageId,
        expected_path: &str,
    ) -> Result<ConversationRecord> {
        let reply = self
            .request_with_recovery(page, PageRequest::ExtractCurrentConversation, expected_path)
            .await?;
        conversation_reply(reply)
    }

    /// Send one request, reviving the agent once when the channel turns out
    /// to be dead: before the request via a failed probe, or during it via a
    /// connection error on the send itself.
    async fn request_with_recovery(
        &self,
        page: PageId,
        request: PageRequest,
        expected_path: &str,
    ) -> Result<PageReply> {
        self.await_ready(page, self.readiness.initial_timeout(), expected_path)
            .await?;

        if let Err(error) = self.probe_agent(page).await {
            if !error.is_connection() {
                return Err(error);
            }
            info!(page = %page, "agent unreachable, injecting");
            self.revive_agent(page, expected_path).await?;
        }

        match self.send_request(page, request).await {
            Ok(reply) => Ok(reply),
            Err(error) if error.is_connection() => {
                info!(page = %page, "connection dropped mid-request, injecting");
                self.revive_agent(page, expected_path).await?;
                self.send_request(page, request).await
            }
            Err(error) => Err(error),
        }
    }

    async fn revive_agent(&self, page: PageId, expected_path: &str) -> Result<()> {
        self.host.inject_agent(page).await?;
        self.await_ready(page, self.readiness.recovery_timeout(), expected_path)
            .await?;
        self.probe_agent(page).await
    }

    async fn probe_agent(&self, page: PageId) -> Result<()> {
        match self.send_request(page, PageRequest::Ping).await? {
            PageReply::Pong(info) => {
                trace!(page = %page, url = %info.url, state = %info.ready_state, "agent alive");
                Ok(())
            }
            _ => Err(ArchiveError::UnexpectedReply { expected: "pong" }),
        }
    }

    async fn send_request(&self, page: PageId, request: PageRequest) -> Result<PageReply> {
        match tokio::time::timeout(self.page.request_timeout(), self.host.send(page, request))
            .await
        {
            Ok(reply) => reply,
            Err(_) => Err(ArchiveError::RequestTimeout {
                waited_ms: self.page.request_timeout_ms,
            }),
        }
    }

    /// Poll until the page is ready for messaging: fully loaded, not
    /// discarded, on the working origin and on the expected path when one is
    /// given.
    async fn await_ready(
        &self,
        page: PageId,
        timeout: Duration,
        expected_path: &str,
    ) -> Result<()> {
        let deadline = Instant::now() + timeout;
        let mut last_state = "unknown".to_string();
        let mut last_url = String::new();

        loop {
            let status = self.host.page_status(page).await?;
            last_state = status.load_state.to_string();
            last_url.clone_from(&status.url);

            if self.ready_for_messaging(&status, expected_path) {
                return Ok(());
            }
            if Instant::now() >= deadline {
                return Err(ArchiveError::ReadinessTimeout {
                    last_state,
                    last_url,
                });
            }
            tokio::time::sleep(self.readiness.poll_interval()).await;
        }
    }

    fn ready_for_messaging(&self, status: &PageStatus, expected_path: &str) -> bool {
        if status.discarded || status.load_state != PageLoadState::Complete {
            return false;
        }
        if !status.url.starts_with(&self.page.origin) {
            return false;
        }
        expected_path.is_empty() || status.url.contains(expected_path)
    }

    /// Delay before the attempt after `attempt`: exponential in the attempt
    /// number with bounded random jitter, capped at the configured maximum.
    fn backoff_delay(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(16);
        let base = self.retry.base_delay_ms.saturating_mul(1 << exponent);
        let jitter = if self.retry.jitter_ms == 0 {
            0
        } else {
            rand::thread_rng().gen_range(0..self.retry.jitter_ms)
        };
        Duration::from_millis(base.saturating_add(jitter).min(self.retry.max_delay_ms))
    }
}

fn conversation_reply(reply: PageReply) -> Result<ConversationRecord> {
    match reply {
        PageReply::Conversation(record) => Ok(record),
        PageReply::Failure { error } => Err(ArchiveError::PageScript { message: error }),
        _ => Err(ArchiveError::UnexpectedReply {
            expected: "conversation",
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::Role;
    use crate::domain::protocol::{DocumentReadyState, PongInfo};
    use async_trait::async_trait;
    use chrono::Utc;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    const PAGE_URL: &str = "https://chatgpt.com/c/abc-123";

    fn record() -> ConversationRecord {
        ConversationRecord {
            id: "abc-123".to_string(),
            title: "Test".to_string(),
            source_url: PAGE_URL.to_string(),
            exported_at: Utc::now(),
            turns: vec![crate::domain::models::Turn {
                role: Role::User,
                text: "hi".to_string(),
                markdown: "hi".to_string(),
                attachments: vec![],
            }],
        }
    }

    #[derive(Default)]
    struct ScriptState {
        ping_replies: VecDeque<Result<PageReply>>,
        extract_replies: VecDeque<Result<PageReply>>,
        loading: bool,
        opened: Vec<String>,
        closed: Vec<PageId>,
        injections: u32,
        reloads: u32,
        extract_sends: u32,
    }

    /// Host that serves scripted replies for one page.
    #[derive(Default)]
    struct ScriptedPageHost {
        state: Mutex<ScriptState>,
    }

    impl ScriptedPageHost {
        fn with_extracts(replies: Vec<Result<PageReply>>) -> Self {
            let host = Self::default();
            host.state.lock().unwrap().extract_replies = replies.into();
            host
        }
    }

    #[async_trait]
    impl PageHost for ScriptedPageHost {
        async fn active_page(&self) -> Result<PageId> {
            Ok(PageId(1))
        }

        async fn open_page(&self, url: &str) -> Result<PageId> {
            self.state.lock().unwrap().opened.push(url.to_string());
            Ok(PageId(7))
        }

        async fn close_page(&self, page: PageId) -> Result<()> {
            self.state.lock().unwrap().closed.push(page);
            Ok(())
        }

        async fn reload_page(&self, _page: PageId) -> Result<()> {
            self.state.lock().unwrap().reloads += 1;
            Ok(())
        }

        async fn page_status(&self, _page: PageId) -> Result<PageStatus> {
            let loading = self.state.lock().unwrap().loading;
            Ok(PageStatus {
                url: PAGE_URL.to_string(),
                load_state: if loading {
                    PageLoadState::Loading
                } else {
                    PageLoadState::Complete
                },
                discarded: false,
            })
        }

        async fn inject_agent(&self, _page: PageId) -> Result<()> {
            self.state.lock().unwrap().injections += 1;
            Ok(())
        }

        async fn send(&self, _page: PageId, request: PageRequest) -> Result<PageReply> {
            let mut state = self.state.lock().unwrap();
            match request {
                PageRequest::Ping => state.ping_replies.pop_front().unwrap_or_else(|| {
                    Ok(PageReply::Pong(PongInfo {
                        url: PAGE_URL.to_string(),
                        ready_state: DocumentReadyState::Complete,
                    }))
                }),
                _ => {
                    state.extract_sends += 1;
                    state.extract_replies.pop_front().unwrap_or_else(|| {
                        Err(ArchiveError::PageScript {
                            message: "script ran out of replies".to_string(),
                        })
                    })
                }
            }
        }
    }

    fn retryable_failure() -> Result<PageReply> {
        Ok(PageReply::Failure {
            error: "No conversation messages found on the page.".to_string(),
        })
    }

    fn orchestrator(host: ScriptedPageHost) -> ExtractionOrchestrator<ScriptedPageHost> {
        let config = AppConfig {
            retry: RetryConfig {
                jitter_ms: 0,
                ..RetryConfig::default()
            },
            ..AppConfig::default()
        };
        ExtractionOrchestrator::new(host, &config)
    }

    #[tokio::test(start_paused = true)]
    async fn exhausted_retries_wrap_the_last_error() {
        let host = ScriptedPageHost::with_extracts(vec![
            retryable_failure(),
            retryable_failure(),
            retryable_failure(),
        ]);
        let orchestrator = orchestrator(host);

        let err = orchestrator.extract_from_url(PAGE_URL).await.unwrap_err();
        match err {
            ArchiveError::RetriesExhausted {
                conversation_id,
                attempts,
                ..
            } => {
                assert_eq!(conversation_id, "abc-123");
                assert_eq!(attempts, 3);
            }
            other => panic!("unexpected error: {other}"),
        }

        let state = orchestrator.host.state.lock().unwrap();
        assert_eq!(state.extract_sends, 3);
        assert_eq!(state.reloads, 2);
        assert_eq!(state.closed, vec![PageId(7)]);
    }

    #[tokio::test]
    async fn fatal_failure_stops_after_a_single_attempt() {
        let host = ScriptedPageHost::with_extracts(vec![Ok(PageReply::Failure {
            error: "Current page is not a conversation route (/c/<id>).".to_string(),
        })]);
        let orchestrator = orchestrator(host);

        let err = orchestrator.extract_from_url(PAGE_URL).await.unwrap_err();
        assert!(matches!(err, ArchiveError::PageScript { .. }));

        let state = orchestrator.host.state.lock().unwrap();
        assert_eq!(state.extract_sends, 1);
        assert_eq!(state.reloads, 0);
        assert_eq!(state.closed, vec![PageId(7)]);
    }

    #[tokio::test]
    async fn dead_agent_is_injected_once_before_the_request() {
        let host = ScriptedPageHost::with_extracts(vec![Ok(PageReply::Conversation(record()))]);
        host.state.lock().unwrap().ping_replies =
            vec![Err(ArchiveError::Connection {
                message: "Receiving end does not exist.".to_string(),
            })]
            .into();
        let orchestrator = orchestrator(host);

        let record = orchestrator.extract_from_url(PAGE_URL).await.unwrap();
        assert_eq!(record.id, "abc-123");

        let state = orchestrator.host.state.lock().unwrap();
        assert_eq!(state.injections, 1);
        assert_eq!(state.extract_sends, 1);
    }

    #[tokio::test]
    async fn connection_drop_mid_request_resends_exactly_once() {
        let host = ScriptedPageHost::with_extracts(vec![
            Err(ArchiveError::Connection {
                message: "The message port closed before a response was received.".to_string(),
            }),
            Ok(PageReply::Conversation(record())),
        ]);
        let orchestrator = orchestrator(host);

        let record = orchestrator.extract_from_url(PAGE_URL).await.unwrap();
        assert_eq!(record.turns.len(), 1);

        let state = orchestrator.host.state.lock().unwrap();
        assert_eq!(state.injections, 1);
        assert_eq!(state.extract_sends, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn page_stuck_loading_times_out_and_retries() {
        let host = ScriptedPageHost::default();
        host.state.lock().unwrap().loading = true;
        let orchestrator = orchestrator(host);

        let err = orchestrator.extract_from_url(PAGE_URL).await.unwrap_err();
        match err {
            ArchiveError::RetriesExhausted { attempts, source, .. } => {
                assert_eq!(attempts, 3);
                assert!(matches!(*source, ArchiveError::ReadinessTimeout { .. }));
            }
            other => panic!("unexpected error: {other}"),
        }

        let state = orchestrator.host.state.lock().unwrap();
        assert_eq!(state.extract_sends, 0);
    }

    #[tokio::test]
    async fn urls_without_a_conversation_id_are_rejected_up_front() {
        let orchestrator = orchestrator(ScriptedPageHost::default());

        let err = orchestrator
            .extract_from_url("https://chatgpt.com/settings")
            .await
            .unwrap_err();
        assert!(matches!(err, ArchiveError::InvalidConversationUrl { .. }));
        assert!(orchestrator.host.state.lock().unwrap().opened.is_empty());
    }

    #[tokio::test]
    async fn history_flows_through_the_active_page() {
        let host = ScriptedPageHost::with_extracts(vec![Ok(PageReply::HistoryLinks(vec![
            HistoryItem {
                id: "abc".to_string(),
                title: "One".to_string(),
                url: "https://chatgpt.com/c/abc".to_string(),
            },
        ]))]);
        let orchestrator = orchestrator(host);

        let items = orchestrator.history_from_active_page().await.unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].id, "abc");
    }

    #[test]
    fn backoff_doubles_and_caps_at_the_maximum() {
        let orchestrator = orchestrator(ScriptedPageHost::default());

        assert_eq!(orchestrator.backoff_delay(1), Duration::from_millis(800));
        assert_eq!(orchestrator.backoff_delay(2), Duration::from_millis(1600));
        assert_eq!(orchestrator.backoff_delay(3), Duration::from_millis(3200));
        assert_eq!(orchestrator.backoff_delay(4), Duration::from_millis(3500));
    }
}
