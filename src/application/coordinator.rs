//! Export coordination.
//!
//! Top of the pipeline: takes extraction results from the orchestrator,
//! renders them into Markdown documents, names the files, and hands them to
//! a download sink. Batch selections are normalized, exported one at a
//! time, and packed into a single archive, with per-item failures collected
//! instead of aborting the rest.

use chrono::{NaiveDate, SecondsFormat, Utc};
use tracing::{info, warn};

use crate::application::archive::{encode_archive, ArchiveEntry};
use crate::application::orchestrator::ExtractionOrchestrator;
use crate::domain::config::AppConfig;
use crate::domain::error::{ArchiveError, Result};
use crate::domain::models::{
    normalize_history_items, BatchFailure, BatchOutcome, ConversationRecord, ExportOutcome,
    HistoryItem,
};
use crate::infrastructure::download::DownloadSink;
use crate::infrastructure::page_host::PageHost;

/// How many batch failures a summary lists before truncating.
const SUMMARY_FAILURE_CAP: usize = 8;

/// Runs exports from extraction to delivery.
pub struct ExportCoordinator<H: PageHost> {
    orchestrator: ExtractionOrchestrator<H>,
    sink: Box<dyn DownloadSink>,
    folder: String,
    origin: String,
}

impl<H: PageHost> ExportCoordinator<H> {
    pub fn new(host: H, sink: Box<dyn DownloadSink>, config: &AppConfig) -> Self {
        Self {
            orchestrator: ExtractionOrchestrator::new(host, config),
            sink,
            folder: config.export.folder.clone(),
            origin: config.page.origin.clone(),
        }
    }

    /// Export the conversation on the active page as a Markdown file.
    ///
    /// # Errors
    /// Returns error when extraction fails or the file cannot be delivered.
    pub async fn export_current(&self) -> Result<ExportOutcome> {
        let record = self.orchestrator.extract_from_active_page().await?;
        let markdown = render_document(&record);
        let filename = markdown_filename(&self.folder, &record, today());

        let path = self.sink.deliver(&filename, markdown.as_bytes())?;
        info!(path = %path.display(), turns = record.turn_count(), "conversation exported");

        Ok(ExportOutcome {
            filename,
            turn_count: record.turn_count(),
            conversation_id: record.id,
        })
    }

    /// Export a history selection as one ZIP archive of Markdown files.
    ///
    /// Items are deduplicated and validated first. Conversations that fail
    /// extraction are reported in the outcome; only a batch where every
    /// single item failed is an error.
    ///
    /// # Errors
    /// Returns [`ArchiveError::EmptyBatch`] when nothing eligible was
    /// selected, [`ArchiveError::BatchFailed`] when no item could be
    /// exported, or a delivery error for the archive itself.
    pub async fn export_selected(&self, selection: &[HistoryItem]) -> Result<BatchOutcome> {
        let items = normalize_history_items(selection, &self.origin);
        if items.is_empty() {
            return Err(ArchiveError::EmptyBatch);
        }

        let mut entries: Vec<ArchiveEntry> = Vec::new();
        let mut failures: Vec<BatchFailure> = Vec::new();

        for item in &items {
            match self.orchestrator.extract_from_url(&item.url).await {
                Ok(record) => {
                    let markdown = render_document(&record);
                    let filename = markdown_filename(&self.folder, &record, today());
                    // Entries inside the archive drop the folder prefix; the
                    // archive itself already lands in that folder.
                    let name = filename
                        .strip_prefix(&format!("{}/", self.folder))
                        .unwrap_or(&filename)
                        .to_string();
                    entries.push(ArchiveEntry {
                        name,
                        data: markdown.into_bytes(),
                    });
                }
                Err(error) => {
                    warn!(id = %item.id, title = %item.title, error = %error, "batch item failed");
                    failures.push(BatchFailure {
                        id: item.id.clone(),
                        title: item.title.clone(),
                        error: error.to_string(),
                    });
                }
            }
        }

        if entries.is_empty() {
            return Err(ArchiveError::BatchFailed {
                total: items.len(),
                failures,
            });
        }

        let filename = zip_filename(&self.folder, entries.len(), today());
        let bytes = encode_archive(&entries, &Utc::now());
        let path = self.sink.deliver(&filename, &bytes)?;
        info!(
            path = %path.display(),
            files = entries.len(),
            failed = failures.len(),
            "batch exported"
        );

        Ok(BatchOutcome {
            filename,
            total: items.len(),
            success_count: entries.len(),
            failed_count: failures.len(),
            failures,
        })
    }

    /// Collect the conversation history through the active page.
    ///
    /// # Errors
    /// Returns error when no eligible page is active or the agent cannot be
    /// reached.
    pub async fn fetch_history(&self) -> Result<Vec<HistoryItem>> {
        self.orchestrator.history_from_active_page().await
    }
}

/// Render an extracted conversation as a Markdown document: a title, a
/// metadata list, and one `##` section per turn with its attachments.
#[must_use]
pub fn render_document(record: &ConversationRecord) -> String {
    let mut lines: Vec<String> = Vec::new();

    lines.push(format!(
        "# {}",
        non_empty(&record.title, "Untitled Conversation")
    ));
    lines.push(String::new());
    lines.push(format!(
        "- Conversation ID: `{}`",
        non_empty(&record.id, "unknown")
    ));
    lines.push(format!("- Source: {}", non_empty(&record.source_url, "unknown")));
    lines.push(format!(
        "- Exported At: {}",
        record.exported_at.to_rfc3339_opts(SecondsFormat::Millis, true)
    ));
    lines.push(String::new());
    lines.push("---".to_string());
    lines.push(String::new());

    for turn in &record.turns {
        lines.push(format!("## {}", turn.role.heading()));
        lines.push(String::new());
        lines.push(turn.content().to_string());
        lines.push(String::new());

        if !turn.attachments.is_empty() {
            lines.push("Attachments:".to_string());
            for attachment in &turn.attachments {
                lines.push(format!(
                    "- {}: {}",
                    non_empty(&attachment.alt, "image"),
                    attachment.src
                ));
            }
            lines.push(String::new());
        }
    }

    let mut document = lines.join("\n").trim().to_string();
    document.push('\n');
    document
}

/// Human-readable batch result, with the failure list truncated.
#[must_use]
pub fn summarize_batch(outcome: &BatchOutcome) -> String {
    let mut lines = vec![
        "Batch export complete.".to_string(),
        format!("ZIP: {}", outcome.filename),
        format!("Total: {}", outcome.total),
        format!("Success: {}", outcome.success_count),
        format!("Failed: {}", outcome.failed_count),
    ];

    if !outcome.failures.is_empty() {
        lines.push(String::new());
        lines.push("Failed items:".to_string());
        for failure in outcome.failures.iter().take(SUMMARY_FAILURE_CAP) {
            let label = non_empty(&failure.title, &failure.id);
            lines.push(format!("- {label}: {}", failure.error));
        }
        if outcome.failures.len() > SUMMARY_FAILURE_CAP {
            lines.push(format!(
                "- ... and {} more",
                outcome.failures.len() - SUMMARY_FAILURE_CAP
            ));
        }
    }

    lines.join("\n")
}

fn markdown_filename(folder: &str, record: &ConversationRecord, date: NaiveDate) -> String {
    let title = sanitize_filename(non_empty(&record.title, "untitled"));
    let id = sanitize_filename(non_empty(&record.id, "unknown"));
    format!("{folder}/{date}_{title}_{id}.md")
}

fn zip_filename(folder: &str, file_count: usize, date: NaiveDate) -> String {
    format!("{folder}/{date}_batch_export_{file_count}.zip")
}

/// Make a string safe as a filename component: runs of reserved characters
/// become one underscore, whitespace collapses to single spaces, and the
/// result is trimmed and capped at 80 characters.
fn sanitize_filename(value: &str) -> String {
    let mut collapsed = String::with_capacity(value.len());
    let mut prev_forbidden = false;
    for c in value.chars() {
        let forbidden = matches!(c, '\\' | '/' | ':' | '*' | '?' | '"' | '<' | '>' | '|');
        if forbidden {
            if !prev_forbidden {
                collapsed.push('_');
            }
        } else {
            collapsed.push(c);
        }
        prev_forbidden = forbidden;
    }

    let mut spaced = String::with_capacity(collapsed.len());
    let mut prev_space = false;
    for c in collapsed.chars() {
        if c.is_whitespace() {
            if !prev_space {
                spaced.push(' ');
            }
            prev_space = true;
        } else {
            spaced.push(c);
            prev_space = false;
        }
    }

    spaced.trim().chars().take(80).collect()
}

fn non_empty<'a>(value: &'a str, fallback: &'a str) -> &'a str {
    if value.is_empty() {
        fallback
    } else {
        value
    }
}

fn today() -> NaiveDate {
    Utc::now().date_naive()
}
