//! Application layer - use cases and orchestration.
//!
//! This layer contains the extraction agent, the retry orchestration
//! around it, and the export pipeline that turns extracted conversations
//! into delivered files.

pub mod agent;
pub mod archive;
pub mod coordinator;
pub mod orchestrator;
pub mod serializer;

pub use agent::PageAgent;
pub use archive::{encode_archive, ArchiveEntry};
pub use coordinator::{render_document, summarize_batch, ExportCoordinator};
pub use orchestrator::ExtractionOrchestrator;
