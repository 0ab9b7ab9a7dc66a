//! Infrastructure layer - external adapters (pages, filesystem).
//!
//! This layer handles all I/O operations and external dependencies.

pub mod config;
pub mod download;
pub mod page_host;
pub mod snapshot;

pub use config::{
    config_file_path, ensure_config_exists, load_config, load_config_from_file, save_config,
};
pub use download::{DirectorySink, DownloadSink};
pub use page_host::{AgentRuntime, PageHost, PageId, PageLoadState, PageStatus, PageView};
pub use snapshot::{PageSnapshot, SnapshotPageHost, SnapshotView};
