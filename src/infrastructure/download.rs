//! Export delivery.
//!
//! Finished exports leave the pipeline through a [`DownloadSink`]. The
//! directory sink mirrors a browser download folder: subfolders from the
//! export name, and a counter suffix instead of overwriting on collision.

use std::fs;
use std::path::{Path, PathBuf};

use tracing::info;

use crate::domain::error::{ArchiveError, Result};

/// Destination for finished export files.
pub trait DownloadSink: Send + Sync {
    /// Deliver one file, returning the path it landed at.
    ///
    /// # Errors
    /// Returns error if the file cannot be written.
    fn deliver(&self, name: &str, bytes: &[u8]) -> Result<PathBuf>;
}

/// Sink writing exports into a directory tree.
pub struct DirectorySink {
    root: PathBuf,
}

impl DirectorySink {
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

impl DownloadSink for DirectorySink {
    fn deliver(&self, name: &str, bytes: &[u8]) -> Result<PathBuf> {
        let target = unique_path(&self.root.join(name));

        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent).map_err(|e| {
                ArchiveError::io(format!("Failed to create {}", parent.display()), e)
            })?;
        }
        fs::write(&target, bytes).map_err(|e| ArchiveError::Delivery {
            name: name.to_string(),
            source: e,
        })?;

        info!(path = %target.display(), bytes = bytes.len(), "export written");
        Ok(target)
    }
}

/// First free variant of `path`: the path itself, then `stem (1).ext`,
/// `stem (2).ext` and so on.
fn unique_path(path: &Path) -> PathBuf {
    if !path.exists() {
        return path.to_path_buf();
    }

    let stem = path
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("export");
    let extension = path.extension().and_then(|s| s.to_str());

    for n in 1u32.. {
        let candidate = match extension {
            Some(ext) => path.with_file_name(format!("{stem} ({n}).{ext}")),
            None => path.with_file_name(format!("{stem} ({n})")),
        };
        if !candidate.exists() {
            return candidate;
        }
    }
    path.to_path_buf()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn writes_into_subfolders_from_the_export_name() {
        let dir = tempdir().unwrap();
        let sink = DirectorySink::new(dir.path());

        let path = sink.deliver("ChatGPT/2026-01-05_hello_abc.md", b"# Hello\n").unwrap();

        assert!(path.starts_with(dir.path()));
        assert_eq!(fs::read_to_string(&path).unwrap(), "# Hello\n");
    }

    #[test]
    fn collisions_get_a_counter_instead_of_overwriting() {
        let dir = tempdir().unwrap();
        let sink = DirectorySink::new(dir.path());

        let first = sink.deliver("export.md", b"one").unwrap();
        let second = sink.deliver("export.md", b"two").unwrap();

        assert_ne!(first, second);
        assert!(second.to_string_lossy().ends_with("export (1).md"));
        assert_eq!(fs::read_to_string(&first).unwrap(), "one");
        assert_eq!(fs::read_to_string(&second).unwrap(), "two");
    }

    #[test]
    fn unwritable_destination_reports_delivery_failure() {
        let dir = tempdir().unwrap();
        let blocking_file = dir.path().join("taken");
        fs::write(&blocking_file, b"").unwrap();

        let sink = DirectorySink::new(&blocking_file);
        let err = sink.deliver("sub/export.md", b"data").unwrap_err();

        assert!(matches!(err, ArchiveError::Io { .. }));
    }
}
