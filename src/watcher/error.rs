//! Watcher error types.

use std::path::PathBuf;

/// Errors that can occur while locating, watching, or reading rollout files.
#[derive(thiserror::Error, Debug)]
pub enum WatcherError {
    /// Rollout file disappeared between notification and read.
    #[error("Rollout file missing: {0}")]
    FileDeleted(PathBuf),

    /// Permission denied accessing file.
    #[error("Permission denied: {0}")]
    PermissionDenied(PathBuf),

    /// Notify watcher error.
    #[error("File watcher error: {0}")]
    Notify(#[from] notify::Error),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl WatcherError {
    /// Map an I/O error on `path` into the matching variant.
    #[must_use]
    pub fn from_io(path: &std::path::Path, err: std::io::Error) -> Self {
        match err.kind() {
            std::io::ErrorKind::NotFound => Self::FileDeleted(path.to_path_buf()),
            std::io::ErrorKind::PermissionDenied => Self::PermissionDenied(path.to_path_buf()),
            _ => Self::Io(err),
        }
    }

    /// Whether a later attempt at the same read may succeed.
    ///
    /// Every filesystem failure is retryable; only watcher setup is not.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        !matches!(self, Self::Notify(_))
    }
}
