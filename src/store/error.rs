//! Store error types.

use std::path::PathBuf;

use crate::persist::PersistError;
use crate::watcher::WatcherError;

/// Errors that can occur during store operations.
#[derive(thiserror::Error, Debug)]
pub enum StoreError {
    /// No session with this key is indexed.
    #[error("Unknown session: {0}")]
    UnknownSession(String),

    /// Loading or saving progress failed.
    #[error("Progress persistence failed: {0}")]
    Persist(#[from] PersistError),

    /// A poll kept failing until the retry budget ran out.
    #[error("Polling {path} failed after {attempts} attempts: {source}")]
    RetriesExhausted {
        path: PathBuf,
        attempts: u32,
        #[source]
        source: WatcherError,
    },

    /// Blocking task was cancelled.
    #[error("Blocking task cancelled")]
    TaskCancelled,

    /// The store has been stopped.
    #[error("Session store stopped")]
    Stopped,
}
