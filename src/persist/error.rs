//! Persistence error types.

use std::path::PathBuf;

/// Errors that can occur while loading or saving progress.
#[derive(thiserror::Error, Debug)]
pub enum PersistError {
    /// Failed to open or create database.
    #[error("Failed to open database at {path}: {source}")]
    DatabaseOpen {
        path: PathBuf,
        #[source]
        source: rusqlite::Error,
    },

    /// Failed to execute SQL.
    #[error("Database query failed: {0}")]
    Query(#[from] rusqlite::Error),

    /// Failed to encode or decode a snapshot.
    #[error("Snapshot serialization failed: {0}")]
    Serialize(#[from] serde_json::Error),

    /// Snapshot was written by an incompatible version.
    #[error("Unsupported snapshot version {found} (expected {expected})")]
    VersionMismatch { found: u32, expected: u32 },

    /// Blocking task was cancelled.
    #[error("Blocking task cancelled")]
    TaskCancelled,

    /// Failed to create parent directory.
    #[error("Failed to create directory {path}: {source}")]
    CreateDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}
