//! Versioned progress snapshot.
//!
//! Serialized as JSON into a single blob. A snapshot written by another
//! version, or one that fails to decode, is rejected as a whole.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::error::PersistError;

/// Current snapshot format version.
pub const SNAPSHOT_VERSION: u32 = 1;

/// Blob key the snapshot is stored under.
pub const SNAPSHOT_KEY: &str = "progress";

/// Persisted progress for one file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileProgress {
    /// Line-aligned byte offset already ingested.
    pub offset: u64,
    pub size: u64,
    pub mtime_ms: Option<i64>,
    /// Next per-file sequence number.
    pub sequence: u64,
}

/// Everything persisted across restarts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgressSnapshot {
    pub version: u32,
    /// Progress keyed by absolute file path.
    pub files: BTreeMap<String, FileProgress>,
    /// Opaque translation cache owned by the rendering layer.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub translations: Option<BTreeMap<String, String>>,
}

impl Default for ProgressSnapshot {
    fn default() -> Self {
        Self {
            version: SNAPSHOT_VERSION,
            files: BTreeMap::new(),
            translations: None,
        }
    }
}

impl ProgressSnapshot {
    /// Encode as JSON bytes.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn encode(&self) -> Result<Vec<u8>, PersistError> {
        Ok(serde_json::to_vec(self)?)
    }

    /// Decode and validate a snapshot.
    ///
    /// # Errors
    ///
    /// Returns an error if the bytes are not a snapshot or the version is
    /// not [`SNAPSHOT_VERSION`].
    pub fn decode(bytes: &[u8]) -> Result<Self, PersistError> {
        let snapshot: Self = serde_json::from_slice(bytes)?;
        if snapshot.version != SNAPSHOT_VERSION {
            return Err(PersistError::VersionMismatch {
                found: snapshot.version,
                expected: SNAPSHOT_VERSION,
            });
        }
        Ok(snapshot)
    }

    /// Decode a stored blob, treating anything invalid as no prior progress.
    #[must_use]
    pub fn decode_or_default(bytes: Option<&[u8]>) -> Self {
        let Some(bytes) = bytes else {
            return Self::default();
        };
        match Self::decode(bytes) {
            Ok(snapshot) => snapshot,
            Err(e) => {
                tracing::warn!(error = %e, "Discarding invalid progress snapshot");
                Self::default()
            }
        }
    }
}
