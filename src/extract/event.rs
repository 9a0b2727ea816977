//! Normalized event model.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// What an event represents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum EventKind {
    Reasoning,
    UserMessage,
    AgentMessage,
    ToolCall,
    ToolResult,
    Meta,
    Error,
}

impl EventKind {
    /// Wire name, e.g. `tool-call`.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Reasoning => "reasoning",
            Self::UserMessage => "user-message",
            Self::AgentMessage => "agent-message",
            Self::ToolCall => "tool-call",
            Self::ToolResult => "tool-result",
            Self::Meta => "meta",
            Self::Error => "error",
        }
    }
}

impl std::fmt::Display for EventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Severity level, ordered from least to most severe.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    #[default]
    Info,
    Warn,
    Error,
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Info => f.write_str("info"),
            Self::Warn => f.write_str("warn"),
            Self::Error => f.write_str("error"),
        }
    }
}

/// Where an event came from.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SourceRef {
    pub path: PathBuf,
    /// Byte offset of the originating line.
    pub offset: u64,
}

/// A normalized, immutable event extracted from one rollout line.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShadowEvent {
    /// Content-addressed identity; re-reading the same line yields the same id.
    pub id: String,
    pub session_key: String,
    pub session_id: Option<String>,
    pub timestamp: DateTime<Utc>,
    /// Per-file sequence, the tie-breaker for equal timestamps.
    pub sequence: u64,
    pub kind: EventKind,
    pub detail: serde_json::Value,
    pub tags: BTreeSet<String>,
    pub severity: Severity,
    pub source: SourceRef,
    /// Call id shared by a tool call and its result.
    pub related_call_id: Option<String>,
}

impl ShadowEvent {
    /// Whether the event carries `tag`.
    #[must_use]
    pub fn has_tag(&self, tag: &str) -> bool {
        self.tags.contains(tag)
    }

    /// Ordering key within a session: timestamp, then sequence.
    #[must_use]
    pub fn sort_key(&self) -> (DateTime<Utc>, u64) {
        (self.timestamp, self.sequence)
    }
}

/// Compute the identity of the `index`-th event derived from a line.
///
/// Hashes the file path, the line's byte offset, the raw timestamp text, and
/// the record discriminator. The byte offset stands in for the per-file
/// sequence because it survives a resume at a rewound offset unchanged.
#[must_use]
pub fn event_identity(
    path: &Path,
    offset: u64,
    raw_timestamp: Option<&str>,
    discriminator: &str,
    index: usize,
) -> String {
    let mut hasher = Sha256::new();
    hasher.update(path.to_string_lossy().as_bytes());
    hasher.update([0x1f]);
    hasher.update(offset.to_be_bytes());
    hasher.update([0x1f]);
    hasher.update(raw_timestamp.unwrap_or_default().as_bytes());
    hasher.update([0x1f]);
    hasher.update(discriminator.as_bytes());
    hasher.update([0x1f]);
    hasher.update((index as u64).to_be_bytes());
    format!("{:x}", hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identity_is_deterministic() {
        let path = Path::new("/s/rollout-1.jsonl");
        let a = event_identity(path, 10, Some("2024-01-01T00:00:00Z"), "event_msg:user_message", 0);
        let b = event_identity(path, 10, Some("2024-01-01T00:00:00Z"), "event_msg:user_message", 0);
        assert_eq!(a, b);
        assert_eq!(a.len(), 64);
    }

    #[test]
    fn test_identity_varies_with_inputs() {
        let path = Path::new("/s/rollout-1.jsonl");
        let base = event_identity(path, 10, None, "meta", 0);
        assert_ne!(base, event_identity(Path::new("/s/rollout-2.jsonl"), 10, None, "meta", 0));
        assert_ne!(base, event_identity(path, 11, None, "meta", 0));
        assert_ne!(base, event_identity(path, 10, Some("t"), "meta", 0));
        assert_ne!(base, event_identity(path, 10, None, "other", 0));
        assert_ne!(base, event_identity(path, 10, None, "meta", 1));
    }

    #[test]
    fn test_kind_serializes_kebab_case() {
        let json = serde_json::to_string(&EventKind::UserMessage).unwrap();
        assert_eq!(json, "\"user-message\"");
        assert_eq!(EventKind::ToolResult.to_string(), "tool-result");
    }

    #[test]
    fn test_severity_ordering() {
        assert!(Severity::Error > Severity::Warn);
        assert!(Severity::Warn > Severity::Info);
        assert_eq!(Severity::default(), Severity::Info);
    }
}
