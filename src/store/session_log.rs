//! Per-session event list with dedup and call pairing.

use std::collections::HashMap;
use std::sync::Arc;

use super::dedup::BoundedIdSet;
use crate::extract::{EventKind, ShadowEvent};

/// A tool call and its result, correlated by call id.
///
/// Either side may be missing: a result whose call was never seen is kept
/// as a standalone event.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CallPair {
    pub call: Option<Arc<ShadowEvent>>,
    pub result: Option<Arc<ShadowEvent>>,
}

impl CallPair {
    /// Both sides have been seen.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.call.is_some() && self.result.is_some()
    }
}

/// Deduplicated, sorted events of one session.
#[derive(Debug)]
pub(crate) struct SessionLog {
    events: Vec<Arc<ShadowEvent>>,
    seen: BoundedIdSet,
    calls: HashMap<String, CallPair>,
}

impl SessionLog {
    pub(crate) fn new(dedup_capacity: usize) -> Self {
        Self {
            events: Vec::new(),
            seen: BoundedIdSet::new(dedup_capacity),
            calls: HashMap::new(),
        }
    }

    /// Append `event` unless its id was already seen.
    ///
    /// The list is left unsorted; call [`SessionLog::sort`] after a batch.
    pub(crate) fn insert(&mut self, event: ShadowEvent) -> Option<Arc<ShadowEvent>> {
        if !self.seen.insert(&event.id) {
            return None;
        }
        let event = Arc::new(event);
        if let Some(call_id) = &event.related_call_id {
            let pair = self.calls.entry(call_id.clone()).or_default();
            match event.kind {
                EventKind::ToolCall if pair.call.is_none() => pair.call = Some(event.clone()),
                EventKind::ToolResult if pair.result.is_none() => {
                    pair.result = Some(event.clone());
                }
                _ => {}
            }
        }
        self.events.push(event.clone());
        Some(event)
    }

    /// Stable sort by `(timestamp, sequence)`.
    pub(crate) fn sort(&mut self) {
        self.events.sort_by_key(|event| event.sort_key());
    }

    pub(crate) fn events(&self) -> &[Arc<ShadowEvent>] {
        &self.events
    }

    pub(crate) fn call_pair(&self, call_id: &str) -> Option<CallPair> {
        self.calls.get(call_id).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extract::{Severity, SourceRef};
    use chrono::{DateTime, TimeZone, Utc};
    use std::collections::BTreeSet;
    use std::path::PathBuf;

    fn event(id: &str, secs: i64, sequence: u64, kind: EventKind, call: Option<&str>) -> ShadowEvent {
        let timestamp: DateTime<Utc> = Utc.timestamp_opt(secs, 0).unwrap();
        ShadowEvent {
            id: id.to_string(),
            session_key: "s".to_string(),
            session_id: None,
            timestamp,
            sequence,
            kind,
            detail: serde_json::Value::Null,
            tags: BTreeSet::new(),
            severity: Severity::Info,
            source: SourceRef {
                path: PathBuf::from("/s/rollout-1.jsonl"),
                offset: sequence,
            },
            related_call_id: call.map(str::to_string),
        }
    }

    #[test]
    fn test_duplicate_ids_rejected() {
        let mut log = SessionLog::new(10);
        assert!(log.insert(event("a", 1, 0, EventKind::Meta, None)).is_some());
        assert!(log.insert(event("a", 1, 0, EventKind::Meta, None)).is_none());
        assert_eq!(log.events().len(), 1);
    }

    #[test]
    fn test_sort_by_timestamp_then_sequence() {
        let mut log = SessionLog::new(10);
        log.insert(event("c", 2, 0, EventKind::Meta, None));
        log.insert(event("b", 1, 5, EventKind::Meta, None));
        log.insert(event("a", 1, 3, EventKind::Meta, None));
        log.sort();
        let ids: Vec<&str> = log.events().iter().map(|e| e.id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b", "c"]);
    }

    #[test]
    fn test_call_pairing() {
        let mut log = SessionLog::new(10);
        log.insert(event("call", 1, 0, EventKind::ToolCall, Some("x")));
        assert!(!log.call_pair("x").unwrap().is_complete());

        log.insert(event("result", 2, 1, EventKind::ToolResult, Some("x")));
        let pair = log.call_pair("x").unwrap();
        assert!(pair.is_complete());
        assert_eq!(pair.call.unwrap().id, "call");
        assert_eq!(pair.result.unwrap().id, "result");
        assert!(log.call_pair("y").is_none());
    }

    #[test]
    fn test_unpaired_result_is_standalone() {
        let mut log = SessionLog::new(10);
        log.insert(event("result", 2, 1, EventKind::ToolResult, Some("orphan")));
        let pair = log.call_pair("orphan").unwrap();
        assert!(pair.call.is_none());
        assert!(pair.result.is_some());
        assert_eq!(log.events().len(), 1);
    }
}
