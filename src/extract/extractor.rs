//! Record-to-event extraction.
//!
//! Dispatches on the record type and the nested payload type. Extraction
//! never fails: unrecognized shapes produce no events.

use std::collections::BTreeSet;
use std::path::Path;

use chrono::{DateTime, Utc};
use serde_json::{json, Map, Value};

use super::classify::{shell_command_text, ShellClassifier, ToolClass};
use super::event::{event_identity, EventKind, Severity, ShadowEvent, SourceRef};
use crate::watcher::{parse_timestamp, RawRecord, RecordType, SessionMeta};

/// Per-file context an event is extracted in.
#[derive(Debug, Clone, Copy)]
pub struct ExtractContext<'a> {
    pub session_key: &'a str,
    pub session_id: Option<&'a str>,
    /// File the record was read from.
    pub path: &'a Path,
    /// Timestamp for records that carry none (usually the file mtime).
    pub fallback_time: DateTime<Utc>,
}

/// An event before identity and location are attached.
#[derive(Debug)]
struct Draft {
    kind: EventKind,
    severity: Severity,
    tags: BTreeSet<String>,
    detail: Value,
    related_call_id: Option<String>,
}

impl Draft {
    fn new(kind: EventKind, tags: &[&str], detail: Value) -> Self {
        Self {
            kind,
            severity: Severity::Info,
            tags: tags.iter().map(|t| (*t).to_string()).collect(),
            detail,
            related_call_id: None,
        }
    }
}

/// Maps raw records to normalized events.
///
/// Holds only compiled classification rules, so one instance can serve
/// every file and session.
#[derive(Debug, Clone, Default)]
pub struct Extractor {
    shell: ShellClassifier,
}

impl Extractor {
    /// Create an extractor with the default shell rules.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an extractor with a custom shell classifier.
    #[must_use]
    pub fn with_classifier(shell: ShellClassifier) -> Self {
        Self { shell }
    }

    /// Extract zero or more events from one record.
    #[must_use]
    pub fn extract(&self, ctx: &ExtractContext<'_>, record: &RawRecord) -> Vec<ShadowEvent> {
        let Some(draft) = self.classify(record) else {
            return Vec::new();
        };

        let discriminator = match record.payload_type() {
            Some(inner) if record.record_type != RecordType::ParseError => {
                format!("{}:{inner}", record.record_type.as_str())
            }
            _ => record.record_type.as_str().to_string(),
        };
        let timestamp = record
            .timestamp
            .as_deref()
            .and_then(parse_timestamp)
            .unwrap_or(ctx.fallback_time);
        let session_id = ctx.session_id.map(str::to_string).or_else(|| {
            SessionMeta::from_record(record).and_then(|meta| meta.id)
        });

        vec![ShadowEvent {
            id: event_identity(
                ctx.path,
                record.offset,
                record.timestamp.as_deref(),
                &discriminator,
                0,
            ),
            session_key: ctx.session_key.to_string(),
            session_id,
            timestamp,
            sequence: record.sequence,
            kind: draft.kind,
            detail: draft.detail,
            tags: draft.tags,
            severity: draft.severity,
            source: SourceRef {
                path: ctx.path.to_path_buf(),
                offset: record.offset,
            },
            related_call_id: draft.related_call_id,
        }]
    }

    fn classify(&self, record: &RawRecord) -> Option<Draft> {
        let payload = &record.payload;
        match record.record_type {
            RecordType::ParseError => {
                let mut draft = Draft::new(EventKind::Error, &["error", "parse"], payload.clone());
                draft.severity = Severity::Error;
                Some(draft)
            }
            RecordType::SessionMeta => {
                let meta = SessionMeta::from_record(record).unwrap_or_default();
                let detail = json!({
                    "session_id": meta.id,
                    "cwd": meta.cwd,
                    "model": meta.model,
                    "originator": payload.get("originator"),
                    "cli_version": payload.get("cli_version"),
                });
                Some(Draft::new(EventKind::Meta, &["meta", "session"], detail))
            }
            RecordType::TurnContext => {
                let detail = pick(payload, &["model", "cwd", "effort", "approval_policy"]);
                Some(Draft::new(EventKind::Meta, &["meta", "turn"], detail))
            }
            RecordType::EventMsg => Self::event_msg(payload),
            RecordType::ResponseItem => self.response_item(payload),
            RecordType::Unknown(_) => None,
        }
    }

    fn event_msg(payload: &Value) -> Option<Draft> {
        let text = |key: &str| json!({ "text": str_field(payload, key).unwrap_or_default() });
        match payload.get("type").and_then(Value::as_str)? {
            "agent_reasoning" => Some(Draft::new(
                EventKind::Reasoning,
                &["reasoning"],
                text("text"),
            )),
            "user_message" => Some(Draft::new(
                EventKind::UserMessage,
                &["message", "user"],
                text("message"),
            )),
            "agent_message" => Some(Draft::new(
                EventKind::AgentMessage,
                &["message", "agent"],
                text("message"),
            )),
            "token_count" => Some(Draft::new(
                EventKind::Meta,
                &["meta", "tokens"],
                pick(payload, &["info", "rate_limits"]),
            )),
            _ => None,
        }
    }

    fn response_item(&self, payload: &Value) -> Option<Draft> {
        match payload.get("type").and_then(Value::as_str)? {
            "function_call" => {
                let name = str_field(payload, "name").unwrap_or_default();
                let (arguments, parse_error) = reparse(payload.get("arguments"), true);
                Some(self.tool_call(payload, name, arguments, parse_error))
            }
            "custom_tool_call" => {
                let name = str_field(payload, "name").unwrap_or_default();
                let (input, parse_error) = reparse(payload.get("input"), false);
                Some(self.tool_call(payload, name, input, parse_error))
            }
            "local_shell_call" => {
                let action = payload.get("action").cloned().unwrap_or(Value::Null);
                Some(self.tool_call(payload, "shell", action, None))
            }
            "function_call_output" | "custom_tool_call_output" => {
                Some(self.tool_result(payload))
            }
            "reasoning" => {
                let text = reasoning_summary(payload)?;
                Some(Draft::new(
                    EventKind::Reasoning,
                    &["reasoning"],
                    json!({ "text": text }),
                ))
            }
            _ => None,
        }
    }

    fn tool_call(
        &self,
        payload: &Value,
        name: &str,
        arguments: Value,
        parse_error: Option<String>,
    ) -> Draft {
        let class = ToolClass::of(name);
        let mut tags = class.tags();
        let mut detail = Map::new();
        detail.insert("tool".to_string(), json!(name));

        if class == ToolClass::Shell {
            if let Some(command) = shell_command_text(&arguments) {
                tags.extend(self.shell.command_tags(&command));
                detail.insert("command".to_string(), json!(command));
            }
        }
        detail.insert("arguments".to_string(), arguments);
        if let Some(error) = parse_error {
            detail.insert("arguments_parse_error".to_string(), json!(error));
        }

        Draft {
            kind: EventKind::ToolCall,
            severity: Severity::Info,
            tags,
            detail: Value::Object(detail),
            related_call_id: str_field(payload, "call_id").map(str::to_string),
        }
    }

    fn tool_result(&self, payload: &Value) -> Draft {
        let mut detail = Map::new();
        let (text, exit_code) = match payload.get("output") {
            Some(Value::String(raw)) => {
                let trimmed = raw.trim_start();
                if trimmed.starts_with('{') || trimmed.starts_with('[') {
                    match serde_json::from_str::<Value>(raw) {
                        Ok(parsed) => {
                            let text = output_text(&parsed).unwrap_or_else(|| raw.clone());
                            let exit_code = metadata_exit_code(&parsed);
                            detail.insert("parsed".to_string(), parsed);
                            (text, exit_code)
                        }
                        Err(e) => {
                            detail.insert("output_parse_error".to_string(), json!(e.to_string()));
                            (raw.clone(), None)
                        }
                    }
                } else {
                    (raw.clone(), None)
                }
            }
            Some(other @ (Value::Object(_) | Value::Array(_))) => {
                let text = output_text(other).unwrap_or_else(|| other.to_string());
                (text, metadata_exit_code(other))
            }
            Some(Value::Null) | None => (String::new(), None),
            Some(other) => (other.to_string(), None),
        };

        let exit_code = exit_code.or_else(|| self.shell.exit_code_in(&text));
        let severity = self.shell.result_severity(exit_code, &text);
        if let Some(code) = exit_code {
            detail.insert("exit_code".to_string(), json!(code));
        }
        detail.insert("output".to_string(), json!(text));

        let mut draft = Draft::new(EventKind::ToolResult, &["tool", "result"], Value::Object(detail));
        draft.severity = severity;
        draft.related_call_id = str_field(payload, "call_id").map(str::to_string);
        draft
    }
}

fn str_field<'a>(value: &'a Value, key: &str) -> Option<&'a str> {
    value.get(key).and_then(Value::as_str)
}

/// Copy the listed keys of `value` that are present into a new object.
fn pick(value: &Value, keys: &[&str]) -> Value {
    let map: Map<String, Value> = keys
        .iter()
        .filter_map(|key| value.get(*key).map(|v| ((*key).to_string(), v.clone())))
        .collect();
    Value::Object(map)
}

/// Re-parse a JSON-encoded string argument.
///
/// Non-string values pass through. When `always` is false, only strings that
/// look like JSON are attempted. On failure the raw string is kept and the
/// decoder message returned.
fn reparse(value: Option<&Value>, always: bool) -> (Value, Option<String>) {
    match value {
        Some(Value::String(raw)) => {
            let trimmed = raw.trim_start();
            if !always && !(trimmed.starts_with('{') || trimmed.starts_with('[')) {
                return (Value::String(raw.clone()), None);
            }
            match serde_json::from_str::<Value>(raw) {
                Ok(parsed) => (parsed, None),
                Err(e) => (Value::String(raw.clone()), Some(e.to_string())),
            }
        }
        Some(other) => (other.clone(), None),
        None => (Value::Null, None),
    }
}

/// Text of a structured tool output (`output` or `content` field).
fn output_text(value: &Value) -> Option<String> {
    ["output", "content"]
        .iter()
        .find_map(|key| value.get(*key).and_then(Value::as_str))
        .map(str::to_string)
}

fn metadata_exit_code(value: &Value) -> Option<i64> {
    value
        .get("metadata")
        .and_then(|m| m.get("exit_code"))
        .and_then(Value::as_i64)
}

/// Join the summary texts of a reasoning item; `None` when all are empty.
fn reasoning_summary(payload: &Value) -> Option<String> {
    let parts: Vec<&str> = payload
        .get("summary")?
        .as_array()?
        .iter()
        .filter_map(|item| item.get("text").and_then(Value::as_str))
        .map(str::trim)
        .filter(|text| !text.is_empty())
        .collect();
    if parts.is_empty() {
        None
    } else {
        Some(parts.join("\n\n"))
    }
}
