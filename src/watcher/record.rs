//! Raw rollout records.
//!
//! One [`RawRecord`] is produced per complete line of a rollout file.

use serde_json::Value;

/// Maximum number of characters of an unparseable line kept in its error record.
pub const PARSE_ERROR_TEXT_LIMIT: usize = 512;

/// Top-level `type` discriminator of a rollout line.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum RecordType {
    /// Session header written once when the agent starts.
    SessionMeta,
    /// Per-turn settings (model, cwd, policies).
    TurnContext,
    /// Model input/output items (tool calls, reasoning, messages).
    ResponseItem,
    /// UI-facing event stream (user/agent messages, token counts).
    EventMsg,
    /// Synthetic record for a line that failed to decode.
    ParseError,
    /// Any other discriminator (forward compatibility).
    Unknown(String),
}

impl RecordType {
    /// Map a wire discriminator to a record type.
    #[must_use]
    pub fn from_wire(value: &str) -> Self {
        match value {
            "session_meta" => Self::SessionMeta,
            "turn_context" => Self::TurnContext,
            "response_item" => Self::ResponseItem,
            "event_msg" => Self::EventMsg,
            "parse_error" => Self::ParseError,
            other => Self::Unknown(other.to_string()),
        }
    }

    /// The wire discriminator for this record type.
    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Self::SessionMeta => "session_meta",
            Self::TurnContext => "turn_context",
            Self::ResponseItem => "response_item",
            Self::EventMsg => "event_msg",
            Self::ParseError => "parse_error",
            Self::Unknown(other) => other,
        }
    }
}

/// One parsed line of a rollout file.
#[derive(Debug, Clone, PartialEq)]
pub struct RawRecord {
    /// Top-level discriminator.
    pub record_type: RecordType,
    /// The `payload` object (or the error description for parse errors).
    pub payload: Value,
    /// Raw `timestamp` text, if the line carried one.
    pub timestamp: Option<String>,
    /// Per-file sequence number, strictly increasing within a file.
    pub sequence: u64,
    /// Byte offset of the first byte of the line.
    pub offset: u64,
}

impl RawRecord {
    /// Decode one complete line.
    ///
    /// Never fails: a line that is not a JSON object becomes a
    /// [`RecordType::ParseError`] record carrying the offending text.
    #[must_use]
    pub fn from_line(line: &[u8], sequence: u64, offset: u64) -> Self {
        match serde_json::from_slice::<Value>(line) {
            Ok(Value::Object(mut map)) => {
                let record_type = map
                    .get("type")
                    .and_then(Value::as_str)
                    .map_or_else(|| RecordType::Unknown(String::new()), RecordType::from_wire);
                let timestamp = map
                    .get("timestamp")
                    .and_then(Value::as_str)
                    .map(str::to_string);
                let payload = map.remove("payload").unwrap_or(Value::Null);
                Self {
                    record_type,
                    payload,
                    timestamp,
                    sequence,
                    offset,
                }
            }
            Ok(other) => Self::parse_error(
                line,
                &format!("expected a JSON object, found {}", json_kind(&other)),
                sequence,
                offset,
            ),
            Err(e) => Self::parse_error(line, &e.to_string(), sequence, offset),
        }
    }

    fn parse_error(line: &[u8], error: &str, sequence: u64, offset: u64) -> Self {
        let text: String = String::from_utf8_lossy(line)
            .chars()
            .take(PARSE_ERROR_TEXT_LIMIT)
            .collect();
        Self {
            record_type: RecordType::ParseError,
            payload: serde_json::json!({ "text": text, "error": error }),
            timestamp: None,
            sequence,
            offset,
        }
    }

    /// The nested `payload.type` discriminator, if any.
    #[must_use]
    pub fn payload_type(&self) -> Option<&str> {
        self.payload.get("type").and_then(Value::as_str)
    }
}

/// Session header fields carried by a `session_meta` record.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionMeta {
    pub id: Option<String>,
    pub cwd: Option<String>,
    pub model: Option<String>,
    /// Start time recorded in the payload, falling back to the line timestamp.
    pub timestamp: Option<String>,
}

impl SessionMeta {
    /// Pull session header fields out of a `session_meta` record.
    ///
    /// Returns `None` for any other record type.
    #[must_use]
    pub fn from_record(record: &RawRecord) -> Option<Self> {
        if record.record_type != RecordType::SessionMeta {
            return None;
        }
        let field = |name: &str| {
            record
                .payload
                .get(name)
                .and_then(Value::as_str)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
        };
        Some(Self {
            id: field("id"),
            cwd: field("cwd"),
            model: field("model").or_else(|| field("model_provider")),
            timestamp: field("timestamp").or_else(|| record.timestamp.clone()),
        })
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
