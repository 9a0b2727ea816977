//! Extraction of normalized events from raw rollout records.
//!
//! The extractor is stateless: given a record and the context of the file it
//! came from, it returns zero or more [`ShadowEvent`]s with stable identity,
//! tags, severity, and call/result correlation.

mod classify;
mod event;
mod extractor;

pub use classify::{
    shell_command_text, ClassifyError, ShellClassifier, ShellRule, ToolClass, EXEC_TAG,
    MCP_PREFIX, SHELL_TOOL_NAMES,
};
pub use event::{event_identity, EventKind, Severity, ShadowEvent, SourceRef};
pub use extractor::{ExtractContext, Extractor};
