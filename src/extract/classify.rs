//! Tool and output classification heuristics.
//!
//! Tool names are tagged by protocol (MCP, shell, plain). Shell commands are
//! further tagged by regex rules matched against the command line.

use std::collections::BTreeSet;

use regex::Regex;
use serde_json::Value;

use super::event::Severity;

/// Prefix of multi-protocol (MCP) tool names: `mcp__<server>__<method>`.
pub const MCP_PREFIX: &str = "mcp__";

/// Tool names that execute a shell command.
pub const SHELL_TOOL_NAMES: &[&str] = &["shell", "shell_command"];

/// Tag applied to shell commands matching no other rule.
pub const EXEC_TAG: &str = "exec";

/// Error type for classifier construction.
#[derive(thiserror::Error, Debug)]
pub enum ClassifyError {
    /// Invalid regex pattern.
    #[error("Invalid regex pattern: {0}")]
    InvalidPattern(#[from] regex::Error),
}

/// A single shell rule: commands matching `pattern` get `tag`.
#[derive(Debug, Clone)]
pub struct ShellRule {
    tag: String,
    pattern: Regex,
}

impl ShellRule {
    /// Create a new shell rule.
    ///
    /// # Errors
    ///
    /// Returns `ClassifyError::InvalidPattern` if the regex is invalid.
    pub fn new(tag: impl Into<String>, pattern: &str) -> Result<Self, ClassifyError> {
        Ok(Self {
            tag: tag.into(),
            pattern: Regex::new(pattern)?,
        })
    }

    #[must_use]
    pub fn matches(&self, command: &str) -> bool {
        self.pattern.is_match(command)
    }

    #[must_use]
    pub fn tag(&self) -> &str {
        &self.tag
    }
}

/// Regex rules that sub-classify shell commands.
#[derive(Debug, Clone)]
pub struct ShellClassifier {
    rules: Vec<ShellRule>,
    exit_code: Option<Regex>,
    error_words: Option<Regex>,
    warn_words: Option<Regex>,
}

impl Default for ShellClassifier {
    fn default() -> Self {
        Self::with_default_rules()
    }
}

impl ShellClassifier {
    /// Create a classifier with the built-in rules.
    #[must_use]
    pub fn with_default_rules() -> Self {
        let rules = Self::default_rules()
            .into_iter()
            .filter_map(|result| match result {
                Ok(rule) => Some(rule),
                Err(e) => {
                    tracing::warn!(error = %e, "Failed to compile default shell rule");
                    None
                }
            })
            .collect();
        Self {
            rules,
            exit_code: compile(r"(?m)(?:Exit code:?|Process exited with code)\s*(-?\d+)"),
            error_words: compile(r"(?i)error|exception|failed|disconnected"),
            warn_words: compile(r"(?i)retry|warn"),
        }
    }

    fn default_rules() -> Vec<Result<ShellRule, ClassifyError>> {
        vec![
            ShellRule::new(
                "search",
                r"(?:^|[\s;&|(])(?:rg|grep|egrep|fgrep|ag|ack|fd|find|git\s+grep)(?:\s|$)",
            ),
            ShellRule::new(
                "file-read",
                r"(?:^|[\s;&|(])(?:cat|head|tail|less|more|nl|bat|sed\s+-n)(?:\s|$)",
            ),
            ShellRule::new("skill", r"(?i)SKILL\.md|/skills/"),
        ]
    }

    /// Add a rule.
    pub fn add_rule(&mut self, rule: ShellRule) {
        self.rules.push(rule);
    }

    /// Tags for a shell command: every matching rule's tag, or `exec`.
    #[must_use]
    pub fn command_tags(&self, command: &str) -> BTreeSet<String> {
        let mut tags: BTreeSet<String> = self
            .rules
            .iter()
            .filter(|rule| rule.matches(command))
            .map(|rule| rule.tag().to_string())
            .collect();
        if tags.is_empty() {
            tags.insert(EXEC_TAG.to_string());
        }
        tags
    }

    /// Exit code announced in tool output text, if any.
    #[must_use]
    pub fn exit_code_in(&self, text: &str) -> Option<i64> {
        self.exit_code
            .as_ref()?
            .captures(text)?
            .get(1)?
            .as_str()
            .parse()
            .ok()
    }

    /// Severity from keywords in output text.
    #[must_use]
    pub fn severity_from_text(&self, text: &str) -> Severity {
        if self.error_words.as_ref().is_some_and(|re| re.is_match(text)) {
            Severity::Error
        } else if self.warn_words.as_ref().is_some_and(|re| re.is_match(text)) {
            Severity::Warn
        } else {
            Severity::Info
        }
    }

    /// Severity of a tool result: a non-zero exit code always wins.
    #[must_use]
    pub fn result_severity(&self, exit_code: Option<i64>, text: &str) -> Severity {
        match exit_code {
            Some(code) if code != 0 => Severity::Error,
            _ => self.severity_from_text(text),
        }
    }
}

fn compile(pattern: &str) -> Option<Regex> {
    match Regex::new(pattern) {
        Ok(re) => Some(re),
        Err(e) => {
            tracing::warn!(error = %e, pattern, "Failed to compile classifier pattern");
            None
        }
    }
}

/// How a tool name is classified.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ToolClass {
    /// `mcp__<server>__<method>`.
    Mcp {
        server: String,
        method: Option<String>,
    },
    Shell,
    Plain,
}

impl ToolClass {
    /// Classify a tool name.
    #[must_use]
    pub fn of(name: &str) -> Self {
        if let Some(rest) = name.strip_prefix(MCP_PREFIX) {
            let (server, method) = match rest.split_once("__") {
                Some((server, method)) if !method.is_empty() => {
                    (server.to_string(), Some(method.to_string()))
                }
                Some((server, _)) => (server.to_string(), None),
                None => (rest.to_string(), None),
            };
            return Self::Mcp { server, method };
        }
        if SHELL_TOOL_NAMES.contains(&name) {
            return Self::Shell;
        }
        Self::Plain
    }

    /// Base tags for this class.
    #[must_use]
    pub fn tags(&self) -> BTreeSet<String> {
        let mut tags = BTreeSet::from(["tool".to_string()]);
        match self {
            Self::Mcp { server, method } => {
                tags.insert("mcp".to_string());
                if !server.is_empty() {
                    tags.insert(format!("mcp:{server}"));
                    if let Some(method) = method {
                        tags.insert(format!("mcp:{server}:{method}"));
                    }
                }
            }
            Self::Shell => {
                tags.insert("shell".to_string());
            }
            Self::Plain => {}
        }
        tags
    }
}

/// Command line carried by shell tool arguments.
///
/// Accepts `{"command": "..."}` or `{"command": [argv...]}`; for
/// `["bash", "-lc", script]` the script itself is returned.
#[must_use]
pub fn shell_command_text(arguments: &Value) -> Option<String> {
    match arguments.get("command")? {
        Value::String(command) => Some(command.clone()),
        Value::Array(argv) => {
            let parts: Vec<&str> = argv.iter().filter_map(Value::as_str).collect();
            if let [shell, flag, script, ..] = parts.as_slice() {
                let is_shell = ["sh", "bash", "zsh"]
                    .iter()
                    .any(|name| shell.rsplit('/').next() == Some(name));
                if is_shell && matches!(*flag, "-c" | "-lc") {
                    return Some((*script).to_string());
                }
            }
            Some(parts.join(" "))
        }
        _ => None,
    }
}
