//! Colored one-line terminal output for sessions and events.

use std::io::{self, Write};
use std::path::Path;

use owo_colors::OwoColorize;

use crate::extract::{EventKind, Severity, ShadowEvent};
use crate::watcher::SessionInfo;

/// Maximum length for truncated display strings.
const DEFAULT_MAX_LEN: usize = 100;

/// Truncate a string to at most `max_len` characters, adding an ellipsis if
/// truncated. Newlines are flattened to spaces.
#[must_use]
pub fn truncate(s: &str, max_len: usize) -> String {
    let flat: String = s
        .chars()
        .map(|c| if c == '\n' || c == '\r' { ' ' } else { c })
        .collect();
    if flat.chars().count() <= max_len {
        flat
    } else if max_len <= 3 {
        "...".to_string()
    } else {
        let head: String = flat.chars().take(max_len - 3).collect();
        format!("{head}...")
    }
}

/// Short plain-text summary of an event's detail.
#[must_use]
pub fn summarize(event: &ShadowEvent) -> String {
    let detail = &event.detail;
    let text = |key: &str| detail.get(key).and_then(|v| v.as_str()).unwrap_or_default();
    let summary = match event.kind {
        EventKind::Reasoning | EventKind::UserMessage | EventKind::AgentMessage => {
            text("text").to_string()
        }
        EventKind::ToolCall => {
            let command = text("command");
            if command.is_empty() {
                text("tool").to_string()
            } else {
                format!("{} $ {command}", text("tool"))
            }
        }
        EventKind::ToolResult => match detail.get("exit_code").and_then(|v| v.as_i64()) {
            Some(code) => format!("exit={code} {}", text("output")),
            None => text("output").to_string(),
        },
        EventKind::Meta => {
            let mut tags: Vec<&str> = event
                .tags
                .iter()
                .map(String::as_str)
                .filter(|tag| *tag != "meta")
                .collect();
            tags.sort_unstable();
            tags.join(",")
        }
        EventKind::Error => text("error").to_string(),
    };
    truncate(&summary, DEFAULT_MAX_LEN)
}

fn severity_label(severity: Severity) -> String {
    match severity {
        Severity::Info => format!("{}", "INFO".dimmed()),
        Severity::Warn => format!("{}", "WARN".yellow().bold()),
        Severity::Error => format!("{}", "ERROR".red().bold()),
    }
}

/// Print one event as a single line.
pub fn print_event(event: &ShadowEvent) {
    println!(
        "{} {:>5} {:<13} {}",
        event
            .timestamp
            .format("%Y-%m-%dT%H:%M:%S%.3fZ")
            .to_string()
            .dimmed(),
        severity_label(event.severity),
        event.kind.as_str().cyan(),
        summarize(event)
    );
    let _ = io::stdout().flush();
}

/// Print one session as a single line.
pub fn print_session(info: &SessionInfo) {
    let archived = if info.archived { " [archived]" } else { "" };
    println!(
        "{} {} files={} id={} cwd={}{}",
        info.updated_at
            .format("%Y-%m-%d %H:%M")
            .to_string()
            .dimmed(),
        info.key.blue().bold(),
        info.files.len(),
        info.session_id.as_deref().unwrap_or("-").cyan(),
        truncate(info.cwd.as_deref().unwrap_or("-"), 60),
        archived.dimmed()
    );
    let _ = io::stdout().flush();
}

/// Print a poll failure.
pub fn print_poll_failure(path: &Path, attempts: u32, error: &str) {
    eprintln!(
        "{} {} (after {attempts} attempts): {}",
        "[POLL FAILED]".red().bold(),
        path.display(),
        truncate(error, 200).red()
    );
}
