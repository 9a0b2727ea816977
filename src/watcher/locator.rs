//! Rollout file discovery.
//!
//! Finds rollout files under a root directory and groups them into
//! sessions by containing directory.

use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Component, Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::Serialize;

use super::parser::mtime_millis;
use super::record::{RawRecord, SessionMeta};

/// Directory holding live sessions, relative to the root.
pub const SESSIONS_DIR: &str = "sessions";
/// Directory holding archived sessions, relative to the root.
pub const ARCHIVED_SESSIONS_DIR: &str = "archived_sessions";

/// Naming convention for rollout files: `<prefix>*.<extension>`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RolloutNaming {
    pub prefix: String,
    pub extension: String,
}

impl Default for RolloutNaming {
    fn default() -> Self {
        Self {
            prefix: "rollout-".to_string(),
            extension: "jsonl".to_string(),
        }
    }
}

impl RolloutNaming {
    /// Naming with the default prefix and a custom extension.
    #[must_use]
    pub fn with_extension(extension: impl Into<String>) -> Self {
        Self {
            extension: extension.into(),
            ..Self::default()
        }
    }

    /// Whether `path` names a rollout file.
    #[must_use]
    pub fn matches(&self, path: &Path) -> bool {
        let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
            return false;
        };
        name.starts_with(&self.prefix)
            && path
                .extension()
                .is_some_and(|ext| ext.to_string_lossy() == self.extension)
    }
}

/// What the locator scans.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocatorConfig {
    /// Agent home directory containing `sessions/`.
    pub root: PathBuf,
    /// Also scan `archived_sessions/`.
    pub include_archived: bool,
    pub naming: RolloutNaming,
}

impl LocatorConfig {
    /// Config scanning only live sessions under `root`.
    ///
    /// A relative `root` is made absolute against the current directory.
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            include_archived: false,
            naming: RolloutNaming::default(),
        }
        .with_absolute_root()
    }

    /// Make `root` absolute and free of `.` and `..` so that session keys
    /// and watcher paths agree.
    ///
    /// The root is kept as is if the current directory cannot be read.
    #[must_use]
    pub fn with_absolute_root(mut self) -> Self {
        if let Ok(root) = std::path::absolute(&self.root) {
            self.root = normalize_lexically(&root);
        }
        self
    }

    /// Session roots to scan, each flagged as archived or not.
    #[must_use]
    pub fn session_roots(&self) -> Vec<(PathBuf, bool)> {
        let mut roots = vec![(self.root.join(SESSIONS_DIR), false)];
        if self.include_archived {
            roots.push((self.root.join(ARCHIVED_SESSIONS_DIR), true));
        }
        roots
    }

    /// Session roots that exist on disk, for the watch layer.
    #[must_use]
    pub fn watch_roots(&self) -> Vec<PathBuf> {
        self.session_roots()
            .into_iter()
            .map(|(root, _)| root)
            .filter(|root| root.is_dir())
            .collect()
    }

    /// Whether `path` lies under the archived root.
    #[must_use]
    pub fn is_archived(&self, path: &Path) -> bool {
        path.starts_with(self.root.join(ARCHIVED_SESSIONS_DIR))
    }
}

/// Drop `.` and fold `..` components without touching the filesystem.
fn normalize_lexically(path: &Path) -> PathBuf {
    let mut normalized = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                normalized.pop();
            }
            other => normalized.push(other),
        }
    }
    normalized
}

/// One logical session: every rollout file in one directory.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SessionInfo {
    /// The containing directory, as a string.
    pub key: String,
    pub session_id: Option<String>,
    pub cwd: Option<String>,
    pub model: Option<String>,
    pub created_at: DateTime<Utc>,
    /// Never moves backwards.
    pub updated_at: DateTime<Utc>,
    /// Rollout files, sorted lexicographically.
    pub files: Vec<PathBuf>,
    pub archived: bool,
}

/// Session key for a rollout file: its containing directory.
#[must_use]
pub fn session_key_for(path: &Path) -> Option<String> {
    path.parent().map(|dir| dir.to_string_lossy().into_owned())
}

/// Convert milliseconds since the epoch to a UTC timestamp.
#[must_use]
pub fn datetime_from_millis(ms: i64) -> Option<DateTime<Utc>> {
    DateTime::<Utc>::from_timestamp_millis(ms)
}

/// Parse an RFC 3339 timestamp into UTC.
#[must_use]
pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

/// Recursively collect rollout files under `root`.
///
/// Unreadable directories are skipped.
#[must_use]
pub fn collect_rollout_files(root: &Path, naming: &RolloutNaming) -> Vec<PathBuf> {
    let mut result = Vec::new();
    let mut stack = vec![root.to_path_buf()];

    while let Some(dir) = stack.pop() {
        let Ok(entries) = std::fs::read_dir(&dir) else {
            continue;
        };

        for entry in entries.flatten() {
            let path = entry.path();
            if path.is_dir() {
                stack.push(path);
            } else if naming.matches(&path) {
                result.push(path);
            }
        }
    }

    result.sort();
    result
}

/// Read and decode the first line of `path`.
///
/// Returns `None` if the file is missing, empty, or has no complete line.
#[must_use]
pub fn read_first_record(path: &Path) -> Option<RawRecord> {
    let file = File::open(path).ok()?;
    let mut reader = BufReader::new(file);
    let mut line = Vec::new();
    let read = reader.read_until(b'\n', &mut line).ok()?;
    if read == 0 || line.last() != Some(&b'\n') {
        return None;
    }
    let trimmed = line.trim_ascii();
    if trimmed.is_empty() {
        return None;
    }
    Some(RawRecord::from_line(trimmed, 0, 0))
}

/// Build a [`SessionInfo`] for the rollout `files` in `dir`.
///
/// Metadata comes from the first record of the earliest file; timestamps
/// fall back to file modification times when the header lacks them.
#[must_use]
pub fn describe_session(dir: &Path, mut files: Vec<PathBuf>, archived: bool) -> SessionInfo {
    files.sort();
    files.dedup();

    let mtimes: Vec<DateTime<Utc>> = files
        .iter()
        .filter_map(|file| std::fs::metadata(file).ok())
        .filter_map(|metadata| mtime_millis(&metadata))
        .filter_map(datetime_from_millis)
        .collect();
    let newest_mtime = mtimes.iter().max().copied();
    let oldest_mtime = mtimes.iter().min().copied();

    let header = files.first().and_then(|file| read_first_record(file));
    let meta = header.as_ref().and_then(SessionMeta::from_record);
    let header_time = meta
        .as_ref()
        .and_then(|m| m.timestamp.as_deref())
        .or_else(|| header.as_ref().and_then(|h| h.timestamp.as_deref()))
        .and_then(parse_timestamp);

    let created_at = header_time.or(oldest_mtime).unwrap_or_default();
    let updated_at = newest_mtime.map_or(created_at, |mtime| mtime.max(created_at));
    let meta = meta.unwrap_or_default();

    SessionInfo {
        key: dir.to_string_lossy().into_owned(),
        session_id: meta.id,
        cwd: meta.cwd,
        model: meta.model,
        created_at,
        updated_at,
        files,
        archived,
    }
}

/// Scan the configured roots and return one [`SessionInfo`] per session
/// directory, in key order.
#[must_use]
pub fn scan(config: &LocatorConfig) -> Vec<SessionInfo> {
    let mut grouped: BTreeMap<PathBuf, (Vec<PathBuf>, bool)> = BTreeMap::new();
    for (root, archived) in config.session_roots() {
        for file in collect_rollout_files(&root, &config.naming) {
            let Some(dir) = file.parent().map(Path::to_path_buf) else {
                continue;
            };
            grouped
                .entry(dir)
                .or_insert_with(|| (Vec::new(), archived))
                .0
                .push(file);
        }
    }

    grouped
        .into_iter()
        .map(|(dir, (files, archived))| describe_session(&dir, files, archived))
        .collect()
}
