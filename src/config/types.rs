//! Configuration types.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::persist::default_state_path;
use crate::store::{RetryPolicy, StoreConfig};
use crate::watcher::{LocatorConfig, RolloutNaming};

/// Top-level configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ShadowConfig {
    /// Agent home directory containing `sessions/`. A leading `~/` is
    /// expanded to the home directory.
    pub root: PathBuf,
    /// Also index `archived_sessions/`.
    pub include_archived: bool,
    /// Rollout file extension, without the dot.
    pub file_extension: String,
    /// Progress database path; defaults to the user data directory.
    pub state_path: Option<PathBuf>,
    pub store: StoreSettings,
    pub retry: RetrySettings,
}

fn default_root() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".codex")
}

impl Default for ShadowConfig {
    fn default() -> Self {
        Self {
            root: default_root(),
            include_archived: false,
            file_extension: "jsonl".to_string(),
            state_path: None,
            store: StoreSettings::default(),
            retry: RetrySettings::default(),
        }
    }
}

impl ShadowConfig {
    /// The root with `~/` expanded.
    #[must_use]
    pub fn resolved_root(&self) -> PathBuf {
        expand_home(&self.root)
    }

    /// Progress database path, explicit or default.
    #[must_use]
    pub fn resolved_state_path(&self) -> PathBuf {
        self.state_path
            .as_deref()
            .map_or_else(default_state_path, expand_home)
    }

    #[must_use]
    pub fn locator(&self) -> LocatorConfig {
        LocatorConfig {
            root: self.resolved_root(),
            include_archived: self.include_archived,
            naming: RolloutNaming::with_extension(self.file_extension.clone()),
        }
        .with_absolute_root()
    }

    #[must_use]
    pub fn store_config(&self) -> StoreConfig {
        StoreConfig {
            locator: self.locator(),
            debounce: Duration::from_millis(self.store.debounce_ms),
            notify_throttle: Duration::from_millis(self.store.notify_throttle_ms),
            persist_debounce: Duration::from_millis(self.store.persist_debounce_ms),
            dedup_capacity: self.store.dedup_capacity,
            rewind_margin: self.store.rewind_margin_bytes,
            read_chunk_bytes: self.store.read_chunk_bytes,
            retry: self.retry.policy(),
        }
    }
}

fn expand_home(path: &Path) -> PathBuf {
    match path.strip_prefix("~") {
        Ok(rest) => dirs::home_dir().map_or_else(|| path.to_path_buf(), |home| home.join(rest)),
        Err(_) => path.to_path_buf(),
    }
}

/// Session store tuning.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreSettings {
    pub debounce_ms: u64,
    pub notify_throttle_ms: u64,
    pub persist_debounce_ms: u64,
    pub dedup_capacity: usize,
    pub rewind_margin_bytes: u64,
    pub read_chunk_bytes: usize,
}

impl Default for StoreSettings {
    fn default() -> Self {
        Self {
            debounce_ms: 150,
            notify_throttle_ms: 250,
            persist_debounce_ms: 1000,
            dedup_capacity: 10_000,
            rewind_margin_bytes: 4096,
            read_chunk_bytes: 1 << 20,
        }
    }
}

/// Backoff for transient poll failures.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrySettings {
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
    /// Total attempts per poll, including the first.
    pub max_attempts: u32,
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            base_delay_ms: 100,
            max_delay_ms: 2000,
            max_attempts: 4,
        }
    }
}

impl RetrySettings {
    #[must_use]
    pub fn policy(&self) -> RetryPolicy {
        RetryPolicy {
            base_delay: Duration::from_millis(self.base_delay_ms),
            max_delay: Duration::from_millis(self.max_delay_ms),
            max_attempts: self.max_attempts,
        }
    }
}
