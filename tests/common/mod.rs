//! Shared fixtures for integration tests.

#![allow(dead_code)]

use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use shadow_tail::persist::{BlobStore, MemoryBlobStore};
use shadow_tail::store::{RetryPolicy, SessionStore, StoreConfig, StoreEvent};
use shadow_tail::watcher::LocatorConfig;
use tempfile::TempDir;
use tokio::sync::broadcast;

pub const META: &str = r#"{"type":"session_meta","timestamp":"2024-01-01T00:00:00Z","payload":{"id":"abc","cwd":"/tmp"}}"#;
pub const USER: &str = r#"{"type":"event_msg","timestamp":"2024-01-01T00:00:01Z","payload":{"type":"user_message","message":"hi"}}"#;
pub const AGENT: &str = r#"{"type":"event_msg","timestamp":"2024-01-01T00:00:02Z","payload":{"type":"agent_message","message":"hello"}}"#;

/// A temporary agent home with one session directory.
pub struct Home {
    _temp: TempDir,
    pub root: PathBuf,
    pub session_dir: PathBuf,
}

impl Home {
    pub fn new() -> Self {
        let temp = TempDir::new().expect("Failed to create temp dir");
        let root = temp.path().to_path_buf();
        let session_dir = root.join("sessions").join("2024").join("01").join("s1");
        std::fs::create_dir_all(&session_dir).expect("Failed to create session dir");
        Self {
            _temp: temp,
            root,
            session_dir,
        }
    }

    pub fn key(&self) -> String {
        self.session_dir.to_string_lossy().into_owned()
    }

    pub fn rollout(&self, name: &str) -> PathBuf {
        self.session_dir.join(name)
    }

    /// Append raw text to a rollout file, creating it if needed.
    pub fn append(&self, name: &str, content: &str) -> PathBuf {
        let path = self.rollout(name);
        append_to(&path, content);
        path
    }

    pub fn config(&self) -> StoreConfig {
        let mut config = StoreConfig::new(LocatorConfig::new(&self.root));
        config.debounce = Duration::from_millis(20);
        config.notify_throttle = Duration::from_millis(20);
        config.persist_debounce = Duration::from_millis(20);
        config.retry = RetryPolicy {
            base_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(5),
            max_attempts: 3,
        };
        config
    }
}

pub fn append_to(path: &Path, content: &str) {
    let mut file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .expect("Failed to open rollout");
    file.write_all(content.as_bytes())
        .expect("Failed to append to rollout");
    file.flush().expect("Failed to flush rollout");
}

pub async fn open_store(config: StoreConfig, blobs: Arc<MemoryBlobStore>) -> SessionStore {
    let blobs: Arc<dyn BlobStore> = blobs;
    SessionStore::open(config, blobs)
        .await
        .expect("Failed to open store")
}

/// Wait for the first event matching `pred`, failing after five seconds.
pub async fn wait_for(
    rx: &mut broadcast::Receiver<StoreEvent>,
    pred: impl Fn(&StoreEvent) -> bool,
) -> StoreEvent {
    tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            match rx.recv().await {
                Ok(event) if pred(&event) => return event,
                Ok(_) | Err(broadcast::error::RecvError::Lagged(_)) => continue,
                Err(broadcast::error::RecvError::Closed) => panic!("store channel closed"),
            }
        }
    })
    .await
    .expect("Timed out waiting for store event")
}
