//! Key-value blob stores for progress snapshots.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use rusqlite::{params, Connection, OptionalExtension};
use tokio::sync::Mutex;

use super::error::PersistError;
use super::schema::SCHEMA;

/// Returns the default path for the progress database.
///
/// This is `~/.local/share/shadow-tail/progress.db` on Unix systems.
#[must_use]
pub fn default_state_path() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("shadow-tail")
        .join("progress.db")
}

/// Durable key-value storage for opaque blobs.
#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Load the blob stored under `key`, if any.
    async fn load(&self, key: &str) -> Result<Option<Vec<u8>>, PersistError>;

    /// Store `value` under `key`, replacing any previous blob.
    async fn save(&self, key: &str, value: Vec<u8>) -> Result<(), PersistError>;
}

/// `SQLite`-backed blob store.
///
/// Uses a single `kv` table in WAL mode, with async operations via
/// `spawn_blocking`.
#[derive(Debug, Clone)]
pub struct SqliteBlobStore {
    conn: Arc<Mutex<Connection>>,
    path: Option<PathBuf>,
}

impl SqliteBlobStore {
    /// Open a blob store at the specified path.
    ///
    /// Creates parent directories if they don't exist and initializes the schema.
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be opened or the schema cannot be applied.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self, PersistError> {
        let path = path.as_ref().to_path_buf();

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                tokio::fs::create_dir_all(parent).await.map_err(|source| {
                    PersistError::CreateDir {
                        path: parent.to_path_buf(),
                        source,
                    }
                })?;
            }
        }

        let path_clone = path.clone();
        let conn = tokio::task::spawn_blocking(move || -> Result<Connection, PersistError> {
            let conn =
                Connection::open(&path_clone).map_err(|source| PersistError::DatabaseOpen {
                    path: path_clone,
                    source,
                })?;
            conn.execute_batch(SCHEMA)?;
            Ok(conn)
        })
        .await
        .map_err(|_| PersistError::TaskCancelled)??;

        tracing::debug!(path = %path.display(), "Opened progress database");
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            path: Some(path),
        })
    }

    /// Open an in-memory blob store for testing.
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be created or the schema cannot be applied.
    pub async fn open_in_memory() -> Result<Self, PersistError> {
        let conn = tokio::task::spawn_blocking(|| -> Result<Connection, PersistError> {
            let conn = Connection::open_in_memory()?;
            conn.execute_batch(SCHEMA)?;
            Ok(conn)
        })
        .await
        .map_err(|_| PersistError::TaskCancelled)??;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            path: None,
        })
    }

    /// Returns the path to the database, if opened from a file.
    #[must_use]
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }
}

#[async_trait]
impl BlobStore for SqliteBlobStore {
    async fn load(&self, key: &str) -> Result<Option<Vec<u8>>, PersistError> {
        let key = key.to_string();
        let conn = self.conn.clone();
        tokio::task::spawn_blocking(move || -> Result<Option<Vec<u8>>, PersistError> {
            let conn = conn.blocking_lock();
            let value = conn
                .query_row("SELECT value FROM kv WHERE key = ?1", params![key], |row| {
                    row.get(0)
                })
                .optional()?;
            Ok(value)
        })
        .await
        .map_err(|_| PersistError::TaskCancelled)?
    }

    async fn save(&self, key: &str, value: Vec<u8>) -> Result<(), PersistError> {
        let key = key.to_string();
        let updated_at = chrono::Utc::now().to_rfc3339();
        let conn = self.conn.clone();
        tokio::task::spawn_blocking(move || -> Result<(), PersistError> {
            let conn = conn.blocking_lock();
            conn.execute(
                "INSERT OR REPLACE INTO kv (key, value, updated_at) VALUES (?1, ?2, ?3)",
                params![key, value, updated_at],
            )?;
            Ok(())
        })
        .await
        .map_err(|_| PersistError::TaskCancelled)?
    }
}

/// In-process blob store, for tests and ephemeral runs.
#[derive(Debug, Default)]
pub struct MemoryBlobStore {
    blobs: Mutex<HashMap<String, Vec<u8>>>,
    saves: AtomicUsize,
}

impl MemoryBlobStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of successful `save` calls so far.
    #[must_use]
    pub fn save_count(&self) -> usize {
        self.saves.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl BlobStore for MemoryBlobStore {
    async fn load(&self, key: &str) -> Result<Option<Vec<u8>>, PersistError> {
        Ok(self.blobs.lock().await.get(key).cloned())
    }

    async fn save(&self, key: &str, value: Vec<u8>) -> Result<(), PersistError> {
        self.blobs.lock().await.insert(key.to_string(), value);
        self.saves.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}
