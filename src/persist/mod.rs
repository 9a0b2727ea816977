//! Durable progress storage.
//!
//! A snapshot of per-file resume progress is encoded as one blob and kept
//! in a [`BlobStore`], by default an `SQLite` key-value table.

mod blob;
mod error;
mod schema;
mod snapshot;

pub use blob::{default_state_path, BlobStore, MemoryBlobStore, SqliteBlobStore};
pub use error::PersistError;
pub use schema::SCHEMA;
pub use snapshot::{FileProgress, ProgressSnapshot, SNAPSHOT_KEY, SNAPSHOT_VERSION};
