//! Database schema for the key-value blob store.

/// SQL schema for the progress database.
pub const SCHEMA: &str = r"
PRAGMA journal_mode = WAL;

CREATE TABLE IF NOT EXISTS kv (
    key TEXT PRIMARY KEY NOT NULL,
    value BLOB NOT NULL,
    updated_at TEXT NOT NULL DEFAULT (datetime('now'))
);
";
