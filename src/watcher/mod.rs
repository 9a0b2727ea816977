//! Watcher module for agent rollout files.
//!
//! Locates rollout files, watches their directories, and parses appended
//! lines incrementally.

mod error;
mod fs_watcher;
mod locator;
mod parser;
mod record;

pub use error::WatcherError;
pub use fs_watcher::{
    is_under_roots, RolloutWatcher, WatchKind, WatchNotification, DEFAULT_SETTLE_DELAY,
};
pub use locator::{
    collect_rollout_files, datetime_from_millis, describe_session, parse_timestamp,
    read_first_record, scan, session_key_for, LocatorConfig, RolloutNaming, SessionInfo,
    ARCHIVED_SESSIONS_DIR, SESSIONS_DIR,
};
pub use parser::{
    mtime_millis, poll, FileResumeState, FileStat, PollOutcome, DEFAULT_CHUNK_BYTES,
};
pub use record::{RawRecord, RecordType, SessionMeta, PARSE_ERROR_TEXT_LIMIT};
