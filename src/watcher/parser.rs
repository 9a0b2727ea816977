//! Incremental rollout parser.
//!
//! Reads only the bytes appended since the previous call. All resumable
//! state travels in [`FileResumeState`]; nothing is kept between calls.

use std::path::{Path, PathBuf};
use std::time::UNIX_EPOCH;

use tokio::fs::File;
use tokio::io::{AsyncReadExt, AsyncSeekExt};

use super::error::WatcherError;
use super::record::RawRecord;

/// Default upper bound on a single read.
pub const DEFAULT_CHUNK_BYTES: usize = 1 << 20;

/// Resume position for one rollout file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileResumeState {
    /// Absolute path of the file.
    pub path: PathBuf,
    /// Bytes consumed so far, including those held in `pending`.
    pub offset: u64,
    /// Bytes read past the last newline.
    pub pending: Vec<u8>,
    /// Sequence number assigned to the next record.
    pub sequence: u64,
    /// File size observed at the last read.
    pub last_size: u64,
    /// Modification time (ms since epoch) observed at the last read.
    pub last_mtime_ms: Option<i64>,
    /// Discard bytes through the first newline before parsing.
    pub align_to_line_start: bool,
    /// Bytes already discarded while looking for that newline.
    pub skipped: u64,
}

impl FileResumeState {
    /// State for a file that has never been read.
    #[must_use]
    pub fn new(path: PathBuf) -> Self {
        Self {
            path,
            offset: 0,
            pending: Vec::new(),
            sequence: 0,
            last_size: 0,
            last_mtime_ms: None,
            align_to_line_start: false,
            skipped: 0,
        }
    }

    /// State resuming at `offset`, which may fall in the middle of a line.
    ///
    /// Reading restarts one byte early so that a newline immediately before
    /// `offset` is seen; everything up to and including the first newline is
    /// dropped.
    #[must_use]
    pub fn resume_at(path: PathBuf, offset: u64, sequence: u64) -> Self {
        let mut state = Self::new(path);
        state.sequence = sequence;
        if offset > 0 {
            state.offset = offset - 1;
            state.align_to_line_start = true;
        }
        state
    }

    /// Offset of the first byte not yet part of a complete line.
    #[must_use]
    pub fn committed_offset(&self) -> u64 {
        if self.align_to_line_start {
            return if self.skipped == 0 {
                self.offset + 1
            } else {
                self.offset
            };
        }
        self.offset.saturating_sub(self.pending.len() as u64)
    }

    fn reset(&mut self) {
        self.offset = 0;
        self.pending.clear();
        self.sequence = 0;
        self.align_to_line_start = false;
        self.skipped = 0;
    }
}

/// Size and modification time observed by a poll.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileStat {
    pub size: u64,
    pub mtime_ms: Option<i64>,
}

impl FileStat {
    /// Stat `path`.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be stat'ed.
    pub async fn of(path: &Path) -> Result<Self, WatcherError> {
        let metadata = tokio::fs::metadata(path)
            .await
            .map_err(|e| WatcherError::from_io(path, e))?;
        Ok(Self::from_metadata(&metadata))
    }

    /// Build from already-fetched metadata.
    #[must_use]
    pub fn from_metadata(metadata: &std::fs::Metadata) -> Self {
        Self {
            size: metadata.len(),
            mtime_ms: mtime_millis(metadata),
        }
    }
}

/// Modification time of `metadata` in milliseconds since the Unix epoch.
#[must_use]
pub fn mtime_millis(metadata: &std::fs::Metadata) -> Option<i64> {
    let modified = metadata.modified().ok()?;
    let since_epoch = modified.duration_since(UNIX_EPOCH).ok()?;
    i64::try_from(since_epoch.as_millis()).ok()
}

/// Result of one [`poll`].
#[derive(Debug, Clone)]
pub struct PollOutcome {
    /// Records parsed from complete lines, in file order.
    pub records: Vec<RawRecord>,
    /// State to commit if the caller accepts this poll.
    pub state: FileResumeState,
    /// The file shrank and was re-read from the beginning.
    pub truncated: bool,
    /// What the file looked like when the poll started.
    pub stat: FileStat,
}

/// Read the bytes appended to `path` since `previous`.
///
/// Reads at most `chunk_bytes` per read call and stops at the size observed
/// when the poll started; anything appended later is left for the next poll.
/// A trailing fragment without a newline is carried in the returned state's
/// `pending` buffer. Lines that are not valid JSON become parse-error
/// records and do not interrupt the batch.
///
/// # Errors
///
/// Returns an error if the file cannot be stat'ed, opened, or read.
pub async fn poll(
    path: &Path,
    previous: &FileResumeState,
    chunk_bytes: usize,
) -> Result<PollOutcome, WatcherError> {
    let stat = FileStat::of(path).await?;

    let mut state = previous.clone();
    state.path = path.to_path_buf();

    let mut truncated = false;
    if stat.size < state.offset {
        tracing::warn!(
            path = %path.display(),
            old_offset = state.offset,
            new_len = stat.size,
            "Rollout file truncated, re-reading from start"
        );
        state.reset();
        truncated = true;
    }

    if stat.size <= state.offset {
        if truncated {
            state.last_size = stat.size;
            state.last_mtime_ms = stat.mtime_ms;
        }
        return Ok(PollOutcome {
            records: Vec::new(),
            state,
            truncated,
            stat,
        });
    }

    let mut file = File::open(path)
        .await
        .map_err(|e| WatcherError::from_io(path, e))?;
    file.seek(std::io::SeekFrom::Start(state.offset)).await?;

    let mut remaining = stat.size - state.offset;
    let mut carry = std::mem::take(&mut state.pending);
    // File offset of carry[0].
    let mut carry_start = state.offset - carry.len() as u64;
    let mut buf = vec![0u8; chunk_bytes.max(1)];
    let mut records = Vec::new();

    while remaining > 0 {
        let want = usize::try_from(remaining).map_or(buf.len(), |r| r.min(buf.len()));
        let read = file.read(&mut buf[..want]).await?;
        if read == 0 {
            break;
        }
        remaining -= read as u64;
        state.offset += read as u64;
        carry.extend_from_slice(&buf[..read]);

        if state.align_to_line_start {
            let Some(newline) = carry.iter().position(|b| *b == b'\n') else {
                carry_start += carry.len() as u64;
                state.skipped += carry.len() as u64;
                carry.clear();
                continue;
            };
            carry.drain(..=newline);
            carry_start += newline as u64 + 1;
            state.align_to_line_start = false;
            state.skipped = 0;
        }

        let mut consumed = 0;
        while let Some(newline) = carry[consumed..].iter().position(|b| *b == b'\n') {
            let line = &carry[consumed..consumed + newline];
            let line = line.strip_suffix(b"\r").unwrap_or(line);
            if !line.iter().all(u8::is_ascii_whitespace) {
                records.push(RawRecord::from_line(
                    line,
                    state.sequence,
                    carry_start + consumed as u64,
                ));
                state.sequence += 1;
            }
            consumed += newline + 1;
        }
        carry.drain(..consumed);
        carry_start += consumed as u64;
    }

    state.pending = carry;
    state.last_size = stat.size;
    state.last_mtime_ms = stat.mtime_ms;

    Ok(PollOutcome {
        records,
        state,
        truncated,
        stat,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::watcher::RecordType;
    use std::io::Write;
    use tempfile::NamedTempFile;

    const META: &str = r#"{"type":"session_meta","timestamp":"2024-01-01T00:00:00Z","payload":{"id":"abc","cwd":"/tmp"}}"#;
    const USER: &str = r#"{"type":"event_msg","timestamp":"2024-01-01T00:00:01Z","payload":{"type":"user_message","message":"hi"}}"#;

    fn append(file: &mut NamedTempFile, bytes: &[u8]) {
        file.write_all(bytes).unwrap();
        file.flush().unwrap();
    }

    #[tokio::test]
    async fn test_poll_reads_complete_lines() {
        let mut file = NamedTempFile::new().unwrap();
        append(&mut file, format!("{META}\n{USER}\n").as_bytes());

        let state = FileResumeState::new(file.path().to_path_buf());
        let outcome = poll(file.path(), &state, DEFAULT_CHUNK_BYTES).await.unwrap();

        assert_eq!(outcome.records.len(), 2);
        assert_eq!(outcome.records[0].sequence, 0);
        assert_eq!(outcome.records[1].sequence, 1);
        assert_eq!(outcome.records[0].offset, 0);
        assert_eq!(outcome.records[1].offset, META.len() as u64 + 1);
        assert!(!outcome.truncated);
        assert!(outcome.state.pending.is_empty());
        assert_eq!(outcome.state.offset, outcome.stat.size);
    }

    #[tokio::test]
    async fn test_poll_unchanged_file_yields_nothing() {
        let mut file = NamedTempFile::new().unwrap();
        append(&mut file, format!("{META}\n").as_bytes());

        let state = FileResumeState::new(file.path().to_path_buf());
        let first = poll(file.path(), &state, DEFAULT_CHUNK_BYTES).await.unwrap();
        let second = poll(file.path(), &first.state, DEFAULT_CHUNK_BYTES)
            .await
            .unwrap();

        assert_eq!(first.records.len(), 1);
        assert!(second.records.is_empty());
        assert_eq!(second.state, first.state);
    }

    #[tokio::test]
    async fn test_partial_line_held_until_newline() {
        let mut file = NamedTempFile::new().unwrap();
        append(&mut file, format!("{META}\n{USER}").as_bytes());

        let state = FileResumeState::new(file.path().to_path_buf());
        let first = poll(file.path(), &state, DEFAULT_CHUNK_BYTES).await.unwrap();
        assert_eq!(first.records.len(), 1);
        assert_eq!(first.records[0].record_type, RecordType::SessionMeta);
        assert_eq!(first.state.pending, USER.as_bytes());
        assert_eq!(first.state.committed_offset(), META.len() as u64 + 1);

        append(&mut file, b"\n");
        let second = poll(file.path(), &first.state, DEFAULT_CHUNK_BYTES)
            .await
            .unwrap();
        assert_eq!(second.records.len(), 1);
        assert_eq!(second.records[0].record_type, RecordType::EventMsg);
        assert_eq!(second.records[0].sequence, 1);
        assert_eq!(second.records[0].offset, META.len() as u64 + 1);
        assert!(second.state.pending.is_empty());
    }

    #[tokio::test]
    async fn test_split_at_every_boundary_matches_single_read() {
        let content = format!("{META}\r\n\n{USER}\nnot valid json\n");
        let mut whole_file = NamedTempFile::new().unwrap();
        append(&mut whole_file, content.as_bytes());
        let whole = poll(
            whole_file.path(),
            &FileResumeState::new(whole_file.path().to_path_buf()),
            DEFAULT_CHUNK_BYTES,
        )
        .await
        .unwrap()
        .records;
        assert_eq!(whole.len(), 3);

        for split in [1, 10, META.len(), META.len() + 1, META.len() + 2, content.len() - 3] {
            let mut file = NamedTempFile::new().unwrap();
            append(&mut file, &content.as_bytes()[..split]);
            let state = FileResumeState::new(file.path().to_path_buf());
            let first = poll(file.path(), &state, 7).await.unwrap();
            append(&mut file, &content.as_bytes()[split..]);
            let second = poll(file.path(), &first.state, 7).await.unwrap();

            let mut records = first.records;
            records.extend(second.records);
            assert_eq!(records, whole, "split at {split}");
        }
    }

    #[tokio::test]
    async fn test_small_chunks_read_everything() {
        let mut file = NamedTempFile::new().unwrap();
        append(&mut file, format!("{META}\n{USER}\n{USER}\n").as_bytes());

        let state = FileResumeState::new(file.path().to_path_buf());
        let outcome = poll(file.path(), &state, 16).await.unwrap();
        assert_eq!(outcome.records.len(), 3);
        assert_eq!(outcome.records[2].sequence, 2);
    }

    #[tokio::test]
    async fn test_bad_line_does_not_block_batch() {
        let mut file = NamedTempFile::new().unwrap();
        append(&mut file, format!("not valid json\n{USER}\n").as_bytes());

        let state = FileResumeState::new(file.path().to_path_buf());
        let outcome = poll(file.path(), &state, DEFAULT_CHUNK_BYTES).await.unwrap();
        assert_eq!(outcome.records.len(), 2);
        assert_eq!(outcome.records[0].record_type, RecordType::ParseError);
        assert_eq!(outcome.records[1].record_type, RecordType::EventMsg);
    }

    #[tokio::test]
    async fn test_truncation_resets_state() {
        let file = NamedTempFile::new().unwrap();
        let path = file.path().to_path_buf();
        std::fs::write(&path, format!("{META}\n{USER}\n")).unwrap();

        let state = FileResumeState::new(path.clone());
        let first = poll(&path, &state, DEFAULT_CHUNK_BYTES).await.unwrap();
        assert_eq!(first.records.len(), 2);

        std::fs::write(&path, format!("{USER}\n")).unwrap();
        let second = poll(&path, &first.state, DEFAULT_CHUNK_BYTES).await.unwrap();
        assert!(second.truncated);
        assert_eq!(second.records.len(), 1);
        assert_eq!(second.records[0].sequence, 0);
        assert_eq!(second.records[0].offset, 0);
    }

    #[tokio::test]
    async fn test_truncation_to_empty_reports_truncated() {
        let file = NamedTempFile::new().unwrap();
        let path = file.path().to_path_buf();
        std::fs::write(&path, format!("{META}\n")).unwrap();

        let first = poll(&path, &FileResumeState::new(path.clone()), DEFAULT_CHUNK_BYTES)
            .await
            .unwrap();
        std::fs::write(&path, "").unwrap();
        let second = poll(&path, &first.state, DEFAULT_CHUNK_BYTES).await.unwrap();
        assert!(second.truncated);
        assert!(second.records.is_empty());
        assert_eq!(second.state.offset, 0);
        assert_eq!(second.state.sequence, 0);
    }

    #[tokio::test]
    async fn test_resume_mid_line_skips_fragment() {
        let mut file = NamedTempFile::new().unwrap();
        append(&mut file, format!("{META}\n{USER}\n").as_bytes());

        let state = FileResumeState::resume_at(file.path().to_path_buf(), 5, 10);
        let outcome = poll(file.path(), &state, DEFAULT_CHUNK_BYTES).await.unwrap();
        assert_eq!(outcome.records.len(), 1);
        assert_eq!(outcome.records[0].record_type, RecordType::EventMsg);
        assert_eq!(outcome.records[0].offset, META.len() as u64 + 1);
        assert_eq!(outcome.records[0].sequence, 10);
    }

    #[tokio::test]
    async fn test_resume_on_line_boundary_keeps_line() {
        let mut file = NamedTempFile::new().unwrap();
        append(&mut file, format!("{META}\n{USER}\n").as_bytes());

        let boundary = META.len() as u64 + 1;
        let state = FileResumeState::resume_at(file.path().to_path_buf(), boundary, 1);
        assert_eq!(state.committed_offset(), boundary);
        let outcome = poll(file.path(), &state, DEFAULT_CHUNK_BYTES).await.unwrap();
        assert_eq!(outcome.records.len(), 1);
        assert_eq!(outcome.records[0].offset, boundary);
    }

    #[tokio::test]
    async fn test_resume_inside_unfinished_line_commits_read_position() {
        let mut file = NamedTempFile::new().unwrap();
        append(&mut file, META.as_bytes());

        let state = FileResumeState::resume_at(file.path().to_path_buf(), 5, 0);
        let outcome = poll(file.path(), &state, DEFAULT_CHUNK_BYTES).await.unwrap();
        assert!(outcome.records.is_empty());
        assert!(outcome.state.align_to_line_start);
        assert_eq!(outcome.state.committed_offset(), META.len() as u64);
        assert!(outcome.state.committed_offset() <= outcome.stat.size);

        append(&mut file, format!("\n{USER}\n").as_bytes());
        let next = poll(file.path(), &outcome.state, DEFAULT_CHUNK_BYTES)
            .await
            .unwrap();
        assert_eq!(next.records.len(), 1);
        assert_eq!(next.records[0].record_type, RecordType::EventMsg);
        assert_eq!(next.state.committed_offset(), next.stat.size);
    }

    #[tokio::test]
    async fn test_missing_file_is_error() {
        let path = PathBuf::from("/tmp/nonexistent-rollout-12345.jsonl");
        let result = poll(&path, &FileResumeState::new(path.clone()), DEFAULT_CHUNK_BYTES).await;
        assert!(matches!(result, Err(WatcherError::FileDeleted(_))));
    }
}
