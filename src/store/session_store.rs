//! The session store.
//!
//! Owns every per-file resume state, the session index, and the per-session
//! event lists. Change notifications feed a debounced single-flight flush;
//! each flushed file is polled, its records extracted, and the resulting
//! events merged into its session.

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, PoisonError};
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use tokio::sync::{broadcast, mpsc, Mutex, Notify};
use tokio_util::sync::CancellationToken;

use super::error::StoreError;
use super::retry::RetryPolicy;
use super::scheduler::{Debounce, FlushScheduler, Throttle};
use super::session_log::{CallPair, SessionLog};
use crate::extract::{ExtractContext, Extractor, ShadowEvent};
use crate::persist::{BlobStore, FileProgress, ProgressSnapshot, SNAPSHOT_KEY};
use crate::watcher::{
    datetime_from_millis, describe_session, is_under_roots, poll, scan, session_key_for,
    FileResumeState, FileStat, LocatorConfig, PollOutcome, SessionInfo, SessionMeta,
    WatchKind, WatchNotification, DEFAULT_CHUNK_BYTES,
};

/// Capacity of the store event broadcast channel.
const EVENT_CHANNEL_CAPACITY: usize = 256;

/// Tuning for a [`SessionStore`].
#[derive(Debug, Clone, PartialEq)]
pub struct StoreConfig {
    pub locator: LocatorConfig,
    /// Quiet period before a batch of changed files is polled.
    pub debounce: Duration,
    /// Minimum interval between session-list notifications.
    pub notify_throttle: Duration,
    /// Quiet period before progress is written.
    pub persist_debounce: Duration,
    /// Event ids remembered per session for dedup.
    pub dedup_capacity: usize,
    /// Bytes re-read before a persisted offset on resume.
    pub rewind_margin: u64,
    pub read_chunk_bytes: usize,
    pub retry: RetryPolicy,
}

impl StoreConfig {
    /// Default tuning for the given locator.
    #[must_use]
    pub fn new(locator: LocatorConfig) -> Self {
        Self {
            locator,
            debounce: Duration::from_millis(150),
            notify_throttle: Duration::from_millis(250),
            persist_debounce: Duration::from_secs(1),
            dedup_capacity: 10_000,
            rewind_margin: 4096,
            read_chunk_bytes: DEFAULT_CHUNK_BYTES,
            retry: RetryPolicy::default(),
        }
    }
}

/// Notification sent to store subscribers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreEvent {
    /// New events were merged into a session.
    EventsAppended { session_key: String, count: usize },
    /// The session list or a session's recency changed.
    SessionsChanged,
    /// A file could not be polled within the retry budget.
    PollFailed {
        path: PathBuf,
        attempts: u32,
        error: String,
    },
}

/// Summary of one flushed batch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FlushReport {
    /// Files polled successfully.
    pub polled: usize,
    /// Events admitted across all files.
    pub appended: usize,
    /// Files that exhausted their retries.
    pub failed: usize,
}

#[derive(Debug)]
struct StoreState {
    locator: LocatorConfig,
    sessions: BTreeMap<String, SessionInfo>,
    files: HashMap<PathBuf, FileResumeState>,
    logs: HashMap<String, SessionLog>,
    /// Progress as last loaded or committed, keyed by path.
    progress: BTreeMap<String, FileProgress>,
    translations: Option<BTreeMap<String, String>>,
}

impl StoreState {
    fn snapshot(&self) -> ProgressSnapshot {
        ProgressSnapshot {
            files: self.progress.clone(),
            translations: self.translations.clone(),
            ..ProgressSnapshot::default()
        }
    }
}

#[derive(Debug)]
struct Timers {
    flush: FlushScheduler,
    notify: Throttle,
    persist: Debounce,
}

/// What a merge changed.
struct Merged {
    session_key: String,
    appended: usize,
    recency_changed: bool,
}

/// Incrementally ingests rollout files into per-session event lists.
///
/// Shared through `Arc`; every method takes `&self`.
pub struct SessionStore {
    config: StoreConfig,
    extractor: Extractor,
    blobs: Arc<dyn BlobStore>,
    state: Mutex<StoreState>,
    timers: std::sync::Mutex<Timers>,
    poll_gate: Mutex<()>,
    events: broadcast::Sender<StoreEvent>,
    wake: Notify,
    stopped: AtomicBool,
    /// Cancelled by [`SessionStore::stop`]; ends [`SessionStore::run`].
    shutdown: CancellationToken,
}

impl std::fmt::Debug for SessionStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionStore")
            .field("config", &self.config)
            .field("stopped", &self.stopped.load(Ordering::SeqCst))
            .finish_non_exhaustive()
    }
}

impl SessionStore {
    /// Open a store, load saved progress from `blobs`, and scan for sessions.
    ///
    /// A snapshot that is missing, unreadable, or of another version is
    /// treated as no prior progress.
    ///
    /// # Errors
    ///
    /// Returns an error if the blob store cannot be read or the scan task fails.
    pub async fn open(
        mut config: StoreConfig,
        blobs: Arc<dyn BlobStore>,
    ) -> Result<Self, StoreError> {
        config.locator = config.locator.with_absolute_root();
        let stored = blobs.load(SNAPSHOT_KEY).await?;
        let snapshot = ProgressSnapshot::decode_or_default(stored.as_deref());
        tracing::info!(files = snapshot.files.len(), "Loaded progress snapshot");

        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        let store = Self {
            extractor: Extractor::new(),
            blobs,
            state: Mutex::new(StoreState {
                locator: config.locator.clone(),
                sessions: BTreeMap::new(),
                files: HashMap::new(),
                logs: HashMap::new(),
                progress: snapshot.files,
                translations: snapshot.translations,
            }),
            timers: std::sync::Mutex::new(Timers {
                flush: FlushScheduler::new(config.debounce),
                notify: Throttle::new(config.notify_throttle),
                persist: Debounce::new(config.persist_debounce),
            }),
            poll_gate: Mutex::new(()),
            events,
            wake: Notify::new(),
            stopped: AtomicBool::new(false),
            shutdown: CancellationToken::new(),
            config,
        };
        store.rescan().await?;
        Ok(store)
    }

    fn timers(&self) -> std::sync::MutexGuard<'_, Timers> {
        self.timers.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn emit(&self, event: StoreEvent) {
        // No subscribers is fine.
        let _ = self.events.send(event);
    }

    fn emit_sessions_changed(&self) {
        self.timers().notify.fire(Instant::now());
        self.emit(StoreEvent::SessionsChanged);
    }

    fn request_sessions_changed(&self) {
        let fire = self.timers().notify.request(Instant::now());
        if fire {
            self.emit(StoreEvent::SessionsChanged);
        } else {
            self.wake.notify_one();
        }
    }

    fn schedule_persist(&self) {
        self.timers().persist.schedule(Instant::now());
        self.wake.notify_one();
    }

    /// Subscribe to store notifications.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<StoreEvent> {
        self.events.subscribe()
    }

    /// Whether [`SessionStore::stop`] has run.
    #[must_use]
    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::SeqCst)
    }

    /// Current locator options.
    pub async fn locator(&self) -> LocatorConfig {
        self.state.lock().await.locator.clone()
    }

    /// Re-derive the session list from the filesystem.
    ///
    /// The index is replaced wholesale; event lists and resume states are
    /// keyed by path and survive. Returns the number of sessions found.
    ///
    /// # Errors
    ///
    /// Returns an error if the scan task is cancelled.
    pub async fn rescan(&self) -> Result<usize, StoreError> {
        let locator = self.locator().await;
        let scanned = tokio::task::spawn_blocking(move || scan(&locator))
            .await
            .map_err(|_| StoreError::TaskCancelled)?;
        let count = scanned.len();

        {
            let mut state = self.state.lock().await;
            let previous = std::mem::take(&mut state.sessions);
            state.sessions = scanned
                .into_iter()
                .map(|mut info| {
                    if let Some(old) = previous.get(&info.key) {
                        carry_forward(&mut info, old);
                    }
                    (info.key.clone(), info)
                })
                .collect();
        }

        tracing::info!(sessions = count, "Rescanned rollout sessions");
        self.emit_sessions_changed();
        Ok(count)
    }

    /// Swap locator options and rescan.
    ///
    /// A relative root is made absolute first.
    ///
    /// # Errors
    ///
    /// Returns an error if the rescan fails.
    pub async fn reconfigure(&self, locator: LocatorConfig) -> Result<usize, StoreError> {
        self.state.lock().await.locator = locator.with_absolute_root();
        self.rescan().await
    }

    /// Queue `path` for the next debounced flush.
    pub fn enqueue(&self, path: impl Into<PathBuf>) {
        if self.is_stopped() {
            return;
        }
        self.timers().flush.enqueue(path.into(), Instant::now());
        self.wake.notify_one();
    }

    /// Register an added file with its session, then queue it.
    ///
    /// Notifications outside the configured roots or not matching the
    /// rollout naming are ignored.
    ///
    /// # Errors
    ///
    /// Returns an error if describing a new session fails.
    pub async fn handle_notification(
        &self,
        notification: WatchNotification,
    ) -> Result<(), StoreError> {
        if self.is_stopped() {
            return Ok(());
        }
        let locator = self.locator().await;
        let roots: Vec<PathBuf> = locator
            .session_roots()
            .into_iter()
            .map(|(root, _)| root)
            .collect();
        if !locator.naming.matches(&notification.path)
            || !is_under_roots(&notification.path, &roots)
        {
            tracing::trace!(path = %notification.path.display(), "Ignoring notification");
            return Ok(());
        }

        if notification.kind == WatchKind::Added && self.register_file(&notification.path).await? {
            self.request_sessions_changed();
        }
        self.enqueue(notification.path);
        Ok(())
    }

    /// Add `path` to its session, creating the session if needed.
    ///
    /// Returns `true` if the index changed.
    async fn register_file(&self, path: &Path) -> Result<bool, StoreError> {
        let Some(dir) = path.parent().map(Path::to_path_buf) else {
            return Ok(false);
        };
        let key = dir.to_string_lossy().into_owned();
        let archived = {
            let mut state = self.state.lock().await;
            if let Some(info) = state.sessions.get_mut(&key) {
                return Ok(add_file(info, path));
            }
            state.locator.is_archived(path)
        };

        let file = path.to_path_buf();
        let described =
            tokio::task::spawn_blocking(move || describe_session(&dir, vec![file], archived))
                .await
                .map_err(|_| StoreError::TaskCancelled)?;

        let mut state = self.state.lock().await;
        match state.sessions.get_mut(&key) {
            Some(info) => Ok(add_file(info, path)),
            None => {
                tracing::info!(session = %key, "Discovered new session");
                state.sessions.insert(key, described);
                Ok(true)
            }
        }
    }

    /// Flush the pending batch if its debounce has elapsed.
    pub async fn flush_due(&self, now: Instant) -> FlushReport {
        if self.is_stopped() {
            return FlushReport::default();
        }
        let batch = self.timers().flush.take_ready(now);
        match batch {
            Some(batch) => self.flush_batch(batch).await,
            None => FlushReport::default(),
        }
    }

    /// Flush the pending batch now, ignoring the debounce.
    ///
    /// Does nothing while another batch is in flight.
    pub async fn flush_pending(&self) -> FlushReport {
        if self.is_stopped() {
            return FlushReport::default();
        }
        let batch = self.timers().flush.take_all();
        match batch {
            Some(batch) => self.flush_batch(batch).await,
            None => FlushReport::default(),
        }
    }

    async fn flush_batch(&self, batch: Vec<PathBuf>) -> FlushReport {
        let _gate = self.poll_gate.lock().await;
        tracing::debug!(files = batch.len(), "Flushing changed rollout files");

        let mut report = FlushReport::default();
        for path in &batch {
            match self.poll_file(path).await {
                Ok(appended) => {
                    report.polled += 1;
                    report.appended += appended;
                }
                Err(e) => {
                    report.failed += 1;
                    self.report_failure(path, &e);
                }
            }
        }

        self.timers().flush.finish(Instant::now());
        self.wake.notify_one();
        tracing::debug!(
            polled = report.polled,
            appended = report.appended,
            failed = report.failed,
            "Flush complete"
        );
        report
    }

    fn report_failure(&self, path: &Path, error: &StoreError) {
        tracing::warn!(path = %path.display(), error = %error, "Rollout poll failed");
        let attempts = match error {
            StoreError::RetriesExhausted { attempts, .. } => *attempts,
            _ => 1,
        };
        self.emit(StoreEvent::PollFailed {
            path: path.to_path_buf(),
            attempts,
            error: error.to_string(),
        });
    }

    /// Poll every file of a session now and wait for the results.
    ///
    /// Returns the number of events admitted. A file that keeps failing is
    /// reported and skipped.
    ///
    /// # Errors
    ///
    /// Returns an error if the session is unknown or the store is stopped.
    pub async fn warm_session(&self, key: &str) -> Result<usize, StoreError> {
        if self.is_stopped() {
            return Err(StoreError::Stopped);
        }
        let files = self
            .state
            .lock()
            .await
            .sessions
            .get(key)
            .map(|info| info.files.clone())
            .ok_or_else(|| StoreError::UnknownSession(key.to_string()))?;

        let _gate = self.poll_gate.lock().await;
        let mut appended = 0;
        for path in &files {
            match self.poll_file(path).await {
                Ok(count) => appended += count,
                Err(e) => self.report_failure(path, &e),
            }
        }
        tracing::debug!(session = %key, files = files.len(), appended, "Warmed session");
        Ok(appended)
    }

    /// Poll one file and merge its events. Caller holds the poll gate.
    async fn poll_file(&self, path: &Path) -> Result<usize, StoreError> {
        let (previous, saved, known) = {
            let state = self.state.lock().await;
            let known = session_key_for(path).is_some_and(|key| state.sessions.contains_key(&key));
            (
                state.files.get(path).cloned(),
                state.progress.get(&progress_key(path)).copied(),
                known,
            )
        };
        let previous = match previous {
            Some(previous) => previous,
            None => self.resume_state(path, saved).await,
        };
        let outcome = self.poll_with_retry(path, &previous).await?;
        if !known && self.register_file(path).await? {
            self.request_sessions_changed();
        }
        let merged = self.merge(path, outcome).await;

        if merged.appended > 0 {
            self.emit(StoreEvent::EventsAppended {
                session_key: merged.session_key,
                count: merged.appended,
            });
        }
        if merged.recency_changed {
            self.request_sessions_changed();
        }
        self.schedule_persist();
        Ok(merged.appended)
    }

    /// Initial resume state for a file not polled since startup.
    async fn resume_state(&self, path: &Path, saved: Option<FileProgress>) -> FileResumeState {
        let Some(saved) = saved else {
            return FileResumeState::new(path.to_path_buf());
        };
        let Ok(stat) = FileStat::of(path).await else {
            return FileResumeState::new(path.to_path_buf());
        };

        if progress_matches(&saved, stat) {
            let offset = saved.offset.saturating_sub(self.config.rewind_margin);
            tracing::debug!(
                path = %path.display(),
                saved_offset = saved.offset,
                offset,
                "Resuming from saved progress"
            );
            FileResumeState::resume_at(path.to_path_buf(), offset, saved.sequence)
        } else {
            tracing::warn!(
                path = %path.display(),
                saved_offset = saved.offset,
                size = stat.size,
                "Saved progress does not match file, re-reading from start"
            );
            FileResumeState::new(path.to_path_buf())
        }
    }

    async fn poll_with_retry(
        &self,
        path: &Path,
        previous: &FileResumeState,
    ) -> Result<PollOutcome, StoreError> {
        let retry = &self.config.retry;
        let mut attempt = 0;
        loop {
            match poll(path, previous, self.config.read_chunk_bytes).await {
                Ok(outcome) => return Ok(outcome),
                Err(e) if e.is_transient() && retry.should_retry(attempt) => {
                    let delay = retry.delay_for_attempt(attempt);
                    tracing::warn!(
                        path = %path.display(),
                        attempt = attempt + 1,
                        delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                        error = %e,
                        "Poll failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(source) => {
                    return Err(StoreError::RetriesExhausted {
                        path: path.to_path_buf(),
                        attempts: attempt + 1,
                        source,
                    })
                }
            }
        }
    }

    /// Commit a poll: extract, dedup, sort, and update recency.
    async fn merge(&self, path: &Path, outcome: PollOutcome) -> Merged {
        let session_key = session_key_for(path).unwrap_or_default();
        let mtime = outcome.stat.mtime_ms.and_then(datetime_from_millis);
        let fallback_time = mtime.unwrap_or_else(Utc::now);

        let mut guard = self.state.lock().await;
        let state = &mut *guard;
        let mut info = state.sessions.get_mut(&session_key);
        let session_id = info.as_ref().and_then(|i| i.session_id.clone());
        let ctx = ExtractContext {
            session_key: &session_key,
            session_id: session_id.as_deref(),
            path,
            fallback_time,
        };

        let log = state
            .logs
            .entry(session_key.clone())
            .or_insert_with(|| SessionLog::new(self.config.dedup_capacity));
        let mut appended = 0;
        let mut newest: Option<DateTime<Utc>> = None;
        let mut meta: Option<SessionMeta> = None;
        for record in &outcome.records {
            if meta.is_none() {
                meta = SessionMeta::from_record(record);
            }
            for event in self.extractor.extract(&ctx, record) {
                if let Some(event) = log.insert(event) {
                    appended += 1;
                    newest = newest.max(Some(event.timestamp));
                }
            }
        }
        if appended > 0 {
            log.sort();
        }

        let mut recency_changed = false;
        if let Some(info) = info.as_deref_mut() {
            let candidate = newest.max(mtime);
            if let Some(candidate) = candidate.filter(|c| *c > info.updated_at) {
                info.updated_at = candidate;
                recency_changed = true;
            }
            if let Some(meta) = meta {
                recency_changed |= fill_missing(info, meta);
            }
        }

        if outcome.truncated {
            tracing::info!(path = %path.display(), "Re-ingesting truncated rollout file");
        }
        state
            .progress
            .insert(progress_key(path), progress_of(&outcome.state));
        state.files.insert(path.to_path_buf(), outcome.state);

        Merged {
            session_key,
            appended,
            recency_changed,
        }
    }

    /// Sessions, most recently updated first.
    pub async fn get_sessions(&self) -> Vec<SessionInfo> {
        let mut sessions: Vec<SessionInfo> =
            self.state.lock().await.sessions.values().cloned().collect();
        sessions.sort_by(|a, b| b.updated_at.cmp(&a.updated_at).then_with(|| a.key.cmp(&b.key)));
        sessions
    }

    pub async fn get_session(&self, key: &str) -> Option<SessionInfo> {
        self.state.lock().await.sessions.get(key).cloned()
    }

    /// Snapshot of a session's events in `(timestamp, sequence)` order.
    ///
    /// Empty for a session with nothing ingested yet.
    pub async fn get_events(&self, key: &str) -> Vec<Arc<ShadowEvent>> {
        self.state
            .lock()
            .await
            .logs
            .get(key)
            .map(|log| log.events().to_vec())
            .unwrap_or_default()
    }

    /// The call and result sharing `call_id` in a session.
    pub async fn find_call_pair(&self, key: &str, call_id: &str) -> Option<CallPair> {
        self.state.lock().await.logs.get(key)?.call_pair(call_id)
    }

    /// Cached translation for `key`.
    pub async fn translation(&self, key: &str) -> Option<String> {
        self.state
            .lock()
            .await
            .translations
            .as_ref()?
            .get(key)
            .cloned()
    }

    /// Cache a translation; it is persisted with the next snapshot.
    pub async fn put_translation(&self, key: impl Into<String>, text: impl Into<String>) {
        self.state
            .lock()
            .await
            .translations
            .get_or_insert_with(BTreeMap::new)
            .insert(key.into(), text.into());
        self.schedule_persist();
    }

    /// Write the progress snapshot now.
    ///
    /// # Errors
    ///
    /// Returns an error if the snapshot cannot be encoded or saved.
    pub async fn persist_now(&self) -> Result<(), StoreError> {
        let snapshot = self.state.lock().await.snapshot();
        let bytes = snapshot.encode()?;
        self.blobs.save(SNAPSHOT_KEY, bytes).await?;
        tracing::debug!(files = snapshot.files.len(), "Persisted progress snapshot");
        Ok(())
    }

    /// Earliest timer deadline across flush, notify, and persist.
    fn next_deadline(&self) -> Option<Instant> {
        let timers = self.timers();
        [
            timers.flush.deadline(),
            timers.notify.deadline(),
            timers.persist.deadline(),
        ]
        .into_iter()
        .flatten()
        .min()
    }

    /// Fire every timer that is due at `now`.
    async fn fire_due(&self, now: Instant) {
        self.flush_due(now).await;

        let (notify, persist) = {
            let mut timers = self.timers();
            (timers.notify.take_due(now), timers.persist.take_due(now))
        };
        if notify {
            self.emit(StoreEvent::SessionsChanged);
        }
        if persist {
            if let Err(e) = self.persist_now().await {
                tracing::warn!(error = %e, "Failed to persist progress");
            }
        }
    }

    /// Drive the store until `cancel` fires or [`stop`](Self::stop) is
    /// called, then stop.
    ///
    /// Feeds `notifications` into the flush queue and fires debounce,
    /// throttle, and persistence timers. A batch in progress always runs
    /// to completion.
    pub async fn run(
        &self,
        mut notifications: mpsc::UnboundedReceiver<WatchNotification>,
        cancel: CancellationToken,
    ) {
        tracing::info!("Session store running");
        let mut watching = true;
        loop {
            let deadline = self.next_deadline();
            let sleep = async {
                match deadline {
                    Some(deadline) => {
                        tokio::time::sleep_until(tokio::time::Instant::from_std(deadline)).await;
                    }
                    None => std::future::pending::<()>().await,
                }
            };

            tokio::select! {
                () = cancel.cancelled() => break,
                () = self.shutdown.cancelled() => break,
                received = notifications.recv(), if watching => match received {
                    Some(notification) => {
                        if let Err(e) = self.handle_notification(notification).await {
                            tracing::warn!(error = %e, "Failed to handle notification");
                        }
                    }
                    None => {
                        tracing::debug!("Notification channel closed");
                        watching = false;
                    }
                },
                () = sleep => self.fire_due(Instant::now()).await,
                () = self.wake.notified() => {}
            }
        }

        if let Err(e) = self.stop().await {
            tracing::warn!(error = %e, "Failed to write final progress snapshot");
        }
    }

    /// Stop scheduling polls, end a running [`run`](Self::run) loop, and
    /// write a final snapshot.
    ///
    /// Idempotent.
    ///
    /// # Errors
    ///
    /// Returns an error if the final snapshot cannot be saved.
    pub async fn stop(&self) -> Result<(), StoreError> {
        if self.stopped.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        self.shutdown.cancel();
        {
            let mut timers = self.timers();
            timers.flush.clear();
            timers.notify.cancel();
            timers.persist.cancel();
        }
        self.wake.notify_one();
        self.persist_now().await?;
        tracing::info!("Session store stopped");
        Ok(())
    }
}

fn progress_key(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}

fn progress_of(state: &FileResumeState) -> FileProgress {
    FileProgress {
        offset: state.committed_offset(),
        size: state.last_size,
        mtime_ms: state.last_mtime_ms,
        sequence: state.sequence,
    }
}

/// Saved progress is usable if the file has not shrunk below the size last
/// seen and has not gone back in time.
fn progress_matches(saved: &FileProgress, stat: FileStat) -> bool {
    let mtime_ok = match (saved.mtime_ms, stat.mtime_ms) {
        (Some(saved), Some(current)) => current >= saved,
        _ => true,
    };
    stat.size >= saved.size.max(saved.offset) && mtime_ok
}

fn add_file(info: &mut SessionInfo, path: &Path) -> bool {
    if info.files.iter().any(|file| file == path) {
        return false;
    }
    info.files.push(path.to_path_buf());
    info.files.sort();
    true
}

/// Keep what a rescan cannot see: forward-only recency and header fields
/// learned from ingested events.
fn carry_forward(info: &mut SessionInfo, old: &SessionInfo) {
    info.updated_at = info.updated_at.max(old.updated_at);
    if info.session_id.is_none() {
        info.session_id.clone_from(&old.session_id);
    }
    if info.cwd.is_none() {
        info.cwd.clone_from(&old.cwd);
    }
    if info.model.is_none() {
        info.model.clone_from(&old.model);
    }
}

fn fill_missing(info: &mut SessionInfo, meta: SessionMeta) -> bool {
    let mut changed = false;
    for (slot, value) in [
        (&mut info.session_id, meta.id),
        (&mut info.cwd, meta.cwd),
        (&mut info.model, meta.model),
    ] {
        if slot.is_none() && value.is_some() {
            *slot = value;
            changed = true;
        }
    }
    changed
}
