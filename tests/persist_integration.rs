//! Integration tests for progress persistence across store restarts.

mod common;

use std::sync::Arc;

use common::{append_to, open_store, Home, AGENT, META, USER};
use shadow_tail::persist::{
    BlobStore, MemoryBlobStore, ProgressSnapshot, SqliteBlobStore, SNAPSHOT_KEY,
};
use shadow_tail::store::SessionStore;
use tempfile::TempDir;

#[tokio::test]
async fn test_sqlite_progress_survives_reopen() {
    let home = Home::new();
    let state = TempDir::new().unwrap();
    let db_path = state.path().join("nested").join("state.db");
    let path = home.append("rollout-1.jsonl", &format!("{META}\n{USER}\n"));

    {
        let blobs: Arc<dyn BlobStore> = Arc::new(SqliteBlobStore::open(&db_path).await.unwrap());
        let store = SessionStore::open(home.config(), blobs).await.unwrap();
        assert_eq!(store.warm_session(&home.key()).await.unwrap(), 2);
        store.put_translation("hi", "salut").await;
        store.stop().await.unwrap();
    }
    assert!(db_path.exists());

    append_to(&path, &format!("{AGENT}\n"));
    let sqlite = SqliteBlobStore::open(&db_path).await.unwrap();
    assert_eq!(sqlite.path(), Some(db_path.as_path()));

    let stored = sqlite.load(SNAPSHOT_KEY).await.unwrap().unwrap();
    let snapshot = ProgressSnapshot::decode(&stored).unwrap();
    let progress = snapshot.files[&path.to_string_lossy().into_owned()];
    assert_eq!(progress.offset, (META.len() + USER.len() + 2) as u64);
    assert_eq!(progress.sequence, 2);

    let mut config = home.config();
    config.rewind_margin = 0;
    let blobs: Arc<dyn BlobStore> = Arc::new(sqlite);
    let store = SessionStore::open(config, blobs).await.unwrap();
    assert_eq!(store.translation("hi").await.as_deref(), Some("salut"));
    assert_eq!(store.warm_session(&home.key()).await.unwrap(), 1);

    let events = store.get_events(&home.key()).await;
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].detail["text"], "hello");
    assert_eq!(events[0].sequence, 2);
}

#[tokio::test]
async fn test_corrupt_snapshot_reingests_from_start() {
    let home = Home::new();
    home.append("rollout-1.jsonl", &format!("{META}\n{USER}\n"));
    let blobs = Arc::new(MemoryBlobStore::new());
    blobs
        .save(SNAPSHOT_KEY, b"{not a snapshot".to_vec())
        .await
        .unwrap();

    let store = open_store(home.config(), blobs.clone()).await;
    assert_eq!(store.warm_session(&home.key()).await.unwrap(), 2);
    store.stop().await.unwrap();

    let stored = blobs.load(SNAPSHOT_KEY).await.unwrap().unwrap();
    assert!(ProgressSnapshot::decode(&stored).is_ok());
}

#[tokio::test]
async fn test_snapshot_from_other_version_is_ignored() {
    let home = Home::new();
    let path = home.append("rollout-1.jsonl", &format!("{META}\n{USER}\n"));
    let mut snapshot = ProgressSnapshot {
        version: 99,
        ..ProgressSnapshot::default()
    };
    snapshot.files.insert(
        path.to_string_lossy().into_owned(),
        shadow_tail::persist::FileProgress {
            offset: (META.len() + USER.len() + 2) as u64,
            size: (META.len() + USER.len() + 2) as u64,
            mtime_ms: None,
            sequence: 2,
        },
    );
    let blobs = Arc::new(MemoryBlobStore::new());
    blobs
        .save(SNAPSHOT_KEY, snapshot.encode().unwrap())
        .await
        .unwrap();

    let store = open_store(home.config(), blobs).await;
    assert_eq!(store.warm_session(&home.key()).await.unwrap(), 2);
}

#[tokio::test]
async fn test_stop_is_idempotent_and_blocks_new_work() {
    let home = Home::new();
    home.append("rollout-1.jsonl", &format!("{META}\n"));
    let blobs = Arc::new(MemoryBlobStore::new());
    let store = open_store(home.config(), blobs.clone()).await;

    store.stop().await.unwrap();
    store.stop().await.unwrap();
    assert_eq!(blobs.save_count(), 1);
    assert!(store.warm_session(&home.key()).await.is_err());
    assert_eq!(store.flush_pending().await.polled, 0);
}
