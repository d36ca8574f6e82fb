//! Chaos tests for the persistence and sync pipeline.
//!
//! Failures are injected through wrappers around the in-memory store and
//! scripted remote doubles:
//! 1. **FlakyStore** - insert / mark_synced failures switched on and off
//! 2. **ScriptedBackend** - accepts or rejects batches, records what it saw
//! 3. **SwitchProbe** - connectivity flipped by the test
//!
//! # Running
//! ```bash
//! cargo test --test pipeline
//! ```

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;

use fo_skid::{
    BusError, Channel, CommandSink, ConnectivityProbe, InMemoryStore, RecordStore, RemoteBackend,
    RemoteError, SensorRecord, Skid, SkidConfig, StorageError, SyncError, SyncForwarder, SyncOutcome,
};

// =============================================================================
// Failure-injecting doubles
// =============================================================================

#[derive(Default)]
struct FlakyStore {
    inner: InMemoryStore,
    fail_insert: AtomicBool,
    fail_mark: AtomicBool,
    fail_history: AtomicBool,
}

impl FlakyStore {
    fn check(flag: &AtomicBool, op: &str) -> Result<(), StorageError> {
        if flag.load(Ordering::SeqCst) {
            Err(StorageError::Backend(format!("injected {op} failure")))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl RecordStore for FlakyStore {
    async fn insert(&self, record: &SensorRecord) -> Result<(), StorageError> {
        Self::check(&self.fail_insert, "insert")?;
        self.inner.insert(record).await
    }

    async fn latest_at_or_before(&self, at: i64) -> Result<Option<SensorRecord>, StorageError> {
        Self::check(&self.fail_history, "history")?;
        self.inner.latest_at_or_before(at).await
    }

    async fn range(&self, from: i64, to: i64) -> Result<Vec<SensorRecord>, StorageError> {
        self.inner.range(from, to).await
    }

    async fn unsynced(&self) -> Result<Vec<SensorRecord>, StorageError> {
        self.inner.unsynced().await
    }

    async fn mark_synced(&self, ids: &[i64]) -> Result<u64, StorageError> {
        Self::check(&self.fail_mark, "mark_synced")?;
        self.inner.mark_synced(ids).await
    }

    async fn count(&self) -> Result<u64, StorageError> {
        self.inner.count().await
    }
}

#[derive(Default)]
struct ScriptedBackend {
    reject: AtomicBool,
    batches: Mutex<Vec<Vec<i64>>>,
}

#[async_trait]
impl RemoteBackend for ScriptedBackend {
    async fn upload_batch(&self, records: &[SensorRecord]) -> Result<(), RemoteError> {
        if self.reject.load(Ordering::SeqCst) {
            return Err(RemoteError::Rejected { status: 400, body: "bad row".into() });
        }
        self.batches.lock().push(records.iter().filter_map(|r| r.id).collect());
        Ok(())
    }
}

struct SwitchProbe {
    online: AtomicBool,
    calls: AtomicUsize,
}

impl SwitchProbe {
    fn new(online: bool) -> Self {
        Self { online: AtomicBool::new(online), calls: AtomicUsize::new(0) }
    }
}

#[async_trait]
impl ConnectivityProbe for SwitchProbe {
    async fn is_reachable(&self) -> bool {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.online.load(Ordering::SeqCst)
    }
}

struct NullSink;

#[async_trait]
impl CommandSink for NullSink {
    async fn publish(&self, _topic: &str, _payload: &str) -> Result<(), BusError> {
        Ok(())
    }
}

struct Rig {
    skid: Skid,
    store: Arc<FlakyStore>,
    backend: Arc<ScriptedBackend>,
    probe: Arc<SwitchProbe>,
}

fn rig() -> Rig {
    let store = Arc::new(FlakyStore::default());
    let backend = Arc::new(ScriptedBackend::default());
    let probe = Arc::new(SwitchProbe::new(true));
    let forwarder = SyncForwarder::new(probe.clone(), backend.clone());

    let mut config = SkidConfig::default();
    config.control.enabled = false;
    let skid = Skid::new(config, store.clone(), Arc::new(InMemoryStore::new()), Some(forwarder), Arc::new(NullSink));

    Rig { skid, store, backend, probe }
}

async fn unsynced_ids(store: &FlakyStore) -> Vec<i64> {
    store.unsynced().await.unwrap().into_iter().filter_map(|r| r.id).collect()
}

// =============================================================================
// Persistence
// =============================================================================

#[tokio::test]
async fn test_snapshot_reflects_latest_values() {
    let rig = rig();
    rig.skid.handle_message("cstr-ph", b"7.1", 1_000).await.unwrap();
    rig.skid.handle_message("cstr-ph", b"7.4", 2_000).await.unwrap();
    rig.skid.handle_message("ds-level", b"40", 2_500).await.unwrap();

    let report = rig.skid.persist_and_sync(30_000).await;
    let record = report.persisted.unwrap();

    assert_eq!(record.timestamp, 30_000);
    assert_eq!(record.values.get(Channel::CstrPh), Some(7.4));
    assert_eq!(record.values.get(Channel::DsLevel), Some(40.0));
    assert_eq!(record.values.get(Channel::FeedEc), None);
}

#[tokio::test]
async fn test_store_outage_loses_tick_but_not_later_ones() {
    let rig = rig();
    rig.skid.handle_message("feed-tds", b"500", 1_000).await.unwrap();

    rig.store.fail_insert.store(true, Ordering::SeqCst);
    let report = rig.skid.persist_and_sync(30_000).await;
    assert!(matches!(report.persisted, Err(StorageError::Backend(_))));
    assert_eq!(rig.store.count().await.unwrap(), 0);

    rig.store.fail_insert.store(false, Ordering::SeqCst);
    let report = rig.skid.persist_and_sync(60_000).await;
    assert!(report.persisted.is_ok());
    assert_eq!(rig.store.count().await.unwrap(), 1);
}

#[tokio::test]
async fn test_timestamps_never_go_backwards() {
    let rig = rig();
    rig.skid.persist_and_sync(50_000).await.persisted.unwrap();
    let second = rig.skid.persist_and_sync(40_000).await.persisted.unwrap();

    assert_eq!(second.timestamp, 50_000);
    let all = rig.store.range(0, i64::MAX).await.unwrap();
    assert!(all.windows(2).all(|w| w[0].timestamp <= w[1].timestamp));
}

#[tokio::test]
async fn test_history_failure_still_persists_without_derived() {
    let rig = rig();
    rig.store.fail_history.store(true, Ordering::SeqCst);
    rig.skid.handle_message("feed-level", b"40", 1_000).await.unwrap();

    let record = rig.skid.persist_and_sync(30_000).await.persisted.unwrap();
    assert_eq!(record.values.get(Channel::FeedLevel), Some(40.0));
    assert_eq!(record.derived.vol_to_ds, None);
    assert_eq!(record.derived.flux, None);
}

// =============================================================================
// Sync
// =============================================================================

#[tokio::test]
async fn test_offline_tick_leaves_backlog() {
    let rig = rig();
    rig.probe.online.store(false, Ordering::SeqCst);

    for t in [30_000, 60_000, 90_000] {
        let report = rig.skid.persist_and_sync(t).await;
        assert!(matches!(report.sync, Some(Ok(SyncOutcome::Offline))));
    }
    assert_eq!(unsynced_ids(&rig.store).await.len(), 3);
    assert!(rig.backend.batches.lock().is_empty());

    rig.probe.online.store(true, Ordering::SeqCst);
    let report = rig.skid.persist_and_sync(120_000).await;
    assert!(matches!(report.sync, Some(Ok(SyncOutcome::Uploaded { count: 4 }))));
    assert!(unsynced_ids(&rig.store).await.is_empty());
    assert_eq!(rig.probe.calls.load(Ordering::SeqCst), 4);
}

#[tokio::test]
async fn test_rejected_batch_is_retried_whole() {
    let rig = rig();
    rig.backend.reject.store(true, Ordering::SeqCst);

    let report = rig.skid.persist_and_sync(30_000).await;
    assert!(matches!(
        report.sync,
        Some(Err(SyncError::Upload { count: 1, source: RemoteError::Rejected { status: 400, .. } }))
    ));
    rig.skid.persist_and_sync(60_000).await;
    assert_eq!(unsynced_ids(&rig.store).await.len(), 2);

    rig.backend.reject.store(false, Ordering::SeqCst);
    rig.skid.persist_and_sync(90_000).await;

    let batches = rig.backend.batches.lock().clone();
    assert_eq!(batches.len(), 1);
    assert_eq!(batches[0].len(), 3);
    assert!(unsynced_ids(&rig.store).await.is_empty());
}

#[tokio::test]
async fn test_mark_failure_reuploads_same_records() {
    let rig = rig();
    rig.skid.persist_and_sync(30_000).await;
    rig.probe.online.store(false, Ordering::SeqCst);
    rig.skid.persist_and_sync(60_000).await;
    rig.probe.online.store(true, Ordering::SeqCst);

    rig.store.fail_mark.store(true, Ordering::SeqCst);
    let before = unsynced_ids(&rig.store).await;
    let report = rig.skid.persist_and_sync(90_000).await;
    assert!(matches!(report.sync, Some(Err(SyncError::MarkSynced { count: 2, .. }))));

    let after_failure = unsynced_ids(&rig.store).await;
    assert_eq!(after_failure.len(), before.len() + 1);

    rig.store.fail_mark.store(false, Ordering::SeqCst);
    rig.skid.persist_and_sync(120_000).await;

    let batches = rig.backend.batches.lock().clone();
    assert_eq!(batches.len(), 3);
    // Everything in the failed batch went out again.
    assert!(batches[1].iter().all(|id| batches[2].contains(id)));
    assert!(unsynced_ids(&rig.store).await.is_empty());
}

#[tokio::test]
async fn test_synced_flag_never_reverts() {
    let rig = rig();
    rig.skid.persist_and_sync(30_000).await;
    let synced: Vec<i64> = rig.store.range(0, i64::MAX).await.unwrap().into_iter().filter_map(|r| r.id).collect();

    rig.backend.reject.store(true, Ordering::SeqCst);
    rig.skid.persist_and_sync(60_000).await;
    rig.store.fail_mark.store(true, Ordering::SeqCst);
    rig.backend.reject.store(false, Ordering::SeqCst);
    rig.skid.persist_and_sync(90_000).await;

    let still_synced = rig
        .store
        .range(0, i64::MAX)
        .await
        .unwrap()
        .into_iter()
        .filter(|r| synced.contains(&r.id.unwrap_or_default()))
        .all(|r| r.synced);
    assert!(still_synced);
}

// =============================================================================
// Derived metrics through the whole path
// =============================================================================

#[tokio::test]
async fn test_derived_metrics_use_history() {
    let rig = rig();
    rig.skid.handle_message("feed-level", b"90", 1_000).await.unwrap();
    rig.skid.handle_message("feed-tds", b"300", 1_000).await.unwrap();
    rig.skid.persist_and_sync(1_000).await.persisted.unwrap();

    rig.skid.handle_message("feed-tds", b"310", 31_000).await.unwrap();
    rig.skid.handle_message("feed-level", b"88", 31_000).await.unwrap();
    let record = rig.skid.persist_and_sync(31_000).await.persisted.unwrap();

    assert_eq!(record.derived.vol_to_ds, Some(-2.0));
    assert_eq!(record.derived.com_vol_fs, Some(22.0));
    assert_eq!(record.derived.flux, Some(-4.0));
    assert_eq!(record.derived.increase_in_fs, Some(10.0));
}
