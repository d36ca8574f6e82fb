use parking_lot::Mutex;
use tracing::{error, info, instrument, warn};

use crate::derived::DerivedCalculator;
use crate::metrics::LatencyTimer;
use crate::record::SensorRecord;
use crate::storage::traits::{RecordStore, StorageError};
use crate::telemetry::TelemetryCache;

/// Snapshots the caches into one record per tick.
///
/// Record timestamps never go backwards: if the wall clock steps back, the
/// record reuses the previous timestamp. Before the first write of a process
/// the previous timestamp is the newest one already in the store.
#[derive(Default)]
pub struct PersistenceGateway {
    last_timestamp: Mutex<Option<i64>>,
}

impl PersistenceGateway {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Timestamp of the last successfully written record.
    #[must_use]
    pub fn last_timestamp(&self) -> Option<i64> {
        *self.last_timestamp.lock()
    }

    /// Build and write one record. A failed write skips the tick; nothing is
    /// queued for retry.
    #[instrument(skip(self, telemetry, derived, store))]
    pub async fn tick(
        &self,
        telemetry: &TelemetryCache,
        derived: &DerivedCalculator,
        store: &dyn RecordStore,
        now: i64,
    ) -> Result<SensorRecord, StorageError> {
        let _timer = LatencyTimer::new("persist");

        let floor = match self.last_timestamp() {
            Some(last) => Some(last),
            None => self.seed_from_store(store).await,
        };

        let values = telemetry.read().values();
        let metrics = derived.latest();
        let timestamp = match floor {
            Some(last) if last > now => last,
            _ => now,
        };
        let record = SensorRecord::new(timestamp, values, metrics);

        if let Err(e) = store.insert(&record).await {
            error!(error = %e, timestamp, "Persist failed, skipping tick");
            crate::metrics::record_persist("error");
            return Err(e);
        }

        *self.last_timestamp.lock() = Some(timestamp);
        crate::metrics::record_persist("success");
        info!(timestamp, channels = values.known(), "Persisted sensor record");
        Ok(record)
    }

    /// Newest timestamp already in the store, so a restart with a lagging
    /// clock still appends after the existing history. A failed lookup only
    /// costs the clamp for this tick.
    async fn seed_from_store(&self, store: &dyn RecordStore) -> Option<i64> {
        match store.latest().await {
            Ok(latest) => {
                let seeded = latest.map(|r| r.timestamp);
                if seeded.is_some() {
                    *self.last_timestamp.lock() = seeded;
                }
                seeded
            }
            Err(e) => {
                warn!(error = %e, "Could not read newest record timestamp");
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::derived::DerivedMetrics;
    use crate::storage::memory::InMemoryStore;
    use crate::telemetry::{Channel, ChannelValues};
    use async_trait::async_trait;
    use std::time::Duration;

    struct RejectingStore;

    #[async_trait]
    impl RecordStore for RejectingStore {
        async fn insert(&self, _record: &SensorRecord) -> Result<(), StorageError> {
            Err(StorageError::Backend("disk full".into()))
        }
        async fn latest_at_or_before(&self, _at: i64) -> Result<Option<SensorRecord>, StorageError> {
            Ok(None)
        }
        async fn range(&self, _from: i64, _to: i64) -> Result<Vec<SensorRecord>, StorageError> {
            Ok(Vec::new())
        }
        async fn unsynced(&self) -> Result<Vec<SensorRecord>, StorageError> {
            Ok(Vec::new())
        }
        async fn mark_synced(&self, _ids: &[i64]) -> Result<u64, StorageError> {
            Ok(0)
        }
        async fn count(&self) -> Result<u64, StorageError> {
            Ok(0)
        }
    }

    fn calculator() -> DerivedCalculator {
        DerivedCalculator::new(Duration::from_secs(30), 20.0)
    }

    #[tokio::test]
    async fn test_tick_writes_unsynced_snapshot() {
        let telemetry = TelemetryCache::new();
        telemetry.update(Channel::CstrPh, 7.2, 100);
        let store = InMemoryStore::new();
        let gateway = PersistenceGateway::new();

        let record = gateway.tick(&telemetry, &calculator(), &store, 1_000).await.unwrap();

        assert_eq!(record.timestamp, 1_000);
        assert!(!record.synced);
        let stored = store.records();
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].values.get(Channel::CstrPh), Some(7.2));
        assert_eq!(stored[0].values.get(Channel::FeedLevel), None);
    }

    #[tokio::test]
    async fn test_clock_step_back_is_clamped() {
        let telemetry = TelemetryCache::new();
        let store = InMemoryStore::new();
        let gateway = PersistenceGateway::new();

        gateway.tick(&telemetry, &calculator(), &store, 5_000).await.unwrap();
        let second = gateway.tick(&telemetry, &calculator(), &store, 4_000).await.unwrap();
        let third = gateway.tick(&telemetry, &calculator(), &store, 6_000).await.unwrap();

        assert_eq!(second.timestamp, 5_000);
        assert_eq!(third.timestamp, 6_000);
    }

    #[tokio::test]
    async fn test_failed_write_is_reported_and_not_remembered() {
        let telemetry = TelemetryCache::new();
        let gateway = PersistenceGateway::new();

        let err = gateway.tick(&telemetry, &calculator(), &RejectingStore, 9_000).await.unwrap_err();
        assert!(err.to_string().contains("disk full"));
        assert_eq!(gateway.last_timestamp(), None);
    }

    #[tokio::test]
    async fn test_first_tick_continues_after_existing_history() {
        let telemetry = TelemetryCache::new();
        let store = InMemoryStore::new();
        store
            .insert(&SensorRecord::new(80_000, ChannelValues::new(), DerivedMetrics::default()))
            .await
            .unwrap();

        // Fresh process whose clock is behind the last persisted record.
        let gateway = PersistenceGateway::new();
        let record = gateway.tick(&telemetry, &calculator(), &store, 20_000).await.unwrap();

        assert_eq!(record.timestamp, 80_000);
        assert_eq!(store.latest_at_or_before(79_999).await.unwrap(), None);
        let later = gateway.tick(&telemetry, &calculator(), &store, 90_000).await.unwrap();
        assert_eq!(later.timestamp, 90_000);
    }
}
