use async_trait::async_trait;
use parking_lot::Mutex;

use super::traits::{RecordStore, SettingsStore, StorageError};
use crate::record::SensorRecord;
use crate::settings::ControlSetting;

#[derive(Default)]
struct Tables {
    records: Vec<SensorRecord>,
    settings: Vec<ControlSetting>,
    next_id: i64,
}

/// Process-local store with the same semantics as the SQL one.
///
/// Backs the unit and integration tests.
#[derive(Default)]
pub struct InMemoryStore {
    tables: Mutex<Tables>,
}

impl InMemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.tables.lock().records.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Every record, in insertion order.
    #[must_use]
    pub fn records(&self) -> Vec<SensorRecord> {
        self.tables.lock().records.clone()
    }
}

#[async_trait]
impl RecordStore for InMemoryStore {
    async fn insert(&self, record: &SensorRecord) -> Result<(), StorageError> {
        let mut tables = self.tables.lock();
        tables.next_id += 1;
        let mut row = record.clone();
        row.id = Some(tables.next_id);
        tables.records.push(row);
        Ok(())
    }

    async fn latest_at_or_before(&self, at: i64) -> Result<Option<SensorRecord>, StorageError> {
        let tables = self.tables.lock();
        Ok(tables
            .records
            .iter()
            .filter(|r| r.timestamp <= at)
            .max_by_key(|r| (r.timestamp, r.id))
            .cloned())
    }

    async fn range(&self, from: i64, to: i64) -> Result<Vec<SensorRecord>, StorageError> {
        let tables = self.tables.lock();
        let mut hits: Vec<SensorRecord> = tables
            .records
            .iter()
            .filter(|r| (from..=to).contains(&r.timestamp))
            .cloned()
            .collect();
        hits.sort_by_key(|r| (r.timestamp, r.id));
        Ok(hits)
    }

    async fn unsynced(&self) -> Result<Vec<SensorRecord>, StorageError> {
        let tables = self.tables.lock();
        Ok(tables.records.iter().filter(|r| !r.synced).cloned().collect())
    }

    async fn mark_synced(&self, ids: &[i64]) -> Result<u64, StorageError> {
        let mut tables = self.tables.lock();
        let mut changed = 0;
        for record in tables.records.iter_mut() {
            if !record.synced && record.id.is_some_and(|id| ids.contains(&id)) {
                record.synced = true;
                changed += 1;
            }
        }
        Ok(changed)
    }

    async fn count(&self) -> Result<u64, StorageError> {
        Ok(self.len() as u64)
    }
}

#[async_trait]
impl SettingsStore for InMemoryStore {
    async fn latest_setting(&self) -> Result<Option<ControlSetting>, StorageError> {
        Ok(self.tables.lock().settings.last().cloned())
    }

    async fn save_setting(&self, setting: &ControlSetting) -> Result<(), StorageError> {
        self.tables.lock().settings.push(setting.clone());
        Ok(())
    }
}
