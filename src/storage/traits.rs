use async_trait::async_trait;
use thiserror::Error;

use crate::record::SensorRecord;
use crate::settings::ControlSetting;

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("Storage backend error: {0}")]
    Backend(String),
    #[error("Corrupt row {id}: {reason}")]
    Corrupt { id: i64, reason: String },
    #[error("Unsupported store url '{0}'")]
    UnsupportedUrl(String),
}

/// Append-only store of sensor records.
///
/// There is deliberately no way to clear the `synced` flag: the only
/// mutation after insert is [`RecordStore::mark_synced`].
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Append a record. The record's `id` is ignored; the store assigns one.
    async fn insert(&self, record: &SensorRecord) -> Result<(), StorageError>;

    /// Most recent record with `timestamp <= at`.
    async fn latest_at_or_before(&self, at: i64) -> Result<Option<SensorRecord>, StorageError>;

    /// Most recent record overall.
    async fn latest(&self) -> Result<Option<SensorRecord>, StorageError> {
        self.latest_at_or_before(i64::MAX).await
    }

    /// Records with `from <= timestamp <= to`, oldest first.
    async fn range(&self, from: i64, to: i64) -> Result<Vec<SensorRecord>, StorageError>;

    /// Every record not yet acknowledged by the remote backend, oldest first.
    async fn unsynced(&self) -> Result<Vec<SensorRecord>, StorageError>;

    /// Flag the given records as synced, all or nothing.
    /// Returns the number of rows that changed.
    async fn mark_synced(&self, ids: &[i64]) -> Result<u64, StorageError>;

    /// Total number of records.
    async fn count(&self) -> Result<u64, StorageError>;
}

/// Operator setpoint store.
#[async_trait]
pub trait SettingsStore: Send + Sync {
    /// The most recently inserted settings row, if any.
    async fn latest_setting(&self) -> Result<Option<ControlSetting>, StorageError>;

    /// Insert a new settings row; it becomes the latest.
    async fn save_setting(&self, setting: &ControlSetting) -> Result<(), StorageError>;
}
