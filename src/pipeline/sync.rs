//! Opportunistic upload of unsynced records.
//!
//! Each tick: probe, fetch every unsynced record, upload them as one batch,
//! and only then flag them synced in one transaction. Any failure leaves the
//! flags alone so the same batch (plus whatever was added since) goes out on
//! the next tick. Delivery is at-least-once; the remote may see duplicates if
//! the upload succeeds but marking fails.

use std::sync::Arc;

use thiserror::Error;
use tracing::{debug, info, instrument, warn};

use crate::metrics::LatencyTimer;
use crate::remote::{ConnectivityProbe, RemoteBackend, RemoteError};
use crate::storage::traits::{RecordStore, StorageError};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncOutcome {
    /// Probe failed; nothing attempted.
    Offline,
    /// Reachable, but nothing to send.
    Idle,
    /// Batch accepted and flagged synced.
    Uploaded { count: usize },
}

#[derive(Error, Debug)]
pub enum SyncError {
    #[error("Failed to read unsynced records: {0}")]
    Fetch(#[source] StorageError),
    #[error("Upload of {count} records failed: {source}")]
    Upload {
        count: usize,
        #[source]
        source: RemoteError,
    },
    #[error("Uploaded {count} records but failed to mark them synced: {source}")]
    MarkSynced {
        count: usize,
        #[source]
        source: StorageError,
    },
}

pub struct SyncForwarder {
    probe: Arc<dyn ConnectivityProbe>,
    backend: Arc<dyn RemoteBackend>,
}

impl SyncForwarder {
    pub fn new(probe: Arc<dyn ConnectivityProbe>, backend: Arc<dyn RemoteBackend>) -> Self {
        Self { probe, backend }
    }

    #[instrument(skip_all)]
    pub async fn tick(&self, store: &dyn RecordStore) -> Result<SyncOutcome, SyncError> {
        let _timer = LatencyTimer::new("sync");
        let result = self.run(store).await;

        let label = match &result {
            Ok(SyncOutcome::Offline) => "offline",
            Ok(SyncOutcome::Idle) => "idle",
            Ok(SyncOutcome::Uploaded { .. }) => "uploaded",
            Err(_) => "error",
        };
        crate::metrics::record_sync(label);
        result
    }

    async fn run(&self, store: &dyn RecordStore) -> Result<SyncOutcome, SyncError> {
        if !self.probe.is_reachable().await {
            debug!("Remote unreachable, skipping sync");
            return Ok(SyncOutcome::Offline);
        }

        let pending = store.unsynced().await.map_err(|e| {
            warn!(error = %e, "Failed to read unsynced records");
            SyncError::Fetch(e)
        })?;
        crate::metrics::set_unsynced_backlog(pending.len());
        if pending.is_empty() {
            debug!("Nothing to sync");
            return Ok(SyncOutcome::Idle);
        }

        let count = pending.len();
        if let Err(source) = self.backend.upload_batch(&pending).await {
            warn!(count, error = %source, "Upload failed, records stay unsynced");
            return Err(SyncError::Upload { count, source });
        }
        crate::metrics::record_upload_batch(count);

        let ids: Vec<i64> = pending.iter().filter_map(|r| r.id).collect();
        match store.mark_synced(&ids).await {
            Ok(changed) => {
                crate::metrics::set_unsynced_backlog(0);
                info!(count, changed, "Synced records to remote");
                Ok(SyncOutcome::Uploaded { count })
            }
            Err(source) => {
                warn!(count, error = %source, "Uploaded but could not mark synced; batch will be resent");
                Err(SyncError::MarkSynced { count, source })
            }
        }
    }
}
