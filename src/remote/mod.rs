//! Remote backend seam.
//!
//! The sync forwarder only needs two things from the outside world: "is the
//! uplink there?" and "take this batch of records". Both sit behind traits so
//! the forwarder can be driven by fakes in tests.

use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

use crate::record::SensorRecord;

pub mod probe;
pub mod rest;
pub mod row;

pub use probe::HttpProbe;
pub use rest::RestBackend;
pub use row::RemoteRow;

#[derive(Error, Debug)]
pub enum RemoteError {
    #[error("Remote unreachable: {0}")]
    Unreachable(String),
    #[error("Remote rejected batch with status {status}: {body}")]
    Rejected { status: u16, body: String },
    #[error("Remote request timed out after {0:?}")]
    Timeout(Duration),
    #[error("Failed to build remote request: {0}")]
    Request(String),
}

/// Batch insert into the remote table.
///
/// Acknowledgment is per call: `Ok(())` means every record in the batch was
/// accepted.
#[async_trait]
pub trait RemoteBackend: Send + Sync {
    async fn upload_batch(&self, records: &[SensorRecord]) -> Result<(), RemoteError>;
}

#[async_trait]
pub trait ConnectivityProbe: Send + Sync {
    /// Bounded-time reachability check. Never errors; failure is `false`.
    async fn is_reachable(&self) -> bool;
}
