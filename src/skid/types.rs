//! Public types for the skid coordinator.

use crate::control::Evaluation;
use crate::derived::Derivation;
use crate::pipeline::{SyncError, SyncOutcome};
use crate::record::SensorRecord;
use crate::settings::RefreshOutcome;
use crate::storage::traits::StorageError;
use crate::telemetry::Channel;

/// Skid lifecycle state.
///
/// Use [`super::Skid::state()`] for the current value or
/// [`super::Skid::state_receiver()`] to watch for changes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkidState {
    /// Built, tasks not started
    Created,
    /// Dispatch loop and tickers running
    Running,
    /// Shutdown signalled, waiting for in-flight work
    ShuttingDown,
    /// All tasks stopped
    Stopped,
}

impl SkidState {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Created => "created",
            Self::Running => "running",
            Self::ShuttingDown => "shutting_down",
            Self::Stopped => "stopped",
        }
    }
}

impl std::fmt::Display for SkidState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Created => write!(f, "Created"),
            Self::Running => write!(f, "Running"),
            Self::ShuttingDown => write!(f, "ShuttingDown"),
            Self::Stopped => write!(f, "Stopped"),
        }
    }
}

/// What handling one accepted bus message did.
#[derive(Debug)]
pub struct MessageReport {
    pub channel: Channel,
    /// `None` when the pipeline role is disabled.
    pub derivation: Option<Derivation>,
    /// `None` when the control role is disabled.
    pub control: Option<Evaluation>,
}

/// Result of one persistence tick and the sync that follows it.
#[derive(Debug)]
pub struct TickReport {
    pub persisted: Result<SensorRecord, StorageError>,
    /// `None` when no remote backend is configured.
    pub sync: Option<Result<SyncOutcome, SyncError>>,
}

/// Result of one settings refresh and the control pass that follows it.
#[derive(Debug)]
pub struct SettingsReport {
    pub refresh: Result<RefreshOutcome, StorageError>,
    pub control: Evaluation,
}
