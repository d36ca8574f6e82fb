//! Persistence and sync ticks.
//!
//! ```text
//!   TelemetryCache ─┐
//!                   ├─► PersistenceGateway ──► RecordStore ──► SyncForwarder ──► RemoteBackend
//!   DerivedCalculator┘        (every tick)                     (same tick,
//!                                                               if probe ok)
//! ```

pub mod persistence;
pub mod sync;

pub use persistence::PersistenceGateway;
pub use sync::{SyncError, SyncForwarder, SyncOutcome};
