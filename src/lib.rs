//! # fo-skid
//!
//! Monitoring and control service for a forward-osmosis water-treatment skid.
//!
//! ## Architecture
//!
//! Sensors publish readings on an MQTT bus. The service keeps the latest value
//! per channel, derives secondary process metrics, snapshots everything to a
//! local SQL store on a fixed tick, and forwards unsynced records to a remote
//! backend whenever the uplink is there. Independently, hysteresis rules drive
//! the skid's heaters, feed pump and DS outlet valve.
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                         MQTT bus                            │
//! │  • 11 sensor topics in (bare numeric payloads)             │
//! │  • 4 actuator topics out ("on" / "off")                    │
//! └─────────────────────────────────────────────────────────────┘
//!                              │ BusEvent
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      Telemetry Cache                        │
//! │  • Last value + arrival time per channel                   │
//! └─────────────────────────────────────────────────────────────┘
//!             │                                   │
//!             ▼                                   ▼
//! ┌───────────────────────────┐   ┌─────────────────────────────┐
//! │  Derived Metrics          │   │  Control Loop               │
//! │  • vol_to_ds, com_vol_fs  │   │  • Heaters, feed pump,      │
//! │  • flux, increase_in_fs   │   │    DS outlet (hysteresis)   │
//! │  • History from store     │   │  • Publish only on change   │
//! └───────────────────────────┘   │  • Settings Cache setpoints │
//!             │                   └─────────────────────────────┘
//!       (persist tick)
//!             ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │              Local store (SQLite / PostgreSQL / MySQL)      │
//! │  • Append-only records, synced flag false → true only      │
//! └─────────────────────────────────────────────────────────────┘
//!             │
//!   (same tick, if reachable)
//!             ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                       Remote backend                        │
//! │  • One batch insert per tick, at-least-once                │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use fo_skid::{MqttBus, Skid, SkidConfig, SqlStore};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = SkidConfig::load("fo-skid.toml")?;
//!     let store = Arc::new(SqlStore::connect(&config.store).await?);
//!
//!     let (bus, pump) = MqttBus::connect(&config.bus, Skid::topics_for(&config));
//!     let skid = Arc::new(Skid::new(config, store.clone(), store, None, Arc::new(bus.clone())));
//!
//!     let (tx, rx) = tokio::sync::mpsc::channel(256);
//!     tokio::spawn(pump.run(tx));
//!
//!     skid.run(rx, async { let _ = tokio::signal::ctrl_c().await; }).await;
//!     bus.disconnect().await?;
//!     Ok(())
//! }
//! ```
//!
//! ## Modules
//!
//! - [`telemetry`]: Channel catalogue and the telemetry cache
//! - [`settings`]: Operator setpoints and their cache
//! - [`derived`]: Derived process metrics
//! - [`pipeline`]: Persistence gateway and sync forwarder
//! - [`control`]: Hysteresis rules and compare-and-publish
//! - [`storage`]: Record and settings stores (SQL, memory)
//! - [`remote`]: Remote backend and connectivity probe
//! - [`bus`]: MQTT adapter
//! - [`skid`]: The coordinator owning everything above
//! - [`scheduler`]: Recurring tickers with shared shutdown
//! - [`resilience`]: Retry with backoff

pub mod bus;
pub mod config;
pub mod control;
pub mod derived;
pub mod metrics;
pub mod pipeline;
pub mod record;
pub mod remote;
pub mod resilience;
pub mod scheduler;
pub mod settings;
pub mod skid;
pub mod storage;
pub mod telemetry;

pub use bus::{BusError, BusEvent, CommandSink, MqttBus, MqttEventPump};
pub use config::{ConfigError, SkidConfig};
pub use control::{Actuator, ActuatorState, Command, ControlLoop, Evaluation, FeedBand};
pub use derived::{Derivation, DerivedCalculator, DerivedMetrics};
pub use metrics::LatencyTimer;
pub use pipeline::{PersistenceGateway, SyncError, SyncForwarder, SyncOutcome};
pub use record::SensorRecord;
pub use remote::{ConnectivityProbe, HttpProbe, RemoteBackend, RemoteError, RestBackend};
pub use resilience::retry::RetryConfig;
pub use scheduler::Scheduler;
pub use settings::{ControlSetting, RefreshOutcome, SettingsCache};
pub use skid::{MessageReport, SettingsReport, Skid, SkidState, TickReport};
pub use storage::{InMemoryStore, RecordStore, SettingsStore, SqlStore, StorageError};
pub use telemetry::{Channel, ChannelValues, IngestError, SensorSnapshot, TelemetryCache};

/// Wall clock as epoch milliseconds.
#[must_use]
pub fn now_millis() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or_default()
}
