// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Skid coordinator.
//!
//! [`Skid`] owns every cache and component and wires them together:
//!
//! ```text
//!  BusEvent ──► dispatch loop ──► TelemetryCache ──┬──► DerivedCalculator
//!                                                  └──► ControlLoop ──► CommandSink
//!
//!  persist ticker  ──► PersistenceGateway ──► SyncForwarder
//!  settings ticker ──► SettingsCache ──► ControlLoop
//!  republish ticker ──► ControlLoop
//! ```
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use fo_skid::{InMemoryStore, Skid, SkidConfig};
//! # use fo_skid::bus::{BusError, CommandSink};
//! # struct NullSink;
//! # #[async_trait::async_trait]
//! # impl CommandSink for NullSink {
//! #     async fn publish(&self, _t: &str, _p: &str) -> Result<(), BusError> { Ok(()) }
//! # }
//!
//! # #[tokio::main]
//! # async fn main() {
//! let store = Arc::new(InMemoryStore::new());
//! let skid = Arc::new(Skid::new(SkidConfig::default(), store.clone(), store, None, Arc::new(NullSink)));
//!
//! let (_tx, rx) = tokio::sync::mpsc::channel(16);
//! let scheduler = skid.start(rx);
//! // ... feed BusEvents into `_tx` ...
//! skid.shutdown(scheduler).await;
//! # }
//! ```

mod handlers;
mod lifecycle;
mod types;

pub use types::{MessageReport, SettingsReport, SkidState, TickReport};

use std::sync::Arc;

use tokio::sync::watch;

use crate::bus::CommandSink;
use crate::config::SkidConfig;
use crate::control::{ControlLoop, FeedBand};
use crate::derived::DerivedCalculator;
use crate::pipeline::{PersistenceGateway, SyncForwarder};
use crate::settings::SettingsCache;
use crate::storage::traits::{RecordStore, SettingsStore};
use crate::telemetry::{Channel, TelemetryCache};

pub struct Skid {
    config: SkidConfig,
    telemetry: TelemetryCache,
    settings: SettingsCache,
    derived: DerivedCalculator,
    gateway: PersistenceGateway,
    control: ControlLoop,
    records: Arc<dyn RecordStore>,
    settings_store: Arc<dyn SettingsStore>,
    forwarder: Option<SyncForwarder>,
    sink: Arc<dyn CommandSink>,
    state: watch::Sender<SkidState>,
    state_rx: watch::Receiver<SkidState>,
}

impl Skid {
    /// Build a skid. `forwarder` is `None` when no remote backend is configured.
    pub fn new(
        config: SkidConfig,
        records: Arc<dyn RecordStore>,
        settings_store: Arc<dyn SettingsStore>,
        forwarder: Option<SyncForwarder>,
        sink: Arc<dyn CommandSink>,
    ) -> Self {
        let (state, state_rx) = watch::channel(SkidState::Created);
        let derived = DerivedCalculator::new(config.pipeline.lookback(), config.pipeline.initial_flow_setpoint);
        let control = ControlLoop::new(FeedBand {
            on_at: config.control.feed_on_level,
            off_at: config.control.feed_off_level,
        });

        Self {
            config,
            telemetry: TelemetryCache::new(),
            settings: SettingsCache::new(),
            derived,
            gateway: PersistenceGateway::new(),
            control,
            records,
            settings_store,
            forwarder,
            sink,
            state,
            state_rx,
        }
    }

    #[must_use]
    pub fn state(&self) -> SkidState {
        *self.state_rx.borrow()
    }

    #[must_use]
    pub fn state_receiver(&self) -> watch::Receiver<SkidState> {
        self.state_rx.clone()
    }

    #[must_use]
    pub fn config(&self) -> &SkidConfig {
        &self.config
    }

    #[must_use]
    pub fn telemetry(&self) -> &TelemetryCache {
        &self.telemetry
    }

    #[must_use]
    pub fn settings(&self) -> &SettingsCache {
        &self.settings
    }

    #[must_use]
    pub fn derived(&self) -> &DerivedCalculator {
        &self.derived
    }

    #[must_use]
    pub fn control(&self) -> &ControlLoop {
        &self.control
    }

    /// Topics this skid needs: every channel for the pipeline role, the four
    /// control inputs for the control-only role.
    #[must_use]
    pub fn subscribed_topics(&self) -> Vec<&'static str> {
        Self::topics_for(&self.config)
    }

    /// Topics a skid built from `config` listens on. Available before the
    /// skid exists, since the bus has to be connected first.
    pub fn topics_for(config: &SkidConfig) -> Vec<&'static str> {
        if config.pipeline.enabled {
            Channel::ALL.iter().map(|c| c.topic()).collect()
        } else {
            Channel::CONTROL.iter().map(|c| c.topic()).collect()
        }
    }

    fn set_state(&self, state: SkidState) {
        let _ = self.state.send(state);
        crate::metrics::set_skid_state(state.as_str());
    }
}
