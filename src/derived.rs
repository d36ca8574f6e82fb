// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Derived process metrics.
//!
//! Computed after every telemetry update from the current cache and the most
//! recent persisted record that is at least one lookback window old:
//!
//! ```text
//! vol_to_ds      = feed_level(now) - feed_level(hist)
//! com_vol_fs     = FS0 - vol_to_ds
//! flux           = vol_to_ds * 60 / window_seconds
//! increase_in_fs = feed_tds(now) - feed_tds(hist)
//! ```
//!
//! Each metric is `None` when one of its operands is missing. The
//! `feed_level` chain and `increase_in_fs` are independent of each other.

use std::time::Duration;

use parking_lot::RwLock;
use serde::Serialize;
use tracing::warn;

use crate::storage::traits::{RecordStore, StorageError};
use crate::telemetry::{Channel, ChannelValues, SensorSnapshot};

/// Secondary quantities derived from the feed tank.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct DerivedMetrics {
    pub vol_to_ds: Option<f64>,
    pub com_vol_fs: Option<f64>,
    pub flux: Option<f64>,
    pub increase_in_fs: Option<f64>,
}

impl DerivedMetrics {
    /// Column names, in storage order.
    pub const COLUMNS: [&'static str; 4] = ["vol_to_ds", "com_vol_fs", "flux", "increase_in_fs"];

    /// Pure computation from current and historical channel values.
    ///
    /// # Example
    ///
    /// ```
    /// use fo_skid::{Channel, ChannelValues, DerivedMetrics};
    ///
    /// let now = ChannelValues::new().with(Channel::FeedLevel, 18.0);
    /// let hist = ChannelValues::new().with(Channel::FeedLevel, 21.0);
    /// let m = DerivedMetrics::compute(&now, Some(&hist), 20.0, 30.0);
    ///
    /// assert_eq!(m.vol_to_ds, Some(-3.0));
    /// assert_eq!(m.com_vol_fs, Some(23.0));
    /// assert_eq!(m.flux, Some(-6.0));
    /// assert_eq!(m.increase_in_fs, None);
    /// ```
    #[must_use]
    pub fn compute(
        current: &ChannelValues,
        historical: Option<&ChannelValues>,
        initial_flow_setpoint: f64,
        window_secs: f64,
    ) -> Self {
        let delta = |channel: Channel| -> Option<f64> {
            let now = current.get(channel)?;
            let then = historical?.get(channel)?;
            Some(now - then)
        };

        let vol_to_ds = delta(Channel::FeedLevel);
        let flux = if window_secs > 0.0 {
            vol_to_ds.map(|v| v * 60.0 / window_secs)
        } else {
            None
        };

        Self {
            vol_to_ds,
            com_vol_fs: vol_to_ds.map(|v| initial_flow_setpoint - v),
            flux,
            increase_in_fs: delta(Channel::FeedTds),
        }
    }

    /// Values in [`DerivedMetrics::COLUMNS`] order.
    #[must_use]
    pub fn as_array(&self) -> [Option<f64>; 4] {
        [self.vol_to_ds, self.com_vol_fs, self.flux, self.increase_in_fs]
    }

    #[must_use]
    pub fn from_array(values: [Option<f64>; 4]) -> Self {
        let [vol_to_ds, com_vol_fs, flux, increase_in_fs] = values;
        Self { vol_to_ds, com_vol_fs, flux, increase_in_fs }
    }
}

/// Result of one derivation pass.
#[derive(Debug)]
pub struct Derivation {
    pub metrics: DerivedMetrics,
    /// Set when the history lookup failed; the metrics are then all `None`.
    pub lookup_error: Option<StorageError>,
}

/// Keeps the latest [`DerivedMetrics`] for the persistence tick.
pub struct DerivedCalculator {
    lookback: Duration,
    initial_flow_setpoint: f64,
    latest: RwLock<DerivedMetrics>,
}

impl DerivedCalculator {
    #[must_use]
    pub fn new(lookback: Duration, initial_flow_setpoint: f64) -> Self {
        Self {
            lookback,
            initial_flow_setpoint,
            latest: RwLock::new(DerivedMetrics::default()),
        }
    }

    #[must_use]
    pub fn lookback(&self) -> Duration {
        self.lookback
    }

    /// Latest metrics computed by [`DerivedCalculator::derive`].
    #[must_use]
    pub fn latest(&self) -> DerivedMetrics {
        *self.latest.read()
    }

    /// Recompute from `snapshot` and the store history as of `now` (epoch millis).
    ///
    /// A failed lookup is logged and yields `None` metrics; it never
    /// propagates as an error.
    pub async fn derive(&self, snapshot: &SensorSnapshot, now: i64, store: &dyn RecordStore) -> Derivation {
        let cutoff = now.saturating_sub(self.lookback.as_millis() as i64);
        let (historical, lookup_error) = match store.latest_at_or_before(cutoff).await {
            Ok(record) => (record, None),
            Err(e) => {
                warn!(error = %e, cutoff, "History lookup failed, derived metrics unavailable");
                crate::metrics::record_history_lookup("error");
                (None, Some(e))
            }
        };

        let metrics = DerivedMetrics::compute(
            &snapshot.values(),
            historical.as_ref().map(|r| &r.values),
            self.initial_flow_setpoint,
            self.lookback.as_secs_f64(),
        );
        *self.latest.write() = metrics;

        Derivation { metrics, lookup_error }
    }
}
