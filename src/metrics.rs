// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Metrics instrumentation for the skid service.
//!
//! Uses the `metrics` crate facade; the embedding process installs whichever
//! exporter it wants. Without one, every call here is a no-op.
//!
//! # Naming
//! - `fo_skid_` prefix for all metrics
//! - `_total` suffix for counters
//! - `_seconds` suffix for duration histograms
//!
//! # Labels
//! - `topic`: bus topic (inbound channel or actuator)
//! - `status`: success, error, dropped, empty, ...
//! - `outcome`: offline, idle, uploaded, error

use metrics::{counter, gauge, histogram};
use std::time::{Duration, Instant};

/// Inbound bus message handled by the telemetry cache.
pub fn record_ingest(topic: &str, status: &str) {
    counter!(
        "fo_skid_messages_total",
        "topic" => topic.to_string(),
        "status" => status.to_string()
    )
    .increment(1);
}

/// Historical record lookup for derived metrics.
pub fn record_history_lookup(status: &str) {
    counter!("fo_skid_history_lookups_total", "status" => status.to_string()).increment(1);
}

pub fn record_settings_refresh(status: &str) {
    counter!("fo_skid_settings_refresh_total", "status" => status.to_string()).increment(1);
}

/// Persistence tick result.
pub fn record_persist(status: &str) {
    counter!("fo_skid_records_persisted_total", "status" => status.to_string()).increment(1);
}

/// Sync tick result.
pub fn record_sync(outcome: &str) {
    counter!("fo_skid_sync_total", "outcome" => outcome.to_string()).increment(1);
}

/// Number of records in one upload.
pub fn record_upload_batch(count: usize) {
    histogram!("fo_skid_upload_batch_size").record(count as f64);
}

/// Actuator command publish.
pub fn record_publish(topic: &str, status: &str) {
    counter!(
        "fo_skid_actuator_publishes_total",
        "topic" => topic.to_string(),
        "status" => status.to_string()
    )
    .increment(1);
}

pub fn record_tick_latency(tick: &str, duration: Duration) {
    histogram!("fo_skid_tick_seconds", "tick" => tick.to_string()).record(duration.as_secs_f64());
}

/// Records waiting for upload after the last sync attempt.
pub fn set_unsynced_backlog(count: usize) {
    gauge!("fo_skid_unsynced_records").set(count as f64);
}

pub fn set_bus_connected(connected: bool) {
    gauge!("fo_skid_bus_connected").set(if connected { 1.0 } else { 0.0 });
}

/// Lifecycle state as a labelled 0/1 gauge.
pub fn set_skid_state(state: &str) {
    for s in ["created", "running", "shutting_down", "stopped"] {
        gauge!("fo_skid_state", "state" => s).set(if s == state { 1.0 } else { 0.0 });
    }
}

/// Records tick latency on drop.
pub struct LatencyTimer {
    tick: &'static str,
    start: Instant,
}

impl LatencyTimer {
    #[must_use]
    pub fn new(tick: &'static str) -> Self {
        Self { tick, start: Instant::now() }
    }
}

impl Drop for LatencyTimer {
    fn drop(&mut self) {
        record_tick_latency(self.tick, self.start.elapsed());
    }
}
