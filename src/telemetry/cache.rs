// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Last-known-value cache for the sensor channels.
//!
//! Inbound bus messages overwrite the channel's value and arrival time
//! unconditionally. There is no smoothing and no plausibility check against
//! physical bounds. [`TelemetryCache::read`] returns a copy taken under a
//! single lock, so a reader never sees half of a concurrent update.

use parking_lot::RwLock;
use thiserror::Error;
use tracing::{debug, warn};

use super::channel::{Channel, ChannelValues};

/// Why an inbound message was dropped.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum IngestError {
    #[error("unknown topic '{0}'")]
    UnknownTopic(String),
    #[error("unparseable payload on '{topic}': {reason}")]
    Payload { topic: String, reason: String },
}

/// A single channel value with its arrival time (epoch millis).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Reading {
    pub value: f64,
    pub updated_at: i64,
}

/// Point-in-time copy of every channel.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SensorSnapshot {
    readings: [Option<Reading>; Channel::COUNT],
}

impl SensorSnapshot {
    #[must_use]
    pub fn get(&self, channel: Channel) -> Option<Reading> {
        self.readings[channel.index()]
    }

    #[must_use]
    pub fn value(&self, channel: Channel) -> Option<f64> {
        self.get(channel).map(|r| r.value)
    }

    /// Values only, dropping arrival times.
    #[must_use]
    pub fn values(&self) -> ChannelValues {
        let mut values = ChannelValues::new();
        for channel in Channel::ALL {
            values.set(channel, self.value(channel));
        }
        values
    }

    /// Most recent arrival time across all channels.
    #[must_use]
    pub fn last_update(&self) -> Option<i64> {
        self.readings.iter().flatten().map(|r| r.updated_at).max()
    }

    pub(crate) fn set(&mut self, channel: Channel, reading: Reading) {
        self.readings[channel.index()] = Some(reading);
    }
}

/// Shared telemetry cache.
#[derive(Default)]
pub struct TelemetryCache {
    snapshot: RwLock<SensorSnapshot>,
}

impl TelemetryCache {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Overwrite one channel.
    pub fn update(&self, channel: Channel, value: f64, updated_at: i64) {
        self.snapshot.write().set(channel, Reading { value, updated_at });
    }

    /// Resolve a bus message to a channel update.
    ///
    /// Unknown topics and unparseable payloads are logged and leave the
    /// cache untouched.
    pub fn ingest(&self, topic: &str, payload: &[u8], received_at: i64) -> Result<Channel, IngestError> {
        let Some(channel) = Channel::from_topic(topic) else {
            warn!(topic = %topic, "Dropping message on unknown topic");
            crate::metrics::record_ingest(topic, "unknown_topic");
            return Err(IngestError::UnknownTopic(topic.to_string()));
        };

        let value = match parse_payload(payload) {
            Ok(v) => v,
            Err(reason) => {
                warn!(topic = %topic, %reason, "Dropping unparseable payload");
                crate::metrics::record_ingest(topic, "bad_payload");
                return Err(IngestError::Payload { topic: topic.to_string(), reason });
            }
        };

        self.update(channel, value, received_at);
        debug!(channel = %channel, value, "Telemetry updated");
        crate::metrics::record_ingest(topic, "accepted");
        Ok(channel)
    }

    /// Consistent copy of all channels.
    #[must_use]
    pub fn read(&self) -> SensorSnapshot {
        self.snapshot.read().clone()
    }
}

/// Parse a bare numeric payload such as `21.4`.
///
/// Surrounding whitespace and a JSON string literal (`"21.4"`) are accepted;
/// non-finite values are not.
pub fn parse_payload(payload: &[u8]) -> Result<f64, String> {
    let text = std::str::from_utf8(payload).map_err(|e| format!("not utf-8: {e}"))?;
    let trimmed = text.trim();
    let literal = trimmed
        .strip_prefix('"')
        .and_then(|s| s.strip_suffix('"'))
        .map(str::trim)
        .unwrap_or(trimmed);

    if literal.is_empty() {
        return Err("empty payload".to_string());
    }

    let value: f64 = literal
        .parse()
        .map_err(|e| format!("'{literal}' is not a number: {e}"))?;

    if !value.is_finite() {
        return Err(format!("'{literal}' is not finite"));
    }
    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_parse_payload_accepts_bare_and_quoted_numbers() {
        assert_eq!(parse_payload(b"21.5"), Ok(21.5));
        assert_eq!(parse_payload(b" 7\n"), Ok(7.0));
        assert_eq!(parse_payload(b"\"6.9\""), Ok(6.9));
        assert_eq!(parse_payload(b"-0.25"), Ok(-0.25));
        assert_eq!(parse_payload(b"1e3"), Ok(1000.0));
    }

    #[test]
    fn test_parse_payload_rejects_garbage() {
        assert!(parse_payload(b"").is_err());
        assert!(parse_payload(b"   ").is_err());
        assert!(parse_payload(b"on").is_err());
        assert!(parse_payload(b"{\"value\": 1}").is_err());
        assert!(parse_payload(b"NaN").is_err());
        assert!(parse_payload(b"inf").is_err());
        assert!(parse_payload(&[0xff, 0xfe]).is_err());
    }

    #[test]
    fn test_ingest_updates_channel() {
        let cache = TelemetryCache::new();
        let channel = cache.ingest("cstr-temp", b"34.2", 1_000).unwrap();

        assert_eq!(channel, Channel::CstrTemp);
        let snap = cache.read();
        assert_eq!(snap.get(Channel::CstrTemp), Some(Reading { value: 34.2, updated_at: 1_000 }));
        assert_eq!(snap.last_update(), Some(1_000));
    }

    #[test]
    fn test_unknown_topic_leaves_cache_unchanged() {
        let cache = TelemetryCache::new();
        cache.ingest("ds-tds", b"40", 1).unwrap();
        let before = cache.read();

        let err = cache.ingest("ds-pressure", b"2.0", 2).unwrap_err();
        assert_eq!(err, IngestError::UnknownTopic("ds-pressure".into()));
        assert_eq!(cache.read(), before);
    }

    #[test]
    fn test_bad_payload_leaves_cache_unchanged() {
        let cache = TelemetryCache::new();
        cache.ingest("feed-level", b"22", 1).unwrap();

        let err = cache.ingest("feed-level", b"twenty", 2).unwrap_err();
        assert!(matches!(err, IngestError::Payload { ref topic, .. } if topic == "feed-level"));
        assert_eq!(cache.read().get(Channel::FeedLevel), Some(Reading { value: 22.0, updated_at: 1 }));
    }

    #[test]
    fn test_last_value_wins() {
        let cache = TelemetryCache::new();
        cache.update(Channel::DsEc, 1.0, 10);
        cache.update(Channel::DsEc, 2.0, 5);

        // No ordering by timestamp: the latest call wins.
        assert_eq!(cache.read().get(Channel::DsEc), Some(Reading { value: 2.0, updated_at: 5 }));
    }

    #[test]
    fn test_snapshot_values() {
        let cache = TelemetryCache::new();
        cache.update(Channel::FeedTds, 310.0, 1);
        let values = cache.read().values();

        assert_eq!(values.get(Channel::FeedTds), Some(310.0));
        assert_eq!(values.known(), 1);
    }

    #[test]
    fn test_reads_are_never_torn() {
        // Writers always set both channels to the same value in one snapshot
        // write; readers must never observe them apart.
        let cache = Arc::new(TelemetryCache::new());
        let writer = {
            let cache = cache.clone();
            std::thread::spawn(move || {
                for i in 0..2_000 {
                    let mut guard = cache.snapshot.write();
                    let r = Reading { value: i as f64, updated_at: i };
                    guard.set(Channel::CstrPh, r);
                    guard.set(Channel::CstrOrp, r);
                }
            })
        };

        for _ in 0..2_000 {
            let snap = cache.read();
            assert_eq!(snap.value(Channel::CstrPh), snap.value(Channel::CstrOrp));
        }
        writer.join().unwrap();
    }
}
