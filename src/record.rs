//! Persisted sensor record.
//!
//! A [`SensorRecord`] is created once per persistence tick and never
//! rewritten, except for the `synced` flag which a store may move from
//! `false` to `true` and never back.

use crate::derived::DerivedMetrics;
use crate::telemetry::ChannelValues;

/// One row of the local store.
///
/// # Example
///
/// ```
/// use fo_skid::{Channel, ChannelValues, DerivedMetrics, SensorRecord};
///
/// let values = ChannelValues::new().with(Channel::FeedLevel, 22.0);
/// let record = SensorRecord::new(1_700_000_000_000, values, DerivedMetrics::default());
///
/// assert!(!record.synced);
/// assert!(record.id.is_none());
/// assert_eq!(record.values.get(Channel::FeedLevel), Some(22.0));
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct SensorRecord {
    /// Store-assigned row id; `None` until the record has been read back.
    pub id: Option<i64>,
    /// Tick time (epoch millis).
    pub timestamp: i64,
    /// Channel values at the tick.
    pub values: ChannelValues,
    /// Derived metrics at the tick.
    pub derived: DerivedMetrics,
    /// Whether the remote backend has acknowledged this record.
    pub synced: bool,
}

impl SensorRecord {
    /// A fresh, unsynced record.
    #[must_use]
    pub fn new(timestamp: i64, values: ChannelValues, derived: DerivedMetrics) -> Self {
        Self {
            id: None,
            timestamp,
            values,
            derived,
            synced: false,
        }
    }
}
