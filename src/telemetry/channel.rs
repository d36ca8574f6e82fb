// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! The fixed sensor topology of the skid.
//!
//! Every channel has two spellings: the bus topic the sensor publishes on
//! (`cstr-ph`) and the column name used in the store and the remote rows
//! (`cstr_ph`).
//!
//! # Example
//!
//! ```
//! use fo_skid::Channel;
//!
//! let channel = Channel::from_topic("feed-level").unwrap();
//! assert_eq!(channel, Channel::FeedLevel);
//! assert_eq!(channel.column(), "feed_level");
//! assert!(Channel::from_topic("feed/level").is_none());
//! ```

use serde::ser::SerializeMap;
use serde::{Serialize, Serializer};

/// A sensor channel on the skid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Channel {
    CstrPh,
    FeedEc,
    CstrOrp,
    CstrTemp,
    CstrLevel,
    FeedLevel,
    FeedTds,
    FeedTemp,
    DsTds,
    DsLevel,
    DsEc,
}

impl Channel {
    /// Number of channels on the skid.
    pub const COUNT: usize = 11;

    /// All channels, in index order.
    pub const ALL: [Channel; Channel::COUNT] = [
        Channel::CstrPh,
        Channel::FeedEc,
        Channel::CstrOrp,
        Channel::CstrTemp,
        Channel::CstrLevel,
        Channel::FeedLevel,
        Channel::FeedTds,
        Channel::FeedTemp,
        Channel::DsTds,
        Channel::DsLevel,
        Channel::DsEc,
    ];

    /// Channels the control loop reacts to.
    pub const CONTROL: [Channel; 4] = [
        Channel::CstrTemp,
        Channel::CstrLevel,
        Channel::FeedLevel,
        Channel::DsTds,
    ];

    /// Position of this channel in [`Channel::ALL`].
    #[must_use]
    pub fn index(self) -> usize {
        self as usize
    }

    /// Bus topic the sensor publishes on.
    #[must_use]
    pub fn topic(self) -> &'static str {
        match self {
            Self::CstrPh => "cstr-ph",
            Self::FeedEc => "feed-ec",
            Self::CstrOrp => "cstr-orp",
            Self::CstrTemp => "cstr-temp",
            Self::CstrLevel => "cstr-level",
            Self::FeedLevel => "feed-level",
            Self::FeedTds => "feed-tds",
            Self::FeedTemp => "feed-temp",
            Self::DsTds => "ds-tds",
            Self::DsLevel => "ds-level",
            Self::DsEc => "ds-ec",
        }
    }

    /// Column name in the store and in remote rows.
    #[must_use]
    pub fn column(self) -> &'static str {
        match self {
            Self::CstrPh => "cstr_ph",
            Self::FeedEc => "feed_ec",
            Self::CstrOrp => "cstr_orp",
            Self::CstrTemp => "cstr_temp",
            Self::CstrLevel => "cstr_level",
            Self::FeedLevel => "feed_level",
            Self::FeedTds => "feed_tds",
            Self::FeedTemp => "feed_temp",
            Self::DsTds => "ds_tds",
            Self::DsLevel => "ds_level",
            Self::DsEc => "ds_ec",
        }
    }

    #[must_use]
    pub fn from_topic(topic: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|c| c.topic() == topic)
    }

    #[must_use]
    pub fn from_column(column: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|c| c.column() == column)
    }
}

impl std::fmt::Display for Channel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.column())
    }
}

/// One optional value per channel, indexed by [`Channel`].
///
/// Serializes as a map keyed by column name, so it can be flattened into
/// row structs.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ChannelValues([Option<f64>; Channel::COUNT]);

impl ChannelValues {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn get(&self, channel: Channel) -> Option<f64> {
        self.0[channel.index()]
    }

    pub fn set(&mut self, channel: Channel, value: Option<f64>) {
        self.0[channel.index()] = value;
    }

    /// Builder-style setter, handy in tests and fixtures.
    #[must_use]
    pub fn with(mut self, channel: Channel, value: f64) -> Self {
        self.set(channel, Some(value));
        self
    }

    pub fn iter(&self) -> impl Iterator<Item = (Channel, Option<f64>)> + '_ {
        Channel::ALL.into_iter().map(move |c| (c, self.get(c)))
    }

    /// Number of channels holding a value.
    #[must_use]
    pub fn known(&self) -> usize {
        self.0.iter().filter(|v| v.is_some()).count()
    }
}

impl Serialize for ChannelValues {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(Channel::COUNT))?;
        for (channel, value) in self.iter() {
            map.serialize_entry(channel.column(), &value)?;
        }
        map.end()
    }
}
