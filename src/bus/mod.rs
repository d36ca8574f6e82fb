//! Pub/sub bus adapter.
//!
//! Inbound traffic is turned into [`BusEvent`]s on a channel, so everything
//! downstream is driven by a plain dispatch loop. Outbound actuator commands
//! go through the [`CommandSink`] trait.

use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

pub mod mqtt;

pub use mqtt::{MqttBus, MqttEventPump};

/// Something the dispatch loop reacts to.
#[derive(Debug, Clone, PartialEq)]
pub enum BusEvent {
    Message {
        topic: String,
        payload: Vec<u8>,
        /// Epoch millis.
        received_at: i64,
    },
    Connected,
    Disconnected,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BusError {
    #[error("Publish to '{topic}' failed: {reason}")]
    Publish { topic: String, reason: String },
    #[error("Bus request timed out after {0:?}")]
    Timeout(Duration),
    #[error("Subscribe failed: {0}")]
    Subscribe(String),
}

/// Outbound actuator commands.
#[async_trait]
pub trait CommandSink: Send + Sync {
    /// Returns once the bus client has accepted the message, bounded in time.
    async fn publish(&self, topic: &str, payload: &str) -> Result<(), BusError>;
}
