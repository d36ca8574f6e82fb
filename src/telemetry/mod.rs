//! Sensor channels and the telemetry cache.

pub mod cache;
pub mod channel;

pub use cache::{parse_payload, IngestError, Reading, SensorSnapshot, TelemetryCache};
pub use channel::{Channel, ChannelValues};
