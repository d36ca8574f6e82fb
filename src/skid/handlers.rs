//! Event and tick handlers.
//!
//! Each handler is a plain async method, so tests can drive the skid step by
//! step without a broker or a scheduler.

use tracing::{debug, warn};

use super::{MessageReport, SettingsReport, Skid, TickReport};
use crate::bus::BusEvent;
use crate::control::Evaluation;
use crate::telemetry::IngestError;

impl Skid {
    /// Dispatch one bus event. Returns the report for accepted messages.
    pub async fn handle_event(&self, event: BusEvent) -> Option<MessageReport> {
        match event {
            BusEvent::Message { topic, payload, received_at } => {
                self.handle_message(&topic, &payload, received_at).await.ok()
            }
            BusEvent::Connected => {
                debug!("Bus connected");
                None
            }
            BusEvent::Disconnected => {
                warn!("Bus disconnected, waiting for reconnect");
                None
            }
        }
    }

    /// Ingest a message, then derive metrics and re-evaluate control.
    ///
    /// A rejected message changes nothing and triggers nothing.
    pub async fn handle_message(
        &self,
        topic: &str,
        payload: &[u8],
        received_at: i64,
    ) -> Result<MessageReport, IngestError> {
        let channel = self.telemetry.ingest(topic, payload, received_at)?;
        let snapshot = self.telemetry.read();

        let derivation = if self.config.pipeline.enabled {
            Some(self.derived.derive(&snapshot, received_at, self.records.as_ref()).await)
        } else {
            None
        };

        let control = if self.config.control.enabled {
            Some(self.evaluate_control().await)
        } else {
            None
        };

        Ok(MessageReport { channel, derivation, control })
    }

    /// Persist one record, then attempt a sync whatever the write's outcome.
    pub async fn persist_and_sync(&self, now: i64) -> TickReport {
        let persisted = self
            .gateway
            .tick(&self.telemetry, &self.derived, self.records.as_ref(), now)
            .await;

        let sync = match &self.forwarder {
            Some(forwarder) => Some(forwarder.tick(self.records.as_ref()).await),
            None => None,
        };

        TickReport { persisted, sync }
    }

    /// Refresh settings, then re-evaluate control against the current cache.
    pub async fn refresh_settings(&self) -> SettingsReport {
        let refresh = self.settings.refresh(self.settings_store.as_ref()).await;
        let control = self.evaluate_control().await;
        SettingsReport { refresh, control }
    }

    /// Re-send every known actuator command.
    pub async fn republish(&self) -> Evaluation {
        self.control.republish(self.sink.as_ref()).await
    }

    async fn evaluate_control(&self) -> Evaluation {
        self.control.evaluate(&self.telemetry, &self.settings, self.sink.as_ref()).await
    }
}
