//! Compare-and-publish of actuator commands.
//!
//! A command is sent only when it differs from the last one that reached the
//! bus. The state is updated after the publish succeeds. The whole
//! read/compare/publish/update sequence runs under one async lock: the caches
//! are read only once the lock is held, so an evaluation that had to wait
//! never acts on readings older than the one before it.

use tokio::sync::Mutex;
use tracing::{debug, info, instrument, warn};

use super::actuator::{Actuator, ActuatorState, Command};
use super::rules::{self, FeedBand};
use crate::bus::{BusError, CommandSink};
use crate::settings::SettingsCache;
use crate::telemetry::TelemetryCache;

/// What one evaluation or republish did.
#[derive(Debug, Default)]
pub struct Evaluation {
    pub published: Vec<(Actuator, Command)>,
    pub failed: Vec<(Actuator, BusError)>,
}

impl Evaluation {
    #[must_use]
    pub fn is_quiet(&self) -> bool {
        self.published.is_empty() && self.failed.is_empty()
    }
}

pub struct ControlLoop {
    band: FeedBand,
    state: Mutex<ActuatorState>,
}

impl ControlLoop {
    #[must_use]
    pub fn new(band: FeedBand) -> Self {
        Self { band, state: Mutex::new(ActuatorState::default()) }
    }

    pub async fn state(&self) -> ActuatorState {
        *self.state.lock().await
    }

    /// Run all rules against the current cache contents and publish the
    /// transitions.
    pub async fn evaluate(
        &self,
        telemetry: &TelemetryCache,
        settings: &SettingsCache,
        sink: &dyn CommandSink,
    ) -> Evaluation {
        let mut state = self.state.lock().await;
        let snapshot = telemetry.read();
        let setting = settings.read();
        let desired = rules::evaluate(&snapshot, setting.as_ref(), self.band);
        let mut outcome = Evaluation::default();

        for (actuator, command) in desired {
            if state.get(actuator) == Some(command) {
                continue;
            }
            match publish(sink, actuator, command).await {
                Ok(()) => {
                    state.set(actuator, command);
                    info!(actuator = %actuator, command = %command, "Actuator command sent");
                    outcome.published.push((actuator, command));
                }
                Err(e) => outcome.failed.push((actuator, e)),
            }
        }
        outcome
    }

    /// Re-send every known command regardless of change.
    #[instrument(skip_all)]
    pub async fn republish(&self, sink: &dyn CommandSink) -> Evaluation {
        let state = self.state.lock().await;
        let mut outcome = Evaluation::default();

        for (actuator, command) in state.known() {
            match publish(sink, actuator, command).await {
                Ok(()) => outcome.published.push((actuator, command)),
                Err(e) => outcome.failed.push((actuator, e)),
            }
        }
        debug!(sent = outcome.published.len(), failed = outcome.failed.len(), "Republished actuator state");
        outcome
    }
}

async fn publish(sink: &dyn CommandSink, actuator: Actuator, command: Command) -> Result<(), BusError> {
    match sink.publish(actuator.topic(), command.payload()).await {
        Ok(()) => {
            crate::metrics::record_publish(actuator.topic(), "success");
            Ok(())
        }
        Err(e) => {
            warn!(actuator = %actuator, command = %command, error = %e, "Actuator publish failed");
            crate::metrics::record_publish(actuator.topic(), "error");
            Err(e)
        }
    }
}
