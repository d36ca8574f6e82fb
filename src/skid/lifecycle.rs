//! Skid lifecycle: start, run, shutdown.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use super::{Skid, SkidState};
use crate::bus::BusEvent;

impl Skid {
    /// Spawn the dispatch loop and the tickers.
    ///
    /// - `dispatch`: drains `events` until shutdown or the sender side closes
    /// - `persist` (pipeline role): persistence tick followed by sync
    /// - `settings` (control role): settings refresh, first run immediately
    /// - `republish` (control role): unconditional resend of actuator state
    #[tracing::instrument(skip_all)]
    pub fn start(self: &Arc<Self>, mut events: mpsc::Receiver<BusEvent>) -> crate::Scheduler {
        let mut scheduler = crate::Scheduler::new();

        let skid = Arc::clone(self);
        let mut stop = scheduler.shutdown_signal();
        scheduler.spawn_task("dispatch", async move {
            loop {
                tokio::select! {
                    biased;
                    Ok(()) = stop.changed() => {
                        if *stop.borrow() {
                            break;
                        }
                    }
                    event = events.recv() => match event {
                        Some(event) => {
                            skid.handle_event(event).await;
                        }
                        None => {
                            warn!("Bus event channel closed");
                            break;
                        }
                    },
                }
            }
            debug!("Dispatch loop stopped");
        });

        if self.config.pipeline.enabled {
            let skid = Arc::clone(self);
            scheduler.spawn_ticker("persist", self.config.pipeline.persist_interval(), false, move || {
                let skid = Arc::clone(&skid);
                async move {
                    skid.persist_and_sync(crate::now_millis()).await;
                }
            });
        }

        if self.config.control.enabled {
            let skid = Arc::clone(self);
            scheduler.spawn_ticker("settings", self.config.control.settings_refresh(), true, move || {
                let skid = Arc::clone(&skid);
                async move {
                    skid.refresh_settings().await;
                }
            });

            let skid = Arc::clone(self);
            scheduler.spawn_ticker("republish", self.config.control.republish(), false, move || {
                let skid = Arc::clone(&skid);
                async move {
                    skid.republish().await;
                }
            });
        }

        self.set_state(SkidState::Running);
        info!(
            tasks = scheduler.len(),
            pipeline = self.config.pipeline.enabled,
            control = self.config.control.enabled,
            remote = self.forwarder.is_some(),
            "Skid running"
        );
        scheduler
    }

    /// Start, wait for `stop`, then shut down.
    pub async fn run<F>(self: &Arc<Self>, events: mpsc::Receiver<BusEvent>, stop: F) -> usize
    where
        F: Future<Output = ()>,
    {
        let scheduler = self.start(events);
        stop.await;
        self.shutdown(scheduler).await
    }

    /// Stop every task, letting in-flight ticks finish within the configured
    /// grace period. Returns the number of tasks that had to be aborted.
    #[tracing::instrument(skip_all)]
    pub async fn shutdown(&self, scheduler: crate::Scheduler) -> usize {
        info!("Initiating skid shutdown...");
        self.set_state(SkidState::ShuttingDown);

        let aborted = scheduler.shutdown(Duration::from_secs(self.config.shutdown_grace_secs)).await;

        self.set_state(SkidState::Stopped);
        info!(aborted, "Skid shutdown complete");
        aborted
    }
}
