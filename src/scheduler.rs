//! Recurring tickers with a shared shutdown signal.
//!
//! Every background task of the service is spawned through one
//! [`Scheduler`]. Shutdown flips a `watch` flag: tickers stop between ticks
//! (a tick in progress runs to completion), long-running tasks are expected
//! to select on [`Scheduler::shutdown_signal`]. Anything still running after
//! the grace period is aborted.

use std::future::Future;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

pub struct Scheduler {
    shutdown: watch::Sender<bool>,
    tasks: Vec<(String, JoinHandle<()>)>,
}

impl Default for Scheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl Scheduler {
    #[must_use]
    pub fn new() -> Self {
        let (shutdown, _) = watch::channel(false);
        Self { shutdown, tasks: Vec::new() }
    }

    /// Resolves (via `changed()`/`wait_for`) once shutdown begins.
    #[must_use]
    pub fn shutdown_signal(&self) -> watch::Receiver<bool> {
        self.shutdown.subscribe()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    /// Run `job` every `period`. With `immediate` the first run happens right
    /// away, otherwise after one period. Late ticks are delayed, not bunched.
    pub fn spawn_ticker<F, Fut>(&mut self, name: &str, period: Duration, immediate: bool, mut job: F)
    where
        F: FnMut() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let mut stop = self.shutdown_signal();
        let label = name.to_string();

        let handle = tokio::spawn(async move {
            let start = if immediate { Instant::now() } else { Instant::now() + period };
            let mut interval = tokio::time::interval_at(start, period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    biased;
                    Ok(()) = stop.changed() => {
                        if *stop.borrow() {
                            break;
                        }
                    }
                    _ = interval.tick() => job().await,
                }
            }
            debug!(ticker = %label, "Ticker stopped");
        });

        debug!(ticker = name, ?period, immediate, "Ticker started");
        self.tasks.push((name.to_string(), handle));
    }

    /// Spawn a long-running task. It should watch [`Scheduler::shutdown_signal`].
    pub fn spawn_task<F>(&mut self, name: &str, task: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        self.tasks.push((name.to_string(), tokio::spawn(task)));
    }

    /// Signal shutdown, wait up to `grace` for every task, abort the rest.
    /// Returns the number of aborted tasks.
    pub async fn shutdown(self, grace: Duration) -> usize {
        let _ = self.shutdown.send(true);
        let deadline = Instant::now() + grace;
        let mut aborted = 0;

        for (name, mut handle) in self.tasks {
            match tokio::time::timeout_at(deadline, &mut handle).await {
                Ok(Ok(())) => debug!(task = %name, "Task finished"),
                Ok(Err(e)) => warn!(task = %name, error = %e, "Task ended abnormally"),
                Err(_) => {
                    warn!(task = %name, ?grace, "Task did not stop in time, aborting");
                    handle.abort();
                    aborted += 1;
                }
            }
        }

        info!(aborted, "Scheduler stopped");
        aborted
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn counting_job(counter: &Arc<AtomicUsize>) -> impl FnMut() -> std::future::Ready<()> + Send + 'static {
        let counter = counter.clone();
        move || {
            counter.fetch_add(1, Ordering::SeqCst);
            std::future::ready(())
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_immediate_ticker() {
        let ticks = Arc::new(AtomicUsize::new(0));
        let mut scheduler = Scheduler::new();
        scheduler.spawn_ticker("count", Duration::from_secs(10), true, counting_job(&ticks));

        tokio::time::sleep(Duration::from_secs(35)).await;
        assert_eq!(ticks.load(Ordering::SeqCst), 4);

        assert_eq!(scheduler.shutdown(Duration::from_secs(1)).await, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_delayed_ticker() {
        let ticks = Arc::new(AtomicUsize::new(0));
        let mut scheduler = Scheduler::new();
        scheduler.spawn_ticker("count", Duration::from_secs(10), false, counting_job(&ticks));

        tokio::time::sleep(Duration::from_secs(5)).await;
        assert_eq!(ticks.load(Ordering::SeqCst), 0);
        tokio::time::sleep(Duration::from_secs(30)).await;
        assert_eq!(ticks.load(Ordering::SeqCst), 3);

        scheduler.shutdown(Duration::from_secs(1)).await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_no_ticks_after_shutdown() {
        let ticks = Arc::new(AtomicUsize::new(0));
        let mut scheduler = Scheduler::new();
        scheduler.spawn_ticker("count", Duration::from_secs(1), true, counting_job(&ticks));

        tokio::time::sleep(Duration::from_millis(2_500)).await;
        scheduler.shutdown(Duration::from_secs(1)).await;
        let seen = ticks.load(Ordering::SeqCst);

        tokio::time::sleep(Duration::from_secs(10)).await;
        assert_eq!(ticks.load(Ordering::SeqCst), seen);
    }

    #[tokio::test(start_paused = true)]
    async fn test_in_flight_tick_completes() {
        let finished = Arc::new(AtomicUsize::new(0));
        let f = finished.clone();
        let mut scheduler = Scheduler::new();
        scheduler.spawn_ticker("slow", Duration::from_secs(60), true, move || {
            let f = f.clone();
            async move {
                tokio::time::sleep(Duration::from_secs(3)).await;
                f.fetch_add(1, Ordering::SeqCst);
            }
        });

        tokio::time::sleep(Duration::from_secs(1)).await;
        let aborted = scheduler.shutdown(Duration::from_secs(10)).await;

        assert_eq!(aborted, 0);
        assert_eq!(finished.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stuck_task_is_aborted() {
        let mut scheduler = Scheduler::new();
        scheduler.spawn_task("stuck", std::future::pending());
        let mut signal = scheduler.shutdown_signal();
        scheduler.spawn_task("polite", async move {
            let _ = signal.wait_for(|s| *s).await;
        });
        assert_eq!(scheduler.len(), 2);

        assert_eq!(scheduler.shutdown(Duration::from_secs(2)).await, 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_tickers_run_on_worker_threads() {
        let ticks = Arc::new(AtomicUsize::new(0));
        let t = ticks.clone();
        let mut scheduler = Scheduler::new();
        scheduler.spawn_ticker("yielding", Duration::from_millis(5), true, move || {
            let t = t.clone();
            async move {
                tokio::task::yield_now().await;
                t.fetch_add(1, Ordering::SeqCst);
            }
        });

        tokio::time::sleep(Duration::from_millis(40)).await;
        assert_eq!(scheduler.shutdown(Duration::from_secs(1)).await, 0);
        assert!(ticks.load(Ordering::SeqCst) >= 1);
    }
}
