// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Retry with exponential backoff.
//!
//! Used at startup (store connect, schema creation) where a wrong URL should
//! fail within seconds, around store read queries, and by the bus pump which
//! backs off between reconnection attempts forever.
//!
//! # Example
//!
//! ```
//! use fo_skid::RetryConfig;
//! use std::time::Duration;
//!
//! let startup = RetryConfig::startup();
//! assert_eq!(startup.max_retries, Some(5));
//!
//! let reconnect = RetryConfig::reconnect();
//! assert_eq!(reconnect.max_retries, None);
//! assert_eq!(reconnect.initial_delay, Duration::from_secs(2));
//! ```

use std::future::Future;
use std::time::Duration;

use tokio::time::sleep;
use tracing::{info, warn};

#[derive(Debug, Clone)]
pub struct RetryConfig {
    pub initial_delay: Duration,
    pub max_delay: Duration,
    pub factor: f64,
    /// `None` retries forever.
    pub max_retries: Option<usize>,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self::startup()
    }
}

impl RetryConfig {
    /// Five attempts, roughly five seconds in total.
    #[must_use]
    pub fn startup() -> Self {
        Self {
            max_retries: Some(5),
            initial_delay: Duration::from_millis(200),
            max_delay: Duration::from_secs(2),
            factor: 2.0,
        }
    }

    /// Fixed two second pause between bus reconnection attempts, forever.
    #[must_use]
    pub fn reconnect() -> Self {
        Self {
            max_retries: None,
            initial_delay: Duration::from_secs(2),
            max_delay: Duration::from_secs(2),
            factor: 1.0,
        }
    }

    /// Three quick attempts for a single query.
    #[must_use]
    pub fn query() -> Self {
        Self {
            max_retries: Some(3),
            initial_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(2),
            factor: 2.0,
        }
    }

    #[cfg(test)]
    pub fn test() -> Self {
        Self {
            max_retries: Some(3),
            initial_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(10),
            factor: 2.0,
        }
    }

    #[must_use]
    pub fn backoff(&self) -> Backoff {
        Backoff {
            next: self.initial_delay,
            max: self.max_delay,
            factor: self.factor,
            attempts: 0,
        }
    }
}

/// Delay sequence for one run of retries.
#[derive(Debug, Clone)]
pub struct Backoff {
    next: Duration,
    max: Duration,
    factor: f64,
    attempts: usize,
}

impl Backoff {
    /// The delay to wait now; advances the sequence.
    pub fn next_delay(&mut self) -> Duration {
        let delay = self.next;
        self.attempts += 1;
        self.next = self.next.mul_f64(self.factor).min(self.max);
        delay
    }

    #[must_use]
    pub fn attempts(&self) -> usize {
        self.attempts
    }
}

pub async fn retry<F, Fut, T, E>(operation_name: &str, config: &RetryConfig, mut operation: F) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: std::fmt::Display,
{
    let mut backoff = config.backoff();
    let mut failures = 0;

    loop {
        match operation().await {
            Ok(val) => {
                if failures > 0 {
                    info!(operation = operation_name, retries = failures, "Operation succeeded after retries");
                }
                return Ok(val);
            }
            Err(err) => {
                failures += 1;
                if config.max_retries.is_some_and(|max| failures >= max) {
                    return Err(err);
                }

                let delay = backoff.next_delay();
                warn!(
                    operation = operation_name,
                    attempt = failures,
                    max_attempts = ?config.max_retries,
                    error = %err,
                    ?delay,
                    "Operation failed, retrying"
                );
                sleep(delay).await;
            }
        }
    }
}
