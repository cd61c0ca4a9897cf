//! Bounded retry for transient backend faults.

use std::future::Future;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::CacheError;

/// Exponential, capped backoff for transient cache I/O.
///
/// Missing fields take their defaults, so a config file may set only the
/// ones it cares about.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// Attempts per operation, the first one included
    pub max_attempts: u32,
    /// Wait before the first retry
    pub initial_delay_ms: u64,
    pub max_delay_ms: u64,
    /// Growth of the wait from one retry to the next
    pub backoff_multiplier: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay_ms: 200,
            max_delay_ms: 5000,
            backoff_multiplier: 2.0,
        }
    }
}

impl RetryPolicy {
    /// A policy that never retries
    pub fn none() -> Self {
        Self {
            max_attempts: 1,
            ..Default::default()
        }
    }

    /// Waits between consecutive attempts, one fewer than `max_attempts`
    fn backoff(&self) -> impl Iterator<Item = Duration> + '_ {
        let retries = self.max_attempts.saturating_sub(1) as usize;
        let cap = self.max_delay_ms as f64;
        std::iter::successors(Some(self.initial_delay_ms as f64), move |delay| {
            Some((delay * self.backoff_multiplier).min(cap))
        })
        .take(retries)
        .map(move |delay| Duration::from_millis(delay.min(cap) as u64))
    }

    /// Run `op` until it succeeds, fails with a non-transient error, or the
    /// attempt budget is spent.
    pub async fn run<T, F, Fut>(&self, operation: &str, mut op: F) -> Result<T, CacheError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, CacheError>>,
    {
        let mut delays = self.backoff();
        let mut attempt = 1u32;

        loop {
            let error = match op().await {
                Ok(value) => return Ok(value),
                Err(e) if e.is_transient() => e,
                Err(e) => return Err(e),
            };
            let Some(delay) = delays.next() else {
                return Err(error);
            };

            warn!(
                operation,
                attempt,
                delay_ms = delay.as_millis() as u64,
                error = %error,
                "Transient cache error, retrying"
            );
            tokio::time::sleep(delay).await;
            attempt += 1;
        }
    }
}
