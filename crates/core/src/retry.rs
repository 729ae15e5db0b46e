use std::future::Future;
use std::time::Duration;

use crate::error::SnipeError;

/// Bounded retry with linear backoff for transient failures.
///
/// Only errors classified by [`SnipeError::is_transient`] are retried;
/// logical failures (filter miss, insufficient funds, lock contention,
/// execution errors) surface immediately and are never retried here.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub attempts: u32,
    pub backoff: Duration,
}

impl RetryPolicy {
    #[must_use]
    pub const fn new(attempts: u32, backoff: Duration) -> Self {
        Self { attempts, backoff }
    }

    /// Runs `op` up to `attempts` times, sleeping `backoff * attempt`
    /// between transient failures.
    ///
    /// # Errors
    /// Returns the last error once the budget is exhausted, or the first
    /// non-transient error immediately.
    pub async fn run<T, F, Fut>(&self, what: &str, mut op: F) -> Result<T, SnipeError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, SnipeError>>,
    {
        let attempts = self.attempts.max(1);
        for attempt in 1..=attempts {
            match op().await {
                Ok(value) => return Ok(value),
                Err(err) if err.is_transient() && attempt < attempts => {
                    tracing::debug!(what, attempt, error = %err, "transient failure, retrying");
                    tokio::time::sleep(self.backoff * attempt).await;
                }
                Err(err) => return Err(err),
            }
        }
        unreachable!("retry loop returns on the final attempt");
    }
}
