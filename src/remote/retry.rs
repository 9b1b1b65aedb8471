//! Exponential backoff around single remote attempts.

use std::{future::Future, time::Duration};

use crate::{Result, config::Config};

/// Attempt budget and backoff unit for remote calls.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
   /// Total attempts, including the first.
   pub max_attempts: u32,
   pub base_delay:   Duration,
}

impl Default for RetryPolicy {
   fn default() -> Self {
      Self { max_attempts: 3, base_delay: Duration::from_secs(1) }
   }
}

impl RetryPolicy {
   pub fn from_config(cfg: &Config) -> Self {
      Self { max_attempts: cfg.effective_max_retries(), base_delay: cfg.retry_base() }
   }

   /// Delay after the `failures`-th consecutive failure: `2^failures` units.
   pub fn delay_after(&self, failures: u32) -> Duration {
      self
         .base_delay
         .saturating_mul(2u32.saturating_pow(failures))
   }

   /// Runs `f` until it succeeds, fails with a non-retryable error, or the
   /// attempt budget is spent. Exhaustion is logged as a permanent failure.
   pub async fn run<F, Fut, T>(&self, operation: &'static str, mut f: F) -> Result<T>
   where
      F: FnMut() -> Fut,
      Fut: Future<Output = Result<T>>,
   {
      let max_attempts = self.max_attempts.max(1);
      let mut attempt = 1;

      loop {
         match f().await {
            Ok(value) => {
               if attempt > 1 {
                  tracing::info!(operation, attempt, "operation succeeded after retry");
               }
               return Ok(value);
            },
            Err(err) if err.is_retryable() && attempt < max_attempts => {
               let delay = self.delay_after(attempt);
               tracing::warn!(
                  operation,
                  attempt,
                  delay_ms = delay.as_millis() as u64,
                  error = %err,
                  "transient error, retrying"
               );
               tokio::time::sleep(delay).await;
               attempt += 1;
            },
            Err(err) => {
               if err.is_retryable() {
                  tracing::error!(operation, attempts = attempt, error = %err, "giving up after retries");
               }
               return Err(err);
            },
         }
      }
   }
}
