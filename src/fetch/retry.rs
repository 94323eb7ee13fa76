//! Retry wrapper around single fetch attempts
//!
//! Transient failures are retried locally with a fixed inter-attempt delay.
//! The sleep suspends only this source's fetch sequence; other sources'
//! timers keep firing.

use crate::fetch::executor::{PriceFetcher, ScrapeOutcome};
use crate::storage::SourceRecord;
use std::time::{Duration, Instant};

/// Retry behavior for transient fetch failures
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Additional attempts after the initial fetch
    pub max_retries: u32,

    /// Delay between attempts
    pub retry_delay: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 2,
            retry_delay: Duration::from_millis(3000),
        }
    }
}

impl PriceFetcher {
    /// Fetches with bounded retries for transient failures
    ///
    /// Stops immediately on success or on a non-retryable failure. The
    /// returned outcome records how many retries were actually consumed
    /// and the total elapsed time including inter-attempt sleeps.
    pub async fn fetch_with_retry(&self, source: &SourceRecord) -> ScrapeOutcome {
        let retry = self.retry_config().clone();
        let started = Instant::now();
        let mut retries_used = 0;

        loop {
            let attempt = self.fetch_once(source).await;

            let should_retry = match &attempt.result {
                Ok(_) => false,
                Err(e) => e.is_retryable() && retries_used < retry.max_retries,
            };

            if !should_retry {
                return ScrapeOutcome {
                    result: attempt.result,
                    elapsed: started.elapsed(),
                    retries_used,
                };
            }

            retries_used += 1;
            tracing::debug!(
                "Retrying {} ({}/{}) after {:?}",
                source.name,
                retries_used,
                retry.max_retries,
                retry.retry_delay
            );
            tokio::time::sleep(retry.retry_delay).await;
        }
    }
}
