//! Backoff for replays that cannot reach the backend.

use std::future::Future;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, warn};

use civicsync_common::Result;

/// How often and how patiently a replay is retried within one pass.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryConfig {
    /// Extra attempts after the first one. Zero means a single attempt.
    pub max_retries: u32,
    /// Delay before the first retry; doubled for each further retry.
    pub initial_delay: Duration,
    /// Upper bound for any single delay.
    pub max_delay: Duration,
    /// Spread each delay by up to this fraction in either direction.
    pub jitter: f64,
}

impl RetryConfig {
    pub fn new(max_retries: u32) -> Self {
        Self {
            max_retries,
            initial_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(30),
            jitter: 0.25,
        }
    }

    pub fn with_initial_delay(mut self, delay: Duration) -> Self {
        self.initial_delay = delay;
        self
    }

    pub fn with_max_delay(mut self, delay: Duration) -> Self {
        self.max_delay = delay;
        self
    }

    /// Disable jitter, for deterministic delays.
    pub fn without_jitter(mut self) -> Self {
        self.jitter = 0.0;
        self
    }

    /// Delay before retry number `retry` (zero-based).
    pub fn delay_before(&self, retry: u32) -> Duration {
        let doubled = 2u32
            .checked_pow(retry)
            .and_then(|factor| self.initial_delay.checked_mul(factor))
            .unwrap_or(self.max_delay);
        let capped = doubled.min(self.max_delay);

        if self.jitter <= 0.0 {
            return capped;
        }
        let spread = 1.0 - self.jitter + rand::random::<f64>() * 2.0 * self.jitter;
        capped.mul_f64(spread.max(0.0))
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self::new(0)
    }
}

/// Runs a request, retrying it only while the backend is unreachable.
///
/// Any other failure is the server's answer and comes back on the first
/// attempt.
#[derive(Debug, Clone, Default)]
pub struct RetryExecutor {
    config: RetryConfig,
}

impl RetryExecutor {
    pub fn new(config: RetryConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &RetryConfig {
        &self.config
    }

    /// Run `request`, labelled `what` in logs.
    pub async fn execute<F, Fut, T>(&self, what: &str, request: F) -> Result<T>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let mut retry = 0;
        loop {
            let err = match request().await {
                Ok(value) => {
                    if retry > 0 {
                        debug!(what, retries = retry, "succeeded after retrying");
                    }
                    return Ok(value);
                }
                Err(err) => err,
            };

            if !err.is_unreachable() || retry >= self.config.max_retries {
                return Err(err);
            }

            let delay = self.config.delay_before(retry);
            retry += 1;
            warn!(
                what,
                retry,
                delay_ms = delay.as_millis() as u64,
                "backend unreachable, retrying: {}",
                err
            );
            sleep(delay).await;
        }
    }
}
