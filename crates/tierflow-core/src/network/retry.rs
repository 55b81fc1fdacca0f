//! Exponential backoff shared by fabric reads and job polling.
//!
//! - Delay grows by `exponential_base` per attempt, capped at `max_delay`
//! - Optional jitter spreads concurrent pollers apart
//! - Retries only errors the caller's predicate accepts

use rand::Rng;
use std::future::Future;
use std::time::Duration;
use tracing::{debug, warn};

use crate::config::{FabricConfig, JobsConfig};

/// Backoff configuration.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Maximum number of attempts (including the first one).
    pub max_attempts: u32,
    /// Delay after the first unresolved attempt.
    pub base_delay: Duration,
    /// Maximum delay cap.
    pub max_delay: Duration,
    /// Growth factor per attempt.
    pub exponential_base: f64,
    /// Whether to add random jitter to delays.
    pub jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(250),
            max_delay: Duration::from_secs(10),
            exponential_base: 2.0,
            jitter: true,
        }
    }
}

impl RetryConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Retry policy for idempotent fabric reads.
    pub fn for_fabric_reads(config: &FabricConfig) -> Self {
        Self::default().with_max_attempts(config.read_retries.saturating_add(1))
    }

    /// Polling schedule for unresolved jobs.
    ///
    /// Polling has no attempt limit; the caller's deadline bounds it.
    pub fn for_job_polling(config: &JobsConfig) -> Self {
        Self {
            exponential_base: config.backoff_factor,
            ..Self::default()
        }
        .with_max_attempts(u32::MAX)
        .with_base_delay(config.initial_poll())
        .with_max_delay(config.max_poll())
        .with_jitter(false)
    }

    pub fn with_max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = attempts.max(1);
        self
    }

    pub fn with_base_delay(mut self, delay: Duration) -> Self {
        self.base_delay = delay;
        self
    }

    pub fn with_max_delay(mut self, delay: Duration) -> Self {
        self.max_delay = delay;
        self
    }

    pub fn with_jitter(mut self, jitter: bool) -> Self {
        self.jitter = jitter;
        self
    }

    /// Delay before attempt `attempt + 1` (0-indexed).
    pub fn calculate_delay(&self, attempt: u32) -> Duration {
        let exponent = attempt.min(i32::MAX as u32) as i32;
        let delay_secs = self.base_delay.as_secs_f64() * self.exponential_base.powi(exponent);
        let max_secs = self.max_delay.as_secs_f64();
        let capped_secs = if delay_secs.is_finite() {
            delay_secs.min(max_secs)
        } else {
            max_secs
        };

        let final_secs = if self.jitter {
            // Scale by 0.5..1.5 so the mean stays put and no delay collapses to zero
            let jitter_factor = rand::rng().random_range(0.5..1.5);
            (capped_secs * jitter_factor).min(max_secs)
        } else {
            capped_secs
        };

        Duration::from_secs_f64(final_secs)
    }
}

/// Statistics about a retried operation.
#[derive(Debug, Clone, Default)]
pub struct RetryStats {
    pub attempts: u32,
    pub total_delay: Duration,
    pub success: bool,
    pub last_error: Option<String>,
}

/// Retry an async operation with exponential backoff.
///
/// Returns the final result together with the attempt statistics.
pub async fn retry_async<F, Fut, T, E>(
    config: &RetryConfig,
    mut operation: F,
    should_retry: impl Fn(&E) -> bool,
) -> (Result<T, E>, RetryStats)
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: std::fmt::Display,
{
    let mut stats = RetryStats::default();
    let mut attempt = 0u32;

    loop {
        stats.attempts = attempt + 1;

        let err = match operation().await {
            Ok(value) => {
                stats.success = true;
                if attempt > 0 {
                    debug!(attempts = attempt + 1, "Operation succeeded after retry");
                }
                return (Ok(value), stats);
            }
            Err(e) => e,
        };
        stats.last_error = Some(err.to_string());

        if !should_retry(&err) {
            debug!(error = %err, "Error is not retryable");
            return (Err(err), stats);
        }
        if attempt + 1 >= config.max_attempts {
            warn!(attempts = config.max_attempts, error = %err, "Retry attempts exhausted");
            return (Err(err), stats);
        }

        let delay = config.calculate_delay(attempt);
        stats.total_delay += delay;
        warn!(
            attempt = attempt + 1,
            max_attempts = config.max_attempts,
            error = %err,
            "Attempt failed, retrying in {:?}",
            delay
        );
        tokio::time::sleep(delay).await;
        attempt += 1;
    }
}
