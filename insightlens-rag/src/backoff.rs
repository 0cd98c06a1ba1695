//! Retry and pacing knobs for remote calls.

use std::future::Future;
use std::time::Duration;

use tracing::warn;

use crate::error::Result;

/// Exponential backoff for retrying failed embedding and generation calls.
///
/// Only collaborator failures (see [`RagError::is_collaborator_failure`])
/// are retried; storage and validation errors are returned immediately.
///
/// [`RagError::is_collaborator_failure`]: crate::RagError::is_collaborator_failure
#[derive(Debug, Clone, PartialEq)]
pub struct BackoffPolicy {
    /// Total attempts, including the first. At least 1.
    pub max_attempts: u32,
    pub initial_delay: Duration,
    pub multiplier: f64,
    pub max_delay: Duration,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay: Duration::from_secs(1),
            multiplier: 2.0,
            max_delay: Duration::from_secs(30),
        }
    }
}

impl BackoffPolicy {
    pub fn new(max_attempts: u32, initial_delay: Duration, multiplier: f64, max_delay: Duration) -> Self {
        Self { max_attempts: max_attempts.max(1), initial_delay, multiplier, max_delay }
    }

    /// A single attempt with no retries.
    pub fn none() -> Self {
        Self::immediate(1)
    }

    /// `max_attempts` attempts with no delay between them.
    pub fn immediate(max_attempts: u32) -> Self {
        Self::new(max_attempts, Duration::ZERO, 1.0, Duration::ZERO)
    }

    /// Delay to wait after the given failed attempt (1-based).
    pub fn delay(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(i32::MAX as u32) as i32;
        let secs = self.initial_delay.as_secs_f64() * self.multiplier.powi(exponent);
        if !secs.is_finite() || secs >= self.max_delay.as_secs_f64() {
            return self.max_delay;
        }
        Duration::from_secs_f64(secs.max(0.0))
    }

    /// Run `call` until it succeeds, fails with a non-retryable error, or
    /// the attempts run out. `operation` names the call in log lines.
    pub async fn retry<T, F, Fut>(&self, operation: &str, mut call: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let mut attempt = 1;
        loop {
            match call().await {
                Ok(value) => return Ok(value),
                Err(e) if e.is_collaborator_failure() && attempt < self.max_attempts => {
                    let delay = self.delay(attempt);
                    warn!(operation, attempt, delay_ms = delay.as_millis() as u64, error = %e, "retrying");
                    if !delay.is_zero() {
                        tokio::time::sleep(delay).await;
                    }
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

/// Fixed pauses between consecutive remote calls.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PipelineTimings {
    /// Pause between embedding batches.
    pub batch_pause: Duration,
    /// Pause between chunk summaries when a document has more than ten chunks.
    pub summary_pause: Duration,
}

impl Default for PipelineTimings {
    fn default() -> Self {
        Self { batch_pause: Duration::from_secs(1), summary_pause: Duration::from_millis(500) }
    }
}

impl PipelineTimings {
    /// No pauses at all.
    pub fn zero() -> Self {
        Self { batch_pause: Duration::ZERO, summary_pause: Duration::ZERO }
    }
}
