//! Retry controller: bounded attempts with exponential backoff.
//!
//! Each attempt gets its number, so the caller can escalate strategies as
//! the count rises. Only retryable errors trigger another attempt; the
//! overall deadline is enforced around every attempt and every sleep.

use std::future::Future;
use std::time::Duration;

use rand::Rng;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::config::RetrySettings;
use crate::error::{ExtractError, ExtractResult};

/// Where a retried operation ended up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryState {
    Attempting(u32),
    Done,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Attempts numbered `0..max_attempts` are run.
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub jitter: bool,
    pub deadline: Option<Duration>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from(&RetrySettings::default())
    }
}

impl From<&RetrySettings> for RetryPolicy {
    fn from(settings: &RetrySettings) -> Self {
        Self {
            max_attempts: settings.max_attempts.max(1),
            base_delay: Duration::from_millis(settings.backoff_base_ms),
            jitter: settings.jitter,
            deadline: settings.deadline_secs.map(Duration::from_secs),
        }
    }
}

impl RetryPolicy {
    /// Sleep after attempt `attempt` fails: `base * 2^attempt`, plus up to
    /// half a base of jitter. Strictly increasing in `attempt`.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exp = self.base_delay.saturating_mul(2u32.saturating_pow(attempt.min(16)));
        if !self.jitter || self.base_delay.is_zero() {
            return exp;
        }
        let max_jitter = (self.base_delay.as_millis() / 2).max(1) as u64;
        exp + Duration::from_millis(rand::thread_rng().gen_range(0..max_jitter))
    }
}

/// Result of a retried operation.
#[derive(Debug)]
pub struct RetryReport<T> {
    pub result: ExtractResult<T>,
    /// Attempts actually run.
    pub attempts: u32,
    /// Number of the last attempt run.
    pub last_attempt: u32,
    pub state: RetryState,
}

#[derive(Debug, Clone, Default)]
pub struct RetryController {
    policy: RetryPolicy,
}

impl RetryController {
    pub fn new(policy: RetryPolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Run `op` starting from attempt `start`. When `start` is already at or
    /// past the limit, exactly one attempt runs.
    pub async fn run<T, F, Fut>(&self, start: u32, mut op: F) -> RetryReport<T>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = ExtractResult<T>>,
    {
        let started = Instant::now();
        let last = start.max(self.policy.max_attempts.saturating_sub(1));
        let mut attempt = start;
        let mut attempts = 0;

        loop {
            attempts += 1;
            let outcome = match self.remaining(started) {
                Some(remaining) if remaining.is_zero() => Err(self.deadline_error()),
                Some(remaining) => tokio::time::timeout(remaining, op(attempt))
                    .await
                    .unwrap_or_else(|_| Err(self.deadline_error())),
                None => op(attempt).await,
            };

            match outcome {
                Ok(value) => {
                    if attempt > start {
                        info!("Attempt {} succeeded after {} tries", attempt, attempts);
                    }
                    return RetryReport {
                        result: Ok(value),
                        attempts,
                        last_attempt: attempt,
                        state: RetryState::Done,
                    };
                }
                Err(e) if e.is_retryable() && attempt < last => {
                    let delay = self.policy.delay_for(attempt);
                    if self
                        .remaining(started)
                        .is_some_and(|remaining| remaining <= delay)
                    {
                        warn!("Attempt {} failed ({}); deadline leaves no room to retry", attempt, e);
                        return self.failed(Err(e), attempts, attempt);
                    }
                    warn!(
                        "Attempt {} failed ({}), retrying in {:?}",
                        attempt,
                        e.kind(),
                        delay
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                    debug!("State {:?}", RetryState::Attempting(attempt));
                }
                Err(e) => {
                    warn!("Attempt {} failed terminally: {}", attempt, e);
                    return self.failed(Err(e), attempts, attempt);
                }
            }
        }
    }

    fn failed<T>(&self, result: ExtractResult<T>, attempts: u32, attempt: u32) -> RetryReport<T> {
        RetryReport {
            result,
            attempts,
            last_attempt: attempt,
            state: RetryState::Failed,
        }
    }

    fn remaining(&self, started: Instant) -> Option<Duration> {
        self.policy
            .deadline
            .map(|deadline| deadline.saturating_sub(started.elapsed()))
    }

    fn deadline_error(&self) -> ExtractError {
        ExtractError::UpstreamTimeout(self.policy.deadline.unwrap_or_default())
    }
}
