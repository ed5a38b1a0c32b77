//! Retry policy for transient fetch failures
//!
//! Drives the per-task state machine: every fetch outcome is turned into the
//! next [`TaskState`] here so the worker loop stays a plain `match`.

use crate::config::RetryConfig;
use crate::crawler::FetchResult;
use crate::state::TaskState;
use rand::Rng;
use std::time::Duration;

/// Exponential backoff with non-negative jitter
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    max_retries: u32,
    initial_backoff: Duration,
    max_backoff: Duration,
    multiplier: f64,
    jitter: f64,
}

impl RetryPolicy {
    pub fn from_config(config: &RetryConfig) -> Self {
        Self {
            max_retries: config.max_retries,
            initial_backoff: Duration::from_millis(config.initial_backoff_ms),
            max_backoff: Duration::from_millis(config.max_backoff_ms),
            multiplier: config.multiplier,
            jitter: config.jitter,
        }
    }

    /// Total fetch attempts a task may make
    pub fn max_attempts(&self) -> u32 {
        self.max_retries.saturating_add(1)
    }

    /// Backoff floor after failed attempt `attempt` (numbered from 1)
    ///
    /// `initial * multiplier^(attempt - 1)`, capped at the maximum backoff.
    pub fn backoff(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(i32::MAX as u32) as i32;
        let millis = self.initial_backoff.as_millis() as f64 * self.multiplier.powi(exponent);
        let max_millis = self.max_backoff.as_millis() as f64;

        if !millis.is_finite() || millis >= max_millis {
            self.max_backoff
        } else {
            Duration::from_millis(millis as u64)
        }
    }

    /// Delay before the attempt following `attempt`
    ///
    /// The jittered backoff never drops below [`backoff`](Self::backoff); a
    /// `Retry-After` hint wins when it is longer. Both are capped at the
    /// maximum backoff.
    pub fn delay_for(&self, attempt: u32, retry_after: Option<Duration>) -> Duration {
        let base = self.backoff(attempt);
        let spread = base.as_secs_f64() * self.jitter;
        let jitter = if spread > 0.0 {
            Duration::from_secs_f64(rand::rng().random_range(0.0..=spread))
        } else {
            Duration::ZERO
        };

        let delay = std::cmp::max(base + jitter, retry_after.unwrap_or(Duration::ZERO));
        std::cmp::min(delay, self.max_backoff)
    }

    /// Next task state after attempt `attempt` produced `result`
    pub fn next_state(&self, attempt: u32, result: &FetchResult) -> TaskState {
        match result {
            FetchResult::Success { .. } | FetchResult::Redirect { .. } => TaskState::Succeeded,
            FetchResult::Fatal { .. } => TaskState::Skipped,
            FetchResult::Retryable { retry_after, .. } => {
                if attempt < self.max_attempts() {
                    TaskState::Retrying {
                        attempt,
                        next_delay: self.delay_for(attempt, *retry_after),
                    }
                } else {
                    TaskState::Skipped
                }
            }
        }
    }
}
