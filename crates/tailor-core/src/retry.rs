use std::future::Future;
use std::time::Duration;

use crate::error::AppError;
use crate::traits::{Prompt, TextGenerator};

/// Bounded retry with exponential backoff.
///
/// Delay schedule for the default policy: 500ms, 1s, 2s, … capped at `max_delay`.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Total attempts, including the first one.
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(10),
        }
    }
}

impl RetryPolicy {
    /// One retry after `delay`: the budget for text-generation calls.
    pub fn once(delay: Duration) -> Self {
        Self {
            max_attempts: 2,
            base_delay: delay,
            max_delay: delay,
        }
    }

    /// No retries at all.
    pub fn none() -> Self {
        Self {
            max_attempts: 1,
            base_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
        }
    }

    pub fn with_max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = attempts.max(1);
        self
    }

    pub fn with_base_delay(mut self, delay: Duration) -> Self {
        self.base_delay = delay;
        self
    }

    /// Delay before retry number `attempt` (1-indexed).
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
        std::cmp::min(self.base_delay.saturating_mul(factor), self.max_delay)
    }

    /// Run `operation`, retrying while it fails with a retryable error and the
    /// attempt budget lasts. Non-retryable errors are returned immediately.
    pub async fn run<T, F, Fut>(&self, what: &str, mut operation: F) -> Result<T, AppError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, AppError>>,
    {
        let mut attempt = 1;
        loop {
            match operation().await {
                Ok(value) => return Ok(value),
                Err(e) if e.is_retryable() && attempt < self.max_attempts => {
                    let delay = self.delay_for_attempt(attempt);
                    tracing::warn!(
                        operation = %what,
                        attempt,
                        max_attempts = self.max_attempts,
                        delay_ms = %delay.as_millis(),
                        error = %e,
                        "Retrying after transient failure"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

/// One text-generation call under `policy`. A blank answer counts as a
/// retryable model error.
pub async fn complete_with_retry<G: TextGenerator>(
    generator: &G,
    prompt: &Prompt,
    policy: &RetryPolicy,
    what: &str,
) -> Result<String, AppError> {
    policy
        .run(what, || async move {
            let text = generator.complete(prompt).await?;
            if text.trim().is_empty() {
                Err(AppError::empty_model_response())
            } else {
                Ok(text)
            }
        })
        .await
}
