use std::future::Future;
use std::time::Duration;
use tokio::time::Instant;
use tracing::warn;

use crate::llm::LLMError;

/// Exponential backoff for model calls.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Delay before the first retry
    pub initial_delay: Duration,
    /// Factor applied to the delay after each retry
    pub multiplier: f64,
    /// Upper bound for a single delay
    pub max_delay: Duration,
    /// Overall budget measured from the first attempt
    pub deadline: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_secs(10),
            multiplier: 2.0,
            max_delay: Duration::from_secs(60),
            deadline: Duration::from_secs(300),
        }
    }
}

/// The model could not be reached within the retry budget.
#[derive(Debug, thiserror::Error)]
#[error("model unavailable after {attempts} attempt(s): {source}")]
pub struct RetryExhausted {
    pub attempts: u32,
    #[source]
    pub source: LLMError,
}

impl RetryPolicy {
    /// A policy that never retries.
    pub fn none() -> Self {
        Self {
            deadline: Duration::ZERO,
            ..Self::default()
        }
    }

    /// Delay before retry number `retry` (0-based).
    pub fn delay_for(&self, retry: u32) -> Duration {
        let factor = self.multiplier.powi(retry.min(i32::MAX as u32) as i32);
        let delay = self.initial_delay.as_secs_f64() * factor;
        if !delay.is_finite() || delay >= self.max_delay.as_secs_f64() {
            self.max_delay
        } else {
            Duration::from_secs_f64(delay)
        }
    }

    /// Runs `op` until it succeeds, fails permanently, or the next delay would
    /// overrun the deadline.
    pub async fn run<T, F, Fut>(&self, mut op: F) -> Result<T, RetryExhausted>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, LLMError>>,
    {
        let started = Instant::now();
        let mut attempts = 0;

        loop {
            attempts += 1;
            let error = match op().await {
                Ok(value) => return Ok(value),
                Err(error) => error,
            };

            if !error.is_transient() {
                return Err(RetryExhausted {
                    attempts,
                    source: error,
                });
            }

            let delay = self.delay_for(attempts - 1);
            if started.elapsed() + delay > self.deadline {
                return Err(RetryExhausted {
                    attempts,
                    source: error,
                });
            }

            warn!(attempt = attempts, delay_secs = delay.as_secs_f64(), %error, "Model call failed, retrying");
            tokio::time::sleep(delay).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn unavailable() -> LLMError {
        LLMError::ApiError {
            status: 503,
            message: "overloaded".into(),
        }
    }

    #[test]
    fn test_delays_grow_and_cap() {
        let policy = RetryPolicy::default();
        let delays: Vec<u64> = (0..6).map(|n| policy.delay_for(n).as_secs()).collect();
        assert_eq!(delays, vec![10, 20, 40, 60, 60, 60]);
        assert_eq!(policy.delay_for(u32::MAX), Duration::from_secs(60));
    }

    #[tokio::test(start_paused = true)]
    async fn test_recovers_after_transient_failures() {
        let calls = AtomicU32::new(0);
        let counter = &calls;
        let started = Instant::now();

        let result = RetryPolicy::default()
            .run(move || async move {
                if counter.fetch_add(1, Ordering::SeqCst) < 2 {
                    Err(unavailable())
                } else {
                    Ok("answer")
                }
            })
            .await
            .unwrap();

        assert_eq!(result, "answer");
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert_eq!(started.elapsed().as_secs(), 30);
    }

    #[tokio::test(start_paused = true)]
    async fn test_gives_up_at_deadline() {
        let calls = AtomicU32::new(0);
        let counter = &calls;
        let started = Instant::now();

        let err = RetryPolicy::default()
            .run(move || async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Err::<(), _>(unavailable())
            })
            .await
            .unwrap_err();

        // Sleeps of 10 + 20 + 40 + 60 + 60 + 60 = 250s; a further 60s would pass 300s.
        assert_eq!(err.attempts, 7);
        assert_eq!(calls.load(Ordering::SeqCst), 7);
        assert_eq!(started.elapsed().as_secs(), 250);
        assert!(matches!(err.source, LLMError::ApiError { status: 503, .. }));
    }

    #[tokio::test(start_paused = true)]
    async fn test_permanent_error_is_not_retried() {
        let calls = AtomicU32::new(0);
        let counter = &calls;

        let err = RetryPolicy::default()
            .run(move || async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Err::<(), _>(LLMError::AuthError("bad key".into()))
            })
            .await
            .unwrap_err();

        assert_eq!(err.attempts, 1);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_none_policy_tries_once() {
        let calls = AtomicU32::new(0);
        let counter = &calls;
        let err = RetryPolicy::none()
            .run(move || async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Err::<(), _>(unavailable())
            })
            .await
            .unwrap_err();
        assert_eq!(err.attempts, 1);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
