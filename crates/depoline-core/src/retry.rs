//! Retry with exponential backoff for catalog calls

use std::time::Duration;

use crate::error::CallError;
use crate::rate_limit::RateLimiter;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Retries after the first attempt for transient failures.
    pub max_retries: u32,
    pub base_delay: Duration,
    pub factor: u32,
    pub max_delay: Duration,
    /// Consecutive 429 responses tolerated before giving up on a call.
    pub max_rate_limit_waits: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_secs(1),
            factor: 2,
            max_delay: Duration::from_secs(60),
            max_rate_limit_waits: 20,
        }
    }
}

/// What to do after a failed attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    /// Sleep for the backoff, then try again.
    Retry(Duration),
    /// Re-synchronize the limiter, then try again without counting an attempt.
    Resync(Option<Duration>),
    GiveUp,
}

/// Retry progress for one logical call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryState {
    /// Attempts made so far, including the one in flight.
    pub attempt: u32,
    pub next_backoff: Duration,
    rate_limit_waits: u32,
}

impl RetryState {
    pub fn new(policy: &RetryPolicy) -> Self {
        Self {
            attempt: 1,
            next_backoff: policy.base_delay,
            rate_limit_waits: 0,
        }
    }

    pub fn on_error(&mut self, policy: &RetryPolicy, err: &CallError) -> RetryDecision {
        match err {
            CallError::Validation { .. } => RetryDecision::GiveUp,
            CallError::RateLimited { retry_after } => {
                if self.rate_limit_waits >= policy.max_rate_limit_waits {
                    return RetryDecision::GiveUp;
                }
                self.rate_limit_waits += 1;
                RetryDecision::Resync(*retry_after)
            }
            CallError::Transient { .. } => {
                if self.attempt > policy.max_retries {
                    return RetryDecision::GiveUp;
                }
                let delay = self.next_backoff;
                self.attempt += 1;
                self.next_backoff = (delay * policy.factor).min(policy.max_delay);
                RetryDecision::Retry(delay)
            }
        }
    }
}

/// Final result of a retried call plus the attempts it took.
#[derive(Debug)]
pub struct Retried<T> {
    pub result: Result<T, CallError>,
    pub attempts: u32,
}

/// Run `call` through the limiter, retrying per `policy`.
///
/// Every attempt acquires the limiter first; backoff sleeps use the
/// limiter's clock.
pub fn call_with_retry<T>(
    label: &str,
    limiter: &RateLimiter,
    policy: &RetryPolicy,
    mut call: impl FnMut() -> Result<T, CallError>,
) -> Retried<T> {
    let mut state = RetryState::new(policy);
    loop {
        limiter.acquire();
        let err = match call() {
            Ok(v) => {
                return Retried {
                    result: Ok(v),
                    attempts: state.attempt,
                };
            }
            Err(e) => e,
        };
        match state.on_error(policy, &err) {
            RetryDecision::Retry(delay) => {
                log::debug!(
                    "{label}: attempt {}/{} failed: {err}, retrying in {}s",
                    state.attempt - 1,
                    policy.max_retries + 1,
                    delay.as_secs_f64()
                );
                limiter.clock().sleep(delay);
            }
            RetryDecision::Resync(retry_after) => {
                limiter.on_rate_limited(retry_after);
            }
            RetryDecision::GiveUp => {
                log::debug!("{label}: giving up after {} attempt(s): {err}", state.attempt);
                return Retried {
                    result: Err(err),
                    attempts: state.attempt,
                };
            }
        }
    }
}
