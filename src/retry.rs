//! Retry with jittered geometric backoff
//!
//! The decision logic is an explicit state machine with a pure transition
//! function, unit-testable without any I/O; `RetryManager::run` is the thin
//! async wrapper that sleeps between attempts. Only errors classified
//! retryable consume attempts; fatal errors propagate immediately.

use rand::Rng;
use std::future::Future;
use std::time::Duration;
use tracing::{debug, warn};

use crate::error::{ErrorClass, SpiderResult};

const BACKOFF_MULTIPLIER: u64 = 2;
const MAX_BACKOFF_MS: u64 = 30_000;
const JITTER_PERCENT: f64 = 0.2; // ±20% randomness to prevent thundering herd

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryState {
    Idle,
    Attempting { attempt: u32 },
    Retrying { attempt: u32, delay_ms: u64 },
    Succeeded { attempts: u32 },
    Exhausted { attempts: u32 },
}

/// What the wrapper should do next after an attempt's outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Next {
    Done,
    SleepThenRetry { delay_ms: u64 },
    GiveUp,
    /// Fatal error: stop immediately without consuming further attempts
    Abort,
}

#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay_ms: u64,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, base_delay_ms: u64) -> Self {
        Self {
            max_attempts,
            base_delay_ms,
        }
    }

    /// Pure transition function: current state + attempt outcome → next
    /// state and the action the wrapper must take. Delays reported here are
    /// pre-jitter.
    pub fn transition(
        &self,
        state: RetryState,
        outcome: Result<(), ErrorClass>,
    ) -> (RetryState, Next) {
        let attempt = match state {
            RetryState::Idle => 1,
            RetryState::Attempting { attempt } | RetryState::Retrying { attempt, .. } => attempt,
            finished @ (RetryState::Succeeded { .. } | RetryState::Exhausted { .. }) => {
                return (finished, Next::Done)
            }
        };

        match outcome {
            Ok(()) => (RetryState::Succeeded { attempts: attempt }, Next::Done),
            Err(ErrorClass::Fatal) => (RetryState::Exhausted { attempts: attempt }, Next::Abort),
            Err(ErrorClass::Retryable) if attempt >= self.max_attempts => {
                (RetryState::Exhausted { attempts: attempt }, Next::GiveUp)
            }
            Err(ErrorClass::Retryable) => {
                let delay_ms = self.base_delay(attempt);
                (
                    RetryState::Retrying {
                        attempt: attempt + 1,
                        delay_ms,
                    },
                    Next::SleepThenRetry { delay_ms },
                )
            }
        }
    }

    /// Geometric backoff for the delay after `attempt` (1-based), capped.
    fn base_delay(&self, attempt: u32) -> u64 {
        let power = (attempt - 1).min(6);
        (self.base_delay_ms * BACKOFF_MULTIPLIER.pow(power)).min(MAX_BACKOFF_MS)
    }

    /// Backoff with ±20% jitter applied.
    pub fn jittered_delay(&self, attempt: u32) -> Duration {
        let base = self.base_delay(attempt);
        let jitter = rand::rng().random_range(-JITTER_PERCENT..=JITTER_PERCENT);
        Duration::from_millis((base as f64 * (1.0 + jitter)) as u64)
    }
}

pub struct RetryManager {
    policy: RetryPolicy,
}

impl RetryManager {
    pub fn new(policy: RetryPolicy) -> Self {
        Self { policy }
    }

    /// Drive `op` through the state machine. Returns the final value, or the
    /// last error once attempts are exhausted or a fatal error appears.
    /// Never panics past this boundary; exhaustion is an ordinary `Err`.
    pub async fn run<T, F, Fut>(&self, mut op: F) -> (SpiderResult<T>, u32)
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = SpiderResult<T>>,
    {
        let mut state = RetryState::Idle;
        let mut attempts = 0u32;

        loop {
            let attempt = match state {
                RetryState::Idle => 1,
                RetryState::Retrying { attempt, .. } => attempt,
                _ => 1,
            };
            state = RetryState::Attempting { attempt };
            attempts = attempt;

            match op(attempt).await {
                Ok(value) => return (Ok(value), attempts),
                Err(err) => {
                    let (next_state, action) = self.policy.transition(state, Err(err.class()));
                    state = next_state;
                    match action {
                        Next::Abort => {
                            debug!(attempt, error = %err, "fatal error, not retrying");
                            return (Err(err), attempts);
                        }
                        Next::GiveUp => {
                            warn!(attempts, error = %err, "retry attempts exhausted");
                            return (Err(err), attempts);
                        }
                        Next::SleepThenRetry { .. } => {
                            let delay = self.policy.jittered_delay(attempt);
                            debug!(attempt, ?delay, error = %err, "retrying after backoff");
                            tokio::time::sleep(delay).await;
                        }
                        Next::Done => unreachable!("error outcome cannot complete the machine"),
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{NavigationError, SpiderError};
    use std::sync::atomic::{AtomicU32, Ordering};

    #[test]
    fn transition_success_on_first_attempt() {
        let policy = RetryPolicy::new(3, 1000);
        let (state, next) = policy.transition(RetryState::Idle, Ok(()));
        assert_eq!(state, RetryState::Succeeded { attempts: 1 });
        assert_eq!(next, Next::Done);
    }

    #[test]
    fn transition_retries_until_exhausted() {
        let policy = RetryPolicy::new(3, 1000);

        let (state, next) = policy.transition(RetryState::Idle, Err(ErrorClass::Retryable));
        assert_eq!(
            next,
            Next::SleepThenRetry { delay_ms: 1000 },
            "first backoff is the base delay"
        );

        let (state, next) = policy.transition(state, Err(ErrorClass::Retryable));
        assert_eq!(next, Next::SleepThenRetry { delay_ms: 2000 });

        let (state, next) = policy.transition(state, Err(ErrorClass::Retryable));
        assert_eq!(state, RetryState::Exhausted { attempts: 3 });
        assert_eq!(next, Next::GiveUp);
    }

    #[test]
    fn transition_aborts_on_fatal_without_consuming_retries() {
        let policy = RetryPolicy::new(3, 1000);
        let (state, next) = policy.transition(RetryState::Idle, Err(ErrorClass::Fatal));
        assert_eq!(state, RetryState::Exhausted { attempts: 1 });
        assert_eq!(next, Next::Abort);
    }

    #[test]
    fn backoff_is_capped() {
        let policy = RetryPolicy::new(20, 10_000);
        assert_eq!(policy.base_delay(1), 10_000);
        assert_eq!(policy.base_delay(3), 30_000);
        assert_eq!(policy.base_delay(10), 30_000);
    }

    #[test]
    fn jitter_stays_within_bounds() {
        let policy = RetryPolicy::new(3, 1000);
        for _ in 0..100 {
            let delay = policy.jittered_delay(1).as_millis() as u64;
            assert!((800..=1200).contains(&delay), "delay {delay} out of bounds");
        }
    }

    #[tokio::test]
    async fn run_makes_exactly_max_attempts_on_persistent_transient_error() {
        let calls = AtomicU32::new(0);
        let manager = RetryManager::new(RetryPolicy::new(3, 1));

        let (result, attempts) = manager
            .run(|_| {
                calls.fetch_add(1, Ordering::SeqCst);
                async {
                    Err::<(), _>(SpiderError::Navigation(NavigationError::Timeout(100)))
                }
            })
            .await;

        assert!(result.is_err());
        assert_eq!(attempts, 3);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn run_never_retries_fatal_errors() {
        let calls = AtomicU32::new(0);
        let manager = RetryManager::new(RetryPolicy::new(3, 1));

        let (result, attempts) = manager
            .run(|_| {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err::<(), _>(SpiderError::Config("bad".into())) }
            })
            .await;

        assert!(matches!(result, Err(SpiderError::Config(_))));
        assert_eq!(attempts, 1);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn run_recovers_after_transient_failures() {
        let calls = AtomicU32::new(0);
        let manager = RetryManager::new(RetryPolicy::new(3, 1));

        let (result, attempts) = manager
            .run(|attempt| {
                calls.fetch_add(1, Ordering::SeqCst);
                async move {
                    if attempt < 3 {
                        Err(SpiderError::Navigation(NavigationError::Network(
                            "reset".into(),
                        )))
                    } else {
                        Ok(42)
                    }
                }
            })
            .await;

        assert_eq!(result.unwrap(), 42);
        assert_eq!(attempts, 3);
    }
}
