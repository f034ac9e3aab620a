//! Save retry policy
//! Core Principle: Only contention is worth waiting for

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, warn};

use crate::error::{GroupPolicyError, Result};

use super::DEFAULT_SAVE_RETRY_COUNT;

/// Injectable wait used between save attempts.
pub type Sleeper = Arc<dyn Fn(Duration) + Send + Sync>;

/// How a retried save ended.
#[derive(Debug)]
pub enum SaveOutcome {
    Saved { attempts: u32 },
    /// Every attempt hit a sharing violation.
    Exhausted { attempts: u32, last_code: i32 },
    /// A non-retryable error stopped the loop.
    Failed { attempts: u32, error: GroupPolicyError },
}

impl SaveOutcome {
    pub fn is_saved(&self) -> bool {
        matches!(self, SaveOutcome::Saved { .. })
    }

    pub fn attempts(&self) -> u32 {
        match self {
            SaveOutcome::Saved { attempts }
            | SaveOutcome::Exhausted { attempts, .. }
            | SaveOutcome::Failed { attempts, .. } => *attempts,
        }
    }
}

/// Linear backoff: attempt `i` (0-based) that hits a sharing violation waits `base * (i + 1)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SaveRetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
}

impl Default for SaveRetryPolicy {
    fn default() -> Self {
        SaveRetryPolicy::new(DEFAULT_SAVE_RETRY_COUNT)
    }
}

impl SaveRetryPolicy {
    /// Create new policy with the standard one second unit. Zero attempts still tries once.
    pub fn new(retry_count: u32) -> Self {
        SaveRetryPolicy {
            max_attempts: retry_count.max(1),
            base_delay: Duration::from_secs(1),
        }
    }

    pub fn with_base_delay(mut self, base_delay: Duration) -> Self {
        self.base_delay = base_delay;
        self
    }

    pub fn delay_for(&self, attempt: u32) -> Duration {
        self.base_delay * (attempt + 1)
    }

    /// Run `op` until it succeeds, fails for another reason, or the attempts run out.
    pub fn run<F, S>(&self, mut op: F, mut sleep: S) -> SaveOutcome
    where
        F: FnMut() -> Result<()>,
        S: FnMut(Duration),
    {
        let mut last_code = 0;

        for attempt in 0..self.max_attempts {
            match op() {
                Ok(()) => return SaveOutcome::Saved { attempts: attempt + 1 },
                Err(err) if err.is_sharing_violation() => {
                    last_code = err.code().unwrap_or_default();
                    let delay = self.delay_for(attempt);
                    warn!(
                        attempt = attempt + 1,
                        max = self.max_attempts,
                        ?delay,
                        "GPO save hit a sharing violation"
                    );
                    sleep(delay);
                }
                Err(error) => {
                    debug!(%error, "GPO save failed");
                    return SaveOutcome::Failed {
                        attempts: attempt + 1,
                        error,
                    };
                }
            }
        }

        SaveOutcome::Exhausted {
            attempts: self.max_attempts,
            last_code,
        }
    }

    /// [`run`](Self::run) with `std::thread::sleep`.
    pub fn run_blocking<F>(&self, op: F) -> SaveOutcome
    where
        F: FnMut() -> Result<()>,
    {
        self.run(op, std::thread::sleep)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gpo::ERROR_SHARING_VIOLATION;

    #[test]
    fn sharing_violation_backs_off_linearly_until_exhausted() {
        let policy = SaveRetryPolicy::new(3);
        let mut calls = 0;
        let mut slept = Vec::new();

        let outcome = policy.run(
            || {
                calls += 1;
                Err(GroupPolicyError::native("save", ERROR_SHARING_VIOLATION))
            },
            |d| slept.push(d),
        );

        assert_eq!(calls, 3);
        assert_eq!(
            slept,
            vec![Duration::from_secs(1), Duration::from_secs(2), Duration::from_secs(3)]
        );
        match outcome {
            SaveOutcome::Exhausted { attempts, last_code } => {
                assert_eq!(attempts, 3);
                assert_eq!(last_code, ERROR_SHARING_VIOLATION);
            }
            other => panic!("unexpected outcome: {other:?}"),
        }
    }

    #[test]
    fn other_errors_stop_immediately() {
        let policy = SaveRetryPolicy::new(5);
        let mut calls = 0;
        let outcome = policy.run(
            || {
                calls += 1;
                Err(GroupPolicyError::native("save", 5))
            },
            |_| panic!("must not sleep"),
        );
        assert_eq!(calls, 1);
        assert!(matches!(outcome, SaveOutcome::Failed { attempts: 1, .. }));
    }

    #[test]
    fn succeeds_after_transient_contention() {
        let policy = SaveRetryPolicy::new(4).with_base_delay(Duration::from_millis(10));
        let mut calls = 0;
        let mut slept = Vec::new();
        let outcome = policy.run(
            || {
                calls += 1;
                if calls < 3 {
                    Err(GroupPolicyError::native("save", ERROR_SHARING_VIOLATION))
                } else {
                    Ok(())
                }
            },
            |d| slept.push(d),
        );
        assert!(outcome.is_saved());
        assert_eq!(outcome.attempts(), 3);
        assert_eq!(slept, vec![Duration::from_millis(10), Duration::from_millis(20)]);
    }

    #[test]
    fn zero_retry_count_still_attempts_once() {
        assert_eq!(SaveRetryPolicy::new(0).max_attempts, 1);
        assert_eq!(SaveRetryPolicy::default().max_attempts, DEFAULT_SAVE_RETRY_COUNT);
    }
}
