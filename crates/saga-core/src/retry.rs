//! Bounded exponential backoff around a single step invocation.

use std::fmt::Display;
use std::sync::Arc;
use std::time::Duration;

use rand::Rng;
use tracing::{error, warn};

/// Classifies errors into ones worth retrying and ones that are final.
pub trait Retryable {
    fn is_retryable(&self) -> bool {
        true
    }
}

/// Blocks the current thread of control between retry attempts.
pub trait Sleeper: Send + Sync {
    fn sleep(&self, duration: Duration);
}

impl<S: Sleeper + ?Sized> Sleeper for Arc<S> {
    fn sleep(&self, duration: Duration) {
        (**self).sleep(duration);
    }
}

/// Sleeps on the calling OS thread.
#[derive(Debug, Clone, Copy, Default)]
pub struct ThreadSleeper;

impl Sleeper for ThreadSleeper {
    fn sleep(&self, duration: Duration) {
        if !duration.is_zero() {
            std::thread::sleep(duration);
        }
    }
}

const DEFAULT_MAX_RETRIES: u32 = 3;
const DEFAULT_BASE_DELAY: Duration = Duration::from_millis(500);
const MAX_JITTER: f64 = 0.25;

/// Orchestrator-level retry policy.
///
/// An operation is attempted once, then retried up to `max_retries` times.
/// Before retry `n` (0-indexed) the policy sleeps `base_delay * 2^n`, capped
/// at `max_delay` when set and scaled by a random factor in
/// `[1 - jitter, 1 + jitter]`.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    max_retries: u32,
    base_delay: Duration,
    max_delay: Option<Duration>,
    jitter: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_RETRIES, DEFAULT_BASE_DELAY)
    }
}

impl RetryPolicy {
    #[must_use]
    pub fn new(max_retries: u32, base_delay: Duration) -> Self {
        Self {
            max_retries,
            base_delay,
            max_delay: None,
            jitter: 0.0,
        }
    }

    /// A policy that runs the operation exactly once.
    #[must_use]
    pub fn no_retries() -> Self {
        Self::new(0, Duration::ZERO)
    }

    /// Jitter factor, clamped to `0.0..=0.25`.
    #[must_use]
    pub fn with_jitter(mut self, jitter: f64) -> Self {
        self.jitter = if jitter.is_nan() {
            0.0
        } else {
            jitter.clamp(0.0, MAX_JITTER)
        };
        self
    }

    #[must_use]
    pub fn with_max_delay(mut self, max_delay: Duration) -> Self {
        self.max_delay = Some(max_delay);
        self
    }

    #[must_use]
    pub fn max_retries(&self) -> u32 {
        self.max_retries
    }

    #[must_use]
    pub fn base_delay(&self) -> Duration {
        self.base_delay
    }

    #[must_use]
    pub fn jitter(&self) -> f64 {
        self.jitter
    }

    /// Delay before retry `attempt` without jitter.
    #[must_use]
    pub fn nominal_delay(&self, attempt: u32) -> Duration {
        let factor = 1_u32 << attempt.min(20);
        let delay = self.base_delay.saturating_mul(factor);
        match self.max_delay {
            Some(cap) => delay.min(cap),
            None => delay,
        }
    }

    /// Delay before retry `attempt`, jitter applied.
    #[must_use]
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let nominal = self.nominal_delay(attempt);
        if self.jitter <= 0.0 || nominal.is_zero() {
            return nominal;
        }
        let factor = 1.0 + rand::thread_rng().gen_range(-self.jitter..=self.jitter);
        nominal.mul_f64(factor)
    }

    /// Run `operation` until it succeeds, fails with a non-retryable error or
    /// the retry budget is spent.
    ///
    /// Returns the last result together with the number of attempts made.
    /// The error is passed through untouched.
    pub fn run<T, E, F>(
        &self,
        operation: &str,
        sleeper: &dyn Sleeper,
        mut f: F,
    ) -> (Result<T, E>, u32)
    where
        E: Retryable + Display,
        F: FnMut() -> Result<T, E>,
    {
        let mut attempts: u32 = 0;
        loop {
            let result = f();
            let error = match result {
                Ok(value) => return (Ok(value), attempts + 1),
                Err(error) => error,
            };

            if !error.is_retryable() {
                warn!(operation, error = %error, "non-retryable failure");
                return (Err(error), attempts + 1);
            }

            if attempts >= self.max_retries {
                error!(
                    operation,
                    max_retries = self.max_retries,
                    error = %error,
                    "max retries exceeded"
                );
                return (Err(error), attempts + 1);
            }

            let delay = self.delay_for_attempt(attempts);
            warn!(
                operation,
                retry = attempts + 1,
                max_retries = self.max_retries,
                delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                error = %error,
                "retrying after failure"
            );
            sleeper.sleep(delay);
            attempts += 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use std::cell::Cell;
    use std::sync::Mutex;

    use super::*;

    #[derive(Debug, PartialEq)]
    struct Flaky(bool);

    impl Display for Flaky {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            write!(f, "flaky (retryable: {})", self.0)
        }
    }

    impl Retryable for Flaky {
        fn is_retryable(&self) -> bool {
            self.0
        }
    }

    #[derive(Default)]
    struct RecordingSleeper {
        delays: Mutex<Vec<Duration>>,
    }

    impl Sleeper for RecordingSleeper {
        fn sleep(&self, duration: Duration) {
            self.delays.lock().expect("lock poisoned").push(duration);
        }
    }

    #[test]
    fn default_policy_matches_orchestrator_budget() {
        let policy = RetryPolicy::default();

        assert_eq!(policy.max_retries(), 3);
        assert_eq!(policy.base_delay(), Duration::from_millis(500));
        assert!(policy.jitter().abs() < f64::EPSILON);
    }

    #[test]
    fn nominal_delay_doubles_per_attempt() {
        let policy = RetryPolicy::new(5, Duration::from_millis(100));

        assert_eq!(policy.nominal_delay(0), Duration::from_millis(100));
        assert_eq!(policy.nominal_delay(1), Duration::from_millis(200));
        assert_eq!(policy.nominal_delay(2), Duration::from_millis(400));
        assert_eq!(policy.nominal_delay(3), Duration::from_millis(800));
    }

    #[test]
    fn max_delay_caps_backoff() {
        let policy = RetryPolicy::new(10, Duration::from_millis(100))
            .with_max_delay(Duration::from_millis(300));

        assert_eq!(policy.nominal_delay(1), Duration::from_millis(200));
        assert_eq!(policy.nominal_delay(4), Duration::from_millis(300));
    }

    #[test]
    fn jitter_stays_within_a_quarter() {
        let policy = RetryPolicy::new(3, Duration::from_millis(1000)).with_jitter(0.25);

        for _ in 0..50 {
            let ms = policy.delay_for_attempt(0).as_millis();
            assert!((750..=1250).contains(&ms), "delay {ms} out of range");
        }
    }

    #[test]
    fn jitter_is_clamped() {
        let policy = RetryPolicy::default().with_jitter(3.0);

        assert!((policy.jitter() - 0.25).abs() < f64::EPSILON);
    }

    #[test]
    fn always_failing_operation_runs_one_plus_max_retries_times() {
        let policy = RetryPolicy::new(3, Duration::from_millis(10));
        let sleeper = RecordingSleeper::default();
        let calls = Cell::new(0);

        let (result, attempts) = policy.run("always_fails", &sleeper, || {
            calls.set(calls.get() + 1);
            Err::<(), _>(Flaky(true))
        });

        assert_eq!(result, Err(Flaky(true)));
        assert_eq!(calls.get(), 4);
        assert_eq!(attempts, 4);
        assert_eq!(
            *sleeper.delays.lock().expect("lock poisoned"),
            vec![
                Duration::from_millis(10),
                Duration::from_millis(20),
                Duration::from_millis(40)
            ]
        );
    }

    #[test]
    fn succeeds_after_transient_failures() {
        let policy = RetryPolicy::new(3, Duration::ZERO);
        let calls = Cell::new(0);

        let (result, attempts) = policy.run("flaky", &ThreadSleeper, || {
            calls.set(calls.get() + 1);
            if calls.get() < 3 {
                Err(Flaky(true))
            } else {
                Ok(calls.get() * 2)
            }
        });

        assert_eq!(result, Ok(6));
        assert_eq!(attempts, 3);
    }

    #[test]
    fn non_retryable_error_is_returned_immediately() {
        let policy = RetryPolicy::new(3, Duration::from_millis(10));
        let sleeper = RecordingSleeper::default();
        let calls = Cell::new(0);

        let (result, attempts) = policy.run("precondition", &sleeper, || {
            calls.set(calls.get() + 1);
            Err::<(), _>(Flaky(false))
        });

        assert_eq!(result, Err(Flaky(false)));
        assert_eq!(calls.get(), 1);
        assert_eq!(attempts, 1);
        assert!(sleeper.delays.lock().expect("lock poisoned").is_empty());
    }

    #[test]
    fn no_retries_policy_runs_once() {
        let calls = Cell::new(0);

        let (_, attempts) = RetryPolicy::no_retries().run("once", &ThreadSleeper, || {
            calls.set(calls.get() + 1);
            Err::<(), _>(Flaky(true))
        });

        assert_eq!(calls.get(), 1);
        assert_eq!(attempts, 1);
    }
}
