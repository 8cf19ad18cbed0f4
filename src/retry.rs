//! Bounded retry with a side effect between attempts.
//!
//! Used for backend operations that fail until an eventually-consistent
//! index catches up: each failed attempt kicks the backend, pauses, and
//! tries again.
use std::time::Duration;

/// Blocking pause, injectable so waits can be observed instead of slept.
pub trait Sleeper {
    fn sleep(&self, duration: Duration);
}

/// Sleeps the current thread.
#[derive(Debug, Default)]
pub struct ThreadSleeper;

impl Sleeper for ThreadSleeper {
    fn sleep(&self, duration: Duration) {
        std::thread::sleep(duration);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first.
    pub attempts: u32,
    /// Pause after the side effect, before the next attempt.
    pub backoff: Duration,
}

/// Final error after every attempt failed.
#[derive(Debug)]
pub struct RetryExhausted<E> {
    pub attempts: u32,
    pub last: E,
}

/// Run `op` up to `policy.attempts` times.
///
/// After each failed attempt that is not the last, `on_failure` runs once
/// and the sleeper pauses for `policy.backoff`. A policy of zero attempts
/// still runs `op` once.
pub fn retry<T, E>(
    policy: &RetryPolicy,
    sleeper: &dyn Sleeper,
    mut op: impl FnMut(u32) -> Result<T, E>,
    mut on_failure: impl FnMut(u32, &E),
) -> Result<T, RetryExhausted<E>> {
    let attempts = policy.attempts.max(1);
    let mut attempt = 1;
    loop {
        match op(attempt) {
            Ok(value) => return Ok(value),
            Err(last) if attempt >= attempts => return Err(RetryExhausted { attempts, last }),
            Err(err) => {
                on_failure(attempt, &err);
                sleeper.sleep(policy.backoff);
                attempt += 1;
            }
        }
    }
}
