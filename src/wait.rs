//! Bounded readiness polling.
//!
//! The host has no "asset ready" event, so readiness is level-triggered: check
//! a condition, sleep one interval, check again, up to a ceiling. Hitting the
//! ceiling is not an error; callers carry on best-effort.

use crate::types::LinkerConfig;
use std::time::Duration;
use tokio::time::Instant;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollPolicy {
    pub timeout: Duration,
    pub interval: Duration,
}

impl PollPolicy {
    pub fn new(timeout: Duration, interval: Duration) -> Self {
        Self { timeout, interval }
    }

    pub fn from_config(config: &LinkerConfig) -> Self {
        Self::new(
            Duration::from_millis(config.poll_timeout_ms),
            Duration::from_millis(config.poll_interval_ms.max(1)),
        )
    }
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self::new(Duration::from_secs(3), Duration::from_millis(200))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitOutcome {
    Ready,
    TimedOut,
}

impl WaitOutcome {
    pub fn is_ready(self) -> bool {
        self == WaitOutcome::Ready
    }
}

/// Resolves once `ready` returns true or `policy.timeout` has elapsed.
pub async fn poll_until<F>(policy: PollPolicy, mut ready: F) -> WaitOutcome
where
    F: FnMut() -> bool,
{
    let deadline = Instant::now() + policy.timeout;
    loop {
        if ready() {
            return WaitOutcome::Ready;
        }
        if Instant::now() >= deadline {
            return WaitOutcome::TimedOut;
        }
        tokio::time::sleep(policy.interval).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    #[tokio::test(start_paused = true)]
    async fn ready_condition_resolves_immediately() {
        let start = Instant::now();
        let outcome = poll_until(PollPolicy::default(), || true).await;
        assert_eq!(outcome, WaitOutcome::Ready);
        assert_eq!(start.elapsed(), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn becomes_ready_after_a_few_intervals() {
        let checks = Cell::new(0);
        let outcome = poll_until(PollPolicy::default(), || {
            checks.set(checks.get() + 1);
            checks.get() >= 4
        })
        .await;
        assert!(outcome.is_ready());
        assert_eq!(checks.get(), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn gives_up_at_the_ceiling() {
        let start = Instant::now();
        let outcome = poll_until(PollPolicy::default(), || false).await;
        assert_eq!(outcome, WaitOutcome::TimedOut);
        let waited = start.elapsed();
        assert!(waited >= Duration::from_secs(3));
        assert!(waited < Duration::from_millis(3400));
    }
}
