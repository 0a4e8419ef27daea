//! Bounded polling for asynchronous convergence
//!
//! Configuration changes are applied by an out-of-process daemon; the only
//! way to learn that a change has settled is to keep reading fresh state
//! until it matches. The poller here bounds that wait with a wall-clock
//! budget while guaranteeing the predicate runs at least once.

use crate::error::NetstateResult;
use std::future::Future;
use std::time::Duration;
use tokio::time::{sleep, Instant};
use tracing::debug;

/// Timeout budget and polling cadence for one verification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryBudget {
    timeout: Duration,
    interval: Duration,
}

impl RetryBudget {
    pub const DEFAULT_INTERVAL: Duration = Duration::from_millis(500);

    pub fn new(timeout: Duration) -> Self {
        Self {
            timeout,
            interval: Self::DEFAULT_INTERVAL,
        }
    }

    pub fn from_secs(timeout_secs: u64) -> Self {
        Self::new(Duration::from_secs(timeout_secs))
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }
}

/// Repeatedly invokes `predicate` until it returns true or the budget's
/// wall-clock timeout expires.
///
/// Returns `Ok(true)` on the first true result without further delay, and
/// `Ok(false)` once the budget is exhausted. The predicate is invoked at
/// least once regardless of how small the timeout is. Each invocation is
/// expected to refresh whatever state it inspects; that side effect is the
/// point of calling it again.
///
/// A predicate error aborts the loop immediately and is returned as-is:
/// retries are for "not yet converged", never for failed refreshes.
pub async fn retry_until_true_or_timeout<F, Fut>(
    budget: RetryBudget,
    mut predicate: F,
) -> NetstateResult<bool>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = NetstateResult<bool>>,
{
    let deadline = Instant::now() + budget.timeout;
    let mut attempts: u32 = 0;

    loop {
        attempts += 1;
        if predicate().await? {
            debug!("Converged after {} attempt(s)", attempts);
            return Ok(true);
        }

        let remaining = deadline.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            debug!(
                "Budget of {:.1}s exhausted after {} attempt(s)",
                budget.timeout.as_secs_f64(),
                attempts
            );
            return Ok(false);
        }

        // Clamp the last sleep so we wake at the deadline, not past it
        sleep(budget.interval.min(remaining)).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::NetstateError;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;

    fn tiny_budget() -> RetryBudget {
        RetryBudget::new(Duration::from_millis(120)).with_interval(Duration::from_millis(20))
    }

    #[test]
    fn test_zero_timeout_still_invokes_once() {
        let calls = AtomicU32::new(0);
        let result = tokio_test::block_on(retry_until_true_or_timeout(
            RetryBudget::new(Duration::ZERO),
            || {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Ok(false) }
            },
        ));
        assert_eq!(result.unwrap(), false);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_immediate_success_returns_without_delay() {
        let start = std::time::Instant::now();
        let result = retry_until_true_or_timeout(RetryBudget::from_secs(30), || async { Ok(true) })
            .await
            .unwrap();
        assert!(result);
        assert!(start.elapsed() < Duration::from_secs(1));
    }

    #[tokio::test]
    async fn test_eventual_success() {
        let calls = AtomicU32::new(0);
        let budget = RetryBudget::from_secs(30).with_interval(Duration::from_millis(20));
        let result = retry_until_true_or_timeout(budget, || {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            async move { Ok(n >= 2) }
        })
        .await
        .unwrap();
        assert!(result);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_never_true_exhausts_budget_with_multiple_attempts() {
        let calls = AtomicU32::new(0);
        let start = std::time::Instant::now();
        let result = retry_until_true_or_timeout(tiny_budget(), || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Ok(false) }
        })
        .await
        .unwrap();

        assert!(!result);
        assert!(calls.load(Ordering::SeqCst) > 1);
        // Roughly the configured budget; generous upper bound for slow CI
        assert!(start.elapsed() >= Duration::from_millis(120));
        assert!(start.elapsed() < Duration::from_secs(5));
    }

    #[tokio::test]
    async fn test_predicate_error_aborts_immediately() {
        let calls = AtomicU32::new(0);
        let result = retry_until_true_or_timeout(tiny_budget(), || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(NetstateError::ParseError("refresh failed".to_string())) }
        })
        .await;

        assert!(matches!(result, Err(NetstateError::ParseError(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
