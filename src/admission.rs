//! Admission control and retry policy for backend calls.
//!
//! Every outbound call to the search backend passes through an
//! [`AdmissionController`]: a semaphore bounds how many calls are in flight,
//! and failed calls whose error is [`Retryable`] are repeated with exponential
//! backoff until they succeed, fail terminally, or run out of retries.
//!
//! # Backoff
//!
//! ```text
//! attempt 0 fails → wait initial
//! attempt 1 fails → wait min(initial × multiplier, max)
//! attempt 2 fails → wait min(previous × multiplier, max)
//! ...
//! attempt max_retries fails → return the last error
//! ```
//!
//! Delays carry no jitter, so the sequence is fully determined by the
//! configuration.

use crate::config::RateLimitConfig;
use crate::domain::{EsviewError, Retryable};
use std::fmt::Display;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio_util::sync::CancellationToken;

/// Exponential backoff parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Retries after the first attempt.
    pub max_retries: u32,
    pub initial_delay: Duration,
    pub max_delay: Duration,
    /// Growth factor per retry, greater than 1.0.
    pub multiplier: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(5),
            multiplier: 2.0,
        }
    }
}

impl RetryPolicy {
    /// Delay following `current`, capped at `max_delay`.
    #[must_use]
    pub fn next_delay(&self, current: Duration) -> Duration {
        let grown = current.as_secs_f64() * self.multiplier;
        Duration::from_secs_f64(grown.min(self.max_delay.as_secs_f64()))
    }

    /// The waits taken between attempts, in order; yields `max_retries` items.
    pub fn delays(&self) -> impl Iterator<Item = Duration> + '_ {
        let first = self.initial_delay.min(self.max_delay);
        std::iter::successors(Some(first), move |d| Some(self.next_delay(*d)))
            .take(self.max_retries as usize)
    }
}

impl From<&RateLimitConfig> for RetryPolicy {
    fn from(config: &RateLimitConfig) -> Self {
        Self {
            max_retries: config.max_retries,
            initial_delay: Duration::from_millis(config.initial_retry_delay_ms),
            max_delay: Duration::from_millis(config.max_retry_delay_ms),
            multiplier: config.retry_multiplier,
        }
    }
}

/// A held concurrency slot. Dropping it frees the slot.
#[derive(Debug)]
pub struct AdmissionPermit {
    _permit: OwnedSemaphorePermit,
}

impl AdmissionPermit {
    /// Frees the slot explicitly.
    pub fn release(self) {
        drop(self);
    }
}

/// Bounded-concurrency gate plus retry policy.
#[derive(Debug, Clone)]
pub struct AdmissionController {
    semaphore: Arc<Semaphore>,
    max_concurrent: usize,
    policy: RetryPolicy,
}

impl AdmissionController {
    /// Creates a controller admitting `max_concurrent` calls at once.
    #[must_use]
    pub fn new(max_concurrent: usize, policy: RetryPolicy) -> Self {
        Self {
            semaphore: Arc::new(Semaphore::new(max_concurrent)),
            max_concurrent,
            policy,
        }
    }

    /// Creates a controller from the `[rate_limit]` configuration section.
    #[must_use]
    pub fn from_config(config: &RateLimitConfig) -> Self {
        Self::new(config.max_concurrent, RetryPolicy::from(config))
    }

    /// The retry policy in use.
    #[must_use]
    pub const fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Slots currently held.
    #[must_use]
    pub fn in_use(&self) -> usize {
        self.max_concurrent - self.semaphore.available_permits()
    }

    /// Waits for a free slot.
    ///
    /// # Errors
    ///
    /// [`EsviewError::Timeout`] if no slot frees up within `timeout`.
    pub async fn acquire(&self, operation: &str, timeout: Duration) -> crate::Result<AdmissionPermit> {
        self.acquire_or_cancel(operation, timeout, &CancellationToken::new())
            .await
    }

    /// Waits for a free slot, giving up on timeout or cancellation.
    ///
    /// # Errors
    ///
    /// [`EsviewError::Timeout`] after `timeout`, [`EsviewError::Cancelled`]
    /// when `cancel` fires first.
    pub async fn acquire_or_cancel(
        &self,
        operation: &str,
        timeout: Duration,
        cancel: &CancellationToken,
    ) -> crate::Result<AdmissionPermit> {
        let acquire = Arc::clone(&self.semaphore).acquire_owned();
        tokio::select! {
            biased;
            () = cancel.cancelled() => Err(EsviewError::Cancelled(operation.to_string())),
            result = tokio::time::timeout(timeout, acquire) => match result {
                Ok(Ok(permit)) => {
                    tracing::trace!(operation, in_use = self.in_use(), "admission slot acquired");
                    Ok(AdmissionPermit { _permit: permit })
                }
                Ok(Err(_closed)) => Err(EsviewError::Cancelled(operation.to_string())),
                Err(_elapsed) => {
                    tracing::warn!(operation, waited = ?timeout, "admission timed out");
                    Err(EsviewError::Timeout {
                        operation: operation.to_string(),
                        waited: timeout,
                    })
                }
            },
        }
    }

    /// Runs `op`, retrying retryable failures with backoff.
    ///
    /// Does not take a slot; see [`AdmissionController::execute`].
    ///
    /// # Errors
    ///
    /// The first terminal error, or the last error once retries are spent.
    pub async fn with_retry<T, E, F, Fut>(&self, operation: &str, mut op: F) -> Result<T, E>
    where
        E: Retryable + Display,
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let mut delays = self.policy.delays();
        let mut attempt = 0u32;
        loop {
            match op().await {
                Ok(value) => {
                    if attempt > 0 {
                        tracing::debug!(operation, retries = attempt, "operation succeeded after retries");
                    }
                    return Ok(value);
                }
                Err(e) if !e.is_retryable() => {
                    tracing::debug!(operation, error = %e, "terminal failure, not retrying");
                    return Err(e);
                }
                Err(e) => match delays.next() {
                    Some(delay) => {
                        tracing::warn!(operation, attempt = attempt + 1, delay = ?delay, error = %e, "operation failed, retrying");
                        tokio::time::sleep(delay).await;
                        attempt += 1;
                    }
                    None => {
                        tracing::error!(operation, attempts = attempt + 1, error = %e, "operation failed after all attempts");
                        return Err(e);
                    }
                },
            }
        }
    }

    /// Runs `op` under admission control with retries.
    ///
    /// Each attempt holds a slot only while it runs, so backoff waits do not
    /// block other callers. Cancellation is honoured while waiting for a slot,
    /// during backoff and while an attempt runs.
    ///
    /// # Errors
    ///
    /// [`EsviewError::Timeout`] or [`EsviewError::Cancelled`] from admission,
    /// otherwise the backend error converted into [`EsviewError`].
    pub async fn execute<T, E, F, Fut>(
        &self,
        operation: &str,
        timeout: Duration,
        cancel: &CancellationToken,
        mut op: F,
    ) -> crate::Result<T>
    where
        E: Retryable + Display + Into<EsviewError>,
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let mut delays = self.policy.delays();
        let mut attempt = 0u32;
        loop {
            let permit = self.acquire_or_cancel(operation, timeout, cancel).await?;
            let outcome = tokio::select! {
                biased;
                () = cancel.cancelled() => return Err(EsviewError::Cancelled(operation.to_string())),
                outcome = op() => outcome,
            };
            permit.release();

            let e = match outcome {
                Ok(value) => return Ok(value),
                Err(e) if !e.is_retryable() => {
                    tracing::debug!(operation, error = %e, "terminal failure, not retrying");
                    return Err(e.into());
                }
                Err(e) => e,
            };

            let Some(delay) = delays.next() else {
                tracing::error!(operation, attempts = attempt + 1, error = %e, "operation failed after all attempts");
                return Err(e.into());
            };
            tracing::warn!(operation, attempt = attempt + 1, delay = ?delay, error = %e, "operation failed, retrying");
            tokio::select! {
                biased;
                () = cancel.cancelled() => return Err(EsviewError::Cancelled(operation.to_string())),
                () = tokio::time::sleep(delay) => {}
            }
            attempt += 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{BackendError, BackendErrorKind};
    use proptest::prelude::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn controller(max_concurrent: usize, max_retries: u32) -> AdmissionController {
        AdmissionController::new(
            max_concurrent,
            RetryPolicy {
                max_retries,
                initial_delay: Duration::from_millis(10),
                max_delay: Duration::from_millis(50),
                multiplier: 2.0,
            },
        )
    }

    fn transient() -> BackendError {
        BackendError::new(BackendErrorKind::Unavailable, "503")
    }

    #[test]
    fn delays_grow_and_cap() {
        let policy = controller(1, 5).policy().clone();
        let delays: Vec<u64> = policy.delays().map(|d| d.as_millis() as u64).collect();
        assert_eq!(delays, vec![10, 20, 40, 50, 50]);
    }

    proptest! {
        #[test]
        fn delays_are_monotonic_and_bounded(
            initial in 1u64..1_000,
            extra in 0u64..10_000,
            multiplier in 1.01f64..4.0,
            retries in 0u32..20,
        ) {
            let policy = RetryPolicy {
                max_retries: retries,
                initial_delay: Duration::from_millis(initial),
                max_delay: Duration::from_millis(initial + extra),
                multiplier,
            };
            let delays: Vec<Duration> = policy.delays().collect();
            prop_assert_eq!(delays.len(), retries as usize);
            for pair in delays.windows(2) {
                prop_assert!(pair[0] <= pair[1]);
            }
            for d in &delays {
                prop_assert!(*d <= policy.max_delay);
            }
            let again: Vec<Duration> = policy.delays().collect();
            prop_assert_eq!(delays, again);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn retries_until_success() {
        let calls = AtomicUsize::new(0);
        let result = controller(1, 3)
            .with_retry("search", || async {
                if calls.fetch_add(1, Ordering::SeqCst) < 2 {
                    Err(transient())
                } else {
                    Ok(7)
                }
            })
            .await;
        assert_eq!(result, Ok(7));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn exhausted_budget_returns_last_error() {
        let calls = AtomicUsize::new(0);
        let result: Result<(), BackendError> = controller(1, 2)
            .with_retry("search", || async {
                let n = calls.fetch_add(1, Ordering::SeqCst);
                Err(BackendError::new(BackendErrorKind::Timeout, format!("try {n}")))
            })
            .await;
        assert_eq!(result.unwrap_err().message, "try 2");
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn terminal_errors_skip_the_budget() {
        let calls = AtomicUsize::new(0);
        let result: Result<(), BackendError> = controller(1, 5)
            .with_retry("search", || async {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(BackendError::new(BackendErrorKind::Permission, "403"))
            })
            .await;
        assert_eq!(result.unwrap_err().kind, BackendErrorKind::Permission);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn acquire_times_out_when_full() {
        let gate = controller(1, 0);
        let held = gate.acquire("first", Duration::from_secs(1)).await.unwrap();
        let err = gate.acquire("second", Duration::from_millis(100)).await.unwrap_err();
        assert!(matches!(err, EsviewError::Timeout { .. }));
        held.release();
        assert!(gate.acquire("third", Duration::from_millis(100)).await.is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn acquire_honours_cancellation() {
        let gate = controller(1, 0);
        let _held = gate.acquire("first", Duration::from_secs(1)).await.unwrap();
        let cancel = CancellationToken::new();
        cancel.cancel();
        let err = gate
            .acquire_or_cancel("second", Duration::from_secs(60), &cancel)
            .await
            .unwrap_err();
        assert!(matches!(err, EsviewError::Cancelled(_)));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn never_oversubscribes() {
        let gate = controller(3, 0);
        let peak = Arc::new(AtomicUsize::new(0));
        let current = Arc::new(AtomicUsize::new(0));

        let tasks: Vec<_> = (0..24)
            .map(|_| {
                let gate = gate.clone();
                let peak = Arc::clone(&peak);
                let current = Arc::clone(&current);
                tokio::spawn(async move {
                    gate.execute("load", Duration::from_secs(30), &CancellationToken::new(), || {
                        let peak = Arc::clone(&peak);
                        let current = Arc::clone(&current);
                        async move {
                            let now = current.fetch_add(1, Ordering::SeqCst) + 1;
                            peak.fetch_max(now, Ordering::SeqCst);
                            tokio::time::sleep(Duration::from_millis(5)).await;
                            current.fetch_sub(1, Ordering::SeqCst);
                            Ok::<_, BackendError>(())
                        }
                    })
                    .await
                })
            })
            .collect();

        for task in tasks {
            task.await.unwrap().unwrap();
        }
        assert!(peak.load(Ordering::SeqCst) <= 3);
        assert_eq!(gate.in_use(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn execute_converts_terminal_errors() {
        let err = controller(2, 3)
            .execute("search", Duration::from_secs(1), &CancellationToken::new(), || async {
                Err::<(), _>(BackendError::new(BackendErrorKind::Auth, "401"))
            })
            .await
            .unwrap_err();
        assert!(matches!(err, EsviewError::Backend(ref e) if e.kind == BackendErrorKind::Auth));
    }

    #[tokio::test(start_paused = true)]
    async fn execute_stops_retrying_when_cancelled() {
        let cancel = CancellationToken::new();
        let calls = AtomicUsize::new(0);
        let err = controller(1, 10)
            .execute("search", Duration::from_secs(1), &cancel, || {
                if calls.fetch_add(1, Ordering::SeqCst) == 1 {
                    cancel.cancel();
                }
                async { Err::<(), _>(transient()) }
            })
            .await
            .unwrap_err();
        assert!(matches!(err, EsviewError::Cancelled(_)));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }
}
