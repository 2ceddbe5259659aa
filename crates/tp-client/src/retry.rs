//! Bounded retry with exponential backoff.

use std::future::Future;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Errors that can tell whether repeating the failed operation is worthwhile.
pub trait Retryable {
    fn is_retryable(&self) -> bool;
}

/// Marker produced when the caller's cancellation token fires.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Cancelled;

/// Retry settings shared read-only by every request.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryPolicy {
    /// Additional attempts after the first one.
    pub max_retries: u32,
    /// Delay before the first retry.
    pub initial_delay: Duration,
    /// Multiplier applied to the delay before each successive retry.
    pub backoff_factor: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_delay: Duration::from_secs(1),
            backoff_factor: 2.0,
        }
    }
}

impl RetryPolicy {
    /// Delay before retry number `attempt` (0-based): `initial_delay * backoff_factor^attempt`.
    #[must_use]
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exp = i32::try_from(attempt).unwrap_or(i32::MAX);
        #[allow(clippy::cast_precision_loss)]
        let nanos = self.initial_delay.as_nanos() as f64 * self.backoff_factor.powi(exp);
        if !nanos.is_finite() || nanos <= 0.0 {
            return Duration::ZERO;
        }
        // Float-to-int `as` saturates at u64::MAX.
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let nanos = nanos.round() as u64;
        Duration::from_nanos(nanos)
    }

    /// Run `op` until it succeeds, fails with a non-retryable error, or attempts run out.
    ///
    /// At most `max_retries + 1` attempts are made, strictly one after another. When every
    /// attempt fails the error from the final attempt is returned. Both the in-flight attempt and
    /// the backoff sleep race `cancel`; cancellation is returned immediately and never retried.
    ///
    /// # Errors
    ///
    /// Returns the first non-retryable error, the last retryable error once attempts are
    /// exhausted, or the cancellation error.
    pub async fn execute<T, E, F, Fut>(&self, cancel: &CancellationToken, mut op: F) -> Result<T, E>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Retryable + From<Cancelled>,
    {
        let mut attempt: u32 = 0;
        loop {
            let outcome = tokio::select! {
                biased;
                () = cancel.cancelled() => return Err(E::from(Cancelled)),
                r = op() => r,
            };

            let err = match outcome {
                Ok(value) => return Ok(value),
                Err(err) => err,
            };

            if !err.is_retryable() || attempt >= self.max_retries {
                return Err(err);
            }

            let delay = self.delay_for(attempt);
            debug!(
                attempt = attempt + 1,
                max_retries = self.max_retries,
                delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                "retrying after retryable failure"
            );

            tokio::select! {
                biased;
                () = cancel.cancelled() => return Err(E::from(Cancelled)),
                () = tokio::time::sleep(delay) => {}
            }
            attempt += 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::TpError;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU32, Ordering};
    use tokio::time::Instant;

    fn policy() -> RetryPolicy {
        RetryPolicy {
            max_retries: 3,
            initial_delay: Duration::from_millis(100),
            backoff_factor: 2.0,
        }
    }

    fn api(status: u16, message: String) -> TpError {
        TpError::Api {
            status,
            message,
            context: "GET test".to_string(),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn always_failing_500_is_attempted_max_retries_plus_one_times() {
        let calls = Arc::new(AtomicU32::new(0));
        let cancel = CancellationToken::new();

        let result: Result<(), TpError> = policy()
            .execute(&cancel, || {
                let calls = calls.clone();
                async move {
                    let n = calls.fetch_add(1, Ordering::SeqCst) + 1;
                    Err(api(500, format!("failure #{n}")))
                }
            })
            .await;

        assert_eq!(calls.load(Ordering::SeqCst), 4);
        match result {
            Err(TpError::Api { status, message, .. }) => {
                assert_eq!(status, 500);
                assert_eq!(message, "failure #4");
            }
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn bad_request_is_returned_after_a_single_attempt() {
        let calls = Arc::new(AtomicU32::new(0));
        let cancel = CancellationToken::new();

        let result: Result<(), TpError> = policy()
            .execute(&cancel, || {
                let calls = calls.clone();
                async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Err(api(400, "bad where clause".to_string()))
                }
            })
            .await;

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(matches!(result, Err(TpError::Api { status: 400, ref message, .. }) if message == "bad where clause"));
    }

    #[tokio::test(start_paused = true)]
    async fn succeeds_after_transient_failures() {
        let calls = Arc::new(AtomicU32::new(0));
        let cancel = CancellationToken::new();

        let result: Result<&str, TpError> = policy()
            .execute(&cancel, || {
                let calls = calls.clone();
                async move {
                    if calls.fetch_add(1, Ordering::SeqCst) < 2 {
                        Err(TpError::Transport("connection reset".to_string()))
                    } else {
                        Ok("done")
                    }
                }
            })
            .await;

        assert_eq!(result.expect("eventually succeeds"), "done");
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn delays_grow_by_the_backoff_factor() {
        let stamps = Arc::new(parking_lot::Mutex::new(Vec::<Instant>::new()));
        let cancel = CancellationToken::new();

        let _: Result<(), TpError> = policy()
            .execute(&cancel, || {
                let stamps = stamps.clone();
                async move {
                    stamps.lock().push(Instant::now());
                    Err(api(503, "unavailable".to_string()))
                }
            })
            .await;

        let stamps = stamps.lock();
        assert_eq!(stamps.len(), 4);
        let gaps: Vec<Duration> = stamps.windows(2).map(|w| w[1] - w[0]).collect();
        assert!(gaps[0] >= Duration::from_millis(100));
        assert!(gaps[1] >= Duration::from_millis(200));
        assert!(gaps[2] >= Duration::from_millis(400));
        assert!(gaps[0] < gaps[1] && gaps[1] < gaps[2]);
    }

    #[tokio::test(start_paused = true)]
    async fn cancellation_stops_retrying() {
        let calls = Arc::new(AtomicU32::new(0));
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();

        let result: Result<(), TpError> = policy()
            .execute(&cancel, || {
                let calls = calls.clone();
                let trigger = trigger.clone();
                async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    trigger.cancel();
                    Err(api(500, "server error".to_string()))
                }
            })
            .await;

        assert!(matches!(result, Err(TpError::Cancelled)));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn delay_schedule_matches_formula() {
        let p = policy();
        assert_eq!(p.delay_for(0), Duration::from_millis(100));
        assert_eq!(p.delay_for(1), Duration::from_millis(200));
        assert_eq!(p.delay_for(2), Duration::from_millis(400));
    }

    #[test]
    fn default_policy() {
        let p = RetryPolicy::default();
        assert_eq!(p.max_retries, 3);
        assert_eq!(p.initial_delay, Duration::from_secs(1));
        assert!((p.backoff_factor - 2.0).abs() < f64::EPSILON);
    }
}
