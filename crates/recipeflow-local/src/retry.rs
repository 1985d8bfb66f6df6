//! Generic retry-with-backoff combinator.
//!
//! The policy (attempt count, base delay, multiplier) lives in
//! `recipeflow_core::RetryPolicy` so it can be unit-tested without any
//! caller; this module owns the async loop and the sleeps.

use recipeflow_core::{Error, RetryPolicy};
use std::future::Future;
use tracing::warn;

/// How an individual attempt failed.
pub enum AttemptError {
    /// Do not retry; surface immediately (e.g. a non-429 HTTP error status).
    Fatal(Error),
    /// Back off and try again if attempts remain.
    Retryable(Error),
}

/// Why the whole retry loop failed. Callers that need an aggregate
/// "failed after N attempts" message match on `Exhausted`; fatal errors
/// pass through untouched.
#[derive(Debug)]
pub enum RetryFailure {
    Fatal(Error),
    Exhausted { last: Error, attempts: u32 },
}

impl RetryFailure {
    pub fn into_error(self) -> Error {
        match self {
            RetryFailure::Fatal(e) => e,
            RetryFailure::Exhausted { last, .. } => last,
        }
    }
}

/// Run `op` up to `policy.max_attempts` times, sleeping
/// `base_delay * multiplier^attempt` between retryable failures. No jitter;
/// backoff is deterministic.
///
/// `op` receives the 0-based attempt index so callers can vary per-attempt
/// parameters (e.g. widening temperature).
pub async fn retry_async<T, F, Fut>(
    policy: &RetryPolicy,
    what: &'static str,
    mut op: F,
) -> Result<T, RetryFailure>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, AttemptError>>,
{
    let mut last: Option<Error> = None;
    for attempt in 0..policy.max_attempts {
        match op(attempt).await {
            Ok(v) => return Ok(v),
            Err(AttemptError::Fatal(e)) => return Err(RetryFailure::Fatal(e)),
            Err(AttemptError::Retryable(e)) => {
                warn!(
                    what,
                    attempt = attempt + 1,
                    max = policy.max_attempts,
                    error = %e,
                    "attempt failed"
                );
                last = Some(e);
                if attempt + 1 < policy.max_attempts {
                    tokio::time::sleep(policy.delay_for(attempt)).await;
                }
            }
        }
    }
    Err(RetryFailure::Exhausted {
        last: last.unwrap_or_else(|| Error::Llm(format!("{what}: no attempts were made"))),
        attempts: policy.max_attempts,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;

    fn fast_policy(attempts: u32) -> RetryPolicy {
        RetryPolicy::new(attempts, Duration::ZERO)
    }

    #[tokio::test]
    async fn returns_first_success() {
        let calls = AtomicU32::new(0);
        let out = retry_async(&fast_policy(3), "test", |_| {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Ok::<_, AttemptError>(42) }
        })
        .await
        .unwrap();
        assert_eq!(out, 42);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn retries_retryable_until_exhaustion() {
        let calls = AtomicU32::new(0);
        let out: Result<u32, RetryFailure> = retry_async(&fast_policy(3), "test", |_| {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(AttemptError::Retryable(Error::Llm("boom".to_string()))) }
        })
        .await;
        match out {
            Err(RetryFailure::Exhausted { attempts, .. }) => assert_eq!(attempts, 3),
            other => panic!("expected exhaustion, got {other:?}"),
        }
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn fatal_errors_short_circuit() {
        let calls = AtomicU32::new(0);
        let out: Result<u32, RetryFailure> = retry_async(&fast_policy(3), "test", |_| {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(AttemptError::Fatal(Error::Fetch("HTTP 404".to_string()))) }
        })
        .await;
        assert!(matches!(out, Err(RetryFailure::Fatal(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn succeeds_on_a_later_attempt() {
        let out = retry_async(&fast_policy(3), "test", |attempt| async move {
            if attempt < 2 {
                Err(AttemptError::Retryable(Error::Llm("flaky".to_string())))
            } else {
                Ok(attempt)
            }
        })
        .await
        .unwrap();
        assert_eq!(out, 2);
    }
}
