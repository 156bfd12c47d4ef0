//! Bounded exponential-backoff retry
//!
//! Independent of authentication: the auth layer has its own resend-once rule
//! inside the pipeline, this wraps whole pipeline runs.

use log::{debug, warn};
use std::future::Future;
use std::time::Duration;

use crate::error::{Error, ErrorKind};

/// Which failures are retried.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RetryOn {
    /// Every failure, client errors included (historical behaviour)
    #[default]
    Any,
    /// Network failures and 5xx responses only
    Transient,
}

impl RetryOn {
    fn allows(&self, error: &Error) -> bool {
        // a dead session stays dead, and a 401 here already had its one
        // refresh-and-resend inside the pipeline
        if error.is_session_expired() || error.kind() == ErrorKind::Auth {
            return false;
        }
        match self {
            RetryOn::Any => true,
            RetryOn::Transient => error.is_transient(),
        }
    }
}

/// Configuration for retrying failed calls.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Total attempts, the first one included
    pub max_attempts: u32,
    /// Delay after attempt `n` is `base_delay * 2^n`
    pub base_delay: Duration,
    pub retry_on: RetryOn,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_secs(1),
            retry_on: RetryOn::Any,
        }
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            ..Default::default()
        }
    }

    /// A policy that makes a single attempt.
    pub fn no_retry() -> Self {
        Self::new(1)
    }

    pub fn with_base_delay(mut self, delay: Duration) -> Self {
        self.base_delay = delay;
        self
    }

    pub fn with_retry_on(mut self, retry_on: RetryOn) -> Self {
        self.retry_on = retry_on;
        self
    }

    /// Wait after the given failed attempt (counting from 1).
    pub fn delay_after(&self, attempt: u32) -> Duration {
        self.base_delay.saturating_mul(2u32.saturating_pow(attempt))
    }

    /// Runs `operation` until it succeeds, the attempts are used up, or the
    /// failure is not retryable. The last error is returned.
    pub async fn run<T, F, Fut>(&self, mut operation: F) -> Result<T, Error>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, Error>>,
    {
        let mut attempt = 0;
        loop {
            attempt += 1;
            match operation().await {
                Ok(value) => return Ok(value),
                Err(err) if attempt >= self.max_attempts || !self.retry_on.allows(&err) => {
                    if attempt > 1 {
                        warn!("Giving up after {} attempts: {}", attempt, err);
                    }
                    return Err(err);
                }
                Err(err) => {
                    let delay = self.delay_after(attempt);
                    debug!(
                        "Attempt {}/{} failed ({}), retrying in {:?}",
                        attempt, self.max_attempts, err, delay
                    );
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }
}

/// Runs `operation` with the default backoff and `max_attempts` attempts.
pub async fn with_retry<T, F, Fut>(operation: F, max_attempts: u32) -> Result<T, Error>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, Error>>,
{
    RetryPolicy::new(max_attempts).run(operation).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ApiError;
    use campus_admin_auth::AuthError;
    use reqwest::StatusCode;
    use serde_json::Value;
    use std::sync::Mutex;
    use tokio::time::Instant;

    fn bad_request() -> Error {
        Error::Api(ApiError::new(StatusCode::BAD_REQUEST, Value::Null))
    }

    #[tokio::test(start_paused = true)]
    async fn test_always_failing_operation_runs_max_attempts() {
        let started = Instant::now();
        let calls = Mutex::new(Vec::new());

        let result: Result<(), Error> = with_retry(
            || {
                calls.lock().unwrap().push(started.elapsed());
                async { Err(bad_request()) }
            },
            3,
        )
        .await;

        let err = result.unwrap_err();
        assert_eq!(err.status(), Some(StatusCode::BAD_REQUEST));

        let calls = calls.into_inner().unwrap();
        assert_eq!(calls.len(), 3);
        let first_gap = calls[1] - calls[0];
        let second_gap = calls[2] - calls[1];
        assert_eq!(first_gap, Duration::from_secs(2));
        assert_eq!(second_gap, Duration::from_secs(4));
        assert!(second_gap >= first_gap);
    }

    #[tokio::test(start_paused = true)]
    async fn test_success_after_transient_failure() {
        let mut remaining_failures = 1;
        let value = RetryPolicy::default()
            .run(|| {
                let fail = remaining_failures > 0;
                remaining_failures -= 1;
                async move {
                    if fail {
                        Err(Error::general("connection reset"))
                    } else {
                        Ok(7)
                    }
                }
            })
            .await
            .unwrap();
        assert_eq!(value, 7);
    }

    #[tokio::test(start_paused = true)]
    async fn test_transient_mode_skips_client_errors() {
        let mut calls = 0;
        let policy = RetryPolicy::default().with_retry_on(RetryOn::Transient);
        let result: Result<(), Error> = policy
            .run(|| {
                calls += 1;
                async { Err(bad_request()) }
            })
            .await;
        assert!(result.is_err());
        assert_eq!(calls, 1);

        let mut calls = 0;
        let result: Result<(), Error> = policy
            .run(|| {
                calls += 1;
                async {
                    Err(Error::Api(ApiError::new(
                        StatusCode::SERVICE_UNAVAILABLE,
                        Value::Null,
                    )))
                }
            })
            .await;
        assert!(result.is_err());
        assert_eq!(calls, 3);
    }

    #[tokio::test]
    async fn test_expired_session_is_not_retried() {
        let mut calls = 0;
        let result: Result<(), Error> = RetryPolicy::default()
            .run(|| {
                calls += 1;
                async { Err(Error::Session(AuthError::MissingRefreshToken)) }
            })
            .await;
        assert!(matches!(result, Err(Error::Session(_))));
        assert_eq!(calls, 1);

        let mut calls = 0;
        let result: Result<(), Error> = RetryPolicy::default()
            .run(|| {
                calls += 1;
                async {
                    Err(Error::Api(ApiError::new(
                        StatusCode::UNAUTHORIZED,
                        Value::Null,
                    )))
                }
            })
            .await;
        assert!(result.is_err());
        assert_eq!(calls, 1);
    }

    #[test]
    fn test_delay_growth() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.delay_after(1), Duration::from_secs(2));
        assert_eq!(policy.delay_after(2), Duration::from_secs(4));
        assert_eq!(policy.delay_after(3), Duration::from_secs(8));
    }
}
