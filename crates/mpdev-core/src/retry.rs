//! Retry/Backoff Controller
//!
//! Wraps one operation with a bounded number of attempts and a fixed delay
//! between them. Policies are chosen per call site: uploads, chip detection
//! and over-the-air writes all have their own limits.
//!
//! Callers that need to mutate state between attempts (restart a transfer
//! job, reopen a channel) drive an [`Attempts`] counter directly:
//!
//! ```ignore
//! let mut attempts = policy.attempts("upload main.py");
//! let result = loop {
//!     attempts.start();
//!     job.restart();
//!     match transport.put_file(&mut job, progress).await {
//!         Ok(()) => break Ok(()),
//!         Err(e) => attempts.failed(e).await?,
//!     }
//! };
//! ```
//!
//! Simpler call sites use [`RetryPolicy::run`].

use crate::error::Error;
use std::fmt;
use std::future::Future;
use std::time::Duration;
use thiserror::Error as ThisError;

/// Bounded retry policy with a fixed delay
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first. Zero behaves like one.
    pub max_attempts: u32,
    /// Pause between attempts
    pub delay: Duration,
}

impl RetryPolicy {
    /// Create a policy
    pub const fn new(max_attempts: u32, delay: Duration) -> Self {
        Self {
            max_attempts,
            delay,
        }
    }

    /// Run once, never retry
    pub const fn once() -> Self {
        Self::new(1, Duration::ZERO)
    }

    /// Per-file uploads over the command channel
    pub const fn file_put() -> Self {
        Self::new(3, Duration::from_millis(500))
    }

    /// Per-file uploads over the socket channel
    pub const fn socket_transfer() -> Self {
        Self::new(5, Duration::from_millis(500))
    }

    /// Chip identification before flashing
    pub const fn chip_id() -> Self {
        Self::new(5, Duration::from_secs(1))
    }

    /// Over-the-air erase and write
    pub const fn ota() -> Self {
        Self::new(5, Duration::from_secs(1))
    }

    /// Flash erase over a serial line
    pub const fn erase() -> Self {
        Self::new(3, Duration::from_secs(1))
    }

    /// Same attempts, different delay
    pub const fn with_delay(self, delay: Duration) -> Self {
        Self::new(self.max_attempts, delay)
    }

    /// Effective attempt limit
    pub fn limit(&self) -> u32 {
        self.max_attempts.max(1)
    }

    /// Start counting attempts of `operation`
    pub fn attempts(&self, operation: impl Into<String>) -> Attempts {
        Attempts {
            policy: *self,
            operation: operation.into(),
            made: 0,
        }
    }

    /// Run `f` until it succeeds, the error is not retryable, or the policy
    /// is exhausted
    pub async fn run<T, F, Fut>(
        &self,
        operation: impl Into<String>,
        mut f: F,
    ) -> Result<Retried<T>, RetryError<Error>>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = crate::Result<T>>,
    {
        let mut attempts = self.attempts(operation);
        loop {
            attempts.start();
            match f().await {
                Ok(value) => {
                    return Ok(Retried {
                        value,
                        attempts: attempts.made(),
                    })
                }
                Err(e) if !e.is_retryable() => return Err(attempts.abort(e)),
                Err(e) => attempts.failed(e).await?,
            }
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::file_put()
    }
}

/// A value together with the number of attempts it took
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Retried<T> {
    /// Result of the successful attempt
    pub value: T,
    /// Attempts made, including the successful one
    pub attempts: u32,
}

/// Attempt counter for one operation under a policy
#[derive(Debug, Clone)]
pub struct Attempts {
    policy: RetryPolicy,
    operation: String,
    made: u32,
}

impl Attempts {
    /// Mark the start of an attempt
    pub fn start(&mut self) {
        self.made += 1;
    }

    /// Attempts started so far
    pub fn made(&self) -> u32 {
        self.made
    }

    /// Operation being retried
    pub fn operation(&self) -> &str {
        &self.operation
    }

    /// Record a failed attempt
    ///
    /// Waits out the delay and returns `Ok(())` if another attempt is allowed,
    /// otherwise returns [`RetryError::Exhausted`] carrying `error`.
    pub async fn failed<E>(&mut self, error: E) -> Result<(), RetryError<E>>
    where
        E: fmt::Display + fmt::Debug,
    {
        let limit = self.policy.limit();
        if self.made >= limit {
            log::warn!(
                "{} failed after {} attempt(s): {}",
                self.operation,
                self.made,
                error
            );
            return Err(RetryError::Exhausted {
                operation: self.operation.clone(),
                attempts: self.made,
                last: error,
            });
        }

        log::warn!(
            "{} attempt {}/{} failed: {}; retrying in {:?}",
            self.operation,
            self.made,
            limit,
            error,
            self.policy.delay
        );
        if !self.policy.delay.is_zero() {
            tokio::time::sleep(self.policy.delay).await;
        }
        Ok(())
    }

    /// Give up immediately on an error that must not be retried
    pub fn abort<E: fmt::Display + fmt::Debug>(&self, error: E) -> RetryError<E> {
        RetryError::Aborted {
            operation: self.operation.clone(),
            attempts: self.made,
            error,
        }
    }
}

/// Failure of a retried operation
#[derive(Debug, ThisError)]
pub enum RetryError<E: fmt::Display + fmt::Debug> {
    /// Every allowed attempt failed
    #[error("{operation} failed after {attempts} attempt(s): {last}")]
    Exhausted {
        /// Operation description
        operation: String,
        /// Attempts made
        attempts: u32,
        /// Error of the final attempt
        last: E,
    },
    /// An attempt failed with an error that must not be retried
    #[error("{operation} aborted on attempt {attempts}: {error}")]
    Aborted {
        /// Operation description
        operation: String,
        /// Attempts made
        attempts: u32,
        /// The error
        error: E,
    },
}

impl<E: fmt::Display + fmt::Debug> RetryError<E> {
    /// Attempts made before giving up
    pub fn attempts(&self) -> u32 {
        match self {
            Self::Exhausted { attempts, .. } | Self::Aborted { attempts, .. } => *attempts,
        }
    }

    /// The error that ended the operation
    pub fn into_inner(self) -> E {
        match self {
            Self::Exhausted { last, .. } => last,
            Self::Aborted { error, .. } => error,
        }
    }
}

impl From<RetryError<Error>> for Error {
    fn from(e: RetryError<Error>) -> Self {
        match e {
            RetryError::Exhausted {
                operation,
                attempts,
                last,
            } => Error::RetriesExhausted {
                operation,
                attempts,
                last: Box::new(last),
            },
            RetryError::Aborted { error, .. } => error,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use std::cell::Cell;

    fn quick(max: u32) -> RetryPolicy {
        RetryPolicy::new(max, Duration::ZERO)
    }

    #[tokio::test]
    async fn test_succeeds_after_failures() {
        let calls = Cell::new(0u32);
        let out = quick(5)
            .run("op", || {
                calls.set(calls.get() + 1);
                let n = calls.get();
                async move {
                    if n <= 2 {
                        Err(Error::Disconnected("op".into()))
                    } else {
                        Ok(n)
                    }
                }
            })
            .await
            .unwrap();
        assert_eq!(out.attempts, 3);
        assert_eq!(out.value, 3);
    }

    #[tokio::test]
    async fn test_exhausts_exactly_max_attempts() {
        let calls = Cell::new(0u32);
        let err = quick(3)
            .run("upload a.py", || {
                calls.set(calls.get() + 1);
                async { Err::<(), _>(Error::Protocol("bad frame".into())) }
            })
            .await
            .unwrap_err();
        assert_eq!(calls.get(), 3);
        assert_eq!(err.attempts(), 3);
        let err: Error = err.into();
        assert_eq!(err.kind(), ErrorKind::Transient);
        assert!(err.to_string().contains("upload a.py failed after 3"));
    }

    #[tokio::test]
    async fn test_connection_errors_abort_immediately() {
        let calls = Cell::new(0u32);
        let err = quick(5)
            .run("connect", || {
                calls.set(calls.get() + 1);
                async {
                    Err::<(), _>(Error::ConnectTimeout {
                        endpoint: "x".into(),
                        secs: 20,
                    })
                }
            })
            .await
            .unwrap_err();
        assert_eq!(calls.get(), 1);
        assert!(matches!(err, RetryError::Aborted { .. }));
    }

    #[tokio::test]
    async fn test_zero_attempts_runs_once() {
        let mut attempts = quick(0).attempts("op");
        attempts.start();
        assert!(attempts.failed("boom").await.is_err());
        assert_eq!(attempts.made(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_delay_between_attempts() {
        let policy = RetryPolicy::new(2, Duration::from_secs(1));
        let start = tokio::time::Instant::now();
        let mut attempts = policy.attempts("op");
        attempts.start();
        attempts.failed("first").await.unwrap();
        assert!(start.elapsed() >= Duration::from_secs(1));
        attempts.start();
        assert!(attempts.failed("second").await.is_err());
    }
}
