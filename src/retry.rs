//! Retry logic with exponential backoff
//!
//! Uploads are wrapped in [`with_retry`]: transient failures are retried with
//! exponentially growing delays (capped at `max_delay`, optionally jittered),
//! permanent failures return immediately. Delays go through `tokio::time`, so
//! tests drive them with a paused clock instead of real waiting.
//!
//! # Example
//!
//! ```no_run
//! use auction_export::retry::{IsRetryable, with_retry};
//! use auction_export::config::RetryConfig;
//!
//! #[derive(Debug)]
//! enum MyError {
//!     Transient,
//!     Permanent,
//! }
//!
//! impl std::fmt::Display for MyError {
//!     fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
//!         write!(f, "{self:?}")
//!     }
//! }
//!
//! impl IsRetryable for MyError {
//!     fn is_retryable(&self) -> bool {
//!         matches!(self, MyError::Transient)
//!     }
//! }
//!
//! # async fn example() -> Result<(), MyError> {
//! let config = RetryConfig::default();
//! with_retry(&config, || async { Ok::<_, MyError>(()) }).await?;
//! # Ok(())
//! # }
//! ```

use crate::config::RetryConfig;
use crate::error::Error;
use rand::Rng;
use std::future::Future;
use std::time::Duration;

/// Splits errors into transient and permanent
///
/// Transient failures (timeouts, connection resets, busy servers) return `true`.
/// Permanent failures (bad credentials, corrupt data, misconfiguration) return `false`.
pub trait IsRetryable {
    /// Whether another attempt may succeed
    fn is_retryable(&self) -> bool;
}

impl IsRetryable for Error {
    fn is_retryable(&self) -> bool {
        match self {
            Error::Network(e) => e.is_timeout() || e.is_connect(),
            Error::Io(e) => matches!(
                e.kind(),
                std::io::ErrorKind::TimedOut
                    | std::io::ErrorKind::ConnectionRefused
                    | std::io::ErrorKind::ConnectionReset
                    | std::io::ErrorKind::ConnectionAborted
                    | std::io::ErrorKind::NotConnected
                    | std::io::ErrorKind::BrokenPipe
                    | std::io::ErrorKind::Interrupted
            ),
            // FTP replies are classified by content: 4xx replies are transient
            Error::FileStore(msg) => {
                let msg = msg.to_lowercase();
                msg.contains("421")
                    || msg.contains("425")
                    || msg.contains("426")
                    || msg.contains("450")
                    || msg.contains("too many connections")
                    || msg.contains("timeout")
                    || msg.contains("timed out")
                    || msg.contains("connection")
                    || msg.contains("temporar")
            }
            Error::Config { .. }
            | Error::Serialization(_)
            | Error::Csv(_)
            | Error::Image(_)
            | Error::StatusStore(_)
            | Error::Source(_)
            | Error::Mapping(_)
            | Error::Cancelled
            | Error::Other(_) => false,
        }
    }
}

/// Run `operation` until it succeeds, fails permanently, or runs out of retries
///
/// The operation runs once, then up to `config.max_attempts` more times while
/// it keeps failing with a retryable error. Returns the first success or the
/// last error.
pub async fn with_retry<F, Fut, T, E>(config: &RetryConfig, mut operation: F) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: IsRetryable + std::fmt::Display,
{
    let mut attempt = 0;
    let mut delay = config.initial_delay;

    loop {
        match operation().await {
            Ok(result) => {
                if attempt > 0 {
                    tracing::info!(attempts = attempt + 1, "operation recovered after retry");
                }
                return Ok(result);
            }
            Err(e) if e.is_retryable() && attempt < config.max_attempts => {
                attempt += 1;

                tracing::warn!(
                    error = %e,
                    attempt = attempt,
                    max_attempts = config.max_attempts,
                    backoff_ms = delay.as_millis(),
                    "transient failure, backing off"
                );

                let wait = if config.jitter { add_jitter(delay) } else { delay };
                tokio::time::sleep(wait).await;

                delay = next_delay(config, delay);
            }
            Err(e) => {
                if e.is_retryable() {
                    tracing::error!(
                        error = %e,
                        attempts = attempt + 1,
                        "giving up after exhausting retries"
                    );
                } else {
                    tracing::error!(error = %e, "permanent failure, not retrying");
                }
                return Err(e);
            }
        }
    }
}

/// Delay after `current`, grown by the multiplier and capped at `max_delay`
pub fn next_delay(config: &RetryConfig, current: Duration) -> Duration {
    Duration::from_secs_f64(current.as_secs_f64() * config.backoff_multiplier).min(config.max_delay)
}

/// Jitter is uniform in `[delay, 2 * delay]`
fn add_jitter(delay: Duration) -> Duration {
    let mut rng = rand::thread_rng();
    let factor: f64 = rng.gen_range(1.0..=2.0);
    delay.mul_f64(factor)
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU32, Ordering};
    use tokio::time::Instant;

    #[derive(Debug)]
    enum TestError {
        Transient,
        Permanent,
    }

    impl std::fmt::Display for TestError {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            match self {
                TestError::Transient => write!(f, "transient error"),
                TestError::Permanent => write!(f, "permanent error"),
            }
        }
    }

    impl IsRetryable for TestError {
        fn is_retryable(&self) -> bool {
            matches!(self, TestError::Transient)
        }
    }

    fn fixed(max_attempts: u32, initial_ms: u64, max_ms: u64, multiplier: f64) -> RetryConfig {
        RetryConfig {
            max_attempts,
            initial_delay: Duration::from_millis(initial_ms),
            max_delay: Duration::from_millis(max_ms),
            backoff_multiplier: multiplier,
            jitter: false,
        }
    }

    #[tokio::test(start_paused = true)]
    async fn success_needs_a_single_call() {
        let counter = Arc::new(AtomicU32::new(0));
        let c = counter.clone();

        let result = with_retry(&RetryConfig::default(), || {
            let c = c.clone();
            async move {
                c.fetch_add(1, Ordering::SeqCst);
                Ok::<_, TestError>(42)
            }
        })
        .await;

        assert_eq!(result.unwrap(), 42);
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn transient_failures_are_retried_until_success() {
        let counter = Arc::new(AtomicU32::new(0));
        let c = counter.clone();

        let result = with_retry(&fixed(3, 10, 1000, 2.0), || {
            let c = c.clone();
            async move {
                if c.fetch_add(1, Ordering::SeqCst) < 2 {
                    Err(TestError::Transient)
                } else {
                    Ok(7)
                }
            }
        })
        .await;

        assert_eq!(result.unwrap(), 7);
        assert_eq!(counter.load(Ordering::SeqCst), 3, "two retries before success");
    }

    #[tokio::test(start_paused = true)]
    async fn exhausted_attempts_return_last_error() {
        let counter = Arc::new(AtomicU32::new(0));
        let c = counter.clone();

        let result = with_retry(&fixed(2, 10, 1000, 2.0), || {
            let c = c.clone();
            async move {
                c.fetch_add(1, Ordering::SeqCst);
                Err::<i32, _>(TestError::Transient)
            }
        })
        .await;

        assert!(matches!(result, Err(TestError::Transient)));
        assert_eq!(counter.load(Ordering::SeqCst), 3, "initial try + 2 retries");
    }

    #[tokio::test(start_paused = true)]
    async fn permanent_errors_are_not_retried() {
        let counter = Arc::new(AtomicU32::new(0));
        let c = counter.clone();

        let result = with_retry(&RetryConfig::default(), || {
            let c = c.clone();
            async move {
                c.fetch_add(1, Ordering::SeqCst);
                Err::<i32, _>(TestError::Permanent)
            }
        })
        .await;

        assert!(result.is_err());
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn delays_grow_exponentially_and_respect_the_cap() {
        let timestamps = Arc::new(tokio::sync::Mutex::new(Vec::new()));
        let ts = timestamps.clone();

        let _ = with_retry(&fixed(4, 100, 300, 2.0), || {
            let ts = ts.clone();
            async move {
                ts.lock().await.push(Instant::now());
                Err::<i32, _>(TestError::Transient)
            }
        })
        .await;

        let ts = timestamps.lock().await;
        assert_eq!(ts.len(), 5);
        let gaps: Vec<u128> = ts.windows(2).map(|w| (w[1] - w[0]).as_millis()).collect();
        assert_eq!(gaps, vec![100, 200, 300, 300], "100ms doubling, capped at 300ms");
    }

    #[tokio::test(start_paused = true)]
    async fn zero_max_attempts_calls_once() {
        let counter = Arc::new(AtomicU32::new(0));
        let c = counter.clone();

        let result = with_retry(&fixed(0, 10, 100, 2.0), || {
            let c = c.clone();
            async move {
                c.fetch_add(1, Ordering::SeqCst);
                Err::<i32, _>(TestError::Transient)
            }
        })
        .await;

        assert!(result.is_err());
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn jittered_delay_stays_within_twice_the_base() {
        let config = RetryConfig {
            jitter: true,
            ..fixed(1, 50, 1000, 2.0)
        };
        let start = Instant::now();

        let _ = with_retry(&config, || async { Err::<i32, _>(TestError::Transient) }).await;

        let elapsed = start.elapsed();
        assert!(elapsed >= Duration::from_millis(50), "waited {elapsed:?}");
        assert!(elapsed <= Duration::from_millis(100), "waited {elapsed:?}");
    }

    #[test]
    fn add_jitter_stays_within_bounds() {
        let delay = Duration::from_millis(50);
        for _ in 0..200 {
            let jittered = add_jitter(delay);
            assert!(jittered >= delay && jittered <= delay * 2);
        }
        assert_eq!(add_jitter(Duration::ZERO), Duration::ZERO);
    }

    #[test]
    fn next_delay_is_capped() {
        let config = fixed(5, 1000, 3000, 10.0);
        assert_eq!(
            next_delay(&config, Duration::from_secs(1)),
            Duration::from_secs(3)
        );
    }

    #[test]
    fn file_store_busy_replies_are_retryable() {
        assert!(Error::FileStore("421 Too many connections (8) from this IP".into()).is_retryable());
        assert!(Error::FileStore("connection reset by peer".into()).is_retryable());
        assert!(!Error::FileStore("530 Login authentication failed".into()).is_retryable());
        assert!(!Error::FileStore("553 Can't open that file: Permission denied".into()).is_retryable());
    }

    #[test]
    fn io_errors_are_classified_by_kind() {
        let timeout = Error::Io(std::io::Error::new(std::io::ErrorKind::TimedOut, "t"));
        let denied = Error::Io(std::io::Error::new(std::io::ErrorKind::PermissionDenied, "d"));
        assert!(timeout.is_retryable());
        assert!(!denied.is_retryable());
    }

    #[test]
    fn pipeline_errors_are_permanent() {
        assert!(!Error::Cancelled.is_retryable());
        assert!(!Error::config("bad", "upload").is_retryable());
        assert!(!Error::Source("bad page".into()).is_retryable());
    }
}
