//! Upload rate limiting using a token bucket
//!
//! The [`RateLimiter`] caps how many upload *attempts* start per interval,
//! independent of how many store sessions are open. It is lock-free: the
//! bucket lives in atomics and refills lazily on every acquire, so no
//! background timer task is needed. Time is read from `tokio::time`, which
//! lets tests drive the bucket with a paused clock.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::time::Instant;

/// Token bucket shared by every upload of a run
///
/// # Algorithm
///
/// - Each token is one upload attempt
/// - The bucket holds at most `permits` tokens and starts full
/// - One token is added every `interval / permits`
/// - `acquire` waits until a token is available and takes it
///
/// # Implementation
///
/// - `tokens`: tokens available right now
/// - `last_refill`: nanoseconds since `origin` up to which refills were credited
///
/// Refills advance `last_refill` only by the time that produced whole tokens,
/// so partial progress toward the next token is never lost.
#[derive(Clone, Debug)]
pub struct RateLimiter {
    permits: u64,
    interval: Duration,
    tokens: Arc<AtomicU64>,
    last_refill: Arc<AtomicU64>,
    origin: Instant,
}

impl RateLimiter {
    /// Create a limiter granting `permits` attempts per `interval`
    ///
    /// A zero permit count or interval is treated as one permit per interval /
    /// one nanosecond respectively; [`Config::validate`](crate::config::Config::validate)
    /// rejects both before a limiter is ever built.
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use auction_export::rate_limiter::RateLimiter;
    /// use std::time::Duration;
    ///
    /// # async fn example() {
    /// // 5 uploads per second
    /// let limiter = RateLimiter::new(5, Duration::from_secs(1));
    /// limiter.acquire().await;
    /// // ... start the upload ...
    /// # }
    /// ```
    #[must_use]
    pub fn new(permits: u64, interval: Duration) -> Self {
        let permits = permits.max(1);
        let interval = interval.max(Duration::from_nanos(1));
        Self {
            permits,
            interval,
            tokens: Arc::new(AtomicU64::new(permits)),
            last_refill: Arc::new(AtomicU64::new(0)),
            origin: Instant::now(),
        }
    }

    /// Bucket capacity (permits per interval)
    pub fn permits(&self) -> u64 {
        self.permits
    }

    /// Tokens available right now, after crediting elapsed time
    pub fn available_tokens(&self) -> u64 {
        self.refill_tokens();
        self.tokens.load(Ordering::SeqCst)
    }

    /// Instant up to which refills have been credited
    pub fn last_refill(&self) -> Instant {
        self.origin + Duration::from_nanos(self.last_refill.load(Ordering::SeqCst))
    }

    /// Take one token without waiting
    pub fn try_acquire(&self) -> bool {
        self.refill_tokens();
        loop {
            let current = self.tokens.load(Ordering::SeqCst);
            if current == 0 {
                return false;
            }
            if self
                .tokens
                .compare_exchange(current, current - 1, Ordering::SeqCst, Ordering::SeqCst)
                .is_ok()
            {
                return true;
            }
        }
    }

    /// Wait until a token is available and take it
    pub async fn acquire(&self) {
        loop {
            if self.try_acquire() {
                return;
            }

            // Sleep until the next token is due, re-checking at least every 100ms
            let wait = self.time_to_next_token();
            tokio::time::sleep(wait.clamp(Duration::from_millis(1), Duration::from_millis(100)))
                .await;
        }
    }

    fn token_period_nanos(&self) -> u64 {
        (self.interval.as_nanos() / u128::from(self.permits)).max(1) as u64
    }

    fn now_nanos(&self) -> u64 {
        self.origin.elapsed().as_nanos() as u64
    }

    fn time_to_next_token(&self) -> Duration {
        let period = self.token_period_nanos();
        let elapsed = self
            .now_nanos()
            .saturating_sub(self.last_refill.load(Ordering::SeqCst));
        Duration::from_nanos(period.saturating_sub(elapsed))
    }

    fn refill_tokens(&self) {
        let period = self.token_period_nanos();
        let now = self.now_nanos();
        let last = self.last_refill.load(Ordering::SeqCst);

        let tokens_to_add = now.saturating_sub(last) / period;
        if tokens_to_add == 0 {
            return;
        }

        // Only the thread that wins the timestamp update credits tokens
        let credited = last + tokens_to_add * period;
        if self
            .last_refill
            .compare_exchange(last, credited, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
        {
            let _ = self
                .tokens
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |current| {
                    Some(current.saturating_add(tokens_to_add).min(self.permits))
                });
        }
    }
}
