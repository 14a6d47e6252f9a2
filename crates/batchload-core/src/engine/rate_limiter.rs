//! Token bucket rate limiter shared by every worker of a batch
//!
//! Callers reserve budget in the order they take the state lock (tokio's
//! mutex is fair), so the bucket may run into debt. Each caller then sleeps
//! exactly until its own reservation is covered by the refill. With a burst
//! capacity of one chunk, the bytes admitted in any window `T` never exceed
//! `rate * T + burst`.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::trace;

/// Aggregate byte-rate limiter
#[derive(Clone)]
pub struct RateLimiter {
    state: Arc<Mutex<RateLimiterState>>,
}

struct RateLimiterState {
    /// Maximum tokens (bytes) the bucket holds when idle
    capacity: f64,
    /// Current tokens; negative while callers are waiting on a reservation
    tokens: f64,
    /// Last token refill time
    last_refill: Instant,
    /// Tokens added per second
    refill_rate: f64,
}

impl RateLimiter {
    /// Create a limiter admitting `bytes_per_second` with a burst of `burst` bytes
    ///
    /// Both values are clamped to at least one byte.
    pub fn new(bytes_per_second: u64, burst: u64) -> Self {
        let bytes_per_second = bytes_per_second.max(1);
        let capacity = burst.max(1) as f64;

        Self {
            state: Arc::new(Mutex::new(RateLimiterState {
                capacity,
                tokens: capacity, // Start with full bucket
                last_refill: Instant::now(),
                refill_rate: bytes_per_second as f64,
            })),
        }
    }

    /// Wait until `bytes` of budget are available and consume them
    ///
    /// Requests larger than the burst capacity are admitted as debt, so they
    /// never deadlock; later callers pay for it by waiting longer.
    pub async fn acquire(&self, bytes: u64) {
        if bytes == 0 {
            return;
        }

        let wait = {
            let mut state = self.state.lock().await;
            state.refill();
            state.tokens -= bytes as f64;

            if state.tokens >= 0.0 {
                return;
            }

            Duration::from_secs_f64(-state.tokens / state.refill_rate)
        };

        // Sleep outside the lock so other workers can queue their reservations
        trace!("Rate limiter: waiting {:?} for {} bytes", wait, bytes);
        tokio::time::sleep(wait).await;
    }
}

impl RateLimiterState {
    /// Refill tokens based on elapsed time
    fn refill(&mut self) {
        let now = Instant::now();
        let elapsed = now.duration_since(self.last_refill).as_secs_f64();
        self.tokens = (self.tokens + elapsed * self.refill_rate).min(self.capacity);
        self.last_refill = now;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_rate_limiter_basic() {
        let limiter = RateLimiter::new(1000, 100); // 1KB/s, 100 byte burst

        let start = Instant::now();
        limiter.acquire(100).await; // Burst, immediate
        assert!(start.elapsed() < Duration::from_millis(5));

        limiter.acquire(500).await; // Should wait ~0.5s
        let elapsed = start.elapsed();
        assert!(elapsed >= Duration::from_millis(500));
        assert!(elapsed < Duration::from_millis(550));
    }

    #[tokio::test(start_paused = true)]
    async fn test_rate_limiter_zero_bytes_is_free() {
        let limiter = RateLimiter::new(1, 1);
        let start = Instant::now();
        for _ in 0..100 {
            limiter.acquire(0).await;
        }
        assert_eq!(start.elapsed(), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn test_rate_limiter_oversized_request_does_not_deadlock() {
        let limiter = RateLimiter::new(1000, 10);
        let start = Instant::now();
        limiter.acquire(2010).await;
        let elapsed = start.elapsed();
        assert!(elapsed >= Duration::from_secs(2));
        assert!(elapsed < Duration::from_millis(2050));
    }

    #[tokio::test(start_paused = true)]
    async fn test_rate_limiter_shared_between_tasks() {
        let limiter = RateLimiter::new(1000, 100);
        let start = Instant::now();
        let admitted = Arc::new(parking_lot::Mutex::new(Vec::new()));

        let mut handles = Vec::new();
        for _ in 0..10 {
            let limiter = limiter.clone();
            let admitted = admitted.clone();
            handles.push(tokio::spawn(async move {
                for _ in 0..5 {
                    limiter.acquire(20).await;
                    admitted.lock().push(start.elapsed());
                }
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        // 1000 bytes total, 100 free up front, the rest at 1000 B/s
        let elapsed = start.elapsed();
        assert!(elapsed >= Duration::from_millis(900));
        assert!(elapsed < Duration::from_millis(1000));

        // Every prefix of admissions stays within rate * t + burst
        let mut times = admitted.lock().clone();
        times.sort();
        for (i, at) in times.iter().enumerate() {
            let admitted_bytes = (i as f64 + 1.0) * 20.0;
            let allowed = at.as_secs_f64() * 1000.0 + 100.0;
            assert!(
                admitted_bytes <= allowed + 1.0,
                "{} bytes admitted by {:?}",
                admitted_bytes,
                at
            );
        }
    }
}
