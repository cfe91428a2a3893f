//! Token-bucket rate limiter shared by every outbound call to one upstream.
//!
//! Tokens refill continuously at `refill_per_sec` up to `capacity`. Waiters
//! queue on a fair async mutex so service is FIFO-best-effort; a caller that
//! cannot be served before its timeout gets `RateLimitExceeded`.

use crate::config::RateLimiterConfig;
use crate::error::{Result, SyncError};
use parking_lot::Mutex;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, warn};

struct Bucket {
    tokens: f64,
    last_refill: Instant,
    /// Total tokens handed out since creation
    granted: u64,
}

pub struct RateLimiter {
    name: String,
    capacity: u32,
    refill_per_sec: f64,
    acquire_timeout: Duration,
    bucket: Mutex<Bucket>,
    waiters: tokio::sync::Mutex<()>,
}

impl std::fmt::Debug for RateLimiter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RateLimiter")
            .field("name", &self.name)
            .field("capacity", &self.capacity)
            .field("refill_per_sec", &self.refill_per_sec)
            .finish()
    }
}

impl RateLimiter {
    /// Create a limiter with a full bucket.
    ///
    /// The config is not validated here; a zero capacity makes every
    /// `acquire` fail fast with a configuration error.
    pub fn new(name: &str, config: &RateLimiterConfig) -> Self {
        Self {
            name: name.to_string(),
            capacity: config.capacity,
            refill_per_sec: config.refill_per_sec,
            acquire_timeout: config.acquire_timeout,
            bucket: Mutex::new(Bucket {
                tokens: config.capacity as f64,
                last_refill: Instant::now(),
                granted: 0,
            }),
            waiters: tokio::sync::Mutex::new(()),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Tokens currently available (after refill)
    pub fn available(&self) -> f64 {
        let mut bucket = self.bucket.lock();
        self.refill(&mut bucket, Instant::now());
        bucket.tokens
    }

    /// Total tokens granted since creation
    pub fn granted(&self) -> u64 {
        self.bucket.lock().granted
    }

    fn check_cost(&self, cost: u32) -> Result<()> {
        if self.capacity == 0 || !self.refill_per_sec.is_finite() || self.refill_per_sec <= 0.0 {
            return Err(SyncError::config(format!(
                "rate limiter '{}' misconfigured: capacity={} refill={}",
                self.name, self.capacity, self.refill_per_sec
            )));
        }
        if cost > self.capacity {
            return Err(SyncError::config(format!(
                "rate limiter '{}': cost {} exceeds capacity {}",
                self.name, cost, self.capacity
            )));
        }
        Ok(())
    }

    fn refill(&self, bucket: &mut Bucket, now: Instant) {
        let elapsed = now.saturating_duration_since(bucket.last_refill).as_secs_f64();
        if elapsed > 0.0 {
            bucket.tokens = (bucket.tokens + elapsed * self.refill_per_sec).min(self.capacity as f64);
            bucket.last_refill = now;
        }
    }

    /// Take tokens if available right now, without waiting
    pub fn try_acquire(&self, cost: u32) -> bool {
        if self.check_cost(cost).is_err() {
            return false;
        }
        let mut bucket = self.bucket.lock();
        self.refill(&mut bucket, Instant::now());
        if bucket.tokens >= cost as f64 {
            bucket.tokens -= cost as f64;
            bucket.granted += cost as u64;
            true
        } else {
            false
        }
    }

    /// Wait until `cost` tokens are available and take them.
    pub async fn acquire(&self, cost: u32) -> Result<()> {
        self.check_cost(cost)?;

        let started = Instant::now();
        let deadline = started + self.acquire_timeout;
        let exceeded = || SyncError::RateLimitExceeded {
            cost,
            waited_ms: started.elapsed().as_millis() as u64,
        };

        let _turn = match tokio::time::timeout_at(deadline, self.waiters.lock()).await {
            Ok(guard) => guard,
            Err(_) => {
                warn!("Rate limiter '{}': timed out waiting in queue", self.name);
                return Err(exceeded());
            }
        };

        loop {
            let wait = {
                let now = Instant::now();
                let mut bucket = self.bucket.lock();
                self.refill(&mut bucket, now);
                if bucket.tokens >= cost as f64 {
                    bucket.tokens -= cost as f64;
                    bucket.granted += cost as u64;
                    return Ok(());
                }
                let deficit = cost as f64 - bucket.tokens;
                // Too far out to represent means past any deadline
                Duration::try_from_secs_f64(deficit / self.refill_per_sec).ok()
            };

            let wait = match wait {
                Some(wait)
                    if Instant::now()
                        .checked_add(wait)
                        .map_or(false, |ready| ready <= deadline) =>
                {
                    wait
                }
                _ => {
                    warn!(
                        "Rate limiter '{}': {} token(s) not available within {:?}",
                        self.name, cost, self.acquire_timeout
                    );
                    return Err(exceeded());
                }
            };
            debug!("Rate limiter '{}': waiting {:?} for {} token(s)", self.name, wait, cost);
            tokio::time::sleep(wait).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::{Rng, SeedableRng};
    use std::sync::Arc;

    fn config(capacity: u32, refill_per_sec: f64, timeout_ms: u64) -> RateLimiterConfig {
        RateLimiterConfig {
            capacity,
            refill_per_sec,
            acquire_timeout: Duration::from_millis(timeout_ms),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_try_acquire_drains_bucket() {
        let limiter = RateLimiter::new("espn", &config(3, 1.0, 1000));
        assert!(limiter.try_acquire(1));
        assert!(limiter.try_acquire(2));
        assert!(!limiter.try_acquire(1));
        assert_eq!(limiter.granted(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_refill_over_time() {
        let limiter = RateLimiter::new("espn", &config(2, 2.0, 1000));
        assert!(limiter.try_acquire(2));
        assert!(!limiter.try_acquire(1));
        tokio::time::advance(Duration::from_millis(500)).await;
        assert!(limiter.try_acquire(1));
        assert!(!limiter.try_acquire(1));
    }

    #[tokio::test(start_paused = true)]
    async fn test_refill_capped_at_capacity() {
        let limiter = RateLimiter::new("espn", &config(5, 10.0, 1000));
        tokio::time::advance(Duration::from_secs(60)).await;
        assert!((limiter.available() - 5.0).abs() < 1e-9);
    }

    #[tokio::test(start_paused = true)]
    async fn test_acquire_waits_for_refill() {
        let limiter = RateLimiter::new("espn", &config(1, 1.0, 5000));
        let start = Instant::now();
        limiter.acquire(1).await.unwrap();
        limiter.acquire(1).await.unwrap();
        assert!(start.elapsed() >= Duration::from_millis(999));
    }

    #[tokio::test(start_paused = true)]
    async fn test_acquire_times_out() {
        let limiter = RateLimiter::new("espn", &config(1, 0.1, 2000));
        limiter.acquire(1).await.unwrap();
        // Next token is 10s away, timeout is 2s
        let result = limiter.acquire(1).await;
        assert!(matches!(result, Err(SyncError::RateLimitExceeded { cost: 1, .. })));
    }

    #[tokio::test(start_paused = true)]
    async fn test_vanishing_refill_rate_times_out() {
        let limiter = RateLimiter::new("espn", &config(1, 1e-300, 2000));
        limiter.acquire(1).await.unwrap();
        // Wait for the next token does not fit in a Duration
        let result = limiter.acquire(1).await;
        assert!(matches!(result, Err(SyncError::RateLimitExceeded { cost: 1, .. })));
        assert_eq!(limiter.granted(), 1);
    }

    #[tokio::test]
    async fn test_zero_capacity_fails_fast() {
        let limiter = RateLimiter::new("espn", &config(0, 1.0, 60_000));
        let result = limiter.acquire(1).await;
        assert!(matches!(result, Err(SyncError::Configuration(_))));
        assert!(!limiter.try_acquire(1));
    }

    #[tokio::test]
    async fn test_cost_above_capacity_fails_fast() {
        let limiter = RateLimiter::new("espn", &config(2, 1.0, 60_000));
        assert!(matches!(limiter.acquire(3).await, Err(SyncError::Configuration(_))));
    }

    #[tokio::test(start_paused = true)]
    async fn test_never_grants_more_than_capacity_plus_refill() {
        let mut rng = rand::rngs::StdRng::seed_from_u64(7);

        for round in 0..5 {
            let capacity = rng.gen_range(1..=8);
            let rate = rng.gen_range(1..=10) as f64;
            let limiter = Arc::new(RateLimiter::new(
                "prop",
                &config(capacity, rate, 30_000),
            ));
            let start = Instant::now();
            let grants = Arc::new(Mutex::new(Vec::new()));

            let mut handles = Vec::new();
            for _ in 0..40 {
                let cost = rng.gen_range(1..=capacity);
                let delay = Duration::from_millis(rng.gen_range(0..2000));
                let limiter = limiter.clone();
                let grants = grants.clone();
                handles.push(tokio::spawn(async move {
                    tokio::time::sleep(delay).await;
                    if limiter.acquire(cost).await.is_ok() {
                        grants.lock().push((Instant::now(), cost));
                    }
                }));
            }
            for h in handles {
                h.await.unwrap();
            }

            let mut grants = grants.lock().clone();
            grants.sort_by_key(|(t, _)| *t);
            let mut cumulative = 0u64;
            for (at, cost) in grants {
                cumulative += cost as u64;
                let elapsed = at.duration_since(start).as_secs_f64();
                let bound = capacity as f64 + elapsed * rate + 1e-6;
                assert!(
                    cumulative as f64 <= bound,
                    "round {}: granted {} > bound {:.3}",
                    round,
                    cumulative,
                    bound
                );
            }
        }
    }
}
