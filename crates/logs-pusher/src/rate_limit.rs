// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Token bucket shared by every sender publishing to the same account.

use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use tokio::time::Instant;

use crate::config::RateLimitConfig;
use crate::constants::MAX_PERMIT_WAIT;

#[derive(Debug)]
struct Bucket {
    tokens: f64,
    last_refill: Instant,
}

/// Caps the rate of publish calls at `per_second`, allowing bursts of `burst`.
#[derive(Debug)]
pub struct RateLimiter {
    per_second: f64,
    burst: f64,
    bucket: Mutex<Bucket>,
}

impl RateLimiter {
    /// Creates a limiter whose bucket starts full.
    ///
    /// A rate that is not positive never refills the bucket.
    #[must_use]
    pub fn new(per_second: f64, burst: u32) -> Self {
        let burst = f64::from(burst.max(1));
        Self {
            per_second: per_second.max(0.0),
            burst,
            bucket: Mutex::new(Bucket {
                tokens: burst,
                last_refill: Instant::now(),
            }),
        }
    }

    #[must_use]
    pub fn from_config(config: &RateLimitConfig) -> Self {
        Self::new(config.per_second, config.burst)
    }

    /// Takes a permit if one is available right now.
    pub fn allow(&self) -> bool {
        self.reserve().is_none()
    }

    /// Waits until a permit is available and takes it.
    pub async fn acquire(&self) {
        while let Some(wait) = self.reserve() {
            tokio::time::sleep(wait).await;
        }
    }

    /// Takes a permit, or returns how long until one is expected.
    fn reserve(&self) -> Option<Duration> {
        let mut bucket = self.bucket.lock().unwrap_or_else(PoisonError::into_inner);
        let now = Instant::now();
        let elapsed = now.saturating_duration_since(bucket.last_refill);
        bucket.tokens = (bucket.tokens + elapsed.as_secs_f64() * self.per_second).min(self.burst);
        bucket.last_refill = now;

        if bucket.tokens >= 1.0 {
            bucket.tokens -= 1.0;
            None
        } else {
            let missing = 1.0 - bucket.tokens;
            let wait = Duration::try_from_secs_f64(missing / self.per_second)
                .map_or(MAX_PERMIT_WAIT, |wait| wait.min(MAX_PERMIT_WAIT));
            Some(wait.max(Duration::from_millis(1)))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[tokio::test(start_paused = true)]
    async fn test_allow_respects_burst() {
        let limiter = RateLimiter::new(1.0, 2);
        assert!(limiter.allow());
        assert!(limiter.allow());
        assert!(!limiter.allow());

        tokio::time::advance(Duration::from_secs(1)).await;
        assert!(limiter.allow());
        assert!(!limiter.allow());
    }

    #[tokio::test(start_paused = true)]
    async fn test_bucket_never_exceeds_burst() {
        let limiter = RateLimiter::new(10.0, 3);
        tokio::time::advance(Duration::from_secs(60)).await;
        assert!(limiter.allow());
        assert!(limiter.allow());
        assert!(limiter.allow());
        assert!(!limiter.allow());
    }

    #[tokio::test(start_paused = true)]
    async fn test_acquire_waits_for_refill() {
        let limiter = RateLimiter::new(10.0, 1);
        let start = Instant::now();
        limiter.acquire().await;
        assert_eq!(start.elapsed(), Duration::ZERO);

        limiter.acquire().await;
        limiter.acquire().await;
        assert!(start.elapsed() >= Duration::from_millis(200));
    }

    #[tokio::test(start_paused = true)]
    async fn test_shared_limiter_serves_concurrent_waiters() {
        let limiter = Arc::new(RateLimiter::new(5.0, 1));
        let start = Instant::now();
        let mut handles = Vec::new();
        for _ in 0..5 {
            let limiter = Arc::clone(&limiter);
            handles.push(tokio::spawn(async move { limiter.acquire().await }));
        }
        for handle in handles {
            handle.await.unwrap();
        }
        // One permit up front, then four more at 5 per second.
        assert!(start.elapsed() >= Duration::from_millis(800));
    }

    #[tokio::test(start_paused = true)]
    async fn test_zero_rate_waits_without_panicking() {
        let limiter = Arc::new(RateLimiter::new(0.0, 1));
        limiter.acquire().await;
        assert!(!limiter.allow());

        let waiter = Arc::clone(&limiter);
        let task = tokio::spawn(async move { waiter.acquire().await });
        tokio::time::sleep(MAX_PERMIT_WAIT * 3).await;
        assert!(!task.is_finished());
        task.abort();

        let negative = RateLimiter::new(-5.0, 1);
        assert!(negative.allow());
        tokio::time::advance(Duration::from_secs(3600)).await;
        assert!(!negative.allow());
    }
}
