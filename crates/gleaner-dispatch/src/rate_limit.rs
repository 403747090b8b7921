//! Per-provider token buckets
//!
//! One limiter is shared by every concurrent dispatch in a run, so the call
//! budget applies to the provider as a whole rather than to each item.

use crate::config::DispatchConfig;
use gleaner_domain::ProviderId;
use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};
use tokio::time::{Duration, Instant};

#[derive(Debug)]
struct Bucket {
    tokens: f64,
    refilled_at: Instant,
}

/// Token-bucket rate limiter keyed by provider
#[derive(Debug)]
pub struct RateLimiter {
    capacity: f64,
    per_second: f64,
    buckets: Mutex<HashMap<ProviderId, Bucket>>,
}

impl RateLimiter {
    /// Allow `per_minute` calls per provider with bursts of up to `burst`
    pub fn new(per_minute: u32, burst: u32) -> Self {
        Self {
            capacity: f64::from(burst.max(1)),
            per_second: f64::from(per_minute.max(1)) / 60.0,
            buckets: Mutex::new(HashMap::new()),
        }
    }

    /// Build a limiter when the configuration asks for one
    pub fn from_config(config: &DispatchConfig) -> Option<Self> {
        config
            .rate_limit_per_minute
            .map(|per_minute| Self::new(per_minute, config.rate_limit_burst))
    }

    /// Take a token without waiting
    ///
    /// Returns the time until the next token is available when the bucket
    /// is empty.
    pub fn try_acquire(&self, provider: &ProviderId) -> Result<(), Duration> {
        let now = Instant::now();
        let mut buckets = self.buckets.lock().unwrap_or_else(PoisonError::into_inner);
        let bucket = buckets.entry(provider.clone()).or_insert(Bucket {
            tokens: self.capacity,
            refilled_at: now,
        });

        let elapsed = now.saturating_duration_since(bucket.refilled_at).as_secs_f64();
        bucket.tokens = (bucket.tokens + elapsed * self.per_second).min(self.capacity);
        bucket.refilled_at = now;

        if bucket.tokens >= 1.0 {
            bucket.tokens -= 1.0;
            Ok(())
        } else {
            let missing = 1.0 - bucket.tokens;
            Err(Duration::from_secs_f64(missing / self.per_second))
        }
    }

    /// Wait until a token for `provider` is available and take it
    ///
    /// Returns how long the caller waited.
    pub async fn acquire(&self, provider: &ProviderId) -> Duration {
        let start = Instant::now();
        while let Err(wait) = self.try_acquire(provider) {
            tracing::debug!(provider = %provider, wait_ms = wait.as_millis() as u64, "rate limit wait");
            tokio::time::sleep(wait).await;
        }
        start.elapsed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_burst_then_refill() {
        let limiter = RateLimiter::new(60, 2);
        let a = ProviderId::new("a");

        assert!(limiter.try_acquire(&a).is_ok());
        assert!(limiter.try_acquire(&a).is_ok());
        let wait = limiter.try_acquire(&a).unwrap_err();
        assert!(wait <= Duration::from_secs(1));

        tokio::time::advance(Duration::from_secs(1)).await;
        assert!(limiter.try_acquire(&a).is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn test_buckets_are_per_provider() {
        let limiter = RateLimiter::new(1, 1);
        assert!(limiter.try_acquire(&ProviderId::new("a")).is_ok());
        assert!(limiter.try_acquire(&ProviderId::new("b")).is_ok());
        assert!(limiter.try_acquire(&ProviderId::new("a")).is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_acquire_waits_on_virtual_time() {
        let limiter = RateLimiter::new(30, 1);
        let a = ProviderId::new("a");
        assert_eq!(limiter.acquire(&a).await, Duration::ZERO);

        let waited = limiter.acquire(&a).await;
        assert!(waited >= Duration::from_secs(2));
    }

    #[test]
    fn test_from_config() {
        assert!(RateLimiter::from_config(&DispatchConfig::default()).is_none());
        assert!(RateLimiter::from_config(&DispatchConfig::lenient()).is_some());
    }
}
