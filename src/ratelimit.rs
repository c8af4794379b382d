//! Per-proxy rate limiting
//!
//! Each proxy gets its own token bucket, created on first reference with
//! the pool defaults; individual proxies can be overridden.

use std::num::NonZeroU32;
use std::sync::Arc;

use dashmap::DashMap;
use governor::clock::DefaultClock;
use governor::state::{InMemoryState, NotKeyed};
use governor::{Quota, RateLimiter};

use crate::config::RateLimitOptions;
use crate::error::{LashesError, Result};

type DirectLimiter = RateLimiter<NotKeyed, InMemoryState, DefaultClock>;

/// Rate limiters keyed by proxy id
pub struct ProxyRateLimiter {
    limiters: DashMap<String, Arc<DirectLimiter>>,
    default_quota: Quota,
}

fn quota_for(options: RateLimitOptions) -> Result<Quota> {
    let per_second = NonZeroU32::new(options.requests_per_second).ok_or_else(|| {
        LashesError::InvalidConfig("rate limit requests_per_second must be positive".into())
    })?;
    let burst = NonZeroU32::new(options.burst.max(1)).ok_or_else(|| {
        LashesError::InvalidConfig("rate limit burst must be positive".into())
    })?;
    Ok(Quota::per_second(per_second).allow_burst(burst))
}

impl ProxyRateLimiter {
    pub fn new(options: RateLimitOptions) -> Result<Self> {
        Ok(Self {
            limiters: DashMap::new(),
            default_quota: quota_for(options)?,
        })
    }

    fn limiter_for(&self, proxy_id: &str) -> Arc<DirectLimiter> {
        self.limiters
            .entry(proxy_id.to_string())
            .or_insert_with(|| Arc::new(RateLimiter::direct(self.default_quota)))
            .clone()
    }

    /// Whether a request for this proxy may happen now; consumes a token
    /// when it may.
    pub fn check(&self, proxy_id: &str) -> bool {
        self.limiter_for(proxy_id).check().is_ok()
    }

    /// Wait until the proxy's limiter releases a token.
    pub async fn acquire(&self, proxy_id: &str) {
        self.limiter_for(proxy_id).until_ready().await;
    }

    /// Replace the limiter for one proxy with a custom quota.
    pub fn set_proxy_limit(&self, proxy_id: &str, options: RateLimitOptions) -> Result<()> {
        let quota = quota_for(options)?;
        self.limiters
            .insert(proxy_id.to_string(), Arc::new(RateLimiter::direct(quota)));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_rejects_zero_rate() {
        let result = ProxyRateLimiter::new(RateLimitOptions {
            requests_per_second: 0,
            burst: 1,
        });
        assert!(matches!(result, Err(LashesError::InvalidConfig(_))));
    }

    #[test]
    fn test_burst_then_denied() {
        let limiter = ProxyRateLimiter::new(RateLimitOptions {
            requests_per_second: 1,
            burst: 2,
        })
        .unwrap();

        assert!(limiter.check("p1"));
        assert!(limiter.check("p1"));
        assert!(!limiter.check("p1"));

        // Limits are per proxy.
        assert!(limiter.check("p2"));
    }

    #[test]
    fn test_per_proxy_override() {
        let limiter = ProxyRateLimiter::new(RateLimitOptions {
            requests_per_second: 1,
            burst: 1,
        })
        .unwrap();

        limiter
            .set_proxy_limit(
                "p1",
                RateLimitOptions {
                    requests_per_second: 100,
                    burst: 5,
                },
            )
            .unwrap();

        for _ in 0..5 {
            assert!(limiter.check("p1"));
        }
        assert!(!limiter.check("p1"));
    }

    #[tokio::test]
    async fn test_tokens_refill_over_time() {
        let limiter = ProxyRateLimiter::new(RateLimitOptions {
            requests_per_second: 100,
            burst: 1,
        })
        .unwrap();

        assert!(limiter.check("p1"));
        assert!(!limiter.check("p1"));

        // One token refills every 10ms at 100 rps.
        tokio::time::sleep(Duration::from_millis(25)).await;
        assert!(limiter.check("p1"));
    }

    #[tokio::test]
    async fn test_acquire_waits_for_token() {
        let limiter = ProxyRateLimiter::new(RateLimitOptions {
            requests_per_second: 100,
            burst: 1,
        })
        .unwrap();

        assert!(limiter.check("p1"));
        let started = std::time::Instant::now();
        limiter.acquire("p1").await;
        assert!(started.elapsed() >= Duration::from_millis(5));
    }
}
