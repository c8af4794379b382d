//! Circuit breakers for proxy resilience
//!
//! One three-state breaker per proxy, created lazily on first reference,
//! plus an optional pool-wide breaker with a higher failure threshold.

use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::DashMap;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Circuit breaker states
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BreakerState {
    /// Normal operation; requests flow
    Closed,
    /// Requests are blocked until the reset timeout elapses
    Open,
    /// Trial state; a bounded number of requests may pass
    HalfOpen,
}

/// Circuit breaker configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CircuitBreakerConfig {
    /// Failures tolerated before the circuit opens
    pub max_failures: u32,
    /// Time to wait in Open before allowing a trial request
    #[serde(with = "humantime_serde")]
    pub reset_timeout: Duration,
    /// Requests allowed while HalfOpen
    pub max_half_open_permits: u32,
    /// Also run a breaker over the whole pool
    pub enable_global_breaker: bool,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            max_failures: 5,
            reset_timeout: Duration::from_secs(30),
            max_half_open_permits: 1,
            enable_global_breaker: true,
        }
    }
}

#[derive(Debug)]
struct BreakerInner {
    state: BreakerState,
    failures: u32,
    last_transition: Instant,
    half_open_permits: u32,
}

/// A single three-state circuit breaker
///
/// All transitions happen under one mutex, so concurrent `allow` callers
/// observe a consistent state and exactly one of them performs the
/// Open → HalfOpen transition.
pub struct CircuitBreaker {
    max_failures: u32,
    reset_timeout: Duration,
    max_half_open_permits: u32,
    inner: Mutex<BreakerInner>,
}

impl CircuitBreaker {
    pub fn new(max_failures: u32, reset_timeout: Duration, max_half_open_permits: u32) -> Self {
        Self {
            max_failures,
            reset_timeout,
            max_half_open_permits,
            inner: Mutex::new(BreakerInner {
                state: BreakerState::Closed,
                failures: 0,
                last_transition: Instant::now(),
                half_open_permits: 0,
            }),
        }
    }

    /// Whether a request should be permitted right now.
    ///
    /// In Open, the first caller past the reset deadline flips the breaker
    /// to HalfOpen and takes the first trial permit; in HalfOpen each `true`
    /// consumes one permit.
    pub fn allow(&self) -> bool {
        let mut inner = self.inner.lock();

        match inner.state {
            BreakerState::Closed => true,
            BreakerState::Open => {
                if inner.last_transition.elapsed() >= self.reset_timeout {
                    inner.state = BreakerState::HalfOpen;
                    inner.last_transition = Instant::now();
                    inner.half_open_permits = 1;
                    true
                } else {
                    false
                }
            }
            BreakerState::HalfOpen => {
                if inner.half_open_permits < self.max_half_open_permits {
                    inner.half_open_permits += 1;
                    true
                } else {
                    false
                }
            }
        }
    }

    /// Record a successful request.
    pub fn record_success(&self) {
        let mut inner = self.inner.lock();

        match inner.state {
            BreakerState::Closed => {
                inner.failures = 0;
            }
            BreakerState::HalfOpen => {
                inner.state = BreakerState::Closed;
                inner.failures = 0;
                inner.half_open_permits = 0;
                inner.last_transition = Instant::now();
            }
            BreakerState::Open => {}
        }
    }

    /// Record a failed request.
    pub fn record_failure(&self) {
        let mut inner = self.inner.lock();

        match inner.state {
            BreakerState::Closed => {
                inner.failures += 1;
                if inner.failures >= self.max_failures {
                    inner.state = BreakerState::Open;
                    inner.last_transition = Instant::now();
                }
            }
            BreakerState::HalfOpen => {
                // A trial failure reopens immediately with the counter pinned.
                inner.state = BreakerState::Open;
                inner.failures = self.max_failures;
                inner.half_open_permits = 0;
                inner.last_transition = Instant::now();
            }
            BreakerState::Open => {}
        }
    }

    pub fn state(&self) -> BreakerState {
        self.inner.lock().state
    }
}

/// Manages circuit breakers keyed by proxy id
pub struct CircuitBreakerManager {
    breakers: DashMap<String, Arc<CircuitBreaker>>,
    global: Option<CircuitBreaker>,
    config: CircuitBreakerConfig,
}

impl CircuitBreakerManager {
    pub fn new(config: CircuitBreakerConfig) -> Self {
        let global = config.enable_global_breaker.then(|| {
            CircuitBreaker::new(
                // Higher threshold: the pool as a whole should trip only
                // when failures are widespread.
                config.max_failures * 3,
                config.reset_timeout,
                config.max_half_open_permits,
            )
        });

        Self {
            breakers: DashMap::new(),
            global,
            config,
        }
    }

    fn breaker_for(&self, proxy_id: &str) -> Arc<CircuitBreaker> {
        self.breakers
            .entry(proxy_id.to_string())
            .or_insert_with(|| {
                debug!(proxy_id, "creating circuit breaker");
                Arc::new(CircuitBreaker::new(
                    self.config.max_failures,
                    self.config.reset_timeout,
                    self.config.max_half_open_permits,
                ))
            })
            .clone()
    }

    /// Whether the pool-wide breaker permits a request. Always true when the
    /// global breaker is disabled.
    pub fn global_allows(&self) -> bool {
        self.global.as_ref().map_or(true, |g| g.allow())
    }

    /// Whether this proxy's own breaker permits a request.
    pub fn allow_proxy(&self, proxy_id: &str) -> bool {
        self.breaker_for(proxy_id).allow()
    }

    /// Whether a request through this proxy should be permitted; requires
    /// both the global breaker (when enabled) and the per-proxy breaker.
    pub fn allow(&self, proxy_id: &str) -> bool {
        self.global_allows() && self.allow_proxy(proxy_id)
    }

    /// Record a successful request for a proxy.
    pub fn record_success(&self, proxy_id: &str) {
        if let Some(global) = &self.global {
            global.record_success();
        }
        self.breaker_for(proxy_id).record_success();
    }

    /// Record a failed request for a proxy.
    pub fn record_failure(&self, proxy_id: &str) {
        if let Some(global) = &self.global {
            global.record_failure();
        }
        self.breaker_for(proxy_id).record_failure();
    }

    pub fn proxy_state(&self, proxy_id: &str) -> BreakerState {
        self.breaker_for(proxy_id).state()
    }

    pub fn global_state(&self) -> Option<BreakerState> {
        self.global.as_ref().map(|g| g.state())
    }
}
