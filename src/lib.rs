//! Lashes - Proxy Rotation Runtime
//!
//! A library for rotating outbound requests through a pool of forward
//! proxies (HTTP, SOCKS4, SOCKS5).
//!
//! ## Features
//!
//! - Multiple rotation strategies (round-robin, random, weighted, least-used)
//! - Per-proxy and pool-wide circuit breaking with timed recovery
//! - Per-proxy request metrics with an optional TTL-cached read path
//! - Proxy validation and periodic background health checking
//! - Proxy-bound HTTP client construction with TLS policy and randomized
//!   browser user-agents
//! - In-memory storage by default; SQL storage (sqlite, mysql, postgres)
//!   through one `proxies` table
//!
//! ## Example
//!
//! ```no_run
//! use lashes::{Options, ProxyKind, ProxyRotator};
//!
//! # async fn run() -> lashes::Result<()> {
//! let rotator = ProxyRotator::new(Options::default()).await?;
//! rotator.add_proxy("http://proxy.example:8080", ProxyKind::Http).await?;
//!
//! let proxy = rotator.get_proxy().await?;
//! let client = rotator.client().await?;
//! let response = client.get("https://api.ipify.org?format=json").await?;
//! rotator
//!     .record_result(&proxy.id, std::time::Duration::from_millis(120), response.status().is_success())
//!     .await?;
//! # Ok(())
//! # }
//! ```

pub mod agent;
pub mod breaker;
pub mod client;
pub mod config;
pub mod error;
pub mod health;
pub mod metrics;
pub mod models;
pub mod ratelimit;
pub mod repository;
pub mod rotation;
pub mod rotator;
pub mod validation;

pub use breaker::{BreakerState, CircuitBreaker, CircuitBreakerConfig, CircuitBreakerManager};
pub use client::{ClientOptions, ProxyClient};
pub use config::{
    Config, Options, RateLimitOptions, SecurityOptions, StorageOptions, StorageType, TlsMinVersion,
};
pub use error::{LashesError, Result};
pub use health::{HealthCheckHandle, HealthCheckOptions, HealthReport};
pub use metrics::{MetricsCollector, ProxyMetricsView};
pub use models::{Proxy, ProxyKind};
pub use ratelimit::ProxyRateLimiter;
pub use repository::{MemoryRepository, ProxyRepository, SqlRepository};
pub use rotation::{Strategy, StrategyType};
pub use rotator::{parse_proxies_from_text, ProxyRotator, ValidationSummary};
pub use validation::{ProbeResult, ValidationError, ValidationErrorKind, Validator};
