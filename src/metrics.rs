//! Per-proxy request metrics
//!
//! Counters and latency aggregates accumulate in memory keyed by proxy id;
//! derived views are computed on read. A caching wrapper bounds read cost
//! for hot dashboards at the price of bounded staleness.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};
use serde::Serialize;

use crate::error::{LashesError, Result};
use crate::models::ProxyKind;
use crate::repository::ProxyRepository;

/// Derived metrics view for a single proxy
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProxyMetricsView {
    pub proxy_id: String,
    pub url: String,
    #[serde(rename = "type")]
    pub kind: ProxyKind,
    pub success_rate: f64,
    pub total_calls: i64,
    pub error_count: i64,
    pub avg_latency: Duration,
    pub min_latency: Duration,
    pub max_latency: Duration,
    pub last_used: DateTime<Utc>,
    pub enabled: bool,
}

/// Collects and serves per-proxy metrics
#[async_trait]
pub trait MetricsCollector: Send + Sync {
    /// Record one request outcome for a proxy.
    async fn record_request(&self, proxy_id: &str, latency: Duration, success: bool)
        -> Result<()>;

    /// Derived metrics for one proxy. Fails with `ProxyNotFound` when no
    /// request has been recorded for the id.
    async fn proxy_metrics(&self, proxy_id: &str) -> Result<ProxyMetricsView>;

    /// Derived metrics for every proxy in the repository that has recorded
    /// requests; proxies without entries are skipped.
    async fn all_metrics(&self) -> Result<Vec<ProxyMetricsView>>;
}

#[derive(Debug, Clone)]
struct MetricEntry {
    total_calls: i64,
    total_errors: i64,
    sum_latency: Duration,
    min_latency: Duration,
    max_latency: Duration,
    last_used: DateTime<Utc>,
}

impl MetricEntry {
    fn new(latency: Duration) -> Self {
        Self {
            total_calls: 0,
            total_errors: 0,
            sum_latency: Duration::ZERO,
            min_latency: latency,
            max_latency: latency,
            last_used: Utc::now(),
        }
    }

    fn record(&mut self, latency: Duration, success: bool) {
        self.total_calls += 1;
        if !success {
            self.total_errors += 1;
        }
        self.last_used = Utc::now();
        self.sum_latency += latency;
        self.min_latency = self.min_latency.min(latency);
        self.max_latency = self.max_latency.max(latency);
    }
}

/// In-memory metrics collector
///
/// Entries are created on the first recorded request for a proxy id and
/// live for the process lifetime.
pub struct InMemoryMetricsCollector {
    repo: Arc<dyn ProxyRepository>,
    entries: RwLock<HashMap<String, MetricEntry>>,
}

impl InMemoryMetricsCollector {
    pub fn new(repo: Arc<dyn ProxyRepository>) -> Self {
        Self {
            repo,
            entries: RwLock::new(HashMap::new()),
        }
    }
}

#[async_trait]
impl MetricsCollector for InMemoryMetricsCollector {
    async fn record_request(
        &self,
        proxy_id: &str,
        latency: Duration,
        success: bool,
    ) -> Result<()> {
        let mut entries = self.entries.write();
        entries
            .entry(proxy_id.to_string())
            .or_insert_with(|| MetricEntry::new(latency))
            .record(latency, success);
        Ok(())
    }

    async fn proxy_metrics(&self, proxy_id: &str) -> Result<ProxyMetricsView> {
        let entry = self
            .entries
            .read()
            .get(proxy_id)
            .cloned()
            .ok_or_else(|| LashesError::ProxyNotFound(proxy_id.to_string()))?;

        let proxy = self.repo.get_by_id(proxy_id).await?;

        let (success_rate, avg_latency) = if entry.total_calls > 0 {
            (
                (entry.total_calls - entry.total_errors) as f64 / entry.total_calls as f64,
                entry.sum_latency / entry.total_calls as u32,
            )
        } else {
            (0.0, Duration::ZERO)
        };

        Ok(ProxyMetricsView {
            proxy_id: proxy_id.to_string(),
            url: proxy.url,
            kind: proxy.kind,
            success_rate,
            total_calls: entry.total_calls,
            error_count: entry.total_errors,
            avg_latency,
            min_latency: entry.min_latency,
            max_latency: entry.max_latency,
            last_used: entry.last_used,
            enabled: proxy.enabled,
        })
    }

    async fn all_metrics(&self) -> Result<Vec<ProxyMetricsView>> {
        let proxies = self.repo.list().await?;

        let mut views = Vec::with_capacity(proxies.len());
        for proxy in proxies {
            match self.proxy_metrics(&proxy.id).await {
                Ok(view) => views.push(view),
                // No entry yet; nothing to report for this proxy.
                Err(LashesError::ProxyNotFound(_)) => continue,
                Err(err) => return Err(err),
            }
        }
        Ok(views)
    }
}

struct CacheState {
    views: HashMap<String, ProxyMetricsView>,
    last_update: Option<Instant>,
}

/// TTL-caching wrapper around the in-memory collector
///
/// One wall-clock stamp covers the whole cache; recording a request
/// invalidates the affected id only. The cache's lock is independent of the
/// primary store's.
pub struct CachedMetricsCollector {
    inner: InMemoryMetricsCollector,
    expiration: Duration,
    cache: Mutex<CacheState>,
}

impl CachedMetricsCollector {
    pub fn new(repo: Arc<dyn ProxyRepository>, expiration: Duration) -> Self {
        Self {
            inner: InMemoryMetricsCollector::new(repo),
            expiration,
            cache: Mutex::new(CacheState {
                views: HashMap::new(),
                last_update: None,
            }),
        }
    }

    fn cache_fresh(&self, state: &CacheState) -> bool {
        state
            .last_update
            .is_some_and(|stamp| stamp.elapsed() < self.expiration)
    }
}

#[async_trait]
impl MetricsCollector for CachedMetricsCollector {
    async fn record_request(
        &self,
        proxy_id: &str,
        latency: Duration,
        success: bool,
    ) -> Result<()> {
        self.inner.record_request(proxy_id, latency, success).await?;
        self.cache.lock().views.remove(proxy_id);
        Ok(())
    }

    async fn proxy_metrics(&self, proxy_id: &str) -> Result<ProxyMetricsView> {
        {
            let state = self.cache.lock();
            if self.cache_fresh(&state) {
                if let Some(view) = state.views.get(proxy_id) {
                    return Ok(view.clone());
                }
            }
        }

        let view = self.inner.proxy_metrics(proxy_id).await?;

        let mut state = self.cache.lock();
        state.views.insert(proxy_id.to_string(), view.clone());
        state.last_update = Some(Instant::now());
        Ok(view)
    }

    async fn all_metrics(&self) -> Result<Vec<ProxyMetricsView>> {
        {
            let state = self.cache.lock();
            if self.cache_fresh(&state) && !state.views.is_empty() {
                return Ok(state.views.values().cloned().collect());
            }
        }

        let views = self.inner.all_metrics().await?;

        let mut state = self.cache.lock();
        state.views = views
            .iter()
            .map(|view| (view.proxy_id.clone(), view.clone()))
            .collect();
        state.last_update = Some(Instant::now());
        Ok(views)
    }
}
