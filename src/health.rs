//! Background health checking
//!
//! Periodically probes every stored proxy and flips its enabled flag when
//! its health changes. The sweep runs concurrently with selection and never
//! touches the rotation state.

use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use futures::StreamExt;
use tokio::sync::watch;
use tokio::time::{interval_at, Instant};
use tracing::{debug, error, info, warn};

use crate::config::SecurityOptions;
use crate::models::Proxy;
use crate::repository::ProxyRepository;
use crate::validation::{Validator, ValidatorConfig};

/// Aggregate outcome of one health sweep
#[derive(Debug, Clone, Copy, Default)]
pub struct HealthReport {
    pub checked: usize,
    pub healthy: usize,
    pub unhealthy: usize,
    /// Proxies whose status change could not be persisted
    pub update_errors: usize,
}

/// Callback invoked with the aggregate report at each tick boundary
pub type HealthReporter = Arc<dyn Fn(HealthReport) + Send + Sync>;

/// Health check configuration
#[derive(Clone)]
pub struct HealthCheckOptions {
    /// Interval between sweeps; the first sweep runs one interval after start
    pub interval: Duration,
    /// Timeout for each probe
    pub timeout: Duration,
    /// URL probed through each proxy
    pub health_url: String,
    /// Consecutive failed sweeps before a proxy is disabled
    pub max_failures: u32,
    /// Concurrent probes per sweep
    pub parallel: usize,
    /// Receives the aggregate report after each sweep
    pub reporter: Option<HealthReporter>,
}

impl Default for HealthCheckOptions {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(600),
            timeout: Duration::from_secs(5),
            health_url: "https://api.ipify.org?format=json".to_string(),
            max_failures: 3,
            parallel: 10,
            reporter: None,
        }
    }
}

/// Handle controlling a running health checker
pub struct HealthCheckHandle {
    shutdown_tx: watch::Sender<bool>,
}

impl HealthCheckHandle {
    /// Signal the checker to stop after the current step.
    pub fn stop(&self) {
        let _ = self.shutdown_tx.send(true);
    }
}

impl Drop for HealthCheckHandle {
    fn drop(&mut self) {
        let _ = self.shutdown_tx.send(true);
    }
}

/// Periodic health checker for stored proxies
pub struct HealthChecker {
    repo: Arc<dyn ProxyRepository>,
    options: HealthCheckOptions,
    validator: Validator,
    consecutive_failures: DashMap<String, u32>,
}

impl HealthChecker {
    pub fn new(
        repo: Arc<dyn ProxyRepository>,
        options: HealthCheckOptions,
        security: SecurityOptions,
    ) -> Self {
        let validator = Validator::new(ValidatorConfig {
            timeout: options.timeout,
            retry_count: 0,
            test_url: options.health_url.clone(),
            // The probe timeout is the only latency bound for sweeps.
            max_latency: options.timeout,
            security,
        });

        Self {
            repo,
            options,
            validator,
            consecutive_failures: DashMap::new(),
        }
    }

    /// Spawn the checker as a background task and return its stop handle.
    pub fn spawn(
        repo: Arc<dyn ProxyRepository>,
        options: HealthCheckOptions,
        security: SecurityOptions,
    ) -> HealthCheckHandle {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let checker = HealthChecker::new(repo, options, security);

        tokio::spawn(async move {
            checker.run(shutdown_rx).await;
        });

        HealthCheckHandle { shutdown_tx }
    }

    /// Run the periodic sweep loop (call in a spawned task).
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        info!(
            interval_secs = self.options.interval.as_secs(),
            parallel = self.options.parallel,
            "starting health checker"
        );

        let mut ticker = interval_at(
            Instant::now() + self.options.interval,
            self.options.interval,
        );

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    // A shutdown signal also aborts a sweep in flight.
                    tokio::select! {
                        report = self.sweep() => {
                            info!(
                                checked = report.checked,
                                healthy = report.healthy,
                                unhealthy = report.unhealthy,
                                update_errors = report.update_errors,
                                "health sweep complete"
                            );
                            if let Some(reporter) = &self.options.reporter {
                                reporter(report);
                            }
                        }
                        _ = shutdown.changed() => {
                            if *shutdown.borrow() {
                                info!("health checker shutting down mid-sweep");
                                break;
                            }
                        }
                    }
                }
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        info!("health checker shutting down");
                        break;
                    }
                }
            }
        }
    }

    /// Probe every stored proxy once and persist changed enabled flags.
    pub async fn sweep(&self) -> HealthReport {
        let proxies = match self.repo.list().await {
            Ok(proxies) => proxies,
            Err(err) => {
                error!("health sweep could not list proxies: {err}");
                return HealthReport::default();
            }
        };

        let checked = proxies.len();
        let outcomes = futures::stream::iter(proxies)
            .map(|proxy| self.check_one(proxy))
            .buffer_unordered(self.options.parallel.max(1))
            .collect::<Vec<(bool, bool)>>()
            .await;

        let mut report = HealthReport {
            checked,
            ..HealthReport::default()
        };
        for (healthy, update_failed) in outcomes {
            if healthy {
                report.healthy += 1;
            } else {
                report.unhealthy += 1;
            }
            if update_failed {
                report.update_errors += 1;
            }
        }
        report
    }

    /// Probe one proxy; returns (healthy, update_failed).
    async fn check_one(&self, mut proxy: Proxy) -> (bool, bool) {
        let outcome = self
            .validator
            .validate_with_target(&proxy, &self.options.health_url)
            .await;

        let desired_enabled = if outcome.ok {
            self.consecutive_failures.remove(&proxy.id);
            true
        } else {
            let mut failures = self.consecutive_failures.entry(proxy.id.clone()).or_insert(0);
            *failures += 1;
            debug!(
                proxy_id = %proxy.id,
                failures = *failures,
                "health probe failed"
            );
            // Stay enabled until the failure budget is spent.
            *failures < self.options.max_failures.max(1) && proxy.enabled
        };

        if proxy.enabled == desired_enabled {
            return (outcome.ok, false);
        }

        proxy.enabled = desired_enabled;
        if outcome.ok {
            proxy.latency_ms = outcome.latency.as_millis() as i64;
        }
        proxy.updated_at = chrono::Utc::now();

        match self.repo.update(&proxy).await {
            Ok(()) => (outcome.ok, false),
            Err(err) => {
                warn!(proxy_id = %proxy.id, "failed to persist health status: {err}");
                (outcome.ok, true)
            }
        }
    }
}
