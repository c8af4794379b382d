//! Proxy validation
//!
//! A probe is a GET against the configured test URL issued through a
//! candidate proxy. Latency is measured from submission to response
//! headers; redirects are never followed and certificates are always
//! verified.

use std::time::{Duration, Instant};

use thiserror::Error;
use tracing::debug;

use crate::client::{self, ClientOptions};
use crate::config::SecurityOptions;
use crate::models::Proxy;

/// The way a probe failed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValidationErrorKind {
    /// The proxy locator did not parse or carries an unsupported scheme
    InvalidUrl,
    /// The proxy could not be reached or refused the tunnel
    DialFailed,
    /// The probe ran out of time
    Timeout,
    /// The target answered outside the 2xx window
    BadStatus,
    /// The target answered, but slower than the configured ceiling
    Slow,
}

impl ValidationErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::InvalidUrl => "invalid_url",
            Self::DialFailed => "dial_failed",
            Self::Timeout => "timeout",
            Self::BadStatus => "bad_status",
            Self::Slow => "slow",
        }
    }
}

/// A failed validation probe
#[derive(Debug, Clone, Error)]
#[error("proxy {proxy_id} ({proxy_url}) failed validation: {reason}")]
pub struct ValidationError {
    pub proxy_id: String,
    pub proxy_url: String,
    pub kind: ValidationErrorKind,
    pub reason: String,
    /// HTTP status, when the probe got far enough to see one
    pub status: Option<u16>,
}

/// The outcome of one validation probe
#[derive(Debug, Clone)]
pub struct ProbeResult {
    pub ok: bool,
    pub latency: Duration,
    pub error: Option<ValidationError>,
}

impl ProbeResult {
    fn pass(latency: Duration) -> Self {
        Self {
            ok: true,
            latency,
            error: None,
        }
    }

    fn fail(latency: Duration, error: ValidationError) -> Self {
        Self {
            ok: false,
            latency,
            error: Some(error),
        }
    }
}

/// Validator configuration
#[derive(Debug, Clone)]
pub struct ValidatorConfig {
    /// Timeout for the whole probe
    pub timeout: Duration,
    /// Retry attempts for transport failures
    pub retry_count: u32,
    /// Default probe target
    pub test_url: String,
    /// Latency above which a reachable proxy still fails
    pub max_latency: Duration,
    pub security: SecurityOptions,
}

impl Default for ValidatorConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(10),
            retry_count: 0,
            test_url: "https://api.ipify.org?format=json".to_string(),
            max_latency: Duration::from_secs(5),
            security: SecurityOptions::default(),
        }
    }
}

/// Issues validation probes through candidate proxies
pub struct Validator {
    config: ValidatorConfig,
}

impl Validator {
    pub fn new(config: ValidatorConfig) -> Self {
        Self { config }
    }

    /// Probe the proxy against the configured test URL.
    pub async fn validate(&self, proxy: &Proxy) -> ProbeResult {
        self.validate_with_target(proxy, &self.config.test_url).await
    }

    /// Probe the proxy against a specific target URL.
    pub async fn validate_with_target(&self, proxy: &Proxy, target_url: &str) -> ProbeResult {
        // Probes always verify certificates, whatever the pool's clients do.
        let security = SecurityOptions {
            verify_tls: true,
            allow_insecure: false,
            ..self.config.security.clone()
        };

        let client = match client::build_client(
            proxy,
            &ClientOptions {
                timeout: Some(self.config.timeout),
                max_retries: Some(self.config.retry_count),
                retry_delay: Duration::from_millis(100),
                follow_redirects: false,
                security,
            },
        ) {
            Ok(client) => client,
            Err(err) => {
                return ProbeResult::fail(
                    Duration::ZERO,
                    self.error(proxy, ValidationErrorKind::InvalidUrl, err.to_string(), None),
                );
            }
        };

        let started = Instant::now();
        let response = client.get(target_url).await;
        let latency = started.elapsed();

        let response = match response {
            Ok(response) => response,
            Err(err) => {
                let (kind, reason) = classify_transport_error(&err);
                return ProbeResult::fail(latency, self.error(proxy, kind, reason, None));
            }
        };

        let status = response.status();
        // The body is not read; headers are enough to judge the proxy.
        drop(response);

        if !status.is_success() {
            return ProbeResult::fail(
                latency,
                self.error(
                    proxy,
                    ValidationErrorKind::BadStatus,
                    format!("invalid status code: {status}"),
                    Some(status.as_u16()),
                ),
            );
        }

        if latency > self.config.max_latency {
            return ProbeResult::fail(
                latency,
                self.error(
                    proxy,
                    ValidationErrorKind::Slow,
                    format!(
                        "latency {}ms exceeds ceiling {}ms",
                        latency.as_millis(),
                        self.config.max_latency.as_millis()
                    ),
                    Some(status.as_u16()),
                ),
            );
        }

        debug!(proxy_id = %proxy.id, latency_ms = latency.as_millis() as u64, "probe passed");
        ProbeResult::pass(latency)
    }

    fn error(
        &self,
        proxy: &Proxy,
        kind: ValidationErrorKind,
        reason: String,
        status: Option<u16>,
    ) -> ValidationError {
        ValidationError {
            proxy_id: proxy.id.clone(),
            proxy_url: proxy.url.clone(),
            kind,
            reason,
            status,
        }
    }
}

fn classify_transport_error(err: &crate::error::LashesError) -> (ValidationErrorKind, String) {
    if let crate::error::LashesError::Http(http_err) = err {
        if http_err.is_timeout() {
            return (ValidationErrorKind::Timeout, "probe timed out".to_string());
        }
        if http_err.is_builder() {
            return (ValidationErrorKind::InvalidUrl, http_err.to_string());
        }
    }
    (ValidationErrorKind::DialFailed, err.to_string())
}
