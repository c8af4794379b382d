//! HTTP client factory
//!
//! Builds reqwest clients bound to a proxy endpoint, with the pool's TLS
//! and redirect policy applied and a randomized browser user-agent as the
//! default identity.

use std::time::Duration;

use reqwest::redirect::Policy;
use tracing::debug;

use crate::agent;
use crate::config::{SecurityOptions, TlsMinVersion};
use crate::error::{LashesError, Result};
use crate::models::Proxy;

/// Options for building a proxy-bound client
#[derive(Debug, Clone, Default)]
pub struct ClientOptions {
    /// Request timeout; falls back to the proxy's own limit when unset
    pub timeout: Option<Duration>,
    /// Retry attempts for transport failures; falls back to the proxy's limit
    pub max_retries: Option<u32>,
    /// Delay between retry attempts
    pub retry_delay: Duration,
    /// Follow redirects
    pub follow_redirects: bool,
    /// TLS behavior
    pub security: SecurityOptions,
}

/// An HTTP client bound to one proxy endpoint
///
/// Wraps a configured `reqwest::Client`, retrying transport-level failures
/// up to the configured count. Responses are dropped on every exit path by
/// construction.
pub struct ProxyClient {
    proxy_id: String,
    inner: reqwest::Client,
    max_retries: u32,
    retry_delay: Duration,
}

impl ProxyClient {
    /// The id of the proxy this client routes through.
    pub fn proxy_id(&self) -> &str {
        &self.proxy_id
    }

    /// The underlying reqwest client for requests that manage their own
    /// retry behavior.
    pub fn inner(&self) -> &reqwest::Client {
        &self.inner
    }

    /// Issue a GET, retrying transport errors.
    pub async fn get(&self, url: &str) -> Result<reqwest::Response> {
        let mut attempt = 0;
        loop {
            match self.inner.get(url).send().await {
                Ok(response) => return Ok(response),
                Err(err) => {
                    if attempt >= self.max_retries {
                        return Err(err.into());
                    }
                    debug!(
                        proxy_id = %self.proxy_id,
                        attempt,
                        error = %err,
                        "request attempt failed"
                    );
                    attempt += 1;
                    tokio::time::sleep(self.retry_delay).await;
                }
            }
        }
    }

    /// Execute an arbitrary request, retrying transport errors when the
    /// request body allows cloning.
    pub async fn execute(&self, request: reqwest::Request) -> Result<reqwest::Response> {
        let mut last_err: Option<reqwest::Error> = None;

        for attempt in 0..self.max_retries {
            let replay = match request.try_clone() {
                Some(replay) => replay,
                // Streaming bodies cannot be replayed.
                None => break,
            };

            if attempt > 0 {
                tokio::time::sleep(self.retry_delay).await;
            }

            match self.inner.execute(replay).await {
                Ok(response) => return Ok(response),
                Err(err) => last_err = Some(err),
            }
        }

        if last_err.is_some() {
            tokio::time::sleep(self.retry_delay).await;
        }
        self.inner.execute(request).await.map_err(Into::into)
    }
}

/// Build an HTTP client routed through the given proxy.
pub fn build_client(proxy: &Proxy, options: &ClientOptions) -> Result<ProxyClient> {
    let proxy_url = proxy.parse_url()?;

    let mut outbound = reqwest::Proxy::all(proxy_url.as_str())
        .map_err(|err| LashesError::InvalidProxyUrl(err.to_string()))?;
    if let Some(username) = &proxy.username {
        outbound = outbound.basic_auth(username, proxy.password.as_deref().unwrap_or(""));
    }

    let timeout = options.timeout.unwrap_or(proxy.timeout);
    let max_retries = options.max_retries.unwrap_or(proxy.max_retries);

    let redirect = if options.follow_redirects {
        Policy::limited(10)
    } else {
        Policy::none()
    };

    let min_tls = match options.security.min_tls_version {
        TlsMinVersion::V12 => reqwest::tls::Version::TLS_1_2,
        TlsMinVersion::V13 => reqwest::tls::Version::TLS_1_3,
    };

    let insecure = !options.security.verify_tls || options.security.allow_insecure;

    let inner = reqwest::Client::builder()
        .proxy(outbound)
        .timeout(timeout)
        .redirect(redirect)
        .min_tls_version(min_tls)
        .danger_accept_invalid_certs(insecure)
        .user_agent(agent::random_user_agent())
        .build()?;

    Ok(ProxyClient {
        proxy_id: proxy.id.clone(),
        inner,
        max_retries,
        retry_delay: options.retry_delay,
    })
}
