use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::{LashesError, Result};

/// Success rate assumed for proxies that have not served any request yet.
pub const DEFAULT_SUCCESS_RATE: f64 = 0.5;

/// Proxy protocol kind
///
/// Stored independently of the URL scheme so stores can filter on it without
/// re-parsing locators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProxyKind {
    Http,
    Socks4,
    Socks5,
}

impl ProxyKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProxyKind::Http => "http",
            ProxyKind::Socks4 => "socks4",
            ProxyKind::Socks5 => "socks5",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "http" => Some(ProxyKind::Http),
            "socks4" => Some(ProxyKind::Socks4),
            "socks5" => Some(ProxyKind::Socks5),
            _ => None,
        }
    }

    /// Parse the kind from a locator's URL scheme.
    pub fn from_scheme(scheme: &str) -> Option<Self> {
        Self::from_str(scheme)
    }

    pub fn is_socks(&self) -> bool {
        matches!(self, ProxyKind::Socks4 | ProxyKind::Socks5)
    }
}

impl std::fmt::Display for ProxyKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Proxy entity
///
/// The locator is kept as a string and parsed on demand; `kind` mirrors the
/// scheme at admission time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Proxy {
    pub id: String,
    pub url: String,
    #[serde(rename = "type")]
    pub kind: ProxyKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub country_code: Option<String>,
    pub weight: i32,
    pub enabled: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_used: Option<DateTime<Utc>>,
    pub latency_ms: i64,
    pub usage_count: i64,
    pub error_count: i64,
    pub success_rate: f64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub max_retries: u32,
    #[serde(with = "humantime_serde")]
    pub timeout: Duration,
}

impl Proxy {
    /// Create a new proxy record with admission defaults.
    pub fn new(id: String, url: String, kind: ProxyKind) -> Self {
        let now = Utc::now();
        Self {
            id,
            url,
            kind,
            username: None,
            password: None,
            country_code: None,
            weight: 1,
            enabled: true,
            last_used: None,
            latency_ms: 0,
            usage_count: 0,
            error_count: 0,
            success_rate: DEFAULT_SUCCESS_RATE,
            created_at: now,
            updated_at: now,
            max_retries: 3,
            timeout: Duration::from_secs(30),
        }
    }

    /// Parse the locator into a URL, rejecting schemes outside the supported
    /// set.
    pub fn parse_url(&self) -> Result<Url> {
        let url = Url::parse(&self.url)?;
        if ProxyKind::from_scheme(url.scheme()).is_none() {
            return Err(LashesError::InvalidProxyUrl(format!(
                "unsupported scheme: {}",
                url.scheme()
            )));
        }
        Ok(url)
    }

    /// Record the outcome of one request against the stored counters.
    ///
    /// Keeps `error_count <= usage_count` and recomputes the success rate
    /// from the counters.
    pub fn record_result(&mut self, latency_ms: i64, success: bool) {
        self.usage_count += 1;
        if !success {
            self.error_count += 1;
        }
        self.latency_ms = latency_ms;
        self.success_rate = 1.0 - (self.error_count as f64 / self.usage_count as f64);
        self.updated_at = Utc::now();
    }

    /// Mark the proxy as selected by the rotator.
    pub fn mark_used(&mut self, at: DateTime<Utc>) {
        self.last_used = Some(at);
        self.updated_at = at;
    }
}
