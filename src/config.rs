//! Configuration
//!
//! `Options` is the runtime shape consumed by the rotator. `Config` is the
//! serialized shape: a JSON file with human-readable durations (`10s`,
//! `500ms`), with every field also reachable through `LASHES_*` environment
//! variables.

use std::env;
use std::fs;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::breaker::CircuitBreakerConfig;
use crate::error::{LashesError, Result};
use crate::health::HealthCheckOptions;
use crate::rotation::StrategyType;

/// Storage backend selector
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageType {
    #[default]
    Memory,
    Sqlite,
    Mysql,
    Postgres,
}

/// Storage configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StorageOptions {
    #[serde(rename = "type")]
    pub storage_type: StorageType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub connection_string: Option<String>,
    #[serde(default, with = "humantime_serde::option")]
    pub query_timeout: Option<Duration>,
}

impl StorageOptions {
    /// Resolve the backend connection string.
    pub fn dsn(&self) -> Result<String> {
        match self.storage_type {
            StorageType::Memory => Err(LashesError::InvalidConfig(
                "memory storage has no connection string".into(),
            )),
            StorageType::Sqlite => {
                let path = self.file_path.as_deref().ok_or_else(|| {
                    LashesError::InvalidConfig("sqlite storage requires file_path".into())
                })?;
                Ok(format!("sqlite://{path}?mode=rwc"))
            }
            StorageType::Mysql | StorageType::Postgres => self
                .connection_string
                .clone()
                .ok_or_else(|| {
                    LashesError::InvalidConfig(
                        "sql storage requires connection_string".into(),
                    )
                }),
        }
    }
}

/// Minimum TLS version accepted by outbound clients
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum TlsMinVersion {
    #[default]
    #[serde(rename = "v12")]
    V12,
    #[serde(rename = "v13")]
    V13,
}

/// Security-related client settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SecurityOptions {
    /// Verify upstream TLS certificates
    pub verify_tls: bool,
    /// Minimum TLS version to negotiate
    pub min_tls_version: TlsMinVersion,
    /// Bypass certificate checks entirely (not recommended)
    pub allow_insecure: bool,
}

impl Default for SecurityOptions {
    fn default() -> Self {
        Self {
            verify_tls: true,
            min_tls_version: TlsMinVersion::V12,
            allow_insecure: false,
        }
    }
}

/// Per-proxy rate limit defaults
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct RateLimitOptions {
    pub requests_per_second: u32,
    pub burst: u32,
}

/// Runtime options for the proxy rotator
#[derive(Debug, Clone)]
pub struct Options {
    /// Storage configuration; `None` means in-memory
    pub storage: Option<StorageOptions>,
    /// How proxies are rotated
    pub strategy: StrategyType,
    /// URL used for validation probes
    pub test_url: String,
    /// Validate proxies when they are added
    pub validate_on_start: bool,
    /// Retry attempts for failed requests
    pub max_retries: u32,
    /// Timeout for proxied requests
    pub request_timeout: Duration,
    /// Timeout for validation probes
    pub validation_timeout: Duration,
    /// Delay between retry attempts
    pub retry_delay: Duration,
    /// Latency above which a probe counts as failed
    pub max_latency: Duration,
    /// Circuit breaking; `None` disables it
    pub circuit_breaker: Option<CircuitBreakerConfig>,
    /// Collect per-proxy metrics
    pub metrics_enabled: bool,
    /// Serve metric reads through a TTL cache
    pub metrics_cache_ttl: Option<Duration>,
    /// Per-proxy rate limiting; `None` disables it
    pub rate_limit: Option<RateLimitOptions>,
    /// TLS behavior for outbound clients
    pub security: SecurityOptions,
    /// Follow redirects in rotated clients (probes never do)
    pub follow_redirects: bool,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            storage: None,
            strategy: StrategyType::RoundRobin,
            test_url: "https://api.ipify.org?format=json".to_string(),
            validate_on_start: true,
            max_retries: 3,
            request_timeout: Duration::from_secs(30),
            validation_timeout: Duration::from_secs(10),
            retry_delay: Duration::from_secs(1),
            max_latency: Duration::from_secs(5),
            circuit_breaker: None,
            metrics_enabled: true,
            metrics_cache_ttl: None,
            rate_limit: None,
            security: SecurityOptions::default(),
            follow_redirects: true,
        }
    }
}

/// Serialized configuration file shape
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub storage: StorageOptions,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub strategy: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub test_url: Option<String>,
    #[serde(default)]
    pub validate_on_start: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_retries: Option<u32>,
    #[serde(default)]
    pub timeouts: TimeoutSection,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub circuit_breaker: Option<BreakerSection>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub health: Option<HealthSection>,
    #[serde(default)]
    pub security: SecurityOptions,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TimeoutSection {
    #[serde(default, with = "humantime_serde::option")]
    pub request: Option<Duration>,
    #[serde(default, with = "humantime_serde::option")]
    pub validation: Option<Duration>,
    #[serde(default, with = "humantime_serde::option")]
    pub retry: Option<Duration>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BreakerSection {
    pub enabled: bool,
    #[serde(default)]
    pub max_failures: Option<u32>,
    #[serde(default, with = "humantime_serde::option")]
    pub reset_timeout: Option<Duration>,
    #[serde(default)]
    pub enable_global_breaker: bool,
    #[serde(default)]
    pub max_half_open_permits: Option<u32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthSection {
    #[serde(default, with = "humantime_serde::option")]
    pub interval: Option<Duration>,
    #[serde(default, with = "humantime_serde::option")]
    pub timeout: Option<Duration>,
    #[serde(default)]
    pub health_url: Option<String>,
    #[serde(default)]
    pub max_failures: Option<u32>,
    #[serde(default)]
    pub parallel: Option<usize>,
}

impl Config {
    /// Load configuration from a JSON file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let raw = fs::read_to_string(path)?;
        serde_json::from_str(&raw)
            .map_err(|err| LashesError::InvalidConfig(format!("config parse error: {err}")))
    }

    /// Save configuration to a JSON file.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let raw = serde_json::to_string_pretty(self)
            .map_err(|err| LashesError::InvalidConfig(format!("config encode error: {err}")))?;
        fs::write(path, raw)?;
        Ok(())
    }

    /// Convert the file shape into runtime options, applying defaults for
    /// everything the file leaves unset.
    pub fn into_options(self) -> Result<Options> {
        let mut options = Options::default();

        if self.storage.storage_type != StorageType::Memory {
            options.storage = Some(self.storage);
        }
        if let Some(strategy) = self.strategy.as_deref() {
            options.strategy = StrategyType::parse(strategy)?;
        }
        if let Some(test_url) = self.test_url {
            options.test_url = test_url;
        }
        options.validate_on_start = self.validate_on_start;
        if let Some(max_retries) = self.max_retries {
            options.max_retries = max_retries;
        }
        if let Some(request) = self.timeouts.request {
            options.request_timeout = request;
        }
        if let Some(validation) = self.timeouts.validation {
            options.validation_timeout = validation;
        }
        if let Some(retry) = self.timeouts.retry {
            options.retry_delay = retry;
        }
        if let Some(breaker) = self.circuit_breaker {
            if breaker.enabled {
                let defaults = CircuitBreakerConfig::default();
                options.circuit_breaker = Some(CircuitBreakerConfig {
                    max_failures: breaker.max_failures.unwrap_or(defaults.max_failures),
                    reset_timeout: breaker.reset_timeout.unwrap_or(defaults.reset_timeout),
                    max_half_open_permits: breaker
                        .max_half_open_permits
                        .unwrap_or(defaults.max_half_open_permits),
                    enable_global_breaker: breaker.enable_global_breaker,
                });
            }
        }
        options.security = self.security;

        Ok(options)
    }

    /// Map the health section onto scheduler options.
    pub fn health_check_options(&self) -> HealthCheckOptions {
        let defaults = HealthCheckOptions::default();
        match &self.health {
            Some(section) => HealthCheckOptions {
                interval: section.interval.unwrap_or(defaults.interval),
                timeout: section.timeout.unwrap_or(defaults.timeout),
                health_url: section
                    .health_url
                    .clone()
                    .unwrap_or(defaults.health_url),
                max_failures: section.max_failures.unwrap_or(defaults.max_failures),
                parallel: section.parallel.unwrap_or(defaults.parallel),
                reporter: None,
            },
            None => defaults,
        }
    }
}

impl Options {
    /// Load options from `LASHES_*` environment variables, starting from the
    /// defaults. Malformed values are rejected rather than ignored.
    pub fn from_env() -> Result<Self> {
        let mut options = Options::default();

        match env_var("LASHES_STORAGE_TYPE").as_deref() {
            Some("sqlite") => {
                options.storage = Some(StorageOptions {
                    storage_type: StorageType::Sqlite,
                    file_path: env_var("LASHES_SQLITE_PATH"),
                    connection_string: None,
                    query_timeout: None,
                });
            }
            Some("mysql") => {
                options.storage = Some(StorageOptions {
                    storage_type: StorageType::Mysql,
                    file_path: None,
                    connection_string: env_var("LASHES_MYSQL_DSN"),
                    query_timeout: None,
                });
            }
            Some("postgres") => {
                options.storage = Some(StorageOptions {
                    storage_type: StorageType::Postgres,
                    file_path: None,
                    connection_string: env_var("LASHES_POSTGRES_DSN"),
                    query_timeout: None,
                });
            }
            Some("memory") | None => {}
            Some(other) => {
                return Err(LashesError::InvalidConfig(format!(
                    "LASHES_STORAGE_TYPE: unknown storage type {other:?}"
                )))
            }
        }

        if let Some(strategy) = env_var("LASHES_STRATEGY") {
            options.strategy = StrategyType::parse(&strategy)?;
        }
        if let Some(test_url) = env_var("LASHES_TEST_URL") {
            options.test_url = test_url;
        }
        if let Some(validate) = env_var("LASHES_VALIDATE_ON_START") {
            options.validate_on_start = parse_bool("LASHES_VALIDATE_ON_START", &validate)?;
        }
        if let Some(retries) = env_var("LASHES_MAX_RETRIES") {
            options.max_retries = retries.parse().map_err(|_| {
                LashesError::InvalidConfig("LASHES_MAX_RETRIES must be an integer".into())
            })?;
        }
        if let Some(timeout) = env_var("LASHES_REQUEST_TIMEOUT") {
            options.request_timeout = parse_duration("LASHES_REQUEST_TIMEOUT", &timeout)?;
        }
        if let Some(timeout) = env_var("LASHES_VALIDATION_TIMEOUT") {
            options.validation_timeout = parse_duration("LASHES_VALIDATION_TIMEOUT", &timeout)?;
        }
        if let Some(delay) = env_var("LASHES_RETRY_DELAY") {
            options.retry_delay = parse_duration("LASHES_RETRY_DELAY", &delay)?;
        }

        if let Some(enabled) = env_var("LASHES_BREAKER_ENABLED") {
            if parse_bool("LASHES_BREAKER_ENABLED", &enabled)? {
                let mut breaker = CircuitBreakerConfig::default();
                if let Some(raw) = env_var("LASHES_BREAKER_MAX_FAILURES") {
                    breaker.max_failures = raw.parse().map_err(|_| {
                        LashesError::InvalidConfig(
                            "LASHES_BREAKER_MAX_FAILURES must be an integer".into(),
                        )
                    })?;
                }
                if let Some(raw) = env_var("LASHES_BREAKER_RESET_TIMEOUT") {
                    breaker.reset_timeout = parse_duration("LASHES_BREAKER_RESET_TIMEOUT", &raw)?;
                }
                if let Some(raw) = env_var("LASHES_BREAKER_GLOBAL") {
                    breaker.enable_global_breaker = parse_bool("LASHES_BREAKER_GLOBAL", &raw)?;
                }
                if let Some(raw) = env_var("LASHES_BREAKER_HALF_OPEN_PERMITS") {
                    breaker.max_half_open_permits = raw.parse().map_err(|_| {
                        LashesError::InvalidConfig(
                            "LASHES_BREAKER_HALF_OPEN_PERMITS must be an integer".into(),
                        )
                    })?;
                }
                options.circuit_breaker = Some(breaker);
            }
        }

        if let Some(verify) = env_var("LASHES_VERIFY_TLS") {
            options.security.verify_tls = parse_bool("LASHES_VERIFY_TLS", &verify)?;
        }
        if let Some(version) = env_var("LASHES_MIN_TLS_VERSION") {
            options.security.min_tls_version = match version.as_str() {
                "v12" | "1.2" => TlsMinVersion::V12,
                "v13" | "1.3" => TlsMinVersion::V13,
                other => {
                    return Err(LashesError::InvalidConfig(format!(
                        "LASHES_MIN_TLS_VERSION: unknown version {other:?}"
                    )))
                }
            };
        }
        if let Some(insecure) = env_var("LASHES_ALLOW_INSECURE") {
            options.security.allow_insecure = parse_bool("LASHES_ALLOW_INSECURE", &insecure)?;
        }

        Ok(options)
    }
}

fn env_var(key: &str) -> Option<String> {
    env::var(key).ok().filter(|value| !value.is_empty())
}

fn parse_bool(key: &str, raw: &str) -> Result<bool> {
    match raw.to_lowercase().as_str() {
        "true" | "1" | "yes" => Ok(true),
        "false" | "0" | "no" => Ok(false),
        _ => Err(LashesError::InvalidConfig(format!(
            "{key} must be a boolean, got {raw:?}"
        ))),
    }
}

fn parse_duration(key: &str, raw: &str) -> Result<Duration> {
    humantime::parse_duration(raw).map_err(|err| {
        LashesError::InvalidConfig(format!("{key} must be a duration like 10s or 500ms: {err}"))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    static ENV_LOCK: Mutex<()> = Mutex::new(());

    const CONFIG_ENV_KEYS: &[&str] = &[
        "LASHES_STORAGE_TYPE",
        "LASHES_SQLITE_PATH",
        "LASHES_MYSQL_DSN",
        "LASHES_POSTGRES_DSN",
        "LASHES_STRATEGY",
        "LASHES_TEST_URL",
        "LASHES_VALIDATE_ON_START",
        "LASHES_MAX_RETRIES",
        "LASHES_REQUEST_TIMEOUT",
        "LASHES_VALIDATION_TIMEOUT",
        "LASHES_RETRY_DELAY",
        "LASHES_BREAKER_ENABLED",
        "LASHES_BREAKER_MAX_FAILURES",
        "LASHES_BREAKER_RESET_TIMEOUT",
        "LASHES_BREAKER_GLOBAL",
        "LASHES_BREAKER_HALF_OPEN_PERMITS",
        "LASHES_VERIFY_TLS",
        "LASHES_MIN_TLS_VERSION",
        "LASHES_ALLOW_INSECURE",
    ];

    struct EnvGuard {
        saved: Vec<(String, Option<String>)>,
    }

    impl EnvGuard {
        fn new(keys: &[&str]) -> Self {
            let saved = keys
                .iter()
                .map(|&key| {
                    let old = env::var(key).ok();
                    env::remove_var(key);
                    (key.to_string(), old)
                })
                .collect();

            Self { saved }
        }
    }

    impl Drop for EnvGuard {
        fn drop(&mut self) {
            for (key, value) in self.saved.drain(..) {
                match value {
                    Some(v) => env::set_var(key, v),
                    None => env::remove_var(key),
                }
            }
        }
    }

    #[test]
    fn test_options_defaults() {
        let options = Options::default();
        assert_eq!(options.strategy, StrategyType::RoundRobin);
        assert!(options.storage.is_none());
        assert!(options.validate_on_start);
        assert_eq!(options.max_retries, 3);
        assert_eq!(options.request_timeout, Duration::from_secs(30));
        assert_eq!(options.validation_timeout, Duration::from_secs(10));
        assert!(options.circuit_breaker.is_none());
        assert!(options.security.verify_tls);
    }

    #[test]
    fn test_from_env_defaults() {
        let _lock = ENV_LOCK.lock().unwrap();
        let _guard = EnvGuard::new(CONFIG_ENV_KEYS);

        let options = Options::from_env().unwrap();
        assert_eq!(options.strategy, StrategyType::RoundRobin);
        assert!(options.storage.is_none());
    }

    #[test]
    fn test_from_env_overrides() {
        let _lock = ENV_LOCK.lock().unwrap();
        let _guard = EnvGuard::new(CONFIG_ENV_KEYS);

        env::set_var("LASHES_STRATEGY", "weighted");
        env::set_var("LASHES_TEST_URL", "https://probe.example/ip");
        env::set_var("LASHES_REQUEST_TIMEOUT", "45s");
        env::set_var("LASHES_VALIDATION_TIMEOUT", "500ms");
        env::set_var("LASHES_STORAGE_TYPE", "sqlite");
        env::set_var("LASHES_SQLITE_PATH", "/tmp/lashes.db");
        env::set_var("LASHES_BREAKER_ENABLED", "true");
        env::set_var("LASHES_BREAKER_MAX_FAILURES", "7");

        let options = Options::from_env().unwrap();
        assert_eq!(options.strategy, StrategyType::Weighted);
        assert_eq!(options.test_url, "https://probe.example/ip");
        assert_eq!(options.request_timeout, Duration::from_secs(45));
        assert_eq!(options.validation_timeout, Duration::from_millis(500));

        let storage = options.storage.unwrap();
        assert_eq!(storage.storage_type, StorageType::Sqlite);
        assert_eq!(storage.file_path.as_deref(), Some("/tmp/lashes.db"));

        let breaker = options.circuit_breaker.unwrap();
        assert_eq!(breaker.max_failures, 7);
    }

    #[test]
    fn test_from_env_rejects_malformed_values() {
        let _lock = ENV_LOCK.lock().unwrap();
        let _guard = EnvGuard::new(CONFIG_ENV_KEYS);

        env::set_var("LASHES_REQUEST_TIMEOUT", "soon");
        assert!(matches!(
            Options::from_env(),
            Err(LashesError::InvalidConfig(_))
        ));
        env::remove_var("LASHES_REQUEST_TIMEOUT");

        env::set_var("LASHES_STRATEGY", "fastest");
        assert!(Options::from_env().is_err());
        env::remove_var("LASHES_STRATEGY");

        env::set_var("LASHES_VERIFY_TLS", "maybe");
        assert!(Options::from_env().is_err());
    }

    #[test]
    fn test_config_file_round_trip() {
        let path = std::env::temp_dir().join(format!("lashes-config-{}.json", std::process::id()));

        let raw = r#"{
            "storage": {"type": "sqlite", "file_path": "proxies.db", "query_timeout": "5s"},
            "strategy": "least-used",
            "test_url": "https://probe.example/ip",
            "validate_on_start": true,
            "max_retries": 5,
            "timeouts": {"request": "20s", "validation": "2s", "retry": "250ms"},
            "circuit_breaker": {
                "enabled": true,
                "max_failures": 4,
                "reset_timeout": "10s",
                "enable_global_breaker": true,
                "max_half_open_permits": 2
            },
            "health": {"interval": "1m", "timeout": "3s", "parallel": 4},
            "security": {"verify_tls": true, "min_tls_version": "v13", "allow_insecure": false}
        }"#;
        fs::write(&path, raw).unwrap();

        let config = Config::from_file(&path).unwrap();
        let health = config.health_check_options();
        assert_eq!(health.interval, Duration::from_secs(60));
        assert_eq!(health.parallel, 4);

        let options = config.clone().into_options().unwrap();
        assert_eq!(options.strategy, StrategyType::LeastUsed);
        assert_eq!(options.max_retries, 5);
        assert_eq!(options.request_timeout, Duration::from_secs(20));
        assert_eq!(options.retry_delay, Duration::from_millis(250));
        assert_eq!(options.security.min_tls_version, TlsMinVersion::V13);

        let breaker = options.circuit_breaker.unwrap();
        assert_eq!(breaker.max_failures, 4);
        assert_eq!(breaker.max_half_open_permits, 2);
        assert_eq!(breaker.reset_timeout, Duration::from_secs(10));

        // Save and reload; the round trip preserves the shape.
        config.save(&path).unwrap();
        let reloaded = Config::from_file(&path).unwrap();
        assert_eq!(reloaded.strategy.as_deref(), Some("least-used"));
        assert_eq!(
            reloaded.clone().into_options().unwrap().max_retries,
            options.max_retries
        );

        fs::remove_file(&path).ok();
    }

    #[test]
    fn test_storage_dsn() {
        let sqlite = StorageOptions {
            storage_type: StorageType::Sqlite,
            file_path: Some("proxies.db".into()),
            connection_string: None,
            query_timeout: None,
        };
        assert_eq!(sqlite.dsn().unwrap(), "sqlite://proxies.db?mode=rwc");

        let postgres = StorageOptions {
            storage_type: StorageType::Postgres,
            file_path: None,
            connection_string: Some("postgres://user@db/lashes".into()),
            query_timeout: None,
        };
        assert_eq!(postgres.dsn().unwrap(), "postgres://user@db/lashes");

        let memory = StorageOptions::default();
        assert!(memory.dsn().is_err());

        let broken = StorageOptions {
            storage_type: StorageType::Sqlite,
            file_path: None,
            connection_string: None,
            query_timeout: None,
        };
        assert!(broken.dsn().is_err());
    }
}
