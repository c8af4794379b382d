//! SQL-backed proxy store
//!
//! One `proxies` table mirroring the proxy record, reachable through any of
//! the sqlx `Any` connection strings (sqlite, postgres, mysql). Timestamps
//! are stored as RFC 3339 text so lexicographic order matches chronological
//! order.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use sqlx::any::{AnyPoolOptions, AnyRow};
use sqlx::{AnyPool, Row};
use tracing::debug;

use super::ProxyRepository;
use crate::error::{LashesError, Result};
use crate::models::{Proxy, ProxyKind};

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS proxies (
    id            TEXT PRIMARY KEY,
    url           TEXT NOT NULL,
    type          TEXT NOT NULL,
    username      TEXT,
    password      TEXT,
    country_code  TEXT,
    weight        BIGINT NOT NULL DEFAULT 1,
    enabled       BOOLEAN NOT NULL DEFAULT TRUE,
    last_used     TEXT,
    latency_ms    BIGINT NOT NULL DEFAULT 0,
    usage_count   BIGINT NOT NULL DEFAULT 0,
    error_count   BIGINT NOT NULL DEFAULT 0,
    success_rate  DOUBLE PRECISION NOT NULL DEFAULT 0.5,
    created_at    TEXT NOT NULL,
    updated_at    TEXT NOT NULL,
    max_retries   BIGINT NOT NULL DEFAULT 3,
    timeout_ms    BIGINT NOT NULL DEFAULT 30000
)
"#;

const INDEXES: &[&str] = &[
    "CREATE INDEX IF NOT EXISTS idx_proxies_type ON proxies (type)",
    "CREATE INDEX IF NOT EXISTS idx_proxies_enabled ON proxies (enabled)",
];

const SELECT_COLUMNS: &str = "id, url, type, username, password, country_code, weight, enabled, \
     last_used, latency_ms, usage_count, error_count, success_rate, \
     created_at, updated_at, max_retries, timeout_ms";

/// Proxy store backed by a SQL database through sqlx's `Any` driver.
pub struct SqlRepository {
    pool: AnyPool,
}

impl SqlRepository {
    /// Connect to the database and ensure the schema exists.
    pub async fn connect(connection_string: &str, query_timeout: Duration) -> Result<Self> {
        sqlx::any::install_default_drivers();

        let pool = AnyPoolOptions::new()
            .max_connections(10)
            .acquire_timeout(query_timeout)
            .connect(connection_string)
            .await?;

        let repo = Self { pool };
        repo.migrate().await?;
        Ok(repo)
    }

    async fn migrate(&self) -> Result<()> {
        sqlx::query(SCHEMA).execute(&self.pool).await?;
        for index in INDEXES {
            sqlx::query(index).execute(&self.pool).await?;
        }
        debug!("proxies schema ready");
        Ok(())
    }

    pub fn pool(&self) -> &AnyPool {
        &self.pool
    }
}

fn encode_timestamp(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn decode_timestamp(raw: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|ts| ts.with_timezone(&Utc))
        .map_err(|err| LashesError::InvalidConfig(format!("bad stored timestamp {raw:?}: {err}")))
}

fn row_to_proxy(row: &AnyRow) -> Result<Proxy> {
    let kind_raw: String = row.try_get("type")?;
    let kind = ProxyKind::from_str(&kind_raw).ok_or_else(|| {
        LashesError::InvalidProxyUrl(format!("unsupported proxy type in store: {kind_raw}"))
    })?;

    let last_used: Option<String> = row.try_get("last_used")?;
    let created_at: String = row.try_get("created_at")?;
    let updated_at: String = row.try_get("updated_at")?;

    Ok(Proxy {
        id: row.try_get("id")?,
        url: row.try_get("url")?,
        kind,
        username: row.try_get("username")?,
        password: row.try_get("password")?,
        country_code: row.try_get("country_code")?,
        weight: row.try_get::<i64, _>("weight")? as i32,
        enabled: row.try_get("enabled")?,
        last_used: last_used.as_deref().map(decode_timestamp).transpose()?,
        latency_ms: row.try_get("latency_ms")?,
        usage_count: row.try_get("usage_count")?,
        error_count: row.try_get("error_count")?,
        success_rate: row.try_get("success_rate")?,
        created_at: decode_timestamp(&created_at)?,
        updated_at: decode_timestamp(&updated_at)?,
        max_retries: row.try_get::<i64, _>("max_retries")? as u32,
        timeout: Duration::from_millis(row.try_get::<i64, _>("timeout_ms")?.max(0) as u64),
    })
}

fn map_unique_violation(err: sqlx::Error, id: &str) -> LashesError {
    if let sqlx::Error::Database(ref db_err) = err {
        if db_err.kind() == sqlx::error::ErrorKind::UniqueViolation {
            return LashesError::DuplicateProxyId(id.to_string());
        }
    }
    LashesError::Database(err)
}

#[async_trait]
impl ProxyRepository for SqlRepository {
    async fn create(&self, proxy: &Proxy) -> Result<()> {
        sqlx::query(
            "INSERT INTO proxies (id, url, type, username, password, country_code, weight, \
             enabled, last_used, latency_ms, usage_count, error_count, success_rate, \
             created_at, updated_at, max_retries, timeout_ms) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17)",
        )
        .bind(&proxy.id)
        .bind(&proxy.url)
        .bind(proxy.kind.as_str())
        .bind(&proxy.username)
        .bind(&proxy.password)
        .bind(&proxy.country_code)
        .bind(proxy.weight as i64)
        .bind(proxy.enabled)
        .bind(proxy.last_used.map(encode_timestamp))
        .bind(proxy.latency_ms)
        .bind(proxy.usage_count)
        .bind(proxy.error_count)
        .bind(proxy.success_rate)
        .bind(encode_timestamp(proxy.created_at))
        .bind(encode_timestamp(proxy.updated_at))
        .bind(proxy.max_retries as i64)
        .bind(proxy.timeout.as_millis() as i64)
        .execute(&self.pool)
        .await
        .map_err(|err| map_unique_violation(err, &proxy.id))?;

        Ok(())
    }

    async fn get_by_id(&self, id: &str) -> Result<Proxy> {
        let row = sqlx::query(&format!(
            "SELECT {SELECT_COLUMNS} FROM proxies WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => row_to_proxy(&row),
            None => Err(LashesError::ProxyNotFound(id.to_string())),
        }
    }

    async fn update(&self, proxy: &Proxy) -> Result<()> {
        let result = sqlx::query(
            "UPDATE proxies SET url = $1, type = $2, username = $3, password = $4, \
             country_code = $5, weight = $6, enabled = $7, last_used = $8, latency_ms = $9, \
             usage_count = $10, error_count = $11, success_rate = $12, created_at = $13, \
             updated_at = $14, max_retries = $15, timeout_ms = $16 WHERE id = $17",
        )
        .bind(&proxy.url)
        .bind(proxy.kind.as_str())
        .bind(&proxy.username)
        .bind(&proxy.password)
        .bind(&proxy.country_code)
        .bind(proxy.weight as i64)
        .bind(proxy.enabled)
        .bind(proxy.last_used.map(encode_timestamp))
        .bind(proxy.latency_ms)
        .bind(proxy.usage_count)
        .bind(proxy.error_count)
        .bind(proxy.success_rate)
        .bind(encode_timestamp(proxy.created_at))
        .bind(encode_timestamp(proxy.updated_at))
        .bind(proxy.max_retries as i64)
        .bind(proxy.timeout.as_millis() as i64)
        .bind(&proxy.id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(LashesError::ProxyNotFound(proxy.id.clone()));
        }
        Ok(())
    }

    async fn delete(&self, id: &str) -> Result<()> {
        let result = sqlx::query("DELETE FROM proxies WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(LashesError::ProxyNotFound(id.to_string()));
        }
        Ok(())
    }

    async fn list(&self) -> Result<Vec<Proxy>> {
        let rows = sqlx::query(&format!("SELECT {SELECT_COLUMNS} FROM proxies"))
            .fetch_all(&self.pool)
            .await?;

        rows.iter().map(row_to_proxy).collect()
    }

    async fn get_next(&self) -> Result<Proxy> {
        // RFC 3339 text sorts chronologically; NULL last_used ranks first.
        let row = sqlx::query(&format!(
            "SELECT {SELECT_COLUMNS} FROM proxies WHERE enabled = $1 \
             ORDER BY last_used IS NOT NULL, last_used ASC LIMIT 1"
        ))
        .bind(true)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => row_to_proxy(&row),
            None => Err(LashesError::NoProxiesAvailable),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timestamp_round_trip() {
        let now = Utc::now();
        let decoded = decode_timestamp(&encode_timestamp(now)).unwrap();
        // Encoding truncates below microseconds.
        assert_eq!(
            decoded.timestamp_micros(),
            now.timestamp_micros()
        );
    }

    #[test]
    fn test_timestamp_text_order_matches_chronological() {
        let earlier = Utc::now();
        let later = earlier + chrono::Duration::seconds(90);
        assert!(encode_timestamp(earlier) < encode_timestamp(later));
    }

    #[test]
    fn test_decode_rejects_garbage() {
        assert!(decode_timestamp("last tuesday").is_err());
    }
}
