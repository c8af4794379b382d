//! Proxy storage
//!
//! Every store implements the same contract; callers hold snapshots, never
//! references into the store.

mod memory;
mod sql;

pub use memory::MemoryRepository;
pub use sql::SqlRepository;

use async_trait::async_trait;

use crate::error::Result;
use crate::models::Proxy;

/// Storage contract shared by all proxy stores
///
/// Operations are concurrent-safe and deterministic given the current state.
/// `list` returns owned copies; mutating a returned record has no effect on
/// the store until `update` is called with it.
#[async_trait]
pub trait ProxyRepository: Send + Sync {
    /// Store a new proxy. Fails with `DuplicateProxyId` if the id exists.
    async fn create(&self, proxy: &Proxy) -> Result<()>;

    /// Retrieve a proxy by id. Fails with `ProxyNotFound`.
    async fn get_by_id(&self, id: &str) -> Result<Proxy>;

    /// Replace an existing proxy wholesale. Fails with `ProxyNotFound`.
    async fn update(&self, proxy: &Proxy) -> Result<()>;

    /// Remove a proxy by id. Fails with `ProxyNotFound`.
    async fn delete(&self, id: &str) -> Result<()>;

    /// Snapshot of all proxies; ordering is not guaranteed between calls.
    async fn list(&self) -> Result<Vec<Proxy>>;

    /// The least-recently-used enabled proxy. Never-used proxies rank before
    /// any that have been used. Fails with `NoProxiesAvailable` when no
    /// enabled proxy exists.
    async fn get_next(&self) -> Result<Proxy>;
}
