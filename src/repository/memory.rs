//! In-memory proxy store

use std::collections::HashMap;

use async_trait::async_trait;
use parking_lot::RwLock;

use super::ProxyRepository;
use crate::error::{LashesError, Result};
use crate::models::Proxy;

/// Default store; multi-reader/single-writer over a keyed map.
#[derive(Default)]
pub struct MemoryRepository {
    proxies: RwLock<HashMap<String, Proxy>>,
}

impl MemoryRepository {
    pub fn new() -> Self {
        Self {
            proxies: RwLock::new(HashMap::new()),
        }
    }
}

#[async_trait]
impl ProxyRepository for MemoryRepository {
    async fn create(&self, proxy: &Proxy) -> Result<()> {
        let mut guard = self.proxies.write();
        if guard.contains_key(&proxy.id) {
            return Err(LashesError::DuplicateProxyId(proxy.id.clone()));
        }
        guard.insert(proxy.id.clone(), proxy.clone());
        Ok(())
    }

    async fn get_by_id(&self, id: &str) -> Result<Proxy> {
        self.proxies
            .read()
            .get(id)
            .cloned()
            .ok_or_else(|| LashesError::ProxyNotFound(id.to_string()))
    }

    async fn update(&self, proxy: &Proxy) -> Result<()> {
        let mut guard = self.proxies.write();
        match guard.get_mut(&proxy.id) {
            Some(slot) => {
                *slot = proxy.clone();
                Ok(())
            }
            None => Err(LashesError::ProxyNotFound(proxy.id.clone())),
        }
    }

    async fn delete(&self, id: &str) -> Result<()> {
        match self.proxies.write().remove(id) {
            Some(_) => Ok(()),
            None => Err(LashesError::ProxyNotFound(id.to_string())),
        }
    }

    async fn list(&self) -> Result<Vec<Proxy>> {
        Ok(self.proxies.read().values().cloned().collect())
    }

    async fn get_next(&self) -> Result<Proxy> {
        let guard = self.proxies.read();
        guard
            .values()
            .filter(|p| p.enabled)
            // Never-used proxies sort before any used one.
            .min_by_key(|p| (p.last_used.is_some(), p.last_used))
            .cloned()
            .ok_or(LashesError::NoProxiesAvailable)
    }
}
