//! Least-used proxy selection strategy

use parking_lot::Mutex;

use super::Strategy;
use crate::error::{LashesError, Result};
use crate::models::Proxy;

/// Selects the proxy with the lowest usage count
///
/// Ties break toward the oldest `last_used` timestamp; proxies that have
/// never been used rank before any that have.
pub struct LeastUsedStrategy {
    lock: Mutex<()>,
}

impl LeastUsedStrategy {
    pub fn new() -> Self {
        Self {
            lock: Mutex::new(()),
        }
    }
}

impl Default for LeastUsedStrategy {
    fn default() -> Self {
        Self::new()
    }
}

impl Strategy for LeastUsedStrategy {
    fn next(&self, proxies: &[Proxy]) -> Result<Proxy> {
        if proxies.is_empty() {
            return Err(LashesError::NoProxiesAvailable);
        }

        let _guard = self.lock.lock();

        let min_usage = proxies.iter().map(|p| p.usage_count).min().unwrap_or(0);

        proxies
            .iter()
            .filter(|p| p.usage_count == min_usage)
            // None sorts before Some, so never-used candidates win ties.
            .min_by_key(|p| (p.last_used.is_some(), p.last_used))
            .cloned()
            .ok_or(LashesError::NoProxiesAvailable)
    }

    fn name(&self) -> &'static str {
        "least-used"
    }
}

#[cfg(test)]
mod tests {
    use super::super::tests::test_proxy;
    use super::*;
    use chrono::{Duration as ChronoDuration, Utc};

    fn used_proxy(id: &str, usage: i64, last_used: Option<chrono::DateTime<Utc>>) -> Proxy {
        let mut proxy = test_proxy(id, &format!("http://{id}:1"));
        proxy.usage_count = usage;
        proxy.last_used = last_used;
        proxy
    }

    #[test]
    fn test_least_used_empty() {
        let strategy = LeastUsedStrategy::new();
        assert!(matches!(
            strategy.next(&[]),
            Err(LashesError::NoProxiesAvailable)
        ));
    }

    #[test]
    fn test_least_used_picks_minimum_usage() {
        let strategy = LeastUsedStrategy::new();
        let now = Some(Utc::now());
        let proxies = vec![
            used_proxy("high", 100, now),
            used_proxy("medium", 50, now),
            used_proxy("low", 10, now),
        ];

        let picked = strategy.next(&proxies).unwrap();
        assert_eq!(picked.id, "low");
        assert_eq!(
            picked.usage_count,
            proxies.iter().map(|p| p.usage_count).min().unwrap()
        );
    }

    #[test]
    fn test_least_used_tie_prefers_oldest() {
        let strategy = LeastUsedStrategy::new();
        let now = Utc::now();
        let proxies = vec![
            used_proxy("newer", 10, Some(now)),
            used_proxy("older", 10, Some(now - ChronoDuration::hours(1))),
        ];

        assert_eq!(strategy.next(&proxies).unwrap().id, "older");
    }

    #[test]
    fn test_least_used_tie_prefers_never_used() {
        let strategy = LeastUsedStrategy::new();
        let proxies = vec![
            used_proxy("with-last-used", 10, Some(Utc::now())),
            used_proxy("never-used", 10, None),
        ];

        assert_eq!(strategy.next(&proxies).unwrap().id, "never-used");
    }

    #[test]
    fn test_least_used_keeps_spread_tight() {
        let strategy = LeastUsedStrategy::new();
        let mut proxies = vec![
            used_proxy("a", 0, None),
            used_proxy("b", 0, None),
            used_proxy("c", 0, None),
        ];

        // Simulate a rotation loop that bumps usage on each selection.
        for _ in 0..30 {
            let picked = strategy.next(&proxies).unwrap();
            let slot = proxies.iter_mut().find(|p| p.id == picked.id).unwrap();
            slot.usage_count += 1;
            slot.last_used = Some(Utc::now());
        }

        let max = proxies.iter().map(|p| p.usage_count).max().unwrap();
        let min = proxies.iter().map(|p| p.usage_count).min().unwrap();
        assert!(max - min <= 1, "spread grew to {}", max - min);
    }
}
