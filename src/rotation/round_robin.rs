//! Round-robin proxy selection strategy

use std::sync::atomic::{AtomicU64, Ordering};

use super::Strategy;
use crate::error::{LashesError, Result};
use crate::models::Proxy;

/// Selects proxies in rotation over a deterministic order
///
/// Candidates are sorted by locator before indexing so that the cycle is
/// stable regardless of snapshot ordering. The cursor advances atomically
/// exactly once per call.
pub struct RoundRobinStrategy {
    counter: AtomicU64,
}

impl RoundRobinStrategy {
    pub fn new() -> Self {
        Self {
            counter: AtomicU64::new(0),
        }
    }
}

impl Default for RoundRobinStrategy {
    fn default() -> Self {
        Self::new()
    }
}

impl Strategy for RoundRobinStrategy {
    fn next(&self, proxies: &[Proxy]) -> Result<Proxy> {
        if proxies.is_empty() {
            return Err(LashesError::NoProxiesAvailable);
        }

        let mut ordered: Vec<&Proxy> = proxies.iter().collect();
        ordered.sort_by(|a, b| a.url.cmp(&b.url));

        let index = self.counter.fetch_add(1, Ordering::Relaxed) % ordered.len() as u64;
        Ok(ordered[index as usize].clone())
    }

    fn name(&self) -> &'static str {
        "round-robin"
    }
}

#[cfg(test)]
mod tests {
    use super::super::tests::test_proxy;
    use super::*;

    #[test]
    fn test_round_robin_empty() {
        let strategy = RoundRobinStrategy::new();
        assert!(matches!(
            strategy.next(&[]),
            Err(LashesError::NoProxiesAvailable)
        ));
    }

    #[test]
    fn test_round_robin_full_cycle_without_repeats() {
        let strategy = RoundRobinStrategy::new();
        let proxies = vec![
            test_proxy("b", "http://b:1"),
            test_proxy("c", "http://c:1"),
            test_proxy("a", "http://a:1"),
        ];

        // A window of n selections over a stable set hits each proxy once.
        let picks: Vec<String> = (0..3)
            .map(|_| strategy.next(&proxies).unwrap().url)
            .collect();
        assert_eq!(picks, vec!["http://a:1", "http://b:1", "http://c:1"]);
    }

    #[test]
    fn test_round_robin_positions_repeat_every_n() {
        let strategy = RoundRobinStrategy::new();
        let proxies = vec![
            test_proxy("a", "http://a:1"),
            test_proxy("b", "http://b:1"),
            test_proxy("c", "http://c:1"),
        ];

        let picks: Vec<String> = (0..6)
            .map(|_| strategy.next(&proxies).unwrap().url)
            .collect();
        for i in 0..3 {
            assert_eq!(picks[i], picks[i + 3]);
        }
    }

    #[test]
    fn test_round_robin_order_is_independent_of_snapshot_order() {
        let strategy = RoundRobinStrategy::new();
        let forward = vec![test_proxy("a", "http://a:1"), test_proxy("b", "http://b:1")];
        let reversed: Vec<Proxy> = forward.iter().rev().cloned().collect();

        assert_eq!(strategy.next(&forward).unwrap().url, "http://a:1");
        assert_eq!(strategy.next(&reversed).unwrap().url, "http://b:1");
    }
}
