//! Random proxy selection strategy

use rand::rngs::OsRng;
use rand::Rng;

use super::Strategy;
use crate::error::{LashesError, Result};
use crate::models::Proxy;

/// Selects a uniformly random proxy
///
/// Draws come from the operating system's entropy source, never from a
/// time-seeded generator.
pub struct RandomStrategy;

impl RandomStrategy {
    pub fn new() -> Self {
        Self
    }
}

impl Default for RandomStrategy {
    fn default() -> Self {
        Self::new()
    }
}

impl Strategy for RandomStrategy {
    fn next(&self, proxies: &[Proxy]) -> Result<Proxy> {
        if proxies.is_empty() {
            return Err(LashesError::NoProxiesAvailable);
        }

        let index = OsRng.gen_range(0..proxies.len());
        Ok(proxies[index].clone())
    }

    fn name(&self) -> &'static str {
        "random"
    }
}

#[cfg(test)]
mod tests {
    use super::super::tests::test_proxy;
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_random_empty() {
        let strategy = RandomStrategy::new();
        assert!(matches!(
            strategy.next(&[]),
            Err(LashesError::NoProxiesAvailable)
        ));
    }

    #[test]
    fn test_random_stays_within_candidates() {
        let strategy = RandomStrategy::new();
        let proxies = vec![
            test_proxy("a", "http://a:1"),
            test_proxy("b", "http://b:1"),
            test_proxy("c", "http://c:1"),
        ];
        let ids: HashSet<&str> = proxies.iter().map(|p| p.id.as_str()).collect();

        for _ in 0..50 {
            let picked = strategy.next(&proxies).unwrap();
            assert!(ids.contains(picked.id.as_str()));
        }
    }

    #[test]
    fn test_random_eventually_covers_all_candidates() {
        let strategy = RandomStrategy::new();
        let proxies = vec![
            test_proxy("a", "http://a:1"),
            test_proxy("b", "http://b:1"),
            test_proxy("c", "http://c:1"),
        ];

        // With 200 uniform draws over 3 candidates, missing one has
        // probability (2/3)^200, far below any practical flake threshold.
        let mut seen = HashSet::new();
        for _ in 0..200 {
            seen.insert(strategy.next(&proxies).unwrap().id);
        }
        assert_eq!(seen.len(), 3);
    }
}
