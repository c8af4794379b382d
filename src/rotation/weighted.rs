//! Weighted proxy selection strategy

use parking_lot::Mutex;
use rand::rngs::OsRng;
use rand::Rng;

use super::Strategy;
use crate::error::{LashesError, Result};
use crate::models::Proxy;

/// Probability of sampling from the positive-weight subset when zero-weight
/// proxies are also present.
const POSITIVE_SHARE: f64 = 0.95;

/// Selects proxies proportionally to their weight
///
/// Zero-weight proxies are demoted, not excluded: when the positive-weight
/// subset is non-empty, 95% of draws are weighted picks among it and the
/// remaining 5% are uniform picks among the zero-weight subset. When no
/// proxy carries positive weight, selection is uniform over all.
pub struct WeightedStrategy {
    // Multi-step draw; one selection at a time.
    lock: Mutex<()>,
}

impl WeightedStrategy {
    pub fn new() -> Self {
        Self {
            lock: Mutex::new(()),
        }
    }

    fn pick_uniform<'a>(&self, proxies: &[&'a Proxy]) -> &'a Proxy {
        proxies[OsRng.gen_range(0..proxies.len())]
    }

    fn pick_weighted<'a>(&self, positives: &[&'a Proxy]) -> &'a Proxy {
        let total: u64 = positives.iter().map(|p| p.weight.max(0) as u64).sum();
        let draw = OsRng.gen_range(0..total);

        let mut cumulative = 0u64;
        for proxy in positives {
            cumulative += proxy.weight.max(0) as u64;
            if draw < cumulative {
                return proxy;
            }
        }

        // Unreachable with exact integer weights; kept for the contract.
        positives[positives.len() - 1]
    }
}

impl Default for WeightedStrategy {
    fn default() -> Self {
        Self::new()
    }
}

impl Strategy for WeightedStrategy {
    fn next(&self, proxies: &[Proxy]) -> Result<Proxy> {
        if proxies.is_empty() {
            return Err(LashesError::NoProxiesAvailable);
        }

        let _guard = self.lock.lock();

        let (positives, zeros): (Vec<&Proxy>, Vec<&Proxy>) =
            proxies.iter().partition(|p| p.weight > 0);

        if positives.is_empty() {
            return Ok(self.pick_uniform(&zeros).clone());
        }

        if !zeros.is_empty() && OsRng.gen_range(0.0..1.0) >= POSITIVE_SHARE {
            return Ok(self.pick_uniform(&zeros).clone());
        }

        Ok(self.pick_weighted(&positives).clone())
    }

    fn name(&self) -> &'static str {
        "weighted"
    }
}
