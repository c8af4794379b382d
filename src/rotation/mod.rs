//! Proxy rotation strategies
//!
//! This module provides the strategies for selecting a proxy from a pool
//! snapshot.

mod least_used;
mod random;
mod round_robin;
mod weighted;

pub use least_used::LeastUsedStrategy;
pub use random::RandomStrategy;
pub use round_robin::RoundRobinStrategy;
pub use weighted::WeightedStrategy;

use serde::{Deserialize, Serialize};

use crate::error::{LashesError, Result};
use crate::models::Proxy;

/// Strategy types for proxy rotation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum StrategyType {
    #[default]
    RoundRobin,
    Random,
    Weighted,
    LeastUsed,
}

impl StrategyType {
    /// Parse a strategy name, accepting the historical spelling variants.
    pub fn parse(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "round-robin" | "round_robin" | "roundrobin" => Ok(Self::RoundRobin),
            "random" => Ok(Self::Random),
            "weighted" => Ok(Self::Weighted),
            "least-used" | "least_used" | "leastused" => Ok(Self::LeastUsed),
            other => Err(LashesError::InvalidConfig(format!(
                "unknown rotation strategy: {other}"
            ))),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::RoundRobin => "round-robin",
            Self::Random => "random",
            Self::Weighted => "weighted",
            Self::LeastUsed => "least-used",
        }
    }
}

impl std::fmt::Display for StrategyType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Trait for proxy selection strategies
///
/// Selection is CPU-only and never mutates candidate records; any internal
/// state (cursor, lock) is synchronized by the strategy itself.
pub trait Strategy: Send + Sync {
    /// Select a proxy from the snapshot.
    ///
    /// Returns `NoProxiesAvailable` on an empty snapshot.
    fn next(&self, proxies: &[Proxy]) -> Result<Proxy>;

    /// Get the strategy name
    fn name(&self) -> &'static str;
}

/// Create a strategy instance for the given type
pub fn new_strategy(strategy: StrategyType) -> Box<dyn Strategy> {
    match strategy {
        StrategyType::RoundRobin => Box::new(RoundRobinStrategy::new()),
        StrategyType::Random => Box::new(RandomStrategy::new()),
        StrategyType::Weighted => Box::new(WeightedStrategy::new()),
        StrategyType::LeastUsed => Box::new(LeastUsedStrategy::new()),
    }
}
