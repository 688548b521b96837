//! Identifiers shared by every component of the engine.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Symbol of a tradable instrument, e.g. "AAPL" or "600519.SH".
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct InstrumentId(String);

impl InstrumentId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for InstrumentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Name under which a strategy instance is hosted by the runtime.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StrategyId(String);

impl StrategyId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for StrategyId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Engine-assigned order identifier. Unique and strictly increasing within a run.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct OrderId(u64);

impl OrderId {
    pub fn new(id: u64) -> Self {
        Self(id)
    }

    pub fn value(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for OrderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Fill-level identifier. Supplied by the venue, or synthesized when absent.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FillId(String);

impl FillId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for FillId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Components supervised by the watchdog.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum ComponentId {
    MarketFeed,
    StrategyRuntime,
    ExecutionAdapter,
    PortfolioLedger,
}

impl ComponentId {
    pub const ALL: [ComponentId; 4] = [
        ComponentId::MarketFeed,
        ComponentId::StrategyRuntime,
        ComponentId::ExecutionAdapter,
        ComponentId::PortfolioLedger,
    ];

    /// Losing one of these leaves the book in an unknown state.
    pub fn is_critical(&self) -> bool {
        matches!(
            self,
            ComponentId::ExecutionAdapter | ComponentId::PortfolioLedger
        )
    }
}

impl fmt::Display for ComponentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ComponentId::MarketFeed => "market-feed",
            ComponentId::StrategyRuntime => "strategy-runtime",
            ComponentId::ExecutionAdapter => "execution-adapter",
            ComponentId::PortfolioLedger => "portfolio-ledger",
        };
        f.write_str(name)
    }
}
