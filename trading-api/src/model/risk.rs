use crate::model::identity::{InstrumentId, StrategyId};
use serde::{Deserialize, Serialize};
use std::fmt;

/// What a limit applies to. Variant order is also evaluation order.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskScope {
    Global,
    Instrument(InstrumentId),
    Strategy(StrategyId),
}

impl RiskScope {
    pub fn rank(&self) -> u8 {
        match self {
            RiskScope::Global => 0,
            RiskScope::Instrument(_) => 1,
            RiskScope::Strategy(_) => 2,
        }
    }

    pub fn applies_to(&self, instrument: &InstrumentId, strategy: &StrategyId) -> bool {
        match self {
            RiskScope::Global => true,
            RiskScope::Instrument(id) => id == instrument,
            RiskScope::Strategy(id) => id == strategy,
        }
    }
}

impl fmt::Display for RiskScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RiskScope::Global => f.write_str("global"),
            RiskScope::Instrument(id) => write!(f, "instrument:{id}"),
            RiskScope::Strategy(id) => write!(f, "strategy:{id}"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskMetric {
    MaxPosition,
    MaxNotional,
    MaxDailyLoss,
}

impl fmt::Display for RiskMetric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RiskMetric::MaxPosition => "max_position",
            RiskMetric::MaxNotional => "max_notional",
            RiskMetric::MaxDailyLoss => "max_daily_loss",
        };
        f.write_str(s)
    }
}

/// A single risk limit. Loaded at startup, tightened at runtime, never widened.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskLimit {
    pub scope: RiskScope,
    pub metric: RiskMetric,
    pub threshold: f64,
}

impl RiskLimit {
    pub fn new(scope: RiskScope, metric: RiskMetric, threshold: f64) -> Self {
        Self {
            scope,
            metric,
            threshold,
        }
    }

    pub fn max_position(scope: RiskScope, threshold: f64) -> Self {
        Self::new(scope, RiskMetric::MaxPosition, threshold)
    }

    pub fn max_notional(scope: RiskScope, threshold: f64) -> Self {
        Self::new(scope, RiskMetric::MaxNotional, threshold)
    }

    pub fn max_daily_loss(scope: RiskScope, threshold: f64) -> Self {
        Self::new(scope, RiskMetric::MaxDailyLoss, threshold)
    }

    pub fn same_key(&self, scope: &RiskScope, metric: RiskMetric) -> bool {
        &self.scope == scope && self.metric == metric
    }

    /// Lowers the threshold. Returns false, leaving the limit unchanged, if `threshold`
    /// would widen it.
    pub fn tighten(&mut self, threshold: f64) -> bool {
        if threshold.is_nan() || threshold > self.threshold {
            return false;
        }
        self.threshold = threshold;
        true
    }
}

impl fmt::Display for RiskLimit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} <= {}", self.scope, self.metric, self.threshold)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tighten_never_widens() {
        let mut limit = RiskLimit::max_position(RiskScope::Global, 100.0);
        assert!(!limit.tighten(150.0));
        assert_eq!(limit.threshold, 100.0);
        assert!(limit.tighten(40.0));
        assert_eq!(limit.threshold, 40.0);
    }

    #[test]
    fn scope_ordering_is_global_instrument_strategy() {
        let mut scopes = vec![
            RiskScope::Strategy(StrategyId::new("a")),
            RiskScope::Global,
            RiskScope::Instrument(InstrumentId::new("z")),
        ];
        scopes.sort_by_key(RiskScope::rank);
        assert_eq!(scopes[0], RiskScope::Global);
        assert!(matches!(scopes[1], RiskScope::Instrument(_)));
        assert!(matches!(scopes[2], RiskScope::Strategy(_)));
    }

    #[test]
    fn scope_deserializes_from_tagged_json() {
        let limit: RiskLimit = serde_json::from_str(
            r#"{"scope":{"instrument":"AAPL"},"metric":"max_position","threshold":100.0}"#,
        )
        .unwrap();
        assert_eq!(limit.scope, RiskScope::Instrument(InstrumentId::new("AAPL")));
        let global: RiskScope = serde_json::from_str(r#""global""#).unwrap();
        assert_eq!(global, RiskScope::Global);
    }
}
