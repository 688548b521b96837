use crate::strategy::StrategyOutput;
use serde::{Deserialize, Serialize};
use trading::{
    ComponentId, ExecutionReport, MarketEvent, Notification, RiskMetric, RiskScope, StrategyId,
};

/// Operator commands accepted by a live engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "command", rename_all = "snake_case")]
pub enum AdminCommand {
    /// Graceful stop: no new market events, drain in-flight fills, final snapshot.
    Shutdown,
    /// Clears a Dead component. Admission reopens once nothing is dead.
    Recover { component: ComponentId },
    ResumeStrategy { id: StrategyId },
    ClearKillSwitch,
    TightenLimit {
        scope: RiskScope,
        metric: RiskMetric,
        threshold: f64,
    },
    /// Persists a snapshot now.
    Snapshot,
}

/// Everything the serializing engine step consumes, in arrival order.
#[derive(Debug)]
pub enum Intake {
    Market(MarketEvent),
    LateArrival(Notification),
    Strategy(StrategyOutput),
    Execution(ExecutionReport),
    /// Housekeeping beat: heartbeat and periodic snapshot.
    Tick,
    /// A critical component was confirmed dead.
    Halt(ComponentId),
    Command(AdminCommand),
    /// The market source ended.
    FeedClosed,
}
