//! Typed notifications routed to strategies and the operator channel.

use crate::model::execution::FailureKind;
use crate::model::health::HealthStatus;
use crate::model::identity::{ComponentId, InstrumentId, OrderId, StrategyId};
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Info,
    Warning,
    Fatal,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Notification {
    StrategyFault {
        strategy_id: StrategyId,
        detail: String,
        timestamp: i64,
    },
    RiskRejection {
        order_id: OrderId,
        strategy_id: StrategyId,
        reason: String,
        timestamp: i64,
    },
    OrderFailed {
        order_id: OrderId,
        kind: FailureKind,
        reason: String,
        timestamp: i64,
    },
    LateArrivalDrop {
        instrument_id: InstrumentId,
        event_timestamp: i64,
        watermark: i64,
    },
    ComponentStall {
        component: ComponentId,
        timestamp: i64,
    },
    ComponentDeath {
        component: ComponentId,
        timestamp: i64,
    },
    ComponentRecovered {
        component: ComponentId,
        status: HealthStatus,
        timestamp: i64,
    },
    AccountingViolation {
        detail: String,
        timestamp: i64,
    },
}

impl Notification {
    pub fn severity(&self) -> Severity {
        match self {
            Notification::AccountingViolation { .. } => Severity::Fatal,
            Notification::ComponentDeath { component, .. } if component.is_critical() => {
                Severity::Fatal
            }
            Notification::ComponentRecovered { .. } => Severity::Info,
            _ => Severity::Warning,
        }
    }
}

impl fmt::Display for Notification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Notification::StrategyFault {
                strategy_id,
                detail,
                ..
            } => write!(f, "strategy {strategy_id} faulted: {detail}"),
            Notification::RiskRejection {
                order_id,
                strategy_id,
                reason,
                ..
            } => write!(f, "order {order_id} from {strategy_id} rejected: {reason}"),
            Notification::OrderFailed {
                order_id,
                kind,
                reason,
                ..
            } => write!(f, "order {order_id} failed ({kind}): {reason}"),
            Notification::LateArrivalDrop {
                instrument_id,
                event_timestamp,
                watermark,
            } => write!(
                f,
                "late event for {instrument_id} at {event_timestamp} dropped (watermark {watermark})"
            ),
            Notification::ComponentStall { component, .. } => {
                write!(f, "{component} heartbeat late")
            }
            Notification::ComponentDeath { component, .. } => {
                write!(f, "{component} declared dead")
            }
            Notification::ComponentRecovered {
                component, status, ..
            } => write!(f, "{component} back to {status:?}"),
            Notification::AccountingViolation { detail, .. } => {
                write!(f, "accounting violation: {detail}")
            }
        }
    }
}
