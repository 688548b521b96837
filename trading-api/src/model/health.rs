use crate::model::identity::ComponentId;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HealthStatus {
    Alive,
    Degraded,
    Dead,
}

/// Liveness signal. Ephemeral: the watchdog keeps only the latest per component.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Heartbeat {
    pub component: ComponentId,
    /// Unix milliseconds.
    pub timestamp: i64,
    pub status: HealthStatus,
}

impl Heartbeat {
    pub fn alive(component: ComponentId, timestamp: i64) -> Self {
        Self {
            component,
            timestamp,
            status: HealthStatus::Alive,
        }
    }

    pub fn degraded(component: ComponentId, timestamp: i64) -> Self {
        Self {
            component,
            timestamp,
            status: HealthStatus::Degraded,
        }
    }
}
