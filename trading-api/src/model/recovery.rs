//! Persisted recovery state: a portfolio snapshot plus everything still working at the venue.

use crate::model::identity::{ComponentId, FillId, OrderId};
use crate::model::order::{OrderRequest, OrderStatus};
use crate::model::portfolio::PortfolioSnapshot;
use serde::{Deserialize, Serialize};
use std::fmt;

pub const RECOVERY_STATE_VERSION: u32 = 1;

/// Why a snapshot was taken.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SnapshotReason {
    Periodic,
    ComponentDeath(ComponentId),
    Operator,
    EndOfRun,
}

/// An admitted order that has not reached a terminal state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PendingOrder {
    pub request: OrderRequest,
    pub status: OrderStatus,
    pub filled_quantity: f64,
    /// Fills already applied for this order, so redelivered ones are recognised after restore.
    #[serde(default)]
    pub fill_ids: Vec<FillId>,
}

impl PendingOrder {
    pub fn remaining(&self) -> f64 {
        (self.request.quantity() - self.filled_quantity).max(0.0)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecoveryState {
    pub version: u32,
    pub run_id: String,
    /// Logical time of the snapshot, Unix milliseconds.
    pub taken_at: i64,
    pub reason: SnapshotReason,
    pub snapshot: PortfolioSnapshot,
    pub pending_orders: Vec<PendingOrder>,
    /// Highest order id issued before the snapshot, terminal orders included.
    #[serde(default)]
    pub last_order_id: Option<OrderId>,
}

impl RecoveryState {
    pub fn new(
        run_id: impl Into<String>,
        taken_at: i64,
        reason: SnapshotReason,
        snapshot: PortfolioSnapshot,
        pending_orders: Vec<PendingOrder>,
    ) -> Self {
        Self {
            version: RECOVERY_STATE_VERSION,
            run_id: run_id.into(),
            taken_at,
            reason,
            snapshot,
            pending_orders,
            last_order_id: None,
        }
    }

    pub fn with_last_order_id(mut self, id: Option<OrderId>) -> Self {
        self.last_order_id = id;
        self
    }

    /// The id a resumed run must not go below.
    pub fn highest_order_id(&self) -> Option<OrderId> {
        self.pending_orders
            .iter()
            .map(|o| o.request.id())
            .chain(self.last_order_id)
            .max()
    }

    pub fn key(&self) -> SnapshotKey {
        SnapshotKey::new(self.run_id.clone(), self.taken_at)
    }
}

/// Lookup key for a stored recovery state.
///
/// `seq` tells apart states of one run taken at the same logical time; stores
/// assign it on save.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct SnapshotKey {
    pub run_id: String,
    pub taken_at: i64,
    #[serde(default)]
    pub seq: u32,
}

impl SnapshotKey {
    pub fn new(run_id: impl Into<String>, taken_at: i64) -> Self {
        Self {
            run_id: run_id.into(),
            taken_at,
            seq: 0,
        }
    }

    pub fn with_seq(mut self, seq: u32) -> Self {
        self.seq = seq;
        self
    }
}

impl fmt::Display for SnapshotKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.seq == 0 {
            write!(f, "{}@{}", self.run_id, self.taken_at)
        } else {
            write!(f, "{}@{}.{}", self.run_id, self.taken_at, self.seq)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn states_without_an_id_floor_still_load() {
        let state = RecoveryState::new(
            "run",
            10,
            SnapshotReason::Periodic,
            PortfolioSnapshot::empty(500.0),
            Vec::new(),
        )
        .with_last_order_id(Some(OrderId::new(4)));
        let mut json = serde_json::to_value(&state).unwrap();
        json.as_object_mut().unwrap().remove("last_order_id");

        let loaded: RecoveryState = serde_json::from_value(json).unwrap();
        assert_eq!(loaded.last_order_id, None);
        assert_eq!(loaded.highest_order_id(), None);
        assert_eq!(state.highest_order_id(), Some(OrderId::new(4)));
    }

    #[test]
    fn keys_sort_by_time_then_sequence() {
        let mut keys = vec![
            SnapshotKey::new("run", 20),
            SnapshotKey::new("run", 10).with_seq(1),
            SnapshotKey::new("run", 10),
        ];
        keys.sort();
        assert_eq!(keys[0].to_string(), "run@10");
        assert_eq!(keys[1].to_string(), "run@10.1");
        assert_eq!(keys[2].to_string(), "run@20");
    }
}
