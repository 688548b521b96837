use crate::model::identity::{FillId, InstrumentId, OrderId};
use crate::model::order::Side;
use serde::{Deserialize, Serialize};
use std::fmt;

/// A confirmed execution of some or all of an order. Produced only by an execution adapter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderFill {
    pub fill_id: FillId,
    pub order_id: OrderId,
    pub instrument_id: InstrumentId,
    pub side: Side,
    pub filled_quantity: f64,
    pub fill_price: f64,
    /// Total charges for this fill (commission plus taxes).
    pub fee: f64,
    /// Unix milliseconds.
    pub fill_timestamp: i64,
    /// Quantity of the order still open after this fill.
    pub remaining_quantity: f64,
}

impl OrderFill {
    pub fn new(
        fill_id: FillId,
        order_id: OrderId,
        instrument_id: InstrumentId,
        side: Side,
        fill_timestamp: i64,
    ) -> Self {
        Self {
            fill_id,
            order_id,
            instrument_id,
            side,
            filled_quantity: 0.0,
            fill_price: 0.0,
            fee: 0.0,
            fill_timestamp,
            remaining_quantity: 0.0,
        }
    }

    pub fn with_fill(mut self, quantity: f64, price: f64, remaining: f64) -> Self {
        self.filled_quantity = quantity;
        self.fill_price = price;
        self.remaining_quantity = remaining;
        self
    }

    pub fn with_fee(mut self, fee: f64) -> Self {
        self.fee = fee;
        self
    }

    pub fn notional(&self) -> f64 {
        self.filled_quantity * self.fill_price
    }

    pub fn signed_quantity(&self) -> f64 {
        self.side.sign() * self.filled_quantity
    }

    pub fn is_final(&self) -> bool {
        self.remaining_quantity <= f64::EPSILON
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// The venue refused the order.
    VenueRejected,
    /// The venue could not be reached.
    Network,
    /// The broker did not answer in time. The order may still be live.
    Timeout,
    /// A fill would have pushed the executed total past the order quantity.
    Overfill,
    /// A fill arrived for an order the engine never admitted.
    Uncorrelated,
    /// The order was withdrawn before it completed.
    Cancelled,
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            FailureKind::VenueRejected => "venue rejected",
            FailureKind::Network => "network",
            FailureKind::Timeout => "timeout",
            FailureKind::Overfill => "overfill",
            FailureKind::Uncorrelated => "uncorrelated",
            FailureKind::Cancelled => "cancelled",
        };
        f.write_str(s)
    }
}

/// Submission or correlation failure reported by an execution adapter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderFailure {
    pub order_id: OrderId,
    pub kind: FailureKind,
    pub reason: String,
    pub timestamp: i64,
}

impl OrderFailure {
    pub fn new(order_id: OrderId, kind: FailureKind, reason: impl Into<String>, timestamp: i64) -> Self {
        Self {
            order_id,
            kind,
            reason: reason.into(),
            timestamp,
        }
    }

    /// Whether the engine should stop tracking the order.
    pub fn closes_order(&self) -> bool {
        !matches!(
            self.kind,
            FailureKind::Timeout | FailureKind::Overfill | FailureKind::Uncorrelated
        )
    }
}

/// Everything an execution adapter can report back to the engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ExecutionReport {
    Fill(OrderFill),
    Failed(OrderFailure),
}

impl ExecutionReport {
    pub fn order_id(&self) -> OrderId {
        match self {
            ExecutionReport::Fill(fill) => fill.order_id,
            ExecutionReport::Failed(failure) => failure.order_id,
        }
    }
}

/// Raw fill notification as delivered by a broker gateway.
///
/// The fill id and fee are optional because not every venue supplies them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GatewayFill {
    pub order_id: OrderId,
    pub fill_id: Option<String>,
    pub quantity: f64,
    pub price: f64,
    pub fee: Option<f64>,
    pub timestamp: i64,
}

/// Messages flowing from a broker gateway to the live execution adapter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum GatewayEvent {
    Fill(GatewayFill),
    Rejected {
        order_id: OrderId,
        reason: String,
        timestamp: i64,
    },
    Disconnected {
        reason: String,
    },
}
