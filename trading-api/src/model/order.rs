use crate::model::identity::{InstrumentId, OrderId, StrategyId};
use crate::model::signal::Signal;
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Side {
    Buy,
    Sell,
}

impl Side {
    /// +1 for buys, -1 for sells.
    pub fn sign(&self) -> f64 {
        match self {
            Side::Buy => 1.0,
            Side::Sell => -1.0,
        }
    }

    pub fn from_delta(delta: f64) -> Self {
        if delta >= 0.0 { Side::Buy } else { Side::Sell }
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Side::Buy => f.write_str("BUY"),
            Side::Sell => f.write_str("SELL"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum OrderType {
    Market,
    Limit(f64),
}

/// An order produced by the strategy runtime and admitted (or not) by the risk gate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderRequest {
    id: OrderId,
    strategy_id: StrategyId,
    instrument_id: InstrumentId,
    side: Side,
    quantity: f64,
    order_type: OrderType,
    /// The signal this order was sized from.
    origin: Signal,
    /// Unix milliseconds.
    submitted_at: i64,
}

impl OrderRequest {
    pub fn new(
        id: OrderId,
        side: Side,
        quantity: f64,
        order_type: OrderType,
        origin: Signal,
        submitted_at: i64,
    ) -> Self {
        Self {
            id,
            strategy_id: origin.strategy_id.clone(),
            instrument_id: origin.instrument_id.clone(),
            side,
            quantity,
            order_type,
            origin,
            submitted_at,
        }
    }

    pub fn id(&self) -> OrderId {
        self.id
    }

    pub fn strategy_id(&self) -> &StrategyId {
        &self.strategy_id
    }

    pub fn instrument_id(&self) -> &InstrumentId {
        &self.instrument_id
    }

    pub fn side(&self) -> Side {
        self.side
    }

    pub fn quantity(&self) -> f64 {
        self.quantity
    }

    pub fn order_type(&self) -> OrderType {
        self.order_type
    }

    pub fn limit_price(&self) -> Option<f64> {
        match self.order_type {
            OrderType::Market => None,
            OrderType::Limit(price) => Some(price),
        }
    }

    pub fn origin(&self) -> &Signal {
        &self.origin
    }

    pub fn submitted_at(&self) -> i64 {
        self.submitted_at
    }

    /// Quantity with the side applied: positive for buys.
    pub fn signed_quantity(&self) -> f64 {
        self.side.sign() * self.quantity
    }
}

/// Lifecycle of an order inside the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    /// Created, not yet through the risk gate.
    Pending,
    /// Admitted and handed to the execution adapter.
    Submitted,
    PartiallyFilled,
    Filled,
    /// Refused by the risk gate.
    Rejected,
    /// Refused by the venue or lost to a network fault.
    Failed,
    Cancelled,
}

impl OrderStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            OrderStatus::Filled
                | OrderStatus::Rejected
                | OrderStatus::Failed
                | OrderStatus::Cancelled
        )
    }

    pub fn can_transition_to(&self, next: OrderStatus) -> bool {
        use OrderStatus::*;
        match (self, next) {
            (Pending, Submitted) | (Pending, Rejected) => true,
            (Submitted, PartiallyFilled | Filled | Failed | Cancelled) => true,
            (PartiallyFilled, PartiallyFilled | Filled | Failed | Cancelled) => true,
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn terminal_states_are_sinks() {
        for status in [
            OrderStatus::Filled,
            OrderStatus::Rejected,
            OrderStatus::Failed,
            OrderStatus::Cancelled,
        ] {
            assert!(status.is_terminal());
            assert!(!status.can_transition_to(OrderStatus::Submitted));
            assert!(!status.can_transition_to(OrderStatus::PartiallyFilled));
        }
    }

    #[test]
    fn rejected_only_from_pending() {
        assert!(OrderStatus::Pending.can_transition_to(OrderStatus::Rejected));
        assert!(!OrderStatus::Submitted.can_transition_to(OrderStatus::Rejected));
        assert!(!OrderStatus::Pending.can_transition_to(OrderStatus::Filled));
    }
}
