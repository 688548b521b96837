use crate::model::identity::{InstrumentId, StrategyId};
use serde::{Deserialize, Serialize};

/// Which way the strategy wants to be positioned.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    Long,
    Short,
    /// Close whatever is held. Any size carried is ignored.
    Flat,
}

/// How much the strategy wants.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SignalSize {
    /// Absolute position magnitude to end up with.
    Target(f64),
    /// Magnitude to add in the signal's direction.
    Delta(f64),
}

/// A strategy's trading intent. Not itself an order: sizing turns it into one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Signal {
    pub strategy_id: StrategyId,
    pub instrument_id: InstrumentId,
    pub direction: Direction,
    pub size: SignalSize,
    /// Strategy-assigned timestamp, Unix milliseconds.
    pub timestamp: i64,
    /// Optional limit price carried through to the order.
    #[serde(default)]
    pub limit_price: Option<f64>,
    #[serde(default)]
    pub note: Option<String>,
}

impl Signal {
    pub fn new(
        strategy_id: StrategyId,
        instrument_id: InstrumentId,
        direction: Direction,
        size: SignalSize,
        timestamp: i64,
    ) -> Self {
        Self {
            strategy_id,
            instrument_id,
            direction,
            size,
            timestamp,
            limit_price: None,
            note: None,
        }
    }

    pub fn with_limit(mut self, price: f64) -> Self {
        self.limit_price = Some(price);
        self
    }

    pub fn with_note(mut self, note: impl Into<String>) -> Self {
        self.note = Some(note.into());
        self
    }

    /// Signed quantity this signal asks for, given the position currently held.
    ///
    /// Returns the delta to trade: positive buys, negative sells.
    pub fn required_delta(&self, current_quantity: f64) -> f64 {
        match (self.direction, self.size) {
            (Direction::Flat, _) => -current_quantity,
            (Direction::Long, SignalSize::Target(q)) => q.abs() - current_quantity,
            (Direction::Short, SignalSize::Target(q)) => -q.abs() - current_quantity,
            (Direction::Long, SignalSize::Delta(q)) => q.abs(),
            (Direction::Short, SignalSize::Delta(q)) => -q.abs(),
        }
    }
}
