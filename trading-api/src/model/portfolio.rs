use crate::model::identity::InstrumentId;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Holding in a single instrument. Owned by the portfolio ledger.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub instrument_id: InstrumentId,
    /// Signed: negative for short.
    pub quantity: f64,
    pub average_cost: f64,
    /// Latest mark.
    pub last_price: f64,
    /// Realized P&L including fees paid on this instrument.
    pub realized_pnl: f64,
    /// Total P&L of this instrument at the start of the trading day.
    pub day_start_pnl: f64,
}

impl Position {
    pub fn flat(instrument_id: InstrumentId, last_price: f64) -> Self {
        Self {
            instrument_id,
            quantity: 0.0,
            average_cost: 0.0,
            last_price,
            realized_pnl: 0.0,
            day_start_pnl: 0.0,
        }
    }

    pub fn is_flat(&self) -> bool {
        self.quantity.abs() <= f64::EPSILON
    }

    pub fn market_value(&self) -> f64 {
        self.quantity * self.last_price
    }

    /// Gross exposure at the latest mark.
    pub fn notional(&self) -> f64 {
        self.market_value().abs()
    }

    pub fn unrealized_pnl(&self) -> f64 {
        self.quantity * (self.last_price - self.average_cost)
    }

    pub fn total_pnl(&self) -> f64 {
        self.realized_pnl + self.unrealized_pnl()
    }

    pub fn daily_pnl(&self) -> f64 {
        self.total_pnl() - self.day_start_pnl
    }
}

/// Immutable view of the portfolio at one point in time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PortfolioSnapshot {
    /// Unix milliseconds.
    pub timestamp: i64,
    pub initial_cash: f64,
    pub cash: f64,
    pub positions: BTreeMap<InstrumentId, Position>,
    pub realized_pnl: f64,
    pub unrealized_pnl: f64,
    pub fees_paid: f64,
    /// Equity change since the start of the current UTC trading day.
    pub daily_pnl: f64,
}

impl PortfolioSnapshot {
    pub fn empty(initial_cash: f64) -> Self {
        Self {
            timestamp: 0,
            initial_cash,
            cash: initial_cash,
            positions: BTreeMap::new(),
            realized_pnl: 0.0,
            unrealized_pnl: 0.0,
            fees_paid: 0.0,
            daily_pnl: 0.0,
        }
    }

    pub fn position(&self, instrument_id: &InstrumentId) -> Option<&Position> {
        self.positions.get(instrument_id)
    }

    pub fn quantity(&self, instrument_id: &InstrumentId) -> f64 {
        self.position(instrument_id).map_or(0.0, |p| p.quantity)
    }

    pub fn mark(&self, instrument_id: &InstrumentId) -> Option<f64> {
        self.position(instrument_id)
            .map(|p| p.last_price)
            .filter(|price| *price > 0.0)
    }

    pub fn position_value(&self) -> f64 {
        self.positions.values().map(Position::market_value).sum()
    }

    pub fn gross_exposure(&self) -> f64 {
        self.positions.values().map(Position::notional).sum()
    }

    pub fn equity(&self) -> f64 {
        self.cash + self.position_value()
    }

    /// Residual of cash + position value against initial cash + realized + unrealized P&L.
    pub fn accounting_residual(&self) -> f64 {
        self.equity() - (self.initial_cash + self.realized_pnl + self.unrealized_pnl)
    }

    /// Whether the accounting identity holds within a relative tolerance.
    pub fn reconciles(&self, tolerance: f64) -> bool {
        let scale = self.equity().abs().max(1.0);
        self.accounting_residual().abs() <= tolerance * scale
    }
}
