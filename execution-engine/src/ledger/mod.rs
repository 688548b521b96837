//! Portfolio ledger: the single writer of cash and positions.
//!
//! Only the engine's serializing step calls `apply_fill` and `mark`. Everyone else
//! reads immutable `PortfolioSnapshot`s.

pub mod fees;

pub use fees::FeeSchedule;

use crate::error::{EngineError, EngineResult};
use chrono::{DateTime, NaiveDate};
use log::{debug, error, info};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use trading::{
    FillId, InstrumentId, MarketEvent, OrderFill, PendingOrder, PortfolioSnapshot, Position,
};

/// Relative tolerance of the accounting identity check.
pub const ACCOUNTING_TOLERANCE: f64 = 1e-9;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FillOutcome {
    Applied,
    /// Same fill id seen before; state unchanged.
    Duplicate,
}

pub struct PortfolioLedger {
    initial_cash: f64,
    cash: f64,
    positions: BTreeMap<InstrumentId, Position>,
    fees_paid: f64,
    applied_fills: BTreeSet<FillId>,
    timestamp: i64,
    trading_day: Option<NaiveDate>,
    day_start_equity: f64,
}

impl PortfolioLedger {
    pub fn new(initial_cash: f64) -> Self {
        Self {
            initial_cash,
            cash: initial_cash,
            positions: BTreeMap::new(),
            fees_paid: 0.0,
            applied_fills: BTreeSet::new(),
            timestamp: 0,
            trading_day: None,
            day_start_equity: initial_cash,
        }
    }

    /// Rebuilds a ledger from a persisted snapshot and the orders still open at the time.
    pub fn restore(snapshot: &PortfolioSnapshot, pending: &[PendingOrder]) -> EngineResult<Self> {
        let ledger = Self {
            initial_cash: snapshot.initial_cash,
            cash: snapshot.cash,
            positions: snapshot.positions.clone(),
            fees_paid: snapshot.fees_paid,
            applied_fills: pending
                .iter()
                .flat_map(|p| p.fill_ids.iter().cloned())
                .collect(),
            timestamp: snapshot.timestamp,
            trading_day: trading_day(snapshot.timestamp),
            day_start_equity: snapshot.equity() - snapshot.daily_pnl,
        };
        ledger.check_identity()?;
        info!(
            "Ledger restored at {} with {} positions, cash {:.2}",
            snapshot.timestamp,
            ledger.positions.len(),
            ledger.cash
        );
        Ok(ledger)
    }

    pub fn cash(&self) -> f64 {
        self.cash
    }

    pub fn position(&self, instrument_id: &InstrumentId) -> Option<&Position> {
        self.positions.get(instrument_id)
    }

    pub fn has_applied(&self, fill_id: &FillId) -> bool {
        self.applied_fills.contains(fill_id)
    }

    fn equity(&self) -> f64 {
        self.cash + self.positions.values().map(Position::market_value).sum::<f64>()
    }

    /// Moves the ledger to `timestamp`, rolling the trading day at UTC midnight.
    fn advance(&mut self, timestamp: i64) {
        if timestamp > self.timestamp {
            self.timestamp = timestamp;
        }
        let day = trading_day(timestamp);
        if day.is_some() && day > self.trading_day {
            if self.trading_day.is_some() {
                debug!("Trading day rolled to {:?}", day);
            }
            self.trading_day = day;
            self.day_start_equity = self.equity();
            for position in self.positions.values_mut() {
                position.day_start_pnl = position.total_pnl();
            }
        }
    }

    /// Marks the instrument to the event's price.
    pub fn mark(&mut self, event: &MarketEvent) {
        self.advance(event.timestamp());
        let price = event.price();
        self.positions
            .entry(event.instrument_id().clone())
            .and_modify(|p| p.last_price = price)
            .or_insert_with(|| Position::flat(event.instrument_id().clone(), price));
    }

    /// Applies a fill to cash and the position, then checks the accounting identity.
    ///
    /// A fill id already applied is ignored. An identity failure is fatal.
    pub fn apply_fill(&mut self, fill: &OrderFill) -> EngineResult<FillOutcome> {
        if self.applied_fills.contains(&fill.fill_id) {
            debug!("Duplicate fill {} ignored", fill.fill_id);
            return Ok(FillOutcome::Duplicate);
        }
        if !fill.filled_quantity.is_finite()
            || fill.filled_quantity <= 0.0
            || !fill.fill_price.is_finite()
            || fill.fill_price <= 0.0
            || !fill.fee.is_finite()
        {
            return Err(self.violation(format!(
                "fill {} carries invalid values (qty {}, price {}, fee {})",
                fill.fill_id, fill.filled_quantity, fill.fill_price, fill.fee
            )));
        }
        self.advance(fill.fill_timestamp);

        let delta = fill.signed_quantity();
        let price = fill.fill_price;
        let position = self
            .positions
            .entry(fill.instrument_id.clone())
            .or_insert_with(|| Position::flat(fill.instrument_id.clone(), price));
        if position.last_price <= 0.0 {
            position.last_price = price;
        }

        let held = position.quantity;
        let same_direction = held == 0.0 || held.signum() == delta.signum();
        if same_direction {
            let quantity = held + delta;
            position.average_cost =
                (held.abs() * position.average_cost + delta.abs() * price) / quantity.abs();
            position.quantity = quantity;
        } else {
            let closing = delta.abs().min(held.abs());
            position.realized_pnl += closing * (price - position.average_cost) * held.signum();
            let quantity = held + delta;
            if delta.abs() > held.abs() {
                position.average_cost = price;
            } else if quantity.abs() <= f64::EPSILON {
                position.average_cost = 0.0;
            }
            position.quantity = if quantity.abs() <= f64::EPSILON {
                0.0
            } else {
                quantity
            };
        }
        position.realized_pnl -= fill.fee;

        self.cash -= delta * price + fill.fee;
        self.fees_paid += fill.fee;
        self.applied_fills.insert(fill.fill_id.clone());

        self.check_identity()?;
        Ok(FillOutcome::Applied)
    }

    /// cash == initial + realized - sum(quantity * average cost)
    pub fn check_identity(&self) -> EngineResult<()> {
        let realized: f64 = self.positions.values().map(|p| p.realized_pnl).sum();
        let cost_basis: f64 = self
            .positions
            .values()
            .map(|p| p.quantity * p.average_cost)
            .sum();
        let expected = self.initial_cash + realized - cost_basis;
        let scale = self.cash.abs().max(expected.abs()).max(1.0);
        if (self.cash - expected).abs() > ACCOUNTING_TOLERANCE * scale {
            return Err(self.violation(format!(
                "cash {:.6} does not reconcile with expected {:.6}",
                self.cash, expected
            )));
        }
        Ok(())
    }

    fn violation(&self, detail: String) -> EngineError {
        error!("Accounting violation at {}: {}", self.timestamp, detail);
        EngineError::AccountingViolation(detail)
    }

    pub fn snapshot(&self) -> Arc<PortfolioSnapshot> {
        let realized_pnl = self.positions.values().map(|p| p.realized_pnl).sum();
        let unrealized_pnl = self.positions.values().map(Position::unrealized_pnl).sum();
        Arc::new(PortfolioSnapshot {
            timestamp: self.timestamp,
            initial_cash: self.initial_cash,
            cash: self.cash,
            positions: self.positions.clone(),
            realized_pnl,
            unrealized_pnl,
            fees_paid: self.fees_paid,
            daily_pnl: self.equity() - self.day_start_equity,
        })
    }
}

fn trading_day(timestamp: i64) -> Option<NaiveDate> {
    DateTime::from_timestamp_millis(timestamp).map(|dt| dt.date_naive())
}

#[cfg(test)]
mod tests;
