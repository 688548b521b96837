//! The plugin contract through which all trading logic enters the engine.

use crate::model::execution::{OrderFailure, OrderFill};
use crate::model::market_data::MarketEvent;
use crate::model::order::{OrderRequest, OrderType, Side};
use crate::model::portfolio::PortfolioSnapshot;
use crate::model::signal::Signal;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StrategyError {
    #[error("invalid strategy parameters: {0}")]
    InvalidParams(String),
    #[error("strategy not initialised")]
    NotInitialised,
    #[error("{0}")]
    Logic(String),
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Result of turning a signal into an order quantity.
#[derive(Debug, Clone, PartialEq)]
pub enum SizingDecision {
    Order {
        side: Side,
        quantity: f64,
        order_type: OrderType,
    },
    /// No order. The reason is recorded so that no signal disappears silently.
    Skip(String),
}

/// Sizing used unless a strategy overrides [`Strategy::size`]: trade the difference
/// between the signal's target and the ledger's current position.
pub fn default_sizing(signal: &Signal, portfolio: &PortfolioSnapshot) -> SizingDecision {
    let held = portfolio.quantity(&signal.instrument_id);
    let delta = signal.required_delta(held);
    if !delta.is_finite() {
        return SizingDecision::Skip(format!("non-finite size {delta}"));
    }
    if delta.abs() <= f64::EPSILON {
        return SizingDecision::Skip("already at target".to_string());
    }
    let order_type = match signal.limit_price {
        Some(price) => OrderType::Limit(price),
        None => OrderType::Market,
    };
    SizingDecision::Order {
        side: Side::from_delta(delta),
        quantity: delta.abs(),
        order_type,
    }
}

/// A pluggable strategy hosted by the strategy runtime.
///
/// `on_market_event` only sees the portfolio snapshot the engine hands it and must not
/// reach for any other shared state.
pub trait Strategy: Send {
    fn name(&self) -> &str;

    /// Called once before the first event, with the parameters from the run configuration.
    fn on_init(&mut self, params: &serde_json::Value) -> Result<(), StrategyError> {
        let _ = params;
        Ok(())
    }

    fn on_market_event(
        &mut self,
        event: &MarketEvent,
        portfolio: &PortfolioSnapshot,
    ) -> Result<Vec<Signal>, StrategyError>;

    fn on_fill(&mut self, fill: &OrderFill) -> Result<(), StrategyError> {
        let _ = fill;
        Ok(())
    }

    fn on_order_rejected(&mut self, order: &OrderRequest, reason: &str) {
        let _ = (order, reason);
    }

    fn on_order_failed(&mut self, failure: &OrderFailure) {
        let _ = failure;
    }

    fn on_shutdown(&mut self) {}

    /// Converts a signal into an order quantity. Must always return a decision.
    fn size(&self, signal: &Signal, portfolio: &PortfolioSnapshot) -> SizingDecision {
        default_sizing(signal, portfolio)
    }
}

impl Strategy for Box<dyn Strategy> {
    fn name(&self) -> &str {
        (**self).name()
    }

    fn on_init(&mut self, params: &serde_json::Value) -> Result<(), StrategyError> {
        (**self).on_init(params)
    }

    fn on_market_event(
        &mut self,
        event: &MarketEvent,
        portfolio: &PortfolioSnapshot,
    ) -> Result<Vec<Signal>, StrategyError> {
        (**self).on_market_event(event, portfolio)
    }

    fn on_fill(&mut self, fill: &OrderFill) -> Result<(), StrategyError> {
        (**self).on_fill(fill)
    }

    fn on_order_rejected(&mut self, order: &OrderRequest, reason: &str) {
        (**self).on_order_rejected(order, reason)
    }

    fn on_order_failed(&mut self, failure: &OrderFailure) {
        (**self).on_order_failed(failure)
    }

    fn on_shutdown(&mut self) {
        (**self).on_shutdown()
    }

    fn size(&self, signal: &Signal, portfolio: &PortfolioSnapshot) -> SizingDecision {
        (**self).size(signal, portfolio)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::identity::{InstrumentId, StrategyId};
    use crate::model::portfolio::Position;
    use crate::model::signal::{Direction, SignalSize};

    fn snapshot_holding(quantity: f64) -> PortfolioSnapshot {
        let mut snapshot = PortfolioSnapshot::empty(1_000.0);
        let id = InstrumentId::new("X");
        let mut position = Position::flat(id.clone(), 10.0);
        position.quantity = quantity;
        position.average_cost = 10.0;
        snapshot.positions.insert(id, position);
        snapshot
    }

    #[test]
    fn default_sizing_trades_the_difference() {
        let signal = Signal::new(
            StrategyId::new("s"),
            InstrumentId::new("X"),
            Direction::Long,
            SignalSize::Target(30.0),
            0,
        );
        let decision = default_sizing(&signal, &snapshot_holding(10.0));
        assert_eq!(
            decision,
            SizingDecision::Order {
                side: Side::Buy,
                quantity: 20.0,
                order_type: OrderType::Market
            }
        );
    }

    #[test]
    fn default_sizing_skips_when_at_target() {
        let signal = Signal::new(
            StrategyId::new("s"),
            InstrumentId::new("X"),
            Direction::Flat,
            SignalSize::Target(0.0),
            0,
        );
        assert!(matches!(
            default_sizing(&signal, &snapshot_holding(0.0)),
            SizingDecision::Skip(_)
        ));
    }
}
