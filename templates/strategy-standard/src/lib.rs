//! Sample strategy plugin: goes long when price breaks above its moving average and
//! flattens when it falls back below. For demonstrations and tests only.

use log::debug;
use serde::Deserialize;
use std::collections::{BTreeMap, VecDeque};
use trading::prelude::*;
use trading::{InstrumentId, OrderFill, StrategyId};

fn default_window() -> usize {
    5
}

fn default_band_bps() -> f64 {
    10.0
}

fn default_quantity() -> f64 {
    10.0
}

#[derive(Debug, Clone, Deserialize)]
pub struct MovingAverageParams {
    #[serde(default = "default_window")]
    pub window: usize,
    /// Distance from the average, in basis points, that counts as a breakout.
    #[serde(default = "default_band_bps")]
    pub band_bps: f64,
    #[serde(default = "default_quantity")]
    pub quantity: f64,
}

impl Default for MovingAverageParams {
    fn default() -> Self {
        Self {
            window: default_window(),
            band_bps: default_band_bps(),
            quantity: default_quantity(),
        }
    }
}

#[derive(Default)]
pub struct MyStrategy {
    params: MovingAverageParams,
    prices: BTreeMap<InstrumentId, VecDeque<f64>>,
    fills_seen: usize,
}

impl MyStrategy {
    pub fn fills_seen(&self) -> usize {
        self.fills_seen
    }
}

impl Strategy for MyStrategy {
    fn name(&self) -> &str {
        "moving-average"
    }

    fn on_init(&mut self, params: &serde_json::Value) -> Result<(), StrategyError> {
        if !params.is_null() {
            self.params = serde_json::from_value(params.clone())
                .map_err(|e| StrategyError::InvalidParams(e.to_string()))?;
        }
        if self.params.window == 0 {
            return Err(StrategyError::InvalidParams("window must be positive".into()));
        }
        Ok(())
    }

    fn on_market_event(
        &mut self,
        event: &MarketEvent,
        portfolio: &PortfolioSnapshot,
    ) -> Result<Vec<Signal>, StrategyError> {
        let window = self.params.window;
        let history = self
            .prices
            .entry(event.instrument_id().clone())
            .or_default();
        history.push_back(event.price());
        if history.len() > window {
            history.pop_front();
        }
        if history.len() < window {
            return Ok(vec![]);
        }

        let mean = history.iter().sum::<f64>() / window as f64;
        let band = mean * self.params.band_bps / 10_000.0;
        let held = portfolio.quantity(event.instrument_id());
        let price = event.price();

        let direction = if price > mean + band && held <= 0.0 {
            Direction::Long
        } else if price < mean - band && held > 0.0 {
            Direction::Flat
        } else {
            return Ok(vec![]);
        };
        debug!(
            "{} {:?} at {} (mean {:.4})",
            event.instrument_id(),
            direction,
            price,
            mean
        );

        Ok(vec![Signal::new(
            StrategyId::new(self.name()),
            event.instrument_id().clone(),
            direction,
            SignalSize::Target(self.params.quantity),
            event.timestamp(),
        )])
    }

    fn on_fill(&mut self, _fill: &OrderFill) -> Result<(), StrategyError> {
        self.fills_seen += 1;
        Ok(())
    }
}

trading::export_strategy!(MyStrategy);
