use super::ExecutionAdapter;
use crate::ledger::FeeSchedule;
use log::debug;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use trading::{
    ComponentId, EventKind, ExecutionReport, FailureKind, FillId, Heartbeat, MarketEvent,
    OrderFailure, OrderFill, OrderId, OrderRequest, Side,
};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SimulationConfig {
    pub fees: FeeSchedule,
    pub slippage_bps: f64,
    pub participation_rate: f64,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            fees: FeeSchedule::zero(),
            slippage_bps: 0.0,
            participation_rate: 1.0,
        }
    }
}

struct WorkingOrder {
    request: OrderRequest,
    filled: f64,
    fills: u32,
}

impl WorkingOrder {
    fn remaining(&self) -> f64 {
        self.request.quantity() - self.filled
    }
}

/// Deterministic fill model driven by the market event stream.
///
/// An order fills on the next event for its instrument: ticks fill buys at the ask
/// and sells at the bid, bars fill at the open. Price moves against the order by
/// the configured slippage and the fill size is capped by the event's volume.
pub struct SimulatedExchange {
    config: SimulationConfig,
    working: BTreeMap<OrderId, WorkingOrder>,
}

impl SimulatedExchange {
    pub fn new(config: SimulationConfig) -> Self {
        Self {
            config,
            working: BTreeMap::new(),
        }
    }

    fn execution_price(&self, side: Side, event: &MarketEvent) -> f64 {
        let raw = match (event.kind(), side) {
            (EventKind::Tick { ask, .. }, Side::Buy) => *ask,
            (EventKind::Tick { bid, .. }, Side::Sell) => *bid,
            (EventKind::Bar { open, .. }, _) => *open,
        };
        raw * (1.0 + side.sign() * self.config.slippage_bps / 10_000.0)
    }

    fn liquidity(&self, event: &MarketEvent) -> f64 {
        if event.volume() > 0.0 && self.config.participation_rate > 0.0 {
            event.volume() * self.config.participation_rate
        } else {
            f64::INFINITY
        }
    }
}

impl ExecutionAdapter for SimulatedExchange {
    fn submit(&mut self, order: &OrderRequest) -> Vec<ExecutionReport> {
        if !order.quantity().is_finite() || order.quantity() <= 0.0 {
            return vec![ExecutionReport::Failed(OrderFailure::new(
                order.id(),
                FailureKind::VenueRejected,
                format!("invalid quantity {}", order.quantity()),
                order.submitted_at(),
            ))];
        }
        self.working.insert(
            order.id(),
            WorkingOrder {
                request: order.clone(),
                filled: 0.0,
                fills: 0,
            },
        );
        Vec::new()
    }

    fn on_market_event(&mut self, event: &MarketEvent) -> Vec<ExecutionReport> {
        let mut available = self.liquidity(event);
        let mut reports = Vec::new();
        let mut done = Vec::new();

        let ids: Vec<OrderId> = self
            .working
            .iter()
            .filter(|(_, w)| w.request.instrument_id() == event.instrument_id())
            .map(|(id, _)| *id)
            .collect();

        for id in ids {
            if available <= 0.0 {
                break;
            }
            let Some(side) = self.working.get(&id).map(|w| w.request.side()) else {
                continue;
            };
            let price = self.execution_price(side, event);
            let fees = self.config.fees;
            let Some(working) = self.working.get_mut(&id) else {
                continue;
            };
            let marketable = match working.request.limit_price() {
                None => true,
                Some(limit) => match side {
                    Side::Buy => price <= limit,
                    Side::Sell => price >= limit,
                },
            };
            if !marketable {
                continue;
            }

            let quantity = working.remaining().min(available);
            available -= quantity;
            working.filled += quantity;
            working.fills += 1;
            let remaining = working.remaining().max(0.0);

            let fill = OrderFill::new(
                FillId::new(format!("SIM-{}-{}", id.value(), working.fills)),
                id,
                event.instrument_id().clone(),
                side,
                event.timestamp(),
            )
            .with_fill(quantity, price, remaining)
            .with_fee(fees.fee(side, quantity, price));
            debug!(
                "Simulated fill {} for order {}: {} {} @ {}",
                fill.fill_id, id, side, quantity, price
            );
            if fill.is_final() {
                done.push(id);
            }
            reports.push(ExecutionReport::Fill(fill));
        }

        for id in done {
            self.working.remove(&id);
        }
        reports
    }

    fn cancel_all(&mut self, timestamp: i64) -> Vec<ExecutionReport> {
        std::mem::take(&mut self.working)
            .into_keys()
            .map(|id| {
                ExecutionReport::Failed(OrderFailure::new(
                    id,
                    FailureKind::Cancelled,
                    "cancelled at end of run",
                    timestamp,
                ))
            })
            .collect()
    }

    fn working_orders(&self) -> usize {
        self.working.len()
    }

    fn heartbeat(&self, now: i64) -> Heartbeat {
        Heartbeat::alive(ComponentId::ExecutionAdapter, now)
    }
}
