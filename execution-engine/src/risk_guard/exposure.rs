use std::collections::BTreeMap;
use trading::{InstrumentId, OrderFill, OrderId, OrderRequest, PortfolioSnapshot, StrategyId};

/// Exposure of an admitted order that has not been filled yet.
#[derive(Debug, Clone, PartialEq)]
pub struct Reservation {
    pub instrument_id: InstrumentId,
    pub strategy_id: StrategyId,
    /// Signed open quantity: positive for buys.
    pub open_quantity: f64,
}

/// Reserved and attributed exposure tracked by the risk gate.
///
/// Filled quantities live in the ledger; this book only adds what the ledger cannot
/// know yet (admitted but unfilled orders) and which strategy owns what.
#[derive(Debug, Default, Clone)]
pub struct ExposureBook {
    reservations: BTreeMap<OrderId, Reservation>,
    attributed: BTreeMap<(StrategyId, InstrumentId), f64>,
}

impl ExposureBook {
    pub fn reserve(&mut self, order: &OrderRequest, open_quantity: f64) {
        self.reservations.insert(
            order.id(),
            Reservation {
                instrument_id: order.instrument_id().clone(),
                strategy_id: order.strategy_id().clone(),
                open_quantity: order.side().sign() * open_quantity,
            },
        );
    }

    pub fn on_fill(&mut self, order: &OrderRequest, fill: &OrderFill) {
        let signed = fill.signed_quantity();
        if let Some(reservation) = self.reservations.get_mut(&order.id()) {
            reservation.open_quantity -= signed;
            if reservation.open_quantity * order.side().sign() <= f64::EPSILON {
                self.reservations.remove(&order.id());
            }
        }
        *self
            .attributed
            .entry((order.strategy_id().clone(), order.instrument_id().clone()))
            .or_insert(0.0) += signed;
    }

    pub fn release(&mut self, order_id: OrderId) -> Option<Reservation> {
        self.reservations.remove(&order_id)
    }

    pub fn reservation(&self, order_id: OrderId) -> Option<&Reservation> {
        self.reservations.get(&order_id)
    }

    pub fn open_orders(&self) -> usize {
        self.reservations.len()
    }

    pub fn reserved_quantity(&self, instrument_id: &InstrumentId) -> f64 {
        self.reservations
            .values()
            .filter(|r| &r.instrument_id == instrument_id)
            .map(|r| r.open_quantity)
            .sum()
    }

    /// Filled plus reserved quantity attributed to one strategy in one instrument.
    pub fn strategy_quantity(&self, strategy_id: &StrategyId, instrument_id: &InstrumentId) -> f64 {
        let filled = self
            .attributed
            .get(&(strategy_id.clone(), instrument_id.clone()))
            .copied()
            .unwrap_or(0.0);
        let reserved: f64 = self
            .reservations
            .values()
            .filter(|r| &r.strategy_id == strategy_id && &r.instrument_id == instrument_id)
            .map(|r| r.open_quantity)
            .sum();
        filled + reserved
    }

    /// Instruments a strategy has any filled or reserved exposure in.
    pub fn strategy_instruments(&self, strategy_id: &StrategyId) -> Vec<InstrumentId> {
        let mut out: Vec<InstrumentId> = self
            .attributed
            .keys()
            .filter(|(s, _)| s == strategy_id)
            .map(|(_, i)| i.clone())
            .chain(
                self.reservations
                    .values()
                    .filter(|r| &r.strategy_id == strategy_id)
                    .map(|r| r.instrument_id.clone()),
            )
            .collect();
        out.sort();
        out.dedup();
        out
    }

    /// Instruments with a position or a reservation.
    pub fn book_instruments(&self, snapshot: &PortfolioSnapshot) -> Vec<InstrumentId> {
        let mut out: Vec<InstrumentId> = snapshot
            .positions
            .keys()
            .cloned()
            .chain(self.reservations.values().map(|r| r.instrument_id.clone()))
            .collect();
        out.sort();
        out.dedup();
        out
    }

    pub fn clear(&mut self) {
        self.reservations.clear();
        self.attributed.clear();
    }
}
