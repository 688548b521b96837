use crate::ledger::FeeSchedule;
use log::{debug, warn};
use std::collections::{BTreeMap, BTreeSet};
use trading::{
    ExecutionReport, FailureKind, FillId, GatewayFill, InstrumentId, OrderFailure, OrderFill,
    OrderId, OrderRequest, Side,
};

/// Bounds tolerated when comparing cumulative fills to the order quantity.
const QUANTITY_EPSILON: f64 = 1e-9;

struct TrackedOrder {
    instrument_id: InstrumentId,
    side: Side,
    quantity: f64,
    filled: f64,
    seen: BTreeSet<FillId>,
    closed: bool,
}

/// Matches venue notifications back to admitted orders.
///
/// Delivery is at least once and in any order: fills are keyed by the venue's fill id,
/// or by a synthesized one built from the notification's content when none is given.
pub struct FillCorrelator {
    orders: BTreeMap<OrderId, TrackedOrder>,
    fees: FeeSchedule,
}

impl FillCorrelator {
    pub fn new(fees: FeeSchedule) -> Self {
        Self {
            orders: BTreeMap::new(),
            fees,
        }
    }

    pub fn register(&mut self, order: &OrderRequest) {
        self.orders.insert(
            order.id(),
            TrackedOrder {
                instrument_id: order.instrument_id().clone(),
                side: order.side(),
                quantity: order.quantity(),
                filled: 0.0,
                seen: BTreeSet::new(),
                closed: false,
            },
        );
    }

    /// Seeds an order restored from a snapshot, with the fills it already had.
    pub fn restore(&mut self, order: &OrderRequest, filled: f64, fill_ids: &[FillId]) {
        self.register(order);
        if let Some(tracked) = self.orders.get_mut(&order.id()) {
            tracked.filled = filled;
            tracked.seen = fill_ids.iter().cloned().collect();
        }
    }

    pub fn close(&mut self, order_id: OrderId) {
        if let Some(tracked) = self.orders.get_mut(&order_id) {
            tracked.closed = true;
        }
    }

    pub fn open_orders(&self) -> usize {
        self.orders.values().filter(|o| !o.closed).count()
    }

    pub fn synthesize_id(fill: &GatewayFill) -> FillId {
        FillId::new(format!(
            "{}-{}-{}-{}",
            fill.order_id.value(),
            fill.timestamp,
            fill.quantity,
            fill.price
        ))
    }

    pub fn on_fill(&mut self, fill: GatewayFill) -> Option<ExecutionReport> {
        let fill_id = match &fill.fill_id {
            Some(id) => FillId::new(id.clone()),
            None => Self::synthesize_id(&fill),
        };
        let Some(tracked) = self.orders.get_mut(&fill.order_id) else {
            warn!("Fill {} references unknown order {}", fill_id, fill.order_id);
            return Some(ExecutionReport::Failed(OrderFailure::new(
                fill.order_id,
                FailureKind::Uncorrelated,
                format!("fill {} for an order never admitted", fill_id),
                fill.timestamp,
            )));
        };
        if tracked.seen.contains(&fill_id) {
            debug!("Duplicate notification for fill {}", fill_id);
            return None;
        }
        if !fill.quantity.is_finite()
            || fill.quantity <= 0.0
            || !fill.price.is_finite()
            || fill.price <= 0.0
        {
            warn!("Malformed fill {} dropped (qty {}, price {})", fill_id, fill.quantity, fill.price);
            return None;
        }
        if tracked.filled + fill.quantity > tracked.quantity + QUANTITY_EPSILON {
            warn!(
                "Fill {} would overfill order {} ({} + {} > {})",
                fill_id, fill.order_id, tracked.filled, fill.quantity, tracked.quantity
            );
            tracked.seen.insert(fill_id.clone());
            return Some(ExecutionReport::Failed(OrderFailure::new(
                fill.order_id,
                FailureKind::Overfill,
                format!("fill {} exceeds the order quantity", fill_id),
                fill.timestamp,
            )));
        }

        tracked.seen.insert(fill_id.clone());
        tracked.filled += fill.quantity;
        let remaining = (tracked.quantity - tracked.filled).max(0.0);
        let fee = fill
            .fee
            .unwrap_or_else(|| self.fees.fee(tracked.side, fill.quantity, fill.price));

        Some(ExecutionReport::Fill(
            OrderFill::new(
                fill_id,
                fill.order_id,
                tracked.instrument_id.clone(),
                tracked.side,
                fill.timestamp,
            )
            .with_fill(fill.quantity, fill.price, remaining)
            .with_fee(fee),
        ))
    }

    pub fn on_rejected(&mut self, order_id: OrderId, reason: String, timestamp: i64) -> ExecutionReport {
        self.close(order_id);
        ExecutionReport::Failed(OrderFailure::new(
            order_id,
            FailureKind::VenueRejected,
            reason,
            timestamp,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use trading::{Direction, OrderType, Signal, SignalSize, StrategyId};

    fn order(id: u64, quantity: f64) -> OrderRequest {
        let signal = Signal::new(
            StrategyId::new("s"),
            InstrumentId::new("X"),
            Direction::Long,
            SignalSize::Delta(quantity),
            0,
        );
        OrderRequest::new(OrderId::new(id), Side::Buy, quantity, OrderType::Market, signal, 0)
    }

    fn gateway_fill(order: u64, id: Option<&str>, quantity: f64, ts: i64) -> GatewayFill {
        GatewayFill {
            order_id: OrderId::new(order),
            fill_id: id.map(str::to_string),
            quantity,
            price: 10.0,
            fee: None,
            timestamp: ts,
        }
    }

    #[test]
    fn duplicates_are_dropped() {
        let mut correlator = FillCorrelator::new(FeeSchedule::zero());
        correlator.register(&order(1, 10.0));
        assert!(correlator.on_fill(gateway_fill(1, Some("a"), 4.0, 1)).is_some());
        assert!(correlator.on_fill(gateway_fill(1, Some("a"), 4.0, 1)).is_none());
    }

    #[test]
    fn missing_ids_are_synthesized_consistently() {
        let mut correlator = FillCorrelator::new(FeeSchedule::zero());
        correlator.register(&order(1, 10.0));
        let first = correlator.on_fill(gateway_fill(1, None, 4.0, 7));
        assert!(matches!(first, Some(ExecutionReport::Fill(ref f)) if f.fill_id.as_str() == "1-7-4-10"));
        assert!(correlator.on_fill(gateway_fill(1, None, 4.0, 7)).is_none());
    }

    #[test]
    fn out_of_order_fills_track_remaining() {
        let mut correlator = FillCorrelator::new(FeeSchedule::zero());
        correlator.register(&order(1, 10.0));
        correlator.register(&order(2, 5.0));
        let b = correlator.on_fill(gateway_fill(2, Some("b1"), 5.0, 3));
        let a = correlator.on_fill(gateway_fill(1, Some("a2"), 6.0, 2));
        match (a, b) {
            (Some(ExecutionReport::Fill(a)), Some(ExecutionReport::Fill(b))) => {
                assert_eq!(a.remaining_quantity, 4.0);
                assert_eq!(b.remaining_quantity, 0.0);
            }
            other => panic!("unexpected reports {:?}", other),
        }
    }

    #[test]
    fn overfill_is_reported_not_applied() {
        let mut correlator = FillCorrelator::new(FeeSchedule::zero());
        correlator.register(&order(1, 10.0));
        correlator.on_fill(gateway_fill(1, Some("a"), 8.0, 1));
        let report = correlator.on_fill(gateway_fill(1, Some("b"), 5.0, 2));
        assert!(matches!(
            report,
            Some(ExecutionReport::Failed(OrderFailure { kind: FailureKind::Overfill, .. }))
        ));
    }

    #[test]
    fn unknown_order_is_uncorrelated() {
        let mut correlator = FillCorrelator::new(FeeSchedule::zero());
        let report = correlator.on_fill(gateway_fill(99, Some("z"), 1.0, 1));
        assert!(matches!(
            report,
            Some(ExecutionReport::Failed(OrderFailure { kind: FailureKind::Uncorrelated, .. }))
        ));
    }
}
