use log::warn;
use std::collections::BTreeMap;
use trading::{FillId, OrderFill, OrderId, OrderRequest, OrderStatus, PendingOrder};

const QUANTITY_EPSILON: f64 = 1e-9;

#[derive(Debug, Clone, PartialEq)]
pub enum FillCheck {
    Accepted,
    UnknownOrder,
    Closed(OrderStatus),
    Overfill { filled: f64, requested: f64 },
}

/// Every order the engine was handed and where it is in its lifecycle.
///
/// Terminal orders stay in the book so late or duplicated notifications about them
/// are recognised instead of treated as uncorrelated.
#[derive(Debug, Default)]
pub struct OrderBook {
    orders: BTreeMap<OrderId, PendingOrder>,
}

impl OrderBook {
    pub fn new() -> Self {
        Self::default()
    }

    /// Enters a new order as Pending. An id already in the book is refused.
    pub fn enter(&mut self, request: OrderRequest) -> bool {
        let id = request.id();
        if self.orders.contains_key(&id) {
            warn!("Order {}: id already in the book", id);
            return false;
        }
        self.orders.insert(
            id,
            PendingOrder {
                request,
                status: OrderStatus::Pending,
                filled_quantity: 0.0,
                fill_ids: Vec::new(),
            },
        );
        true
    }

    /// Highest order id the book has seen.
    pub fn last_id(&self) -> Option<OrderId> {
        self.orders.keys().next_back().copied()
    }

    pub fn get(&self, id: OrderId) -> Option<&PendingOrder> {
        self.orders.get(&id)
    }

    pub fn request(&self, id: OrderId) -> Option<&OrderRequest> {
        self.orders.get(&id).map(|o| &o.request)
    }

    pub fn status(&self, id: OrderId) -> Option<OrderStatus> {
        self.orders.get(&id).map(|o| o.status)
    }

    /// Moves an order along its lifecycle. Invalid transitions are refused.
    pub fn transition(&mut self, id: OrderId, next: OrderStatus) -> bool {
        let Some(order) = self.orders.get_mut(&id) else {
            return false;
        };
        if !order.status.can_transition_to(next) {
            warn!("Order {}: refusing transition {:?} -> {:?}", id, order.status, next);
            return false;
        }
        order.status = next;
        true
    }

    /// Checks that a fill can be booked against its order without exceeding it.
    pub fn check_fill(&self, fill: &OrderFill) -> FillCheck {
        let Some(order) = self.orders.get(&fill.order_id) else {
            return FillCheck::UnknownOrder;
        };
        if order.fill_ids.contains(&fill.fill_id) {
            return FillCheck::Accepted;
        }
        if order.status.is_terminal() {
            return FillCheck::Closed(order.status);
        }
        let filled = order.filled_quantity + fill.filled_quantity;
        if filled > order.request.quantity() + QUANTITY_EPSILON {
            return FillCheck::Overfill {
                filled,
                requested: order.request.quantity(),
            };
        }
        FillCheck::Accepted
    }

    /// Books an applied fill. Returns the new status.
    pub fn record_fill(&mut self, fill: &OrderFill) -> Option<OrderStatus> {
        let order = self.orders.get_mut(&fill.order_id)?;
        if order.fill_ids.contains(&fill.fill_id) {
            return Some(order.status);
        }
        order.filled_quantity += fill.filled_quantity;
        order.fill_ids.push(fill.fill_id.clone());
        let next = if order.request.quantity() - order.filled_quantity <= QUANTITY_EPSILON {
            OrderStatus::Filled
        } else {
            OrderStatus::PartiallyFilled
        };
        if order.status.can_transition_to(next) {
            order.status = next;
        }
        Some(order.status)
    }

    pub fn filled_quantity(&self, id: OrderId) -> f64 {
        self.orders.get(&id).map_or(0.0, |o| o.filled_quantity)
    }

    pub fn has_fill(&self, id: OrderId, fill_id: &FillId) -> bool {
        self.orders
            .get(&id)
            .is_some_and(|o| o.fill_ids.contains(fill_id))
    }

    /// Orders still working, in id order.
    pub fn pending(&self) -> Vec<PendingOrder> {
        self.orders
            .values()
            .filter(|o| !o.status.is_terminal())
            .cloned()
            .collect()
    }

    pub fn open_count(&self) -> usize {
        self.orders.values().filter(|o| !o.status.is_terminal()).count()
    }

    pub fn restore(&mut self, pending: &[PendingOrder]) {
        for order in pending {
            self.orders.insert(order.request.id(), order.clone());
        }
    }

    pub fn all(&self) -> impl Iterator<Item = &PendingOrder> {
        self.orders.values()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use trading::{Direction, InstrumentId, OrderType, Side, Signal, SignalSize, StrategyId};

    fn request(id: u64) -> OrderRequest {
        let signal = Signal::new(
            StrategyId::new("s"),
            InstrumentId::new("AAPL"),
            Direction::Long,
            SignalSize::Delta(1.0),
            0,
        );
        OrderRequest::new(OrderId::new(id), Side::Buy, 1.0, OrderType::Market, signal, 0)
    }

    #[test]
    fn new_orders_start_pending() {
        let mut book = OrderBook::new();
        assert!(book.enter(request(1)));
        assert_eq!(book.status(OrderId::new(1)), Some(OrderStatus::Pending));
        assert!(book.transition(OrderId::new(1), OrderStatus::Rejected));
        assert_eq!(book.open_count(), 0);
        assert!(!book.transition(OrderId::new(1), OrderStatus::Submitted));
    }

    #[test]
    fn reused_id_does_not_replace_the_working_order() {
        let mut book = OrderBook::new();
        book.enter(request(3));
        book.transition(OrderId::new(3), OrderStatus::Submitted);

        assert!(!book.enter(request(3)));
        assert_eq!(book.status(OrderId::new(3)), Some(OrderStatus::Submitted));
        assert_eq!(book.last_id(), Some(OrderId::new(3)));
    }
}
