use super::*;
use trading::{
    Direction, FillId, InstrumentId, OrderId, OrderType, Position, Side, Signal, SignalSize,
    StrategyId,
};

fn instrument(s: &str) -> InstrumentId {
    InstrumentId::new(s)
}

fn snapshot_with(positions: &[(&str, f64, f64)]) -> PortfolioSnapshot {
    let mut snapshot = PortfolioSnapshot::empty(100_000.0);
    for (id, quantity, price) in positions {
        let mut position = Position::flat(instrument(id), *price);
        position.quantity = *quantity;
        position.average_cost = *price;
        snapshot.positions.insert(instrument(id), position);
    }
    snapshot
}

fn order(id: u64, strategy: &str, symbol: &str, side: Side, quantity: f64) -> OrderRequest {
    let signal = Signal::new(
        StrategyId::new(strategy),
        instrument(symbol),
        Direction::Long,
        SignalSize::Delta(quantity),
        0,
    );
    OrderRequest::new(OrderId::new(id), side, quantity, OrderType::Market, signal, 0)
}

fn fill_for(order: &OrderRequest, quantity: f64) -> OrderFill {
    OrderFill::new(
        FillId::new(format!("f-{}", order.id())),
        order.id(),
        order.instrument_id().clone(),
        order.side(),
        0,
    )
    .with_fill(quantity, 10.0, order.quantity() - quantity)
}

#[test]
fn test_max_position_boundary() {
    let gate = RiskGate::new(vec![RiskLimit::max_position(
        RiskScope::Instrument(instrument("X")),
        100.0,
    )])
    .unwrap();
    let snapshot = snapshot_with(&[("X", 90.0, 10.0)]);

    let too_big = order(1, "s", "X", Side::Buy, 20.0);
    assert!(matches!(gate.admit(&too_big, &snapshot), RiskDecision::Reject(_)));

    let fits = order(2, "s", "X", Side::Buy, 10.0);
    assert_eq!(gate.admit(&fits, &snapshot), RiskDecision::Accept);
}

#[test]
fn test_reservation_blocks_second_order() {
    let gate = RiskGate::new(vec![RiskLimit::max_position(RiskScope::Global, 100.0)]).unwrap();
    let snapshot = snapshot_with(&[("X", 90.0, 10.0)]);

    assert!(gate.admit(&order(1, "s", "X", Side::Buy, 10.0), &snapshot).is_accept());
    // Same headroom, already reserved by order 1.
    assert!(!gate.admit(&order(2, "s", "X", Side::Buy, 10.0), &snapshot).is_accept());

    gate.release(OrderId::new(1));
    assert!(gate.admit(&order(3, "s", "X", Side::Buy, 10.0), &snapshot).is_accept());
}

#[test]
fn test_reducing_order_passes_when_over_limit() {
    let gate = RiskGate::new(vec![RiskLimit::max_position(RiskScope::Global, 50.0)]).unwrap();
    let snapshot = snapshot_with(&[("X", 90.0, 10.0)]);
    assert!(gate.admit(&order(1, "s", "X", Side::Sell, 20.0), &snapshot).is_accept());
}

#[test]
fn test_first_violation_wins_in_scope_order() {
    let gate = RiskGate::new(vec![
        RiskLimit::max_position(RiskScope::Strategy(StrategyId::new("s")), 1.0),
        RiskLimit::max_notional(RiskScope::Instrument(instrument("X")), 50.0),
        RiskLimit::max_position(RiskScope::Global, 5.0),
    ])
    .unwrap();
    let snapshot = snapshot_with(&[("X", 0.0, 10.0)]);

    match gate.admit(&order(1, "s", "X", Side::Buy, 10.0), &snapshot) {
        RiskDecision::Reject(rejection) => {
            let limit = rejection.limit.unwrap();
            assert_eq!(limit.scope, RiskScope::Global);
        }
        RiskDecision::Accept => panic!("expected rejection"),
    }
}

#[test]
fn test_limits_for_other_scopes_are_ignored() {
    let gate = RiskGate::new(vec![
        RiskLimit::max_position(RiskScope::Instrument(instrument("Y")), 1.0),
        RiskLimit::max_position(RiskScope::Strategy(StrategyId::new("other")), 1.0),
    ])
    .unwrap();
    let snapshot = snapshot_with(&[("X", 0.0, 10.0)]);
    assert!(gate.admit(&order(1, "s", "X", Side::Buy, 10.0), &snapshot).is_accept());
}

#[test]
fn test_strategy_scope_uses_attributed_quantity() {
    let gate = RiskGate::new(vec![RiskLimit::max_position(
        RiskScope::Strategy(StrategyId::new("a")),
        15.0,
    )])
    .unwrap();
    // The book holds 1000 from elsewhere; strategy "a" owns none of it.
    let snapshot = snapshot_with(&[("X", 1_000.0, 10.0)]);
    let first = order(1, "a", "X", Side::Buy, 10.0);
    assert!(gate.admit(&first, &snapshot).is_accept());
    gate.on_fill(&first, &fill_for(&first, 10.0));

    assert!(!gate.admit(&order(2, "a", "X", Side::Buy, 10.0), &snapshot).is_accept());
    assert!(gate.admit(&order(3, "b", "X", Side::Buy, 10.0), &snapshot).is_accept());
}

#[test]
fn test_global_notional_counts_whole_book() {
    let gate = RiskGate::new(vec![RiskLimit::max_notional(RiskScope::Global, 1_500.0)]).unwrap();
    let snapshot = snapshot_with(&[("X", 50.0, 10.0), ("Y", 80.0, 10.0)]);
    // 500 + 800 already, 300 more would make 1600.
    assert!(!gate.admit(&order(1, "s", "X", Side::Buy, 30.0), &snapshot).is_accept());
    assert!(gate.admit(&order(2, "s", "X", Side::Buy, 20.0), &snapshot).is_accept());
}

#[test]
fn test_daily_loss_blocks_only_increasing_orders() {
    let gate = RiskGate::new(vec![RiskLimit::max_daily_loss(RiskScope::Global, 500.0)]).unwrap();
    let mut snapshot = snapshot_with(&[("X", 100.0, 10.0)]);
    snapshot.daily_pnl = -600.0;

    assert!(!gate.admit(&order(1, "s", "X", Side::Buy, 1.0), &snapshot).is_accept());
    assert!(gate.admit(&order(2, "s", "X", Side::Sell, 50.0), &snapshot).is_accept());
}

#[test]
fn test_missing_reference_price_rejects() {
    let gate = RiskGate::unrestricted();
    let snapshot = PortfolioSnapshot::empty(1_000.0);
    assert!(!gate.admit(&order(1, "s", "X", Side::Buy, 1.0), &snapshot).is_accept());
}

#[test]
fn test_kill_switch_rejects_everything_until_cleared() {
    let gate = RiskGate::unrestricted();
    let snapshot = snapshot_with(&[("X", 0.0, 10.0)]);
    gate.engage_kill_switch("test");
    assert!(gate.is_frozen());
    assert!(!gate.admit(&order(1, "s", "X", Side::Buy, 1.0), &snapshot).is_accept());
    gate.clear_kill_switch();
    assert!(gate.admit(&order(2, "s", "X", Side::Buy, 1.0), &snapshot).is_accept());
}

#[test]
fn test_tighten_never_widens_and_adds_missing_limits() {
    let gate = RiskGate::new(vec![RiskLimit::max_position(RiskScope::Global, 100.0)]).unwrap();
    assert!(!gate
        .tighten(RiskScope::Global, RiskMetric::MaxPosition, 200.0)
        .unwrap());
    assert!(gate
        .tighten(RiskScope::Global, RiskMetric::MaxPosition, 10.0)
        .unwrap());
    assert!(gate
        .tighten(RiskScope::Global, RiskMetric::MaxNotional, 1_000.0)
        .unwrap());
    let limits = gate.limits();
    assert_eq!(limits.len(), 2);
    assert_eq!(limits[0].threshold, 10.0);
}

#[test]
fn test_strategy_scoped_daily_loss_is_invalid() {
    let result = RiskGate::new(vec![RiskLimit::max_daily_loss(
        RiskScope::Strategy(StrategyId::new("s")),
        100.0,
    )]);
    assert!(matches!(result, Err(EngineError::InvalidConfig(_))));
}

#[test]
fn test_partial_fill_shrinks_reservation() {
    let gate = RiskGate::unrestricted();
    let snapshot = snapshot_with(&[("X", 0.0, 10.0)]);
    let o = order(1, "s", "X", Side::Buy, 10.0);
    assert!(gate.admit(&o, &snapshot).is_accept());
    assert_eq!(gate.reserved_quantity(&instrument("X")), 10.0);
    gate.on_fill(&o, &fill_for(&o, 4.0));
    assert_eq!(gate.reserved_quantity(&instrument("X")), 6.0);
    gate.on_fill(&o, &fill_for(&o, 6.0));
    assert_eq!(gate.reserved_quantity(&instrument("X")), 0.0);
}
