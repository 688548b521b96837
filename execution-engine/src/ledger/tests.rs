use super::*;
use trading::{OrderId, Side};

const DAY_MS: i64 = 86_400_000;

fn x() -> InstrumentId {
    InstrumentId::new("X")
}

fn fill(id: &str, side: Side, quantity: f64, price: f64, fee: f64, ts: i64) -> OrderFill {
    OrderFill::new(FillId::new(id), OrderId::new(1), x(), side, ts)
        .with_fill(quantity, price, 0.0)
        .with_fee(fee)
}

fn tick(price: f64, ts: i64) -> MarketEvent {
    MarketEvent::tick(x(), ts, 0, price, price, price, 100.0)
}

#[test]
fn test_buy_then_sell_realizes_pnl() {
    let mut ledger = PortfolioLedger::new(10_000.0);
    ledger.apply_fill(&fill("a", Side::Buy, 10.0, 100.0, 1.0, 1)).unwrap();
    ledger.apply_fill(&fill("b", Side::Sell, 4.0, 110.0, 1.0, 2)).unwrap();

    let position = ledger.position(&x()).unwrap();
    assert!((position.quantity - 6.0).abs() < 1e-9);
    assert!((position.average_cost - 100.0).abs() < 1e-9);
    // 4 * 10 gain minus 2 in fees
    assert!((position.realized_pnl - 38.0).abs() < 1e-9, "got {}", position.realized_pnl);
    assert!((ledger.cash() - (10_000.0 - 1_000.0 - 1.0 + 440.0 - 1.0)).abs() < 1e-9);
}

#[test]
fn test_average_cost_blends_on_add() {
    let mut ledger = PortfolioLedger::new(10_000.0);
    ledger.apply_fill(&fill("a", Side::Buy, 10.0, 100.0, 0.0, 1)).unwrap();
    ledger.apply_fill(&fill("b", Side::Buy, 30.0, 120.0, 0.0, 2)).unwrap();
    let position = ledger.position(&x()).unwrap();
    assert!((position.average_cost - 115.0).abs() < 1e-9);
}

#[test]
fn test_flip_from_long_to_short() {
    let mut ledger = PortfolioLedger::new(10_000.0);
    ledger.apply_fill(&fill("a", Side::Buy, 10.0, 100.0, 0.0, 1)).unwrap();
    ledger.apply_fill(&fill("b", Side::Sell, 25.0, 90.0, 0.0, 2)).unwrap();
    let position = ledger.position(&x()).unwrap();
    assert!((position.quantity + 15.0).abs() < 1e-9);
    assert!((position.average_cost - 90.0).abs() < 1e-9);
    assert!((position.realized_pnl + 100.0).abs() < 1e-9);
    ledger.check_identity().unwrap();
}

#[test]
fn test_short_cover_profit() {
    let mut ledger = PortfolioLedger::new(1_000.0);
    ledger.apply_fill(&fill("a", Side::Sell, 5.0, 50.0, 0.0, 1)).unwrap();
    ledger.apply_fill(&fill("b", Side::Buy, 5.0, 40.0, 0.0, 2)).unwrap();
    let position = ledger.position(&x()).unwrap();
    assert!(position.is_flat());
    assert_eq!(position.average_cost, 0.0);
    assert!((position.realized_pnl - 50.0).abs() < 1e-9);
    assert!((ledger.cash() - 1_050.0).abs() < 1e-9);
}

#[test]
fn test_duplicate_fill_applied_once() {
    let mut ledger = PortfolioLedger::new(10_000.0);
    let f = fill("same", Side::Buy, 10.0, 100.0, 2.0, 1);
    assert_eq!(ledger.apply_fill(&f).unwrap(), FillOutcome::Applied);
    let before = ledger.snapshot();
    assert_eq!(ledger.apply_fill(&f).unwrap(), FillOutcome::Duplicate);
    assert_eq!(*ledger.snapshot(), *before);
}

#[test]
fn test_snapshot_reconciles_after_every_fill() {
    let mut ledger = PortfolioLedger::new(50_000.0);
    let script = [
        (Side::Buy, 100.0, 10.0),
        (Side::Buy, 50.0, 12.0),
        (Side::Sell, 200.0, 11.0),
        (Side::Buy, 80.0, 9.5),
        (Side::Sell, 30.0, 10.25),
    ];
    for (i, (side, qty, price)) in script.iter().enumerate() {
        ledger.mark(&tick(price + 0.5, i as i64 * 10));
        ledger
            .apply_fill(&fill(&format!("f{i}"), *side, *qty, *price, 1.25, i as i64 * 10 + 1))
            .unwrap();
        let snapshot = ledger.snapshot();
        assert!(
            snapshot.reconciles(1e-9),
            "residual {} after fill {}",
            snapshot.accounting_residual(),
            i
        );
    }
}

#[test]
fn test_missing_mark_uses_fill_price() {
    let mut ledger = PortfolioLedger::new(1_000.0);
    ledger.apply_fill(&fill("a", Side::Buy, 1.0, 42.0, 0.0, 1)).unwrap();
    assert_eq!(ledger.snapshot().mark(&x()), Some(42.0));
}

#[test]
fn test_invalid_fill_is_an_accounting_violation() {
    let mut ledger = PortfolioLedger::new(1_000.0);
    let result = ledger.apply_fill(&fill("a", Side::Buy, 1.0, f64::NAN, 0.0, 1));
    assert!(matches!(result, Err(EngineError::AccountingViolation(_))));
}

#[test]
fn test_daily_pnl_resets_at_utc_midnight() {
    let mut ledger = PortfolioLedger::new(1_000.0);
    ledger.mark(&tick(10.0, 1_000));
    ledger.apply_fill(&fill("a", Side::Buy, 10.0, 10.0, 0.0, 1_001)).unwrap();
    ledger.mark(&tick(8.0, 2_000));
    assert!((ledger.snapshot().daily_pnl + 20.0).abs() < 1e-9);

    // First event of the next day: the previous close becomes the baseline.
    ledger.mark(&tick(9.0, DAY_MS + 1));
    let snapshot = ledger.snapshot();
    assert!((snapshot.daily_pnl - 10.0).abs() < 1e-9, "got {}", snapshot.daily_pnl);
    assert!((snapshot.positions[&x()].daily_pnl() - 10.0).abs() < 1e-9);
}

#[test]
fn test_restore_round_trips_state() {
    let mut ledger = PortfolioLedger::new(5_000.0);
    ledger.mark(&tick(20.0, 10));
    ledger.apply_fill(&fill("a", Side::Buy, 10.0, 20.0, 1.0, 11)).unwrap();
    ledger.mark(&tick(21.0, 12));
    let snapshot = ledger.snapshot();

    let restored = PortfolioLedger::restore(&snapshot, &[]).unwrap();
    assert_eq!(*restored.snapshot(), *snapshot);
}
