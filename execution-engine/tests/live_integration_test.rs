use execution_engine::alerts::ChannelAlertSink;
use execution_engine::exchange::PaperGateway;
use execution_engine::io::replay::paper_replay;
use execution_engine::models::{AdminCommand, EngineConfig, FeedConfig};
use execution_engine::watchdog::WatchdogConfig;
use execution_engine::store::MemorySnapshotStore;
use execution_engine::strategy::{OrderIdGenerator, StrategyRuntime};
use execution_engine::{LiveEngine, LiveReport};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use trading::prelude::*;
use trading::{
    ComponentId, InstrumentId, MarketRecord, Notification, OrderId, OrderRequest, OrderStatus,
    OrderType, PendingOrder, RecoveryState, RiskMetric, RiskScope, Side, SnapshotReason,
    SnapshotStore, StrategyId, VecSource,
};

/// Buys a fixed quantity on the first event it sees.
struct BuyOnce {
    done: bool,
}

impl Strategy for BuyOnce {
    fn name(&self) -> &str {
        "buy-once"
    }

    fn on_market_event(
        &mut self,
        event: &MarketEvent,
        _portfolio: &PortfolioSnapshot,
    ) -> Result<Vec<Signal>, StrategyError> {
        if self.done {
            return Ok(vec![]);
        }
        self.done = true;
        Ok(vec![Signal::new(
            StrategyId::new("buy-once"),
            event.instrument_id().clone(),
            Direction::Long,
            SignalSize::Delta(5.0),
            event.timestamp(),
        )])
    }
}

fn tick(ts: i64, price: f64) -> MarketRecord {
    MarketRecord::Tick {
        instrument: "AAPL".into(),
        timestamp: ts,
        bid: price - 0.05,
        ask: price + 0.05,
        last: price,
        volume: 100.0,
    }
}

fn config() -> EngineConfig {
    let mut config = EngineConfig {
        run_id: Some("paper".into()),
        feed: FeedConfig {
            reorder_window: 1,
            poll_interval_ms: 20,
        },
        watchdog: WatchdogConfig {
            interval_ms: 50,
            ..WatchdogConfig::default()
        },
        ..EngineConfig::default()
    };
    config.execution.broker_timeout_ms = 2_000;
    config
}

fn runtime() -> StrategyRuntime {
    let mut runtime = StrategyRuntime::new(OrderIdGenerator::default());
    runtime.add(
        StrategyId::new("buy-once"),
        Box::new(BuyOnce { done: false }),
        &serde_json::Value::Null,
    );
    runtime
}

async fn within<F: std::future::Future>(future: F) -> F::Output {
    tokio::time::timeout(Duration::from_secs(10), future)
        .await
        .expect("session did not stop in time")
}

#[tokio::test]
async fn paper_session_applies_redelivered_fills_once() {
    let gateway = Arc::new(PaperGateway::new().with_duplicate_fills());
    let store = Arc::new(MemorySnapshotStore::new());
    let (records_tx, records_rx) = mpsc::channel(16);
    let (_commands_tx, commands_rx) = mpsc::channel(4);

    let engine = LiveEngine::new(config(), runtime(), gateway.clone())
        .unwrap()
        .with_store(store.clone());
    let session = tokio::spawn(engine.run(records_rx, commands_rx));

    // Give the fill receiver time to connect.
    tokio::time::sleep(Duration::from_millis(100)).await;
    let source = VecSource::new((1..=4).map(|ts| tick(ts, 100.0)).collect());
    paper_replay(source, gateway, records_tx, Duration::from_millis(30)).await;

    let report: LiveReport = within(session).await.unwrap().unwrap();
    assert_eq!(report.fills.len(), 1);
    assert_eq!(report.final_snapshot.quantity(&InstrumentId::new("AAPL")), 5.0);
    assert!(report.final_snapshot.reconciles(1e-6));

    let key = report.snapshot_key.unwrap();
    let state = store.load(&key).unwrap();
    assert_eq!(state.reason, SnapshotReason::EndOfRun);
    assert!(state.pending_orders.is_empty());
}

#[tokio::test]
async fn shutdown_command_stops_an_open_feed_and_restores() {
    let gateway = Arc::new(PaperGateway::new());
    let store = Arc::new(MemorySnapshotStore::new());
    let (records_tx, records_rx) = mpsc::channel(16);
    let (commands_tx, commands_rx) = mpsc::channel(4);

    let engine = LiveEngine::new(config(), runtime(), gateway.clone())
        .unwrap()
        .with_store(store.clone());
    let session = tokio::spawn(engine.run(records_rx, commands_rx));

    tokio::time::sleep(Duration::from_millis(100)).await;
    gateway.set_price(InstrumentId::new("AAPL"), 50.0);
    records_tx.send(tick(1, 50.0)).await.unwrap();
    tokio::time::sleep(Duration::from_millis(300)).await;
    commands_tx.send(AdminCommand::Shutdown).await.unwrap();

    let report = within(session).await.unwrap().unwrap();
    assert_eq!(report.fills.len(), 1);
    assert!(report.snapshot_key.is_some());
    drop(records_tx);

    // A second session picks the run up from its last snapshot.
    let (_records_tx, records_rx) = mpsc::channel(16);
    let (commands_tx, commands_rx) = mpsc::channel(4);
    let resumed = LiveEngine::new(config(), runtime(), gateway.clone())
        .unwrap()
        .with_store(store.clone())
        .restore_latest()
        .unwrap();
    assert_eq!(resumed.run_id(), "paper");
    let session = tokio::spawn(resumed.run(records_rx, commands_rx));
    tokio::time::sleep(Duration::from_millis(100)).await;
    commands_tx.send(AdminCommand::Shutdown).await.unwrap();

    let report = within(session).await.unwrap().unwrap();
    assert!(report.fills.is_empty());
    assert_eq!(report.final_snapshot.quantity(&InstrumentId::new("AAPL")), 5.0);
}

fn resting_bid(id: u64) -> PendingOrder {
    let signal = Signal::new(
        StrategyId::new("buy-once"),
        InstrumentId::new("AAPL"),
        Direction::Long,
        SignalSize::Delta(1.0),
        0,
    )
    .with_limit(40.0);
    PendingOrder {
        request: OrderRequest::new(OrderId::new(id), Side::Buy, 1.0, OrderType::Limit(40.0), signal, 0),
        status: OrderStatus::Submitted,
        filled_quantity: 0.0,
        fill_ids: Vec::new(),
    }
}

#[tokio::test]
async fn new_orders_after_restore_leave_restored_orders_working() {
    let gateway = Arc::new(PaperGateway::new());
    let store = Arc::new(MemorySnapshotStore::new());
    let (records_tx, records_rx) = mpsc::channel(16);
    let (commands_tx, commands_rx) = mpsc::channel(4);
    let state = RecoveryState::new(
        "paper",
        1,
        SnapshotReason::Operator,
        PortfolioSnapshot::empty(EngineConfig::default().initial_cash),
        vec![resting_bid(1)],
    );

    let engine = LiveEngine::new(config(), runtime(), gateway.clone())
        .unwrap()
        .with_store(store.clone())
        .restore(state);
    let session = tokio::spawn(engine.run(records_rx, commands_rx));

    tokio::time::sleep(Duration::from_millis(100)).await;
    gateway.set_price(InstrumentId::new("AAPL"), 50.0);
    records_tx.send(tick(2, 50.0)).await.unwrap();
    tokio::time::sleep(Duration::from_millis(300)).await;
    commands_tx.send(AdminCommand::Shutdown).await.unwrap();

    let report = within(session).await.unwrap().unwrap();
    assert_eq!(report.fills.len(), 1);
    assert_eq!(report.fills[0].order_id, OrderId::new(2));
    assert_eq!(report.final_snapshot.quantity(&InstrumentId::new("AAPL")), 5.0);

    // The restored bid was never filled and is still carried forward.
    let saved = store.load(&report.snapshot_key.unwrap()).unwrap();
    assert_eq!(saved.pending_orders.len(), 1);
    assert_eq!(saved.pending_orders[0].request.id(), OrderId::new(1));
    assert_eq!(saved.highest_order_id(), Some(OrderId::new(2)));
}

#[tokio::test]
async fn session_survives_a_reconnecting_adapter() {
    let gateway = Arc::new(PaperGateway::new());
    // Default backoff waits longer than the watchdog's dead timeout.
    gateway.fail_next_connects(2);
    let (alerts, mut alert_rx) = ChannelAlertSink::new();
    let (records_tx, records_rx) = mpsc::channel(16);
    let (_commands_tx, commands_rx) = mpsc::channel(4);

    let engine = LiveEngine::new(config(), runtime(), gateway.clone())
        .unwrap()
        .with_alerts(Arc::new(alerts));
    let session = tokio::spawn(engine.run(records_rx, commands_rx));

    tokio::time::sleep(Duration::from_millis(1_000)).await;
    let source = VecSource::new((1..=3).map(|ts| tick(ts, 100.0)).collect());
    paper_replay(source, gateway, records_tx, Duration::from_millis(30)).await;

    let report = within(session).await.unwrap().unwrap();
    assert_eq!(report.fills.len(), 1);

    let mut stalled = false;
    while let Ok(alert) = alert_rx.try_recv() {
        match alert {
            Notification::ComponentDeath { component, .. } => {
                panic!("{} declared dead", component)
            }
            Notification::ComponentStall {
                component: ComponentId::ExecutionAdapter,
                ..
            } => stalled = true,
            _ => {}
        }
    }
    assert!(stalled);
}

#[tokio::test]
async fn tightened_limit_applies_to_later_orders() {
    let gateway = Arc::new(PaperGateway::new());
    let (records_tx, records_rx) = mpsc::channel(16);
    let (commands_tx, commands_rx) = mpsc::channel(4);

    let engine = LiveEngine::new(config(), runtime(), gateway.clone()).unwrap();
    let session = tokio::spawn(engine.run(records_rx, commands_rx));

    commands_tx
        .send(AdminCommand::TightenLimit {
            scope: RiskScope::Instrument(InstrumentId::new("AAPL")),
            metric: RiskMetric::MaxPosition,
            threshold: 2.0,
        })
        .await
        .unwrap();
    tokio::time::sleep(Duration::from_millis(100)).await;
    let source = VecSource::new((1..=3).map(|ts| tick(ts, 100.0)).collect());
    paper_replay(source, gateway, records_tx, Duration::from_millis(30)).await;

    let report = within(session).await.unwrap().unwrap();
    assert!(report.fills.is_empty());
    assert!(report
        .notifications
        .iter()
        .any(|n| matches!(n, Notification::RiskRejection { .. })));
}
