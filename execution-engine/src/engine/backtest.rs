use super::EngineCore;
use crate::alerts::LogAlertSink;
use crate::clock::{Clock, ReplayClock};
use crate::error::EngineResult;
use crate::exchange::SimulatedExchange;
use crate::feed::{FeedItem, ReplayFeed};
use crate::ledger::PortfolioLedger;
use crate::models::{EngineConfig, TradeJournal};
use crate::risk_guard::RiskGate;
use crate::store::MemorySnapshotStore;
use crate::strategy::{SignalRecord, StrategyInput, StrategyRuntime};
use crate::watchdog::{Watchdog, WatchdogMode};
use log::info;
use serde::Serialize;
use std::sync::Arc;
use trading::{
    AlertSink, ComponentId, DataSource, Notification, OrderFill, PendingOrder, PortfolioSnapshot,
    SnapshotKey, SnapshotReason, SnapshotStore,
};

/// Everything a backtest produced. Identical inputs give identical reports.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BacktestReport {
    pub run_id: String,
    pub events_processed: u64,
    pub fills: Vec<OrderFill>,
    /// Portfolio after each applied fill.
    pub snapshots: Vec<PortfolioSnapshot>,
    pub final_snapshot: PortfolioSnapshot,
    pub notifications: Vec<Notification>,
    pub signal_log: Vec<SignalRecord>,
    /// Every admitted order with its final status.
    pub orders: Vec<PendingOrder>,
    pub snapshot_key: Option<SnapshotKey>,
}

/// Deterministic replay: one thread of control drains the feed and runs strategy,
/// risk gate, simulated execution and ledger synchronously for every event.
pub struct BacktestEngine {
    core: EngineCore,
    runtime: StrategyRuntime,
    watchdog: Watchdog,
    clock: ReplayClock,
    reorder_window: usize,
    signal_log: Vec<SignalRecord>,
}

impl BacktestEngine {
    pub fn new(config: &EngineConfig, runtime: StrategyRuntime) -> EngineResult<Self> {
        config.validate()?;
        let gate = Arc::new(RiskGate::new(config.risk.limits.clone())?);
        let adapter = Box::new(SimulatedExchange::new(config.execution.simulation()));
        let core = EngineCore::new(
            config.run_id(),
            PortfolioLedger::new(config.initial_cash),
            gate,
            adapter,
            Arc::new(LogAlertSink),
            Arc::new(MemorySnapshotStore::new()),
        )
        .with_snapshot_history();
        let watchdog = Watchdog::new(
            config.watchdog.clone(),
            WatchdogMode::Observe,
            &ComponentId::ALL,
            0,
        );
        Ok(Self {
            core,
            runtime,
            watchdog,
            clock: ReplayClock::new(0),
            reorder_window: config.feed.reorder_window,
            signal_log: Vec::new(),
        })
    }

    pub fn with_store(mut self, store: Arc<dyn SnapshotStore>) -> Self {
        self.core.store = store;
        self
    }

    pub fn with_alerts(mut self, alerts: Arc<dyn AlertSink>) -> Self {
        self.core.alerts = alerts;
        self
    }

    pub fn with_journal(mut self, journal: TradeJournal) -> Self {
        self.core = self.core.with_journal(journal);
        self
    }

    fn route(&mut self, routed: Vec<StrategyInput>) {
        for input in routed {
            if let Some(fault) = self.runtime.deliver(input) {
                self.core.notify(fault);
            }
        }
    }

    fn supervise(&mut self, now: i64, feed_beat: Option<trading::Heartbeat>) {
        if let Some(beat) = feed_beat {
            self.watchdog.observe(beat);
        }
        self.watchdog.observe(self.runtime.heartbeat(now));
        self.watchdog.observe(self.core.adapter_heartbeat(now));
        self.watchdog.observe(self.core.heartbeat(now));
        // Observe mode: transitions are logged only.
        self.watchdog.evaluate(now);
    }

    pub fn run<S: DataSource>(mut self, source: S) -> EngineResult<BacktestReport> {
        info!("Backtest {} started", self.core.run_id());
        let mut feed = ReplayFeed::new(source, self.reorder_window);
        let mut events_processed = 0u64;

        while let Some(item) = feed.next() {
            let event = match item {
                FeedItem::Late(notification) => {
                    self.core.notify(notification);
                    continue;
                }
                FeedItem::Event(event) => event,
            };
            let now = self.clock.advance_to(event.timestamp());
            events_processed += 1;

            let routed = self.core.on_market_event(&event)?;
            self.route(routed);

            let snapshot = self.core.snapshot();
            let output = self.runtime.on_market_event(&event, &snapshot);
            for fault in output.faults {
                self.core.notify(fault);
            }
            self.signal_log.extend(output.records);
            let routed = self.core.admit(output.orders)?;
            self.route(routed);

            self.supervise(now, feed.heartbeat());
        }

        let end = self.clock.now();
        let routed = self.core.cancel_all(end)?;
        self.route(routed);
        self.runtime.shutdown();

        let snapshot_key = match self.core.persist(SnapshotReason::EndOfRun, end) {
            Ok(key) => Some(key),
            Err(e) => {
                log::error!("Final snapshot not persisted: {}", e);
                None
            }
        };
        let final_snapshot = (*self.core.snapshot()).clone();
        let run_id = self.core.run_id().to_string();
        let (fills, notifications, snapshots, book) = self.core.into_parts();
        info!(
            "Backtest {} finished: {} events, {} fills, equity {:.2}",
            run_id,
            events_processed,
            fills.len(),
            final_snapshot.equity()
        );

        Ok(BacktestReport {
            run_id,
            events_processed,
            fills,
            snapshots,
            final_snapshot,
            notifications,
            signal_log: self.signal_log,
            orders: book.all().cloned().collect(),
            snapshot_key,
        })
    }
}
