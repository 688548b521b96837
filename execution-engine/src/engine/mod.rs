//! The serializing core shared by backtest and live engines.
//!
//! `EngineCore` is the only writer of the portfolio ledger. Everything that changes
//! money or order state passes through it one step at a time, in the order the
//! caller hands it over.

pub mod backtest;
pub mod live;
pub mod order_book;

pub use backtest::{BacktestEngine, BacktestReport};
pub use live::{LiveEngine, LiveReport};
pub use order_book::{FillCheck, OrderBook};

use crate::error::{EngineError, EngineResult};
use crate::exchange::ExecutionAdapter;
use crate::ledger::{FillOutcome, PortfolioLedger};
use crate::models::{EngineView, TradeJournal};
use crate::risk_guard::{RiskDecision, RiskGate};
use crate::strategy::StrategyInput;
use log::{debug, error, info, warn};
use std::sync::Arc;
use trading::{
    AlertSink, ComponentId, ExecutionReport, FailureKind, Heartbeat, MarketEvent, Notification,
    OrderFailure, OrderFill, OrderId, OrderRequest, OrderStatus, PortfolioSnapshot,
    RecoveryState, SnapshotKey, SnapshotReason, SnapshotStore,
};

pub struct EngineCore {
    run_id: String,
    ledger: PortfolioLedger,
    gate: Arc<RiskGate>,
    adapter: Box<dyn ExecutionAdapter>,
    book: OrderBook,
    alerts: Arc<dyn AlertSink>,
    store: Arc<dyn SnapshotStore>,
    journal: TradeJournal,
    fills: Vec<OrderFill>,
    notifications: Vec<Notification>,
    snapshots: Option<Vec<PortfolioSnapshot>>,
    restored_last_id: Option<OrderId>,
    halted: Option<String>,
}

impl EngineCore {
    pub fn new(
        run_id: impl Into<String>,
        ledger: PortfolioLedger,
        gate: Arc<RiskGate>,
        adapter: Box<dyn ExecutionAdapter>,
        alerts: Arc<dyn AlertSink>,
        store: Arc<dyn SnapshotStore>,
    ) -> Self {
        Self {
            run_id: run_id.into(),
            ledger,
            gate,
            adapter,
            book: OrderBook::new(),
            alerts,
            store,
            journal: TradeJournal::disabled(),
            fills: Vec::new(),
            notifications: Vec::new(),
            snapshots: None,
            restored_last_id: None,
            halted: None,
        }
    }

    pub fn with_journal(mut self, journal: TradeJournal) -> Self {
        self.journal = journal;
        self
    }

    /// Keeps a portfolio snapshot after every applied fill.
    pub fn with_snapshot_history(mut self) -> Self {
        self.snapshots = Some(Vec::new());
        self
    }

    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    pub fn gate(&self) -> &Arc<RiskGate> {
        &self.gate
    }

    pub fn book(&self) -> &OrderBook {
        &self.book
    }

    /// Highest order id this run has handed the core, including before a restore.
    pub fn last_order_id(&self) -> Option<OrderId> {
        self.book.last_id().max(self.restored_last_id)
    }

    pub fn ledger(&self) -> &PortfolioLedger {
        &self.ledger
    }

    pub fn snapshot(&self) -> Arc<PortfolioSnapshot> {
        self.ledger.snapshot()
    }

    pub fn view(&self) -> EngineView {
        EngineView::new(self.ledger.snapshot(), self.book.pending())
    }

    pub fn fills(&self) -> &[OrderFill] {
        &self.fills
    }

    pub fn notifications(&self) -> &[Notification] {
        &self.notifications
    }

    pub fn working_orders(&self) -> usize {
        self.adapter.working_orders()
    }

    pub fn is_halted(&self) -> bool {
        self.halted.is_some()
    }

    pub fn heartbeat(&self, now: i64) -> Heartbeat {
        Heartbeat::alive(ComponentId::PortfolioLedger, now)
    }

    pub fn adapter_heartbeat(&self, now: i64) -> Heartbeat {
        self.adapter.heartbeat(now)
    }

    /// Consumes the core, returning what the run produced.
    pub fn into_parts(self) -> (Vec<OrderFill>, Vec<Notification>, Vec<PortfolioSnapshot>, OrderBook) {
        (
            self.fills,
            self.notifications,
            self.snapshots.unwrap_or_default(),
            self.book,
        )
    }

    fn ensure_running(&self) -> EngineResult<()> {
        match &self.halted {
            Some(reason) => Err(EngineError::Halted(reason.clone())),
            None => Ok(()),
        }
    }

    /// Sends a notification to the operator channel and keeps it for the run report.
    pub fn notify(&mut self, notification: Notification) {
        self.alerts.notify(&notification);
        self.notifications.push(notification);
    }

    fn halt(&mut self, error: EngineError, timestamp: i64) -> EngineError {
        error!("Engine halted: {}", error);
        self.halted = Some(error.to_string());
        self.gate.engage_kill_switch("engine halted");
        if let EngineError::AccountingViolation(detail) = &error {
            self.notify(Notification::AccountingViolation {
                detail: detail.clone(),
                timestamp,
            });
        }
        error
    }

    /// Marks the ledger and lets the adapter fill against the event.
    pub fn on_market_event(&mut self, event: &MarketEvent) -> EngineResult<Vec<StrategyInput>> {
        self.ensure_running()?;
        self.ledger.mark(event);
        let reports = self.adapter.on_market_event(event);
        self.handle_reports(reports)
    }

    /// Runs orders through the risk gate, in order, and submits the admitted ones.
    pub fn admit(&mut self, orders: Vec<OrderRequest>) -> EngineResult<Vec<StrategyInput>> {
        let mut routed = Vec::new();
        for order in orders {
            self.ensure_running()?;
            if self.restored_last_id.is_some_and(|last| order.id() <= last)
                || !self.book.enter(order.clone())
            {
                warn!("Order {} refused: id already issued in this run", order.id());
                routed.push(self.reject(order, "order id already issued in this run".to_string()));
                continue;
            }
            let snapshot = self.ledger.snapshot();
            match self.gate.admit(&order, &snapshot) {
                RiskDecision::Accept => {
                    debug!("Order {} admitted: {} {} {}", order.id(), order.side(), order.quantity(), order.instrument_id());
                    self.book.transition(order.id(), OrderStatus::Submitted);
                    let reports = self.adapter.submit(&order);
                    routed.extend(self.handle_reports(reports)?);
                }
                RiskDecision::Reject(rejection) => {
                    warn!("Order {} rejected by risk gate: {}", order.id(), rejection);
                    self.book.transition(order.id(), OrderStatus::Rejected);
                    routed.push(self.reject(order, rejection.to_string()));
                }
            }
        }
        Ok(routed)
    }

    fn reject(&mut self, order: OrderRequest, reason: String) -> StrategyInput {
        self.notify(Notification::RiskRejection {
            order_id: order.id(),
            strategy_id: order.strategy_id().clone(),
            reason: reason.clone(),
            timestamp: order.submitted_at(),
        });
        StrategyInput::Rejected { order, reason }
    }

    fn handle_reports(&mut self, reports: Vec<ExecutionReport>) -> EngineResult<Vec<StrategyInput>> {
        let mut routed = Vec::new();
        for report in reports {
            routed.extend(self.handle_report(report)?);
        }
        Ok(routed)
    }

    /// Applies one execution report. Fill application always runs to completion.
    pub fn handle_report(&mut self, report: ExecutionReport) -> EngineResult<Vec<StrategyInput>> {
        self.ensure_running()?;
        match report {
            ExecutionReport::Fill(fill) => self.apply_fill(fill),
            ExecutionReport::Failed(failure) => Ok(self.apply_failure(failure)),
        }
    }

    fn apply_fill(&mut self, fill: OrderFill) -> EngineResult<Vec<StrategyInput>> {
        match self.book.check_fill(&fill) {
            FillCheck::Accepted => {}
            FillCheck::UnknownOrder => {
                return Ok(self.apply_failure(OrderFailure::new(
                    fill.order_id,
                    FailureKind::Uncorrelated,
                    format!("fill {} for an order never admitted", fill.fill_id),
                    fill.fill_timestamp,
                )));
            }
            FillCheck::Closed(status) => {
                return Ok(self.apply_failure(OrderFailure::new(
                    fill.order_id,
                    FailureKind::Uncorrelated,
                    format!("fill {} for an order already {:?}", fill.fill_id, status),
                    fill.fill_timestamp,
                )));
            }
            FillCheck::Overfill { filled, requested } => {
                return Ok(self.apply_failure(OrderFailure::new(
                    fill.order_id,
                    FailureKind::Overfill,
                    format!("fill {} would bring {} over {}", fill.fill_id, filled, requested),
                    fill.fill_timestamp,
                )));
            }
        }

        match self.ledger.apply_fill(&fill) {
            Ok(FillOutcome::Duplicate) => return Ok(Vec::new()),
            Ok(FillOutcome::Applied) => {}
            Err(e) => return Err(self.halt(e, fill.fill_timestamp)),
        }

        let Some(order) = self.book.request(fill.order_id).cloned() else {
            return Ok(Vec::new());
        };
        self.gate.on_fill(&order, &fill);
        let status = self.book.record_fill(&fill);
        if let Err(e) = self.journal.record(&fill) {
            warn!("Failed to journal fill {}: {}", fill.fill_id, e);
        }
        if let Some(history) = self.snapshots.as_mut() {
            history.push((*self.ledger.snapshot()).clone());
        }
        if status == Some(OrderStatus::Filled) {
            self.close(fill.order_id);
        }
        self.fills.push(fill.clone());
        Ok(vec![StrategyInput::Fill { order, fill }])
    }

    fn apply_failure(&mut self, failure: OrderFailure) -> Vec<StrategyInput> {
        warn!("Order {} failed ({}): {}", failure.order_id, failure.kind, failure.reason);
        self.notify(Notification::OrderFailed {
            order_id: failure.order_id,
            kind: failure.kind,
            reason: failure.reason.clone(),
            timestamp: failure.timestamp,
        });
        if failure.kind == FailureKind::Uncorrelated {
            return Vec::new();
        }
        let Some(order) = self.book.request(failure.order_id).cloned() else {
            return Vec::new();
        };
        if failure.closes_order() {
            let status = if failure.kind == FailureKind::Cancelled {
                OrderStatus::Cancelled
            } else {
                OrderStatus::Failed
            };
            if self.book.transition(failure.order_id, status) {
                self.close(failure.order_id);
            }
        }
        vec![StrategyInput::Failed { order, failure }]
    }

    fn close(&mut self, order_id: OrderId) {
        self.gate.release(order_id);
        self.adapter.order_closed(order_id);
    }

    /// Withdraws every working order at the adapter.
    pub fn cancel_all(&mut self, timestamp: i64) -> EngineResult<Vec<StrategyInput>> {
        let reports = self.adapter.cancel_all(timestamp);
        self.handle_reports(reports)
    }

    pub fn recovery_state(&self, reason: SnapshotReason, taken_at: i64) -> RecoveryState {
        RecoveryState::new(
            self.run_id.clone(),
            taken_at,
            reason,
            (*self.ledger.snapshot()).clone(),
            self.book.pending(),
        )
        .with_last_order_id(self.last_order_id())
    }

    pub fn persist(&self, reason: SnapshotReason, taken_at: i64) -> EngineResult<SnapshotKey> {
        let key = self.store.save(&self.recovery_state(reason, taken_at))?;
        info!("Snapshot {} persisted ({:?})", key, reason);
        Ok(key)
    }

    /// Rebuilds ledger, open orders and reservations from a stored state.
    pub fn restore(&mut self, state: &RecoveryState) -> EngineResult<()> {
        self.ledger = PortfolioLedger::restore(&state.snapshot, &state.pending_orders)?;
        self.book.restore(&state.pending_orders);
        self.gate.restore(&state.pending_orders);
        self.adapter.restore(&state.pending_orders);
        self.restored_last_id = state.highest_order_id();
        info!(
            "Restored {} at {} with {} pending orders",
            state.run_id,
            state.taken_at,
            state.pending_orders.len()
        );
        Ok(())
    }
}
