use super::EngineCore;
use crate::alerts::LogAlertSink;
use crate::clock::{Clock, WallClock};
use crate::error::{EngineError, EngineResult};
use crate::exchange::{LiveConfig, LiveExchange};
use crate::feed::LiveFeed;
use crate::ledger::PortfolioLedger;
use crate::models::{AdminCommand, EngineConfig, EngineView, Intake, TradeJournal};
use crate::risk_guard::RiskGate;
use crate::store::MemorySnapshotStore;
use crate::strategy::{StrategyInput, StrategyOutput, StrategyRuntime, StrategyTask};
use crate::watchdog::{HeartbeatSender, Supervisor, Watchdog, WatchdogMode, WatchdogTask};
use log::{debug, error, info, warn};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use trading::{
    AlertSink, BrokerGateway, ComponentId, HealthStatus, MarketRecord, Notification, OrderFill,
    PortfolioSnapshot, RecoveryState, SnapshotKey, SnapshotReason, SnapshotStore,
};

#[derive(Debug, Clone)]
pub struct LiveReport {
    pub run_id: String,
    pub fills: Vec<OrderFill>,
    pub final_snapshot: PortfolioSnapshot,
    pub notifications: Vec<Notification>,
    pub snapshot_key: Option<SnapshotKey>,
}

/// Real-time engine over a broker gateway.
///
/// Feed ingestion, strategy evaluation, fill reception and the watchdog run as
/// separate tasks. They all feed one bounded intake queue, and a single step
/// drains it: risk admission and ledger mutation happen nowhere else.
pub struct LiveEngine {
    config: EngineConfig,
    run_id: String,
    runtime: StrategyRuntime,
    gateway: Arc<dyn BrokerGateway>,
    store: Arc<dyn SnapshotStore>,
    alerts: Arc<dyn AlertSink>,
    journal: TradeJournal,
    restore_from: Option<RecoveryState>,
}

impl LiveEngine {
    pub fn new(
        config: EngineConfig,
        runtime: StrategyRuntime,
        gateway: Arc<dyn BrokerGateway>,
    ) -> EngineResult<Self> {
        config.validate()?;
        Ok(Self {
            run_id: config.run_id(),
            config,
            runtime,
            gateway,
            store: Arc::new(MemorySnapshotStore::new()),
            alerts: Arc::new(LogAlertSink),
            journal: TradeJournal::disabled(),
            restore_from: None,
        })
    }

    pub fn with_store(mut self, store: Arc<dyn SnapshotStore>) -> Self {
        self.store = store;
        self
    }

    pub fn with_alerts(mut self, alerts: Arc<dyn AlertSink>) -> Self {
        self.alerts = alerts;
        self
    }

    pub fn with_journal(mut self, journal: TradeJournal) -> Self {
        self.journal = journal;
        self
    }

    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    /// Operator-initiated recovery: the session resumes the stored run.
    pub fn restore(mut self, state: RecoveryState) -> Self {
        info!("Live session will resume {} from {}", state.run_id, state.taken_at);
        if let Some(last) = state.highest_order_id() {
            self.runtime.ids().advance_past(last);
        }
        self.run_id = state.run_id.clone();
        self.restore_from = Some(state);
        self
    }

    /// Restores from the newest snapshot of this run, if there is one.
    pub fn restore_latest(self) -> EngineResult<Self> {
        match self.store.latest(&self.run_id)? {
            Some(key) => {
                let state = self.store.load(&key)?;
                Ok(self.restore(state))
            }
            None => {
                warn!("No snapshot for run {}, starting fresh", self.run_id);
                Ok(self)
            }
        }
    }

    /// Runs the session until shutdown, end of market data, or a fatal error.
    pub async fn run(
        self,
        records: mpsc::Receiver<MarketRecord>,
        commands: mpsc::Receiver<AdminCommand>,
    ) -> EngineResult<LiveReport> {
        let clock = WallClock::new();
        let config = self.config;
        let interval = Duration::from_millis(config.watchdog.interval_ms);

        let (intake_tx, mut intake_rx) = mpsc::channel(config.intake_capacity);
        let (stop_tx, stop_rx) = watch::channel(false);
        let (feed_stop_tx, feed_stop_rx) = watch::channel(false);
        let (beats, beat_rx) = HeartbeatSender::channel(64);

        let gate = Arc::new(RiskGate::new(config.risk.limits.clone())?);
        let exchange = LiveExchange::new(
            self.gateway.clone(),
            LiveConfig {
                broker_timeout: Duration::from_millis(config.execution.broker_timeout_ms),
                backoff: config.execution.backoff,
                heartbeat_interval: interval,
                fees: config.execution.fees,
            },
            intake_tx.clone(),
        );
        let receiver = exchange.receiver(beats.clone(), stop_rx.clone());

        let mut core = EngineCore::new(
            self.run_id.clone(),
            PortfolioLedger::new(config.initial_cash),
            gate.clone(),
            Box::new(exchange),
            self.alerts.clone(),
            self.store.clone(),
        )
        .with_journal(self.journal);
        if let Some(state) = &self.restore_from {
            core.restore(state)?;
        }

        let (view_tx, view_rx) = watch::channel(core.view());
        let watchdog = Arc::new(Mutex::new(Watchdog::new(
            config.watchdog.clone(),
            WatchdogMode::Enforce,
            &ComponentId::ALL,
            clock.now(),
        )));
        let supervisor = Supervisor::new(
            self.run_id.clone(),
            gate.clone(),
            self.store.clone(),
            self.alerts.clone(),
        );
        let (strategy_tx, strategy_rx) = mpsc::unbounded_channel();

        let feed = LiveFeed::new(
            records,
            intake_tx.clone(),
            beats.clone(),
            config.feed.reorder_window,
            Duration::from_millis(config.feed.poll_interval_ms),
            feed_stop_rx,
        );
        let strategy = StrategyTask::new(
            self.runtime,
            strategy_rx,
            view_rx.clone(),
            intake_tx.clone(),
            beats.clone(),
            interval,
        );
        let supervision = WatchdogTask::new(
            watchdog.clone(),
            supervisor,
            beat_rx,
            view_rx,
            intake_tx.clone(),
            stop_rx.clone(),
        );

        let fill_task = tokio::spawn(receiver.run());
        let feed_task = tokio::spawn(feed.run());
        let strategy_task = tokio::spawn(strategy.run());
        let watchdog_task = tokio::spawn(supervision.run());
        let tick_task = tokio::spawn(tick_loop(clock, intake_tx.clone(), interval, stop_rx.clone()));
        let command_task = tokio::spawn(forward_commands(commands, intake_tx, stop_rx));
        info!("Live session {} started", self.run_id);

        let mut session = Session {
            core,
            strategy_tx,
            view_tx,
            watchdog,
            beats,
            feed_stop: feed_stop_tx,
            drain_deadline: None,
            last_snapshot: clock.now(),
            snapshot_interval: config.snapshot.interval_ms as i64,
            drain_timeout: config.execution.broker_timeout_ms as i64,
            clock,
        };
        let outcome = session.drive(&mut intake_rx).await;

        let Session {
            core,
            strategy_tx,
            feed_stop,
            ..
        } = session;
        drop(strategy_tx);
        drop(intake_rx);
        let _ = feed_stop.send(true);
        let _ = stop_tx.send(true);
        if let Err(e) = feed_task.await {
            warn!("feed task ended abnormally: {}", e);
        }
        for (name, task) in [
            ("fill receiver", fill_task),
            ("watchdog", watchdog_task),
            ("ticker", tick_task),
            ("commands", command_task),
        ] {
            if let Err(e) = task.await {
                warn!("{} task ended abnormally: {}", name, e);
            }
        }
        if let Err(e) = strategy_task.await {
            warn!("strategy task ended abnormally: {}", e);
        }

        let snapshot_key = match &outcome {
            Err(EngineError::AccountingViolation(_)) => None,
            _ => match core.persist(SnapshotReason::EndOfRun, clock.now()) {
                Ok(key) => Some(key),
                Err(e) => {
                    error!("Final snapshot not persisted: {}", e);
                    None
                }
            },
        };
        outcome?;

        let final_snapshot = (*core.snapshot()).clone();
        let run_id = core.run_id().to_string();
        let (fills, notifications, _, _) = core.into_parts();
        info!("Live session {} stopped after {} fills", run_id, fills.len());
        Ok(LiveReport {
            run_id,
            fills,
            final_snapshot,
            notifications,
            snapshot_key,
        })
    }
}

async fn tick_loop(
    clock: WallClock,
    intake: mpsc::Sender<Intake>,
    period: Duration,
    mut stop: watch::Receiver<bool>,
) {
    let period = period.as_millis() as i64;
    let mut next = clock.now() + period;
    loop {
        tokio::select! {
            _ = stop.changed() => break,
            _ = clock.sleep_until(next) => {
                next = next.max(clock.now()) + period;
                if intake.send(Intake::Tick).await.is_err() {
                    break;
                }
            }
        }
    }
}

async fn forward_commands(
    mut commands: mpsc::Receiver<AdminCommand>,
    intake: mpsc::Sender<Intake>,
    mut stop: watch::Receiver<bool>,
) {
    loop {
        tokio::select! {
            _ = stop.changed() => break,
            command = commands.recv() => {
                let Some(command) = command else { break };
                if intake.send(Intake::Command(command)).await.is_err() {
                    break;
                }
            }
        }
    }
}

fn lock(watchdog: &Mutex<Watchdog>) -> MutexGuard<'_, Watchdog> {
    watchdog.lock().unwrap_or_else(|p| p.into_inner())
}

/// State of the serializing step.
struct Session {
    core: EngineCore,
    strategy_tx: mpsc::UnboundedSender<StrategyInput>,
    view_tx: watch::Sender<EngineView>,
    watchdog: Arc<Mutex<Watchdog>>,
    beats: HeartbeatSender,
    feed_stop: watch::Sender<bool>,
    drain_deadline: Option<i64>,
    last_snapshot: i64,
    snapshot_interval: i64,
    drain_timeout: i64,
    clock: WallClock,
}

impl Session {
    fn publish(&self) {
        self.view_tx.send_replace(self.core.view());
    }

    fn route(&self, routed: Vec<StrategyInput>) {
        for input in routed {
            let _ = self.strategy_tx.send(input);
        }
    }

    fn begin_drain(&mut self) {
        if self.drain_deadline.is_some() {
            return;
        }
        let deadline = self.clock.now() + self.drain_timeout;
        info!(
            "Shutting down: market intake stopped, waiting for {} open orders",
            self.core.book().open_count()
        );
        let _ = self.feed_stop.send(true);
        self.drain_deadline = Some(deadline);
    }

    fn drained(&self) -> bool {
        match self.drain_deadline {
            None => false,
            Some(deadline) => {
                let open = self.core.book().open_count();
                if open > 0 && self.clock.now() >= deadline {
                    warn!("Drain timeout: {} orders still open at shutdown", open);
                    return true;
                }
                open == 0
            }
        }
    }

    fn on_strategy_output(&mut self, output: StrategyOutput) -> EngineResult<()> {
        for fault in output.faults {
            self.core.notify(fault);
        }
        for record in &output.records {
            debug!("signal from {}: {:?}", record.signal.strategy_id, record.decision);
        }
        if self.drain_deadline.is_some() {
            for order in output.orders {
                info!("Order {} dropped: engine shutting down", order.id());
                let _ = self.strategy_tx.send(StrategyInput::Rejected {
                    order,
                    reason: "engine shutting down".into(),
                });
            }
            return Ok(());
        }
        let routed = self.core.admit(output.orders)?;
        self.publish();
        self.route(routed);
        Ok(())
    }

    fn on_tick(&mut self) {
        let now = self.clock.now();
        self.beats.beat(self.core.heartbeat(now));
        if self.snapshot_interval > 0 && now - self.last_snapshot >= self.snapshot_interval {
            self.last_snapshot = now;
            if let Err(e) = self.core.persist(SnapshotReason::Periodic, now) {
                error!("Periodic snapshot failed: {}", e);
            }
        }
    }

    fn on_command(&mut self, command: AdminCommand) {
        let now = self.clock.now();
        info!("Operator command: {:?}", command);
        match command {
            AdminCommand::Shutdown => self.begin_drain(),
            AdminCommand::Recover { component } => {
                let mut watchdog = lock(&self.watchdog);
                if !watchdog.recover(component, now) {
                    warn!("{} is not dead, nothing to recover", component);
                    return;
                }
                let still_dead = watchdog.any_dead();
                drop(watchdog);
                if !still_dead {
                    self.core.gate().clear_kill_switch();
                }
                self.core.notify(Notification::ComponentRecovered {
                    component,
                    status: HealthStatus::Alive,
                    timestamp: now,
                });
            }
            AdminCommand::ResumeStrategy { id } => {
                let _ = self.strategy_tx.send(StrategyInput::Resume(id));
            }
            AdminCommand::ClearKillSwitch => {
                if lock(&self.watchdog).any_dead() {
                    warn!("Kill switch kept: a monitored component is still dead");
                } else {
                    self.core.gate().clear_kill_switch();
                }
            }
            AdminCommand::TightenLimit {
                scope,
                metric,
                threshold,
            } => match self.core.gate().tighten(scope.clone(), metric, threshold) {
                Ok(true) => info!("Limit {:?} {:?} now {}", scope, metric, threshold),
                Ok(false) => warn!("Limit {:?} {:?} not widened to {}", scope, metric, threshold),
                Err(e) => warn!("Cannot tighten limit: {}", e),
            },
            AdminCommand::Snapshot => {
                if let Err(e) = self.core.persist(SnapshotReason::Operator, now) {
                    error!("Operator snapshot failed: {}", e);
                }
            }
        }
    }

    async fn drive(&mut self, intake: &mut mpsc::Receiver<Intake>) -> EngineResult<()> {
        while let Some(item) = intake.recv().await {
            match item {
                Intake::Market(event) => {
                    if self.drain_deadline.is_none() {
                        let routed = self.core.on_market_event(&event)?;
                        self.publish();
                        self.route(routed);
                        let _ = self.strategy_tx.send(StrategyInput::Event(event));
                    }
                }
                Intake::LateArrival(notification) => self.core.notify(notification),
                Intake::Strategy(output) => self.on_strategy_output(output)?,
                Intake::Execution(report) => {
                    let routed = self.core.handle_report(report)?;
                    self.publish();
                    self.route(routed);
                }
                Intake::Tick => self.on_tick(),
                Intake::Halt(component) => {
                    error!("Critical component {} is dead, halting", component);
                    return Err(EngineError::ComponentDeath(component));
                }
                Intake::Command(command) => self.on_command(command),
                Intake::FeedClosed => self.begin_drain(),
            }
            if self.drained() {
                break;
            }
        }
        Ok(())
    }
}
