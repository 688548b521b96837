use super::{BackoffConfig, ExecutionAdapter, FillCorrelator};
use crate::clock::{Clock, WallClock};
use crate::ledger::FeeSchedule;
use crate::models::Intake;
use crate::watchdog::HeartbeatSender;
use log::{error, info, warn};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use trading::{
    BrokerGateway, ComponentId, ExecutionReport, FailureKind, GatewayError, GatewayEvent,
    Heartbeat, MarketEvent, OrderFailure, OrderId, OrderRequest, PendingOrder,
};

#[derive(Debug, Clone)]
pub struct LiveConfig {
    pub broker_timeout: Duration,
    pub backoff: BackoffConfig,
    pub heartbeat_interval: Duration,
    pub fees: FeeSchedule,
}

fn lock(correlator: &Mutex<FillCorrelator>) -> MutexGuard<'_, FillCorrelator> {
    correlator.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Execution adapter that forwards orders to an external broker.
///
/// Submission is fire-and-forget from the engine's point of view: the broker round
/// trip runs on its own task under a timeout, and everything the venue says comes
/// back through the engine's intake queue.
pub struct LiveExchange {
    gateway: Arc<dyn BrokerGateway>,
    correlator: Arc<Mutex<FillCorrelator>>,
    connected: Arc<AtomicBool>,
    intake: mpsc::Sender<Intake>,
    config: LiveConfig,
    clock: WallClock,
}

impl LiveExchange {
    pub fn new(gateway: Arc<dyn BrokerGateway>, config: LiveConfig, intake: mpsc::Sender<Intake>) -> Self {
        Self {
            gateway,
            correlator: Arc::new(Mutex::new(FillCorrelator::new(config.fees))),
            connected: Arc::new(AtomicBool::new(false)),
            intake,
            config,
            clock: WallClock::new(),
        }
    }

    /// Builds the task that receives venue notifications for this adapter.
    pub fn receiver(&self, heartbeats: HeartbeatSender, stop: watch::Receiver<bool>) -> FillReceiver {
        FillReceiver {
            gateway: self.gateway.clone(),
            correlator: self.correlator.clone(),
            connected: self.connected.clone(),
            intake: self.intake.clone(),
            heartbeats,
            backoff: self.config.backoff,
            heartbeat_interval: self.config.heartbeat_interval,
            stop,
            clock: self.clock,
        }
    }

    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }
}

impl ExecutionAdapter for LiveExchange {
    fn submit(&mut self, order: &OrderRequest) -> Vec<ExecutionReport> {
        let now = self.clock.now();
        if !self.is_connected() {
            warn!("Order {} not sent: gateway disconnected", order.id());
            return vec![ExecutionReport::Failed(OrderFailure::new(
                order.id(),
                FailureKind::Network,
                "gateway disconnected",
                now,
            ))];
        }
        lock(&self.correlator).register(order);

        let gateway = self.gateway.clone();
        let intake = self.intake.clone();
        let timeout = self.config.broker_timeout;
        let clock = self.clock;
        let order = order.clone();
        tokio::spawn(async move {
            let failure = match tokio::time::timeout(timeout, gateway.submit_order(&order)).await {
                Ok(Ok(())) => return,
                Ok(Err(GatewayError::Rejected(reason))) => (FailureKind::VenueRejected, reason),
                Ok(Err(e)) => (FailureKind::Network, e.to_string()),
                Err(_) => (
                    FailureKind::Timeout,
                    format!("no broker answer within {} ms", timeout.as_millis()),
                ),
            };
            warn!("Order {} failed at submission: {:?} {}", order.id(), failure.0, failure.1);
            let report = ExecutionReport::Failed(OrderFailure::new(
                order.id(),
                failure.0,
                failure.1,
                clock.now(),
            ));
            let _ = intake.send(Intake::Execution(report)).await;
        });
        Vec::new()
    }

    fn on_market_event(&mut self, _event: &MarketEvent) -> Vec<ExecutionReport> {
        Vec::new()
    }

    fn cancel_all(&mut self, _timestamp: i64) -> Vec<ExecutionReport> {
        let open = lock(&self.correlator).open_orders();
        if open > 0 {
            info!("{} live orders left working at the venue", open);
        }
        Vec::new()
    }

    fn working_orders(&self) -> usize {
        lock(&self.correlator).open_orders()
    }

    fn order_closed(&mut self, order_id: OrderId) {
        lock(&self.correlator).close(order_id);
    }

    fn restore(&mut self, pending: &[PendingOrder]) {
        let mut correlator = lock(&self.correlator);
        for order in pending {
            correlator.restore(&order.request, order.filled_quantity, &order.fill_ids);
        }
    }

    fn heartbeat(&self, now: i64) -> Heartbeat {
        if self.is_connected() {
            Heartbeat::alive(ComponentId::ExecutionAdapter, now)
        } else {
            Heartbeat::degraded(ComponentId::ExecutionAdapter, now)
        }
    }
}

/// Receives venue notifications, correlates them and feeds the engine.
///
/// Owns the single reconnection loop: when the venue stream ends it retries with
/// capped exponential backoff, reporting Degraded meanwhile. If every attempt fails
/// the task ends and its heartbeats stop.
pub struct FillReceiver {
    gateway: Arc<dyn BrokerGateway>,
    correlator: Arc<Mutex<FillCorrelator>>,
    connected: Arc<AtomicBool>,
    intake: mpsc::Sender<Intake>,
    heartbeats: HeartbeatSender,
    backoff: BackoffConfig,
    heartbeat_interval: Duration,
    stop: watch::Receiver<bool>,
    clock: WallClock,
}

impl FillReceiver {
    fn beat(&self) {
        let now = self.clock.now();
        let heartbeat = if self.connected.load(Ordering::SeqCst) {
            Heartbeat::alive(ComponentId::ExecutionAdapter, now)
        } else {
            Heartbeat::degraded(ComponentId::ExecutionAdapter, now)
        };
        self.heartbeats.beat(heartbeat);
    }

    async fn reconnect(&mut self) -> bool {
        self.connected.store(false, Ordering::SeqCst);
        for attempt in 0..self.backoff.max_attempts {
            self.beat();
            match self.gateway.connect().await {
                Ok(()) => {
                    self.connected.store(true, Ordering::SeqCst);
                    info!("Gateway connected after {} attempt(s)", attempt + 1);
                    self.beat();
                    return true;
                }
                Err(e) => warn!("Gateway connect attempt {} failed: {}", attempt + 1, e),
            }
            if !self.wait_backoff(self.backoff.delay(attempt)).await {
                return false;
            }
        }
        error!(
            "Gateway unreachable after {} attempts, giving up",
            self.backoff.max_attempts
        );
        false
    }

    /// Sleeps out one backoff delay while still reporting Degraded. False on stop.
    async fn wait_backoff(&mut self, delay: Duration) -> bool {
        let wake = tokio::time::sleep(delay);
        tokio::pin!(wake);
        let mut ticker = tokio::time::interval(self.heartbeat_interval);
        ticker.tick().await;
        loop {
            tokio::select! {
                _ = &mut wake => return true,
                _ = ticker.tick() => self.beat(),
                _ = self.stop.changed() => return false,
            }
        }
    }

    async fn forward(&self, report: ExecutionReport) -> bool {
        self.intake.send(Intake::Execution(report)).await.is_ok()
    }

    pub async fn run(mut self) {
        if !self.reconnect().await {
            return;
        }
        let mut ticker = tokio::time::interval(self.heartbeat_interval);
        loop {
            tokio::select! {
                _ = self.stop.changed() => break,
                _ = ticker.tick() => self.beat(),
                event = self.gateway.next_event() => {
                    let report = match event {
                        Some(GatewayEvent::Fill(fill)) => lock(&self.correlator).on_fill(fill),
                        Some(GatewayEvent::Rejected { order_id, reason, timestamp }) => {
                            warn!("Venue rejected order {}: {}", order_id, reason);
                            Some(lock(&self.correlator).on_rejected(order_id, reason, timestamp))
                        }
                        Some(GatewayEvent::Disconnected { reason }) => {
                            warn!("Gateway disconnected: {}", reason);
                            if !self.reconnect().await {
                                break;
                            }
                            None
                        }
                        None => {
                            warn!("Gateway event stream ended");
                            if !self.reconnect().await {
                                break;
                            }
                            None
                        }
                    };
                    if let Some(report) = report {
                        if !self.forward(report).await {
                            break;
                        }
                    }
                }
            }
        }
        info!("Fill receiver stopped");
    }
}
