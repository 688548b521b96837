use super::{Watchdog, WatchdogAction};
use crate::clock::{Clock, WallClock};
use crate::models::{EngineView, Intake};
use crate::risk_guard::RiskGate;
use log::{error, info};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use trading::{AlertSink, ComponentId, Heartbeat, RecoveryState, SnapshotReason, SnapshotStore};

/// Carries out watchdog actions against the engine's collaborators.
#[derive(Clone)]
pub struct Supervisor {
    run_id: String,
    gate: Arc<RiskGate>,
    store: Arc<dyn SnapshotStore>,
    alerts: Arc<dyn AlertSink>,
}

impl Supervisor {
    pub fn new(
        run_id: impl Into<String>,
        gate: Arc<RiskGate>,
        store: Arc<dyn SnapshotStore>,
        alerts: Arc<dyn AlertSink>,
    ) -> Self {
        Self {
            run_id: run_id.into(),
            gate,
            store,
            alerts,
        }
    }

    /// Applies actions in order and returns the components whose death must halt the run.
    pub fn apply(&self, actions: Vec<WatchdogAction>, view: &EngineView, now: i64) -> Vec<ComponentId> {
        let mut halts = Vec::new();
        for action in actions {
            match action {
                WatchdogAction::PersistSnapshot(component) => {
                    let state = RecoveryState::new(
                        self.run_id.clone(),
                        now,
                        SnapshotReason::ComponentDeath(component),
                        (*view.snapshot).clone(),
                        view.pending.as_ref().clone(),
                    );
                    match self.store.save(&state) {
                        Ok(key) => info!("Snapshot {} persisted after {} died", key, component),
                        Err(e) => error!("Failed to persist snapshot after {} died: {}", component, e),
                    }
                }
                WatchdogAction::FreezeAdmission(component) => {
                    self.gate
                        .engage_kill_switch(&format!("{} is dead", component));
                }
                WatchdogAction::Alert(notification) => self.alerts.notify(&notification),
                WatchdogAction::Halt(component) => halts.push(component),
            }
        }
        halts
    }
}

fn lock(watchdog: &Mutex<Watchdog>) -> std::sync::MutexGuard<'_, Watchdog> {
    watchdog.lock().unwrap_or_else(|p| p.into_inner())
}

/// Live watchdog loop: collects heartbeats and evaluates on every interval.
pub struct WatchdogTask {
    watchdog: Arc<Mutex<Watchdog>>,
    supervisor: Supervisor,
    heartbeats: mpsc::Receiver<Heartbeat>,
    view: watch::Receiver<EngineView>,
    intake: mpsc::Sender<Intake>,
    stop: watch::Receiver<bool>,
    clock: WallClock,
}

impl WatchdogTask {
    pub fn new(
        watchdog: Arc<Mutex<Watchdog>>,
        supervisor: Supervisor,
        heartbeats: mpsc::Receiver<Heartbeat>,
        view: watch::Receiver<EngineView>,
        intake: mpsc::Sender<Intake>,
        stop: watch::Receiver<bool>,
    ) -> Self {
        Self {
            watchdog,
            supervisor,
            heartbeats,
            view,
            intake,
            stop,
            clock: WallClock::new(),
        }
    }

    pub async fn run(mut self) {
        let interval = Duration::from_millis(lock(&self.watchdog).config().interval_ms);
        let mut ticker = tokio::time::interval(interval);
        loop {
            tokio::select! {
                _ = self.stop.changed() => break,
                Some(heartbeat) = self.heartbeats.recv() => lock(&self.watchdog).observe(heartbeat),
                _ = ticker.tick() => {
                    let now = self.clock.now();
                    let actions = lock(&self.watchdog).evaluate(now);
                    if actions.is_empty() {
                        continue;
                    }
                    let view = self.view.borrow().clone();
                    for component in self.supervisor.apply(actions, &view, now) {
                        if self.intake.send(Intake::Halt(component)).await.is_err() {
                            return;
                        }
                    }
                }
            }
        }
        info!("Watchdog stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemorySnapshotStore;
    use crate::watchdog::{WatchdogConfig, WatchdogMode};
    use trading::{HealthStatus, Notification};

    struct Recorder(Mutex<Vec<Notification>>);

    impl AlertSink for Recorder {
        fn notify(&self, notification: &Notification) {
            self.0.lock().unwrap().push(notification.clone());
        }
    }

    #[test]
    fn adapter_death_snapshots_once_and_freezes() {
        let gate = Arc::new(RiskGate::unrestricted());
        let store = Arc::new(MemorySnapshotStore::new());
        let alerts = Arc::new(Recorder(Mutex::new(Vec::new())));
        let supervisor = Supervisor::new("run", gate.clone(), store.clone(), alerts.clone());

        let components = [ComponentId::MarketFeed, ComponentId::ExecutionAdapter];
        let config = WatchdogConfig {
            interval_ms: 100,
            degraded_after: 1,
            dead_after: 3,
        };
        let mut watchdog = Watchdog::new(config, WatchdogMode::Enforce, &components, 0);
        let view = EngineView::initial(10_000.0);

        let mut halts = Vec::new();
        for now in (100..=900).step_by(100) {
            watchdog.observe(Heartbeat::alive(ComponentId::MarketFeed, now));
            halts.extend(supervisor.apply(watchdog.evaluate(now), &view, now));
        }

        assert_eq!(halts, vec![ComponentId::ExecutionAdapter]);
        assert_eq!(store.len(), 1);
        assert!(gate.is_frozen());
        assert_eq!(watchdog.status(ComponentId::ExecutionAdapter), Some(HealthStatus::Dead));
        let deaths = alerts
            .0
            .lock()
            .unwrap()
            .iter()
            .filter(|n| matches!(n, Notification::ComponentDeath { .. }))
            .count();
        assert_eq!(deaths, 1);
    }
}
