//! Component liveness supervision.
//!
//! Each monitored component moves Healthy -> Degraded -> Dead as its heartbeat ages.
//! Dead is latched: only an explicit operator recovery clears it, so one fault
//! episode triggers its side effects exactly once.

pub mod supervisor;

pub use supervisor::{Supervisor, WatchdogTask};

use log::{error, info, warn};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tokio::sync::mpsc;
use trading::{ComponentId, HealthStatus, Heartbeat, Notification};

fn default_interval_ms() -> u64 {
    1_000
}

fn default_degraded_after() -> u32 {
    1
}

fn default_dead_after() -> u32 {
    3
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WatchdogConfig {
    /// Expected heartbeat period, also the polling period.
    #[serde(default = "default_interval_ms")]
    pub interval_ms: u64,
    /// Missed intervals before a component counts as degraded.
    #[serde(default = "default_degraded_after")]
    pub degraded_after: u32,
    /// Missed intervals before a component counts as dead.
    #[serde(default = "default_dead_after")]
    pub dead_after: u32,
}

impl Default for WatchdogConfig {
    fn default() -> Self {
        Self {
            interval_ms: default_interval_ms(),
            degraded_after: default_degraded_after(),
            dead_after: default_dead_after(),
        }
    }
}

impl WatchdogConfig {
    fn degraded_timeout(&self) -> i64 {
        (self.interval_ms * u64::from(self.degraded_after)) as i64
    }

    fn dead_timeout(&self) -> i64 {
        (self.interval_ms * u64::from(self.dead_after)) as i64
    }
}

/// Whether transitions have consequences.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatchdogMode {
    /// Backtest: transitions are logged, nothing else.
    Observe,
    /// Live: transitions produce actions.
    Enforce,
}

/// Side effects requested by the watchdog. The caller carries them out.
#[derive(Debug, Clone, PartialEq)]
pub enum WatchdogAction {
    PersistSnapshot(ComponentId),
    FreezeAdmission(ComponentId),
    Alert(Notification),
    Halt(ComponentId),
}

#[derive(Debug, Clone)]
struct ComponentHealth {
    last_seen: i64,
    reported: HealthStatus,
    state: HealthStatus,
}

pub struct Watchdog {
    config: WatchdogConfig,
    mode: WatchdogMode,
    table: BTreeMap<ComponentId, ComponentHealth>,
}

impl Watchdog {
    pub fn new(
        config: WatchdogConfig,
        mode: WatchdogMode,
        components: &[ComponentId],
        start: i64,
    ) -> Self {
        let table = components
            .iter()
            .map(|c| {
                (
                    *c,
                    ComponentHealth {
                        last_seen: start,
                        reported: HealthStatus::Alive,
                        state: HealthStatus::Alive,
                    },
                )
            })
            .collect();
        Self {
            config,
            mode,
            table,
        }
    }

    pub fn config(&self) -> &WatchdogConfig {
        &self.config
    }

    pub fn status(&self, component: ComponentId) -> Option<HealthStatus> {
        self.table.get(&component).map(|h| h.state)
    }

    pub fn any_dead(&self) -> bool {
        self.table.values().any(|h| h.state == HealthStatus::Dead)
    }

    /// Records a heartbeat. Last value wins; a latched Dead state is not lifted.
    pub fn observe(&mut self, heartbeat: Heartbeat) {
        let Some(health) = self.table.get_mut(&heartbeat.component) else {
            return;
        };
        if heartbeat.timestamp >= health.last_seen {
            health.last_seen = heartbeat.timestamp;
            health.reported = heartbeat.status;
        }
    }

    /// Re-evaluates every component at `now` and returns the actions due.
    pub fn evaluate(&mut self, now: i64) -> Vec<WatchdogAction> {
        let degraded_timeout = self.config.degraded_timeout();
        let dead_timeout = self.config.dead_timeout();
        let mut actions = Vec::new();

        for (component, health) in self.table.iter_mut() {
            if health.state == HealthStatus::Dead {
                continue;
            }
            let age = now - health.last_seen;
            let next = if age > dead_timeout || health.reported == HealthStatus::Dead {
                HealthStatus::Dead
            } else if age > degraded_timeout || health.reported == HealthStatus::Degraded {
                HealthStatus::Degraded
            } else {
                HealthStatus::Alive
            };
            if next == health.state {
                continue;
            }
            let previous = health.state;
            health.state = next;

            match next {
                HealthStatus::Dead => {
                    error!("{} dead: no heartbeat for {} ms", component, age);
                    actions.push(WatchdogAction::PersistSnapshot(*component));
                    actions.push(WatchdogAction::FreezeAdmission(*component));
                    actions.push(WatchdogAction::Alert(Notification::ComponentDeath {
                        component: *component,
                        timestamp: now,
                    }));
                    if component.is_critical() {
                        actions.push(WatchdogAction::Halt(*component));
                    }
                }
                HealthStatus::Degraded => {
                    warn!("{} degraded: heartbeat {} ms old", component, age);
                    actions.push(WatchdogAction::Alert(Notification::ComponentStall {
                        component: *component,
                        timestamp: now,
                    }));
                }
                HealthStatus::Alive => {
                    info!("{} healthy again (was {:?})", component, previous);
                    actions.push(WatchdogAction::Alert(Notification::ComponentRecovered {
                        component: *component,
                        status: HealthStatus::Alive,
                        timestamp: now,
                    }));
                }
            }
        }

        match self.mode {
            WatchdogMode::Enforce => actions,
            WatchdogMode::Observe => Vec::new(),
        }
    }

    /// Operator action: clears a Dead latch. Returns false if the component was not dead.
    pub fn recover(&mut self, component: ComponentId, now: i64) -> bool {
        let Some(health) = self.table.get_mut(&component) else {
            return false;
        };
        if health.state != HealthStatus::Dead {
            return false;
        }
        info!("operator recovered {}", component);
        health.state = HealthStatus::Alive;
        health.reported = HealthStatus::Alive;
        health.last_seen = now;
        true
    }
}

/// Cloneable handle components use to publish heartbeats.
///
/// Heartbeats are last-value-wins, so a full channel simply drops the beat.
#[derive(Debug, Clone)]
pub struct HeartbeatSender {
    tx: mpsc::Sender<Heartbeat>,
}

impl HeartbeatSender {
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<Heartbeat>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (Self { tx }, rx)
    }

    pub fn beat(&self, heartbeat: Heartbeat) {
        let _ = self.tx.try_send(heartbeat);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn watchdog(mode: WatchdogMode) -> Watchdog {
        Watchdog::new(
            WatchdogConfig {
                interval_ms: 100,
                degraded_after: 1,
                dead_after: 3,
            },
            mode,
            &ComponentId::ALL,
            0,
        )
    }

    fn beat_all_except(wd: &mut Watchdog, skip: ComponentId, now: i64) {
        for c in ComponentId::ALL {
            if c != skip {
                wd.observe(Heartbeat::alive(c, now));
            }
        }
    }

    fn count(actions: &[WatchdogAction], f: impl Fn(&WatchdogAction) -> bool) -> usize {
        actions.iter().filter(|a| f(a)).count()
    }

    #[test]
    fn missing_heartbeats_go_degraded_then_dead() {
        let mut wd = watchdog(WatchdogMode::Enforce);
        let adapter = ComponentId::ExecutionAdapter;

        beat_all_except(&mut wd, adapter, 150);
        let actions = wd.evaluate(150);
        assert_eq!(wd.status(adapter), Some(HealthStatus::Degraded));
        assert_eq!(actions.len(), 1);

        beat_all_except(&mut wd, adapter, 350);
        let actions = wd.evaluate(350);
        assert_eq!(wd.status(adapter), Some(HealthStatus::Dead));
        assert_eq!(
            count(&actions, |a| matches!(a, WatchdogAction::PersistSnapshot(_))),
            1
        );
        assert!(actions.contains(&WatchdogAction::FreezeAdmission(adapter)));
        assert!(actions.contains(&WatchdogAction::Halt(adapter)));
    }

    #[test]
    fn dead_is_latched_for_the_episode() {
        let mut wd = watchdog(WatchdogMode::Enforce);
        let feed = ComponentId::MarketFeed;
        beat_all_except(&mut wd, feed, 400);
        let first = wd.evaluate(400);
        assert_eq!(
            count(&first, |a| matches!(a, WatchdogAction::PersistSnapshot(_))),
            1
        );
        // Market feed is not critical.
        assert!(!first.iter().any(|a| matches!(a, WatchdogAction::Halt(_))));

        // Comes back briefly, then stalls again, all without operator recovery.
        wd.observe(Heartbeat::alive(feed, 450));
        assert!(wd.evaluate(450).is_empty());
        beat_all_except(&mut wd, feed, 1_000);
        assert!(wd.evaluate(1_000).is_empty());
        assert_eq!(wd.status(feed), Some(HealthStatus::Dead));

        assert!(wd.recover(feed, 1_000));
        assert_eq!(wd.status(feed), Some(HealthStatus::Alive));
        assert!(!wd.recover(feed, 1_000));
    }

    #[test]
    fn observe_mode_only_logs() {
        let mut wd = watchdog(WatchdogMode::Observe);
        assert!(wd.evaluate(10_000).is_empty());
        assert!(wd.any_dead());
    }

    #[test]
    fn self_reported_degraded_is_honoured() {
        let mut wd = watchdog(WatchdogMode::Enforce);
        wd.observe(Heartbeat::degraded(ComponentId::ExecutionAdapter, 10));
        wd.evaluate(10);
        assert_eq!(
            wd.status(ComponentId::ExecutionAdapter),
            Some(HealthStatus::Degraded)
        );
        wd.observe(Heartbeat::alive(ComponentId::ExecutionAdapter, 20));
        let actions = wd.evaluate(20);
        assert_eq!(
            wd.status(ComponentId::ExecutionAdapter),
            Some(HealthStatus::Alive)
        );
        assert!(matches!(
            actions[0],
            WatchdogAction::Alert(Notification::ComponentRecovered { .. })
        ));
    }
}
