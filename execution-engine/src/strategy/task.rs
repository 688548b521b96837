use super::{StrategyOutput, StrategyRuntime};
use crate::clock::{Clock, WallClock};
use crate::models::{EngineView, Intake};
use crate::watchdog::HeartbeatSender;
use log::info;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use trading::{MarketEvent, OrderFailure, OrderFill, OrderRequest, StrategyId};

/// Work routed from the engine step to the strategy task.
#[derive(Debug)]
pub enum StrategyInput {
    Event(MarketEvent),
    Fill { order: OrderRequest, fill: OrderFill },
    Rejected { order: OrderRequest, reason: String },
    Failed { order: OrderRequest, failure: OrderFailure },
    Resume(StrategyId),
}

/// Live-mode host for the strategy runtime.
///
/// Strategies read the latest published engine view and never touch the ledger.
/// Their output goes back through the intake queue so that admission stays in
/// the serializing step. The input channel is unbounded: the engine step must
/// never wait on the task that is waiting on it.
pub struct StrategyTask {
    runtime: StrategyRuntime,
    inputs: mpsc::UnboundedReceiver<StrategyInput>,
    view: watch::Receiver<EngineView>,
    intake: mpsc::Sender<Intake>,
    heartbeats: HeartbeatSender,
    heartbeat_interval: Duration,
    clock: WallClock,
}

impl StrategyTask {
    pub fn new(
        runtime: StrategyRuntime,
        inputs: mpsc::UnboundedReceiver<StrategyInput>,
        view: watch::Receiver<EngineView>,
        intake: mpsc::Sender<Intake>,
        heartbeats: HeartbeatSender,
        heartbeat_interval: Duration,
    ) -> Self {
        Self {
            runtime,
            inputs,
            view,
            intake,
            heartbeats,
            heartbeat_interval,
            clock: WallClock::new(),
        }
    }

    /// Runs until the engine drops its input sender, then shuts strategies down.
    pub async fn run(mut self) -> StrategyRuntime {
        let mut ticker = tokio::time::interval(self.heartbeat_interval);
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.heartbeats.beat(self.runtime.heartbeat(self.clock.now()));
                }
                input = self.inputs.recv() => {
                    let Some(input) = input else { break };
                    if !self.handle(input).await {
                        break;
                    }
                }
            }
        }
        self.runtime.shutdown();
        info!("Strategy runtime stopped");
        self.runtime
    }

    async fn handle(&mut self, input: StrategyInput) -> bool {
        let fault = match input {
            StrategyInput::Event(event) => {
                let snapshot = self.view.borrow().snapshot.clone();
                let output = self.runtime.on_market_event(&event, &snapshot);
                self.heartbeats.beat(self.runtime.heartbeat(self.clock.now()));
                return self.intake.send(Intake::Strategy(output)).await.is_ok();
            }
            other => self.runtime.deliver(other),
        };
        match fault {
            Some(fault) => {
                let output = StrategyOutput {
                    faults: vec![fault],
                    ..Default::default()
                };
                self.intake.send(Intake::Strategy(output)).await.is_ok()
            }
            None => true,
        }
    }
}
