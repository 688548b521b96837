//! Hosts strategy plugins and turns their signals into order requests.
//!
//! Every call into plugin code goes through one guard that converts both errors
//! and panics into a `StrategyFault`. A faulting strategy is suspended; the others
//! keep running.

pub mod registry;
pub mod task;

pub use registry::StrategyRegistry;
pub use task::{StrategyInput, StrategyTask};

use crate::error::{EngineError, EngineResult};
use crate::models::StrategyConfig;
use log::{info, warn};
use serde::{Deserialize, Serialize};
use std::any::Any;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use trading::{
    ComponentId, Heartbeat, MarketEvent, Notification, OrderFailure, OrderFill, OrderId,
    OrderRequest, PortfolioSnapshot, Signal, SizingDecision, Strategy, StrategyError, StrategyId,
};

/// Hands out order ids: unique and strictly increasing for the whole run.
#[derive(Debug, Clone)]
pub struct OrderIdGenerator {
    next: Arc<AtomicU64>,
}

impl Default for OrderIdGenerator {
    fn default() -> Self {
        Self::starting_at(1)
    }
}

impl OrderIdGenerator {
    pub fn starting_at(first: u64) -> Self {
        Self {
            next: Arc::new(AtomicU64::new(first)),
        }
    }

    pub fn next_id(&self) -> OrderId {
        OrderId::new(self.next.fetch_add(1, Ordering::SeqCst))
    }

    /// Makes every later id greater than `issued`. Never moves backwards.
    pub fn advance_past(&self, issued: OrderId) {
        self.next.fetch_max(issued.value() + 1, Ordering::SeqCst);
    }
}

/// What became of one signal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SignalDecision {
    Ordered(OrderId),
    Skipped(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignalRecord {
    pub signal: Signal,
    pub decision: SignalDecision,
}

/// Result of evaluating one market event across all strategies.
#[derive(Debug, Clone, Default)]
pub struct StrategyOutput {
    pub orders: Vec<OrderRequest>,
    pub records: Vec<SignalRecord>,
    pub faults: Vec<Notification>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum SlotState {
    Active,
    Suspended(String),
}

struct StrategySlot {
    id: StrategyId,
    strategy: Box<dyn Strategy>,
    state: SlotState,
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

impl StrategySlot {
    fn is_active(&self) -> bool {
        self.state == SlotState::Active
    }

    /// Runs plugin code, catching errors and panics.
    fn guarded<T>(
        &mut self,
        f: impl FnOnce(&mut dyn Strategy) -> Result<T, StrategyError>,
    ) -> Result<T, String> {
        let strategy = self.strategy.as_mut();
        match catch_unwind(AssertUnwindSafe(|| f(strategy))) {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(e)) => Err(e.to_string()),
            Err(payload) => Err(format!("panicked: {}", panic_message(payload))),
        }
    }

    fn suspend(&mut self, detail: String, timestamp: i64) -> Notification {
        warn!("Strategy {} faulted and is suspended: {}", self.id, detail);
        self.state = SlotState::Suspended(detail.clone());
        Notification::StrategyFault {
            strategy_id: self.id.clone(),
            detail,
            timestamp,
        }
    }
}

pub struct StrategyRuntime {
    slots: Vec<StrategySlot>,
    ids: OrderIdGenerator,
}

impl StrategyRuntime {
    pub fn new(ids: OrderIdGenerator) -> Self {
        Self {
            slots: Vec::new(),
            ids,
        }
    }

    /// Instantiates every configured strategy. Unknown kinds are a configuration error;
    /// initialisation failures suspend the strategy and are returned as faults.
    pub fn from_config(
        configs: &[StrategyConfig],
        registry: &StrategyRegistry,
        ids: OrderIdGenerator,
    ) -> EngineResult<(Self, Vec<Notification>)> {
        let mut runtime = Self::new(ids);
        let mut faults = Vec::new();
        for config in configs {
            let strategy = registry.create(&config.kind).ok_or_else(|| {
                EngineError::InvalidConfig(format!(
                    "unknown strategy kind `{}` for {}",
                    config.kind, config.id
                ))
            })?;
            if let Some(fault) = runtime.add(config.id.clone(), strategy, &config.params) {
                faults.push(fault);
            }
        }
        Ok((runtime, faults))
    }

    /// Adds and initialises a strategy. Returns a fault if `on_init` fails.
    pub fn add(
        &mut self,
        id: StrategyId,
        strategy: Box<dyn Strategy>,
        params: &serde_json::Value,
    ) -> Option<Notification> {
        let mut slot = StrategySlot {
            id,
            strategy,
            state: SlotState::Active,
        };
        let result = slot.guarded(|s| s.on_init(params));
        let fault = match result {
            Ok(()) => {
                info!("Strategy {} ({}) initialised", slot.id, slot.strategy.name());
                None
            }
            Err(detail) => Some(slot.suspend(format!("on_init: {}", detail), 0)),
        };
        self.slots.push(slot);
        fault
    }

    pub fn ids(&self) -> &OrderIdGenerator {
        &self.ids
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn state(&self, id: &StrategyId) -> Option<&SlotState> {
        self.slots.iter().find(|s| &s.id == id).map(|s| &s.state)
    }

    /// Operator action: reactivates a suspended strategy.
    pub fn resume(&mut self, id: &StrategyId) -> bool {
        match self.slots.iter_mut().find(|s| &s.id == id) {
            Some(slot) if !slot.is_active() => {
                info!("Strategy {} resumed", id);
                slot.state = SlotState::Active;
                true
            }
            _ => false,
        }
    }

    /// Evaluates the event in every active strategy, in registration order.
    pub fn on_market_event(&mut self, event: &MarketEvent, portfolio: &PortfolioSnapshot) -> StrategyOutput {
        let mut output = StrategyOutput::default();
        let ids = self.ids.clone();

        for slot in self.slots.iter_mut().filter(|s| s.is_active()) {
            let signals = match slot.guarded(|s| s.on_market_event(event, portfolio)) {
                Ok(signals) => signals,
                Err(detail) => {
                    output.faults.push(slot.suspend(detail, event.timestamp()));
                    continue;
                }
            };

            for mut signal in signals {
                signal.strategy_id = slot.id.clone();
                if !slot.is_active() {
                    output.records.push(SignalRecord {
                        signal,
                        decision: SignalDecision::Skipped("strategy suspended".into()),
                    });
                    continue;
                }
                let sizing = {
                    let signal = &signal;
                    slot.guarded(|s| Ok(s.size(signal, portfolio)))
                };
                let decision = match sizing {
                    Err(detail) => {
                        output.faults.push(slot.suspend(detail, event.timestamp()));
                        SignalDecision::Skipped("strategy faulted while sizing".into())
                    }
                    Ok(SizingDecision::Skip(reason)) => SignalDecision::Skipped(reason),
                    Ok(SizingDecision::Order { quantity, .. })
                        if !quantity.is_finite() || quantity <= 0.0 =>
                    {
                        SignalDecision::Skipped(format!("unusable quantity {}", quantity))
                    }
                    Ok(SizingDecision::Order {
                        side,
                        quantity,
                        order_type,
                    }) => {
                        let order = OrderRequest::new(
                            ids.next_id(),
                            side,
                            quantity,
                            order_type,
                            signal.clone(),
                            event.timestamp(),
                        );
                        let id = order.id();
                        output.orders.push(order);
                        SignalDecision::Ordered(id)
                    }
                };
                output.records.push(SignalRecord { signal, decision });
            }
        }
        output
    }

    fn slot_for(&mut self, id: &StrategyId) -> Option<&mut StrategySlot> {
        self.slots.iter_mut().find(|s| &s.id == id && s.is_active())
    }

    pub fn on_fill(&mut self, order: &OrderRequest, fill: &OrderFill) -> Option<Notification> {
        let slot = self.slot_for(order.strategy_id())?;
        match slot.guarded(|s| s.on_fill(fill)) {
            Ok(()) => None,
            Err(detail) => Some(slot.suspend(format!("on_fill: {}", detail), fill.fill_timestamp)),
        }
    }

    pub fn on_order_rejected(&mut self, order: &OrderRequest, reason: &str) -> Option<Notification> {
        let slot = self.slot_for(order.strategy_id())?;
        match slot.guarded(|s| {
            s.on_order_rejected(order, reason);
            Ok(())
        }) {
            Ok(()) => None,
            Err(detail) => Some(slot.suspend(detail, order.submitted_at())),
        }
    }

    pub fn on_order_failed(&mut self, order: &OrderRequest, failure: &OrderFailure) -> Option<Notification> {
        let slot = self.slot_for(order.strategy_id())?;
        match slot.guarded(|s| {
            s.on_order_failed(failure);
            Ok(())
        }) {
            Ok(()) => None,
            Err(detail) => Some(slot.suspend(detail, failure.timestamp)),
        }
    }

    /// Routes an order outcome or operator action to the strategy it concerns.
    pub fn deliver(&mut self, input: StrategyInput) -> Option<Notification> {
        match input {
            StrategyInput::Fill { order, fill } => self.on_fill(&order, &fill),
            StrategyInput::Rejected { order, reason } => self.on_order_rejected(&order, &reason),
            StrategyInput::Failed { order, failure } => self.on_order_failed(&order, &failure),
            StrategyInput::Resume(id) => {
                self.resume(&id);
                None
            }
            StrategyInput::Event(event) => {
                warn!("market event at {} delivered outside evaluation, ignored", event.timestamp());
                None
            }
        }
    }

    /// Calls `on_shutdown` on every strategy, suspended ones included.
    pub fn shutdown(&mut self) {
        for slot in &mut self.slots {
            if let Err(detail) = slot.guarded(|s| {
                s.on_shutdown();
                Ok(())
            }) {
                warn!("Strategy {} failed during shutdown: {}", slot.id, detail);
            }
        }
    }

    pub fn heartbeat(&self, now: i64) -> Heartbeat {
        Heartbeat::alive(ComponentId::StrategyRuntime, now)
    }
}
