//! Pre-trade risk gate.
//!
//! Limits are evaluated global first, then per instrument, then per strategy, and
//! the first violation decides. Accepted orders reserve their exposure inside the
//! same critical section that evaluated them, so two racing orders cannot both use
//! headroom that only one of them fits in.

pub mod exposure;
pub mod max_daily_loss;
pub mod max_notional;
pub mod max_position;

pub use exposure::{ExposureBook, Reservation};
pub use max_daily_loss::MaxDailyLossPolicy;
pub use max_notional::MaxNotionalPolicy;
pub use max_position::MaxPositionPolicy;

use crate::error::{EngineError, EngineResult};
use log::{info, warn};
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard};
use trading::{
    InstrumentId, OrderFill, OrderId, OrderRequest, PendingOrder, PortfolioSnapshot, RiskLimit,
    RiskMetric, RiskScope, StrategyId,
};

#[derive(Debug, Clone, PartialEq)]
pub struct RiskRejection {
    /// The limit that failed, if the rejection came from a limit.
    pub limit: Option<RiskLimit>,
    pub reason: String,
}

impl fmt::Display for RiskRejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.limit {
            Some(limit) => write!(f, "{} ({})", self.reason, limit),
            None => f.write_str(&self.reason),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum RiskDecision {
    Accept,
    Reject(RiskRejection),
}

impl RiskDecision {
    pub fn is_accept(&self) -> bool {
        matches!(self, RiskDecision::Accept)
    }

    fn reject(reason: impl Into<String>) -> Self {
        RiskDecision::Reject(RiskRejection {
            limit: None,
            reason: reason.into(),
        })
    }
}

/// State visible to policies while one order is evaluated.
pub struct RiskContext<'a> {
    pub snapshot: &'a PortfolioSnapshot,
    pub book: &'a ExposureBook,
    /// Price used to value the candidate order.
    pub reference_price: f64,
}

impl RiskContext<'_> {
    /// Filled plus reserved quantity.
    pub fn current_quantity(&self, instrument_id: &InstrumentId) -> f64 {
        self.snapshot.quantity(instrument_id) + self.book.reserved_quantity(instrument_id)
    }

    pub fn projected_quantity(&self, order: &OrderRequest) -> f64 {
        self.current_quantity(order.instrument_id()) + order.signed_quantity()
    }

    pub fn strategy_current(&self, strategy_id: &StrategyId, instrument_id: &InstrumentId) -> f64 {
        self.book.strategy_quantity(strategy_id, instrument_id)
    }

    /// Price for valuing `instrument_id`: the reference price for the order's instrument.
    pub fn price_for(&self, order: &OrderRequest, instrument_id: &InstrumentId) -> f64 {
        if instrument_id == order.instrument_id() {
            self.reference_price
        } else {
            self.snapshot.mark(instrument_id).unwrap_or(0.0)
        }
    }

    /// Whether the order moves the instrument's absolute exposure up.
    pub fn increases_exposure(&self, order: &OrderRequest) -> bool {
        self.projected_quantity(order).abs()
            > self.current_quantity(order.instrument_id()).abs() + f64::EPSILON
    }
}

pub trait Policy: Send + Sync {
    fn name(&self) -> &str;
    fn limit(&self) -> &RiskLimit;
    fn limit_mut(&mut self) -> &mut RiskLimit;
    fn check(&self, order: &OrderRequest, ctx: &RiskContext) -> RiskDecision;

    fn violation(&self, reason: String) -> RiskDecision {
        RiskDecision::Reject(RiskRejection {
            limit: Some(self.limit().clone()),
            reason,
        })
    }
}

pub fn policy_for(limit: RiskLimit) -> EngineResult<Box<dyn Policy>> {
    if !limit.threshold.is_finite() || limit.threshold < 0.0 {
        return Err(EngineError::InvalidConfig(format!(
            "risk limit {} has an invalid threshold",
            limit
        )));
    }
    Ok(match limit.metric {
        RiskMetric::MaxPosition => Box::new(MaxPositionPolicy::new(limit)),
        RiskMetric::MaxNotional => Box::new(MaxNotionalPolicy::new(limit)),
        RiskMetric::MaxDailyLoss => {
            if matches!(limit.scope, RiskScope::Strategy(_)) {
                return Err(EngineError::InvalidConfig(format!(
                    "daily loss limits cannot be scoped to a strategy: {}",
                    limit
                )));
            }
            if limit.threshold <= 0.0 {
                return Err(EngineError::InvalidConfig(format!(
                    "daily loss limit must be positive: {}",
                    limit
                )));
            }
            Box::new(MaxDailyLossPolicy::new(limit))
        }
    })
}

struct GateState {
    policies: Vec<Box<dyn Policy>>,
    book: ExposureBook,
}

impl GateState {
    fn sort(&mut self) {
        self.policies.sort_by_key(|p| p.limit().scope.rank());
    }
}

pub struct RiskGate {
    state: Mutex<GateState>,
    kill_switch: AtomicBool,
}

impl RiskGate {
    pub fn new(limits: Vec<RiskLimit>) -> EngineResult<Self> {
        let policies = limits
            .into_iter()
            .map(policy_for)
            .collect::<EngineResult<Vec<_>>>()?;
        let mut state = GateState {
            policies,
            book: ExposureBook::default(),
        };
        state.sort();
        Ok(Self {
            state: Mutex::new(state),
            kill_switch: AtomicBool::new(false),
        })
    }

    pub fn unrestricted() -> Self {
        Self {
            state: Mutex::new(GateState {
                policies: Vec::new(),
                book: ExposureBook::default(),
            }),
            kill_switch: AtomicBool::new(false),
        }
    }

    fn lock(&self) -> MutexGuard<'_, GateState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Checks an order against every matching limit and reserves its exposure on success.
    ///
    /// Rejections are terminal for the order; nothing is retried here.
    pub fn admit(&self, order: &OrderRequest, snapshot: &PortfolioSnapshot) -> RiskDecision {
        if self.is_frozen() {
            warn!("Order {} rejected: admission frozen", order.id());
            return RiskDecision::reject("kill switch engaged");
        }
        if !order.quantity().is_finite() || order.quantity() <= 0.0 {
            return RiskDecision::reject(format!("invalid quantity {}", order.quantity()));
        }
        let reference_price = match order
            .limit_price()
            .or_else(|| snapshot.mark(order.instrument_id()))
        {
            Some(price) => price,
            None => {
                warn!("Order {} rejected: no price for {}", order.id(), order.instrument_id());
                return RiskDecision::reject(format!(
                    "no reference price for {}",
                    order.instrument_id()
                ));
            }
        };

        let mut state = self.lock();
        let ctx = RiskContext {
            snapshot,
            book: &state.book,
            reference_price,
        };
        for policy in state
            .policies
            .iter()
            .filter(|p| p.limit().scope.applies_to(order.instrument_id(), order.strategy_id()))
        {
            if let RiskDecision::Reject(rejection) = policy.check(order, &ctx) {
                warn!(
                    "Order {} rejected by policy {}: {}",
                    order.id(),
                    policy.name(),
                    rejection
                );
                return RiskDecision::Reject(rejection);
            }
        }
        state.book.reserve(order, order.quantity());
        RiskDecision::Accept
    }

    pub fn on_fill(&self, order: &OrderRequest, fill: &OrderFill) {
        self.lock().book.on_fill(order, fill);
    }

    /// Drops whatever is still reserved for an order that will not fill further.
    pub fn release(&self, order_id: OrderId) {
        self.lock().book.release(order_id);
    }

    /// Rebuilds reservations for orders still working after a restore.
    pub fn restore(&self, pending: &[PendingOrder]) {
        let mut state = self.lock();
        state.book.clear();
        for order in pending {
            state.book.reserve(&order.request, order.remaining());
        }
    }

    pub fn reserved_quantity(&self, instrument_id: &InstrumentId) -> f64 {
        self.lock().book.reserved_quantity(instrument_id)
    }

    pub fn engage_kill_switch(&self, reason: &str) {
        if !self.kill_switch.swap(true, Ordering::SeqCst) {
            warn!("Kill switch engaged: {}", reason);
        }
    }

    pub fn clear_kill_switch(&self) {
        if self.kill_switch.swap(false, Ordering::SeqCst) {
            info!("Kill switch cleared");
        }
    }

    pub fn is_frozen(&self) -> bool {
        self.kill_switch.load(Ordering::SeqCst)
    }

    /// Lowers an existing limit or adds a new one. Never widens.
    pub fn tighten(&self, scope: RiskScope, metric: RiskMetric, threshold: f64) -> EngineResult<bool> {
        let mut state = self.lock();
        if let Some(policy) = state
            .policies
            .iter_mut()
            .find(|p| p.limit().same_key(&scope, metric))
        {
            let tightened = policy.limit_mut().tighten(threshold);
            if tightened {
                info!("Tightened {}", policy.limit());
            } else {
                warn!("Refused to widen {} to {}", policy.limit(), threshold);
            }
            return Ok(tightened);
        }
        let policy = policy_for(RiskLimit::new(scope, metric, threshold))?;
        info!("Added limit {}", policy.limit());
        state.policies.push(policy);
        state.sort();
        Ok(true)
    }

    pub fn limits(&self) -> Vec<RiskLimit> {
        self.lock().policies.iter().map(|p| p.limit().clone()).collect()
    }
}

#[cfg(test)]
mod tests;
