use super::{Policy, RiskContext, RiskDecision};
use trading::{OrderRequest, RiskLimit, RiskScope};

/// Caps the absolute projected quantity of a single instrument.
///
/// Global and instrument scopes look at the whole book; strategy scope looks at the
/// quantity attributed to the ordering strategy.
pub struct MaxPositionPolicy {
    limit: RiskLimit,
}

impl MaxPositionPolicy {
    pub fn new(limit: RiskLimit) -> Self {
        Self { limit }
    }
}

impl Policy for MaxPositionPolicy {
    fn name(&self) -> &str {
        "MaxPosition"
    }

    fn limit(&self) -> &RiskLimit {
        &self.limit
    }

    fn limit_mut(&mut self) -> &mut RiskLimit {
        &mut self.limit
    }

    fn check(&self, order: &OrderRequest, ctx: &RiskContext) -> RiskDecision {
        let (current, projected) = match &self.limit.scope {
            RiskScope::Strategy(strategy_id) => {
                let current = ctx.strategy_current(strategy_id, order.instrument_id());
                (current, current + order.signed_quantity())
            }
            RiskScope::Global | RiskScope::Instrument(_) => (
                ctx.current_quantity(order.instrument_id()),
                ctx.projected_quantity(order),
            ),
        };

        // Orders that shrink the position are always allowed through.
        if projected.abs() > self.limit.threshold && projected.abs() > current.abs() {
            return self.violation(format!(
                "projected position {} in {} exceeds {}",
                projected,
                order.instrument_id(),
                self.limit.threshold
            ));
        }
        RiskDecision::Accept
    }
}
