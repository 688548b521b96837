use super::{Policy, RiskContext, RiskDecision};
use trading::{OrderRequest, RiskLimit, RiskScope};

/// Once the day's loss reaches the threshold, only exposure-reducing orders pass.
pub struct MaxDailyLossPolicy {
    limit: RiskLimit,
}

impl MaxDailyLossPolicy {
    pub fn new(limit: RiskLimit) -> Self {
        Self { limit }
    }
}

impl Policy for MaxDailyLossPolicy {
    fn name(&self) -> &str {
        "MaxDailyLoss"
    }

    fn limit(&self) -> &RiskLimit {
        &self.limit
    }

    fn limit_mut(&mut self) -> &mut RiskLimit {
        &mut self.limit
    }

    fn check(&self, order: &OrderRequest, ctx: &RiskContext) -> RiskDecision {
        let daily_pnl = match &self.limit.scope {
            RiskScope::Global => ctx.snapshot.daily_pnl,
            RiskScope::Instrument(id) => ctx
                .snapshot
                .position(id)
                .map_or(0.0, |p| p.daily_pnl()),
            RiskScope::Strategy(_) => return RiskDecision::Accept,
        };
        if daily_pnl <= -self.limit.threshold && ctx.increases_exposure(order) {
            return self.violation(format!(
                "daily P&L {:.2} breached loss limit {:.2}",
                daily_pnl, self.limit.threshold
            ));
        }
        RiskDecision::Accept
    }
}
