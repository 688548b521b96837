use super::{Policy, RiskContext, RiskDecision};
use trading::{OrderRequest, RiskLimit, RiskScope};

/// Caps gross exposure valued at the latest marks.
pub struct MaxNotionalPolicy {
    limit: RiskLimit,
}

impl MaxNotionalPolicy {
    pub fn new(limit: RiskLimit) -> Self {
        Self { limit }
    }

    fn exposures(&self, order: &OrderRequest, ctx: &RiskContext) -> (f64, f64) {
        match &self.limit.scope {
            RiskScope::Instrument(_) => {
                let price = ctx.reference_price;
                (
                    ctx.current_quantity(order.instrument_id()).abs() * price,
                    ctx.projected_quantity(order).abs() * price,
                )
            }
            RiskScope::Global => {
                let mut current = 0.0;
                let mut projected = 0.0;
                let mut instruments = ctx.book.book_instruments(ctx.snapshot);
                if !instruments.contains(order.instrument_id()) {
                    instruments.push(order.instrument_id().clone());
                }
                for instrument in &instruments {
                    let price = ctx.price_for(order, instrument);
                    let qty = ctx.current_quantity(instrument);
                    current += qty.abs() * price;
                    projected += if instrument == order.instrument_id() {
                        (qty + order.signed_quantity()).abs() * price
                    } else {
                        qty.abs() * price
                    };
                }
                (current, projected)
            }
            RiskScope::Strategy(strategy_id) => {
                let mut current = 0.0;
                let mut projected = 0.0;
                let mut instruments = ctx.book.strategy_instruments(strategy_id);
                if !instruments.contains(order.instrument_id()) {
                    instruments.push(order.instrument_id().clone());
                }
                for instrument in &instruments {
                    let price = ctx.price_for(order, instrument);
                    let qty = ctx.strategy_current(strategy_id, instrument);
                    current += qty.abs() * price;
                    projected += if instrument == order.instrument_id() {
                        (qty + order.signed_quantity()).abs() * price
                    } else {
                        qty.abs() * price
                    };
                }
                (current, projected)
            }
        }
    }
}

impl Policy for MaxNotionalPolicy {
    fn name(&self) -> &str {
        "MaxNotional"
    }

    fn limit(&self) -> &RiskLimit {
        &self.limit
    }

    fn limit_mut(&mut self) -> &mut RiskLimit {
        &mut self.limit
    }

    fn check(&self, order: &OrderRequest, ctx: &RiskContext) -> RiskDecision {
        let (current, projected) = self.exposures(order, ctx);
        if projected > self.limit.threshold && projected > current {
            return self.violation(format!(
                "projected notional {:.2} exceeds {:.2}",
                projected, self.limit.threshold
            ));
        }
        RiskDecision::Accept
    }
}
