use serde::{Deserialize, Serialize};
use trading::Side;

/// Commission and tax schedule applied to every fill.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct FeeSchedule {
    /// Fraction of notional, e.g. 0.0003.
    #[serde(default)]
    pub commission_rate: f64,
    /// Floor applied to the commission of any non-empty fill.
    #[serde(default)]
    pub minimum_commission: f64,
    /// Charged on sells only.
    #[serde(default)]
    pub sell_tax_rate: f64,
}

impl FeeSchedule {
    pub fn zero() -> Self {
        Self::default()
    }

    pub fn fee(&self, side: Side, quantity: f64, price: f64) -> f64 {
        let notional = (quantity * price).abs();
        if notional <= 0.0 {
            return 0.0;
        }
        let commission = (notional * self.commission_rate).max(self.minimum_commission);
        let tax = match side {
            Side::Sell => notional * self.sell_tax_rate,
            Side::Buy => 0.0,
        };
        round2(commission + tax)
    }
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn minimum_commission_applies_to_small_fills() {
        let fees = FeeSchedule {
            commission_rate: 0.0003,
            minimum_commission: 5.0,
            sell_tax_rate: 0.0,
        };
        assert_eq!(fees.fee(Side::Buy, 10.0, 10.0), 5.0);
        assert_eq!(fees.fee(Side::Buy, 10_000.0, 10.0), 30.0);
    }

    #[test]
    fn sell_tax_only_on_sells() {
        let fees = FeeSchedule {
            commission_rate: 0.0,
            minimum_commission: 0.0,
            sell_tax_rate: 0.001,
        };
        assert_eq!(fees.fee(Side::Buy, 1_000.0, 10.0), 0.0);
        assert_eq!(fees.fee(Side::Sell, 1_000.0, 10.0), 10.0);
    }

    #[test]
    fn zero_schedule_is_free() {
        assert_eq!(FeeSchedule::zero().fee(Side::Sell, 123.0, 45.6), 0.0);
    }
}
