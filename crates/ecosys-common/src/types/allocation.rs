//! Capital Allocation Record
//!
//! Mapping from active component to its share of total capital. Invariants:
//! - sum of fractions <= 1.0
//! - every fraction <= max_position_size
//!
//! The record carries no timestamps, so two rebalances over identical inputs compare equal.

use std::collections::BTreeMap;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::component::ComponentId;

/// One component's share of capital
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Allotment {
    /// Fraction of total capital
    pub fraction: f64,
    /// Currency amount (fraction x total capital, rounded to cents)
    pub amount: Decimal,
    /// Allotment was scaled down to respect the aggregate drawdown limit
    pub risk_constrained: bool,
}

/// Committed allocation of total capital
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct AllocationRecord {
    /// Total capital the fractions refer to
    pub total_capital: Decimal,
    /// Allotments keyed by component
    pub allotments: BTreeMap<ComponentId, Allotment>,
    /// Aggregate drawdown exposure after any scaling
    pub drawdown_exposure: f64,
    /// Uniform scale applied to respect the drawdown limit (1.0 = untouched)
    pub risk_scale: f64,
}

impl AllocationRecord {
    /// Record with no allotments
    pub fn empty(total_capital: Decimal) -> Self {
        Self {
            total_capital,
            allotments: BTreeMap::new(),
            drawdown_exposure: 0.0,
            risk_scale: 1.0,
        }
    }

    /// Sum of allotted fractions
    pub fn allocated_fraction(&self) -> f64 {
        self.allotments.values().map(|a| a.fraction).sum()
    }

    /// Sum of allotted amounts
    pub fn allocated_amount(&self) -> Decimal {
        self.allotments.values().map(|a| a.amount).sum()
    }

    pub fn get(&self, id: &ComponentId) -> Option<&Allotment> {
        self.allotments.get(id)
    }

    pub fn contains(&self, id: &ComponentId) -> bool {
        self.allotments.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.allotments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.allotments.is_empty()
    }

    /// Components flagged as risk constrained
    pub fn risk_constrained(&self) -> impl Iterator<Item = &ComponentId> {
        self.allotments
            .iter()
            .filter(|(_, a)| a.risk_constrained)
            .map(|(id, _)| id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_totals() {
        let mut record = AllocationRecord::empty(dec!(1000));
        record.allotments.insert(
            ComponentId::new(),
            Allotment {
                fraction: 0.25,
                amount: dec!(250),
                risk_constrained: false,
            },
        );
        record.allotments.insert(
            ComponentId::new(),
            Allotment {
                fraction: 0.5,
                amount: dec!(500),
                risk_constrained: true,
            },
        );

        assert_eq!(record.allocated_amount(), dec!(750));
        assert!((record.allocated_fraction() - 0.75).abs() < 1e-12);
        assert_eq!(record.risk_constrained().count(), 1);
    }
}
