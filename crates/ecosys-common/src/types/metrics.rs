//! Performance records reported by components

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::component::ComponentId;

/// One closed trade reported by a component
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TradeResult {
    /// Fractional return of the trade (0.02 = +2%)
    pub return_pct: f64,
    /// Close timestamp
    pub closed_at: DateTime<Utc>,
}

impl TradeResult {
    pub fn new(return_pct: f64) -> Self {
        Self {
            return_pct,
            closed_at: Utc::now(),
        }
    }

    pub fn at(return_pct: f64, closed_at: DateTime<Utc>) -> Self {
        Self {
            return_pct,
            closed_at,
        }
    }
}

/// Aggregate performance of one component over the current evaluation window
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComponentMetrics {
    pub component_id: ComponentId,
    /// Compounded return over the window
    pub realized_return: f64,
    /// Largest peak-to-trough decline of window equity, as a fraction of the peak
    pub max_drawdown: f64,
    /// Mean trade return over its standard deviation, scaled by sqrt(trade count)
    pub risk_adjusted_score: f64,
    pub trade_count: u64,
    /// Generation this window belongs to
    pub window_generation: u64,
    pub updated_at: DateTime<Utc>,
}

impl ComponentMetrics {
    /// Metrics of a component that has not traded in this window
    pub fn empty(component_id: ComponentId, window_generation: u64) -> Self {
        Self {
            component_id,
            realized_return: 0.0,
            max_drawdown: 0.0,
            risk_adjusted_score: 0.0,
            trade_count: 0,
            window_generation,
            updated_at: Utc::now(),
        }
    }
}
