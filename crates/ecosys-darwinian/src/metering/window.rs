//! Streaming window aggregate

use chrono::{DateTime, Utc};
use ecosys_common::{ComponentId, ComponentMetrics, TradeResult};

/// Floor on the return deviation so constant-return windows keep a finite score
const MIN_DEVIATION: f64 = 1e-6;

/// Running aggregate of one component's trades
#[derive(Debug, Clone)]
pub struct WindowAccumulator {
    count: u64,
    mean: f64,
    /// Sum of squared deviations from the mean
    m2: f64,
    /// Compounded equity, starting at 1.0
    equity: f64,
    peak: f64,
    max_drawdown: f64,
    updated_at: DateTime<Utc>,
}

impl Default for WindowAccumulator {
    fn default() -> Self {
        Self {
            count: 0,
            mean: 0.0,
            m2: 0.0,
            equity: 1.0,
            peak: 1.0,
            max_drawdown: 0.0,
            updated_at: Utc::now(),
        }
    }
}

impl WindowAccumulator {
    pub fn push(&mut self, trade: &TradeResult) {
        let r = trade.return_pct;

        self.count += 1;
        let delta = r - self.mean;
        self.mean += delta / self.count as f64;
        self.m2 += delta * (r - self.mean);

        self.equity = (self.equity * (1.0 + r)).max(0.0);
        self.peak = self.peak.max(self.equity);
        if self.peak > 0.0 {
            let drawdown = (self.peak - self.equity) / self.peak;
            self.max_drawdown = self.max_drawdown.max(drawdown);
        }

        self.updated_at = self.updated_at.max(trade.closed_at);
    }

    pub fn count(&self) -> u64 {
        self.count
    }

    pub fn realized_return(&self) -> f64 {
        self.equity - 1.0
    }

    pub fn max_drawdown(&self) -> f64 {
        self.max_drawdown
    }

    /// Per-trade Sharpe-like ratio scaled by sqrt(count); zero below two trades
    pub fn risk_adjusted_score(&self) -> f64 {
        if self.count < 2 {
            return 0.0;
        }
        let variance = self.m2 / (self.count - 1) as f64;
        let deviation = variance.sqrt().max(MIN_DEVIATION);
        self.mean / deviation * (self.count as f64).sqrt()
    }

    pub fn to_metrics(&self, component_id: ComponentId, window_generation: u64) -> ComponentMetrics {
        ComponentMetrics {
            component_id,
            realized_return: self.realized_return(),
            max_drawdown: self.max_drawdown,
            risk_adjusted_score: self.risk_adjusted_score(),
            trade_count: self.count,
            window_generation,
            updated_at: self.updated_at,
        }
    }
}
