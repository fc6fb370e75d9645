//! Fitness calculation: primary score used to rank components at a generation boundary
//!
//! Ties on the primary score are broken by realized return in the evolution engine.

use ecosys_common::ComponentMetrics;

/// Floor on drawdown so a flawless window does not divide by zero
const MIN_DRAWDOWN: f64 = 0.01;

/// Replaceable scoring formula
pub trait FitnessScorer: Send + Sync {
    /// Higher is fitter
    fn score(&self, metrics: &ComponentMetrics) -> f64;

    fn name(&self) -> &'static str;
}

/// Sharpe-like score computed by the metrics collector
#[derive(Debug, Clone, Copy, Default)]
pub struct RiskAdjusted;

impl FitnessScorer for RiskAdjusted {
    fn score(&self, metrics: &ComponentMetrics) -> f64 {
        metrics.risk_adjusted_score
    }

    fn name(&self) -> &'static str {
        "risk_adjusted"
    }
}

/// Calmar-like score: realized return over max drawdown
#[derive(Debug, Clone, Copy, Default)]
pub struct ReturnOverDrawdown;

impl FitnessScorer for ReturnOverDrawdown {
    fn score(&self, metrics: &ComponentMetrics) -> f64 {
        metrics.realized_return / metrics.max_drawdown.max(MIN_DRAWDOWN)
    }

    fn name(&self) -> &'static str {
        "return_over_drawdown"
    }
}
