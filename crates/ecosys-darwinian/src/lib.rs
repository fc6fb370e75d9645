//! # Darwinian
//!
//! Evolutionary population management and capital allocation for the Ecosys meta-controller.
//!
//! ## Selection
//!
//! ```text
//! survivors = max(1, ceil(n × survival_rate))
//! ```
//!
//! Where:
//! - n: ACTIVE strategy components that completed the generation's window
//! - ranking: risk-adjusted score, then realized return, both descending
//!
//! ## Allocation
//!
//! Equal weights, capped at `max_position_size` with the surplus water-filled over the
//! uncapped components, then scaled down uniformly while
//! `Σ fraction × max_drawdown > max_drawdown_limit`.

pub mod allocation;
pub mod culling;
pub mod evolution;
pub mod fitness;
pub mod metering;
pub mod registry;
pub mod telemetry;

pub use allocation::{
    AllocationCandidate, CapitalAllocator, EqualWeight, RebalanceOutcome, RiskBreach,
    ScoreWeighted, WeightingPolicy,
};
pub use culling::SurvivalPolicy;
pub use evolution::{EvolutionEngine, RankedComponent, SelectionPlan};
pub use fitness::{FitnessScorer, ReturnOverDrawdown, RiskAdjusted};
pub use metering::MetricsCollector;
pub use registry::{ComponentFilter, ComponentRegistry, PopulationCounts};
pub use telemetry::EvolutionMetrics;

use chrono::Duration;

/// Evolution configuration
#[derive(Debug, Clone)]
pub struct DarwinianConfig {
    /// Fraction of ranked components kept at each generation boundary
    pub survival_rate: f64,
    /// Minimum time between generation attempts
    pub generation_interval: Duration,
    /// Maximum generation length
    pub evaluation_period: Duration,
    /// Per-component cap on the capital fraction
    pub max_position_size: f64,
    /// Cap on Σ fraction × historical max drawdown
    pub max_drawdown_limit: f64,
}

impl Default for DarwinianConfig {
    fn default() -> Self {
        Self {
            survival_rate: 0.2,
            generation_interval: Duration::minutes(60),
            evaluation_period: Duration::days(30),
            max_position_size: 0.1,
            max_drawdown_limit: 0.2,
        }
    }
}
