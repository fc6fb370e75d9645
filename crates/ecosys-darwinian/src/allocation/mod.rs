//! Capital allocation module
pub mod allocator;
pub mod water_fill;
pub mod weighting;

pub use self::allocator::{AllocationCandidate, CapitalAllocator, RebalanceOutcome, RiskBreach};
pub use self::water_fill::{water_fill, WaterFill};
pub use self::weighting::{EqualWeight, ScoreWeighted, WeightingPolicy};
