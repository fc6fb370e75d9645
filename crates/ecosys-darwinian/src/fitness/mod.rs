//! Fitness scoring module
pub mod calculator;

pub use self::calculator::{FitnessScorer, ReturnOverDrawdown, RiskAdjusted};
