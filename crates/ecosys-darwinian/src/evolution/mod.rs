//! Evolution module: generation scheduling and survivor selection
pub mod engine;

pub use self::engine::{EvolutionEngine, RankedComponent, SelectionPlan};
