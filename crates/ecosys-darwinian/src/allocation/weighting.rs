//! Base weighting policies applied before capping

use super::allocator::AllocationCandidate;

/// Replaceable base-weight policy
pub trait WeightingPolicy: Send + Sync {
    /// One weight per candidate, same order; need not be normalized
    fn weights(&self, candidates: &[AllocationCandidate]) -> Vec<f64>;

    fn name(&self) -> &'static str;
}

/// Every candidate gets the same share
#[derive(Debug, Clone, Copy, Default)]
pub struct EqualWeight;

impl WeightingPolicy for EqualWeight {
    fn weights(&self, candidates: &[AllocationCandidate]) -> Vec<f64> {
        vec![1.0; candidates.len()]
    }

    fn name(&self) -> &'static str {
        "equal"
    }
}

/// Shares proportional to positive fitness; a small floor keeps unproven components funded
#[derive(Debug, Clone, Copy)]
pub struct ScoreWeighted {
    pub floor: f64,
}

impl Default for ScoreWeighted {
    fn default() -> Self {
        Self { floor: 0.1 }
    }
}

impl WeightingPolicy for ScoreWeighted {
    fn weights(&self, candidates: &[AllocationCandidate]) -> Vec<f64> {
        candidates
            .iter()
            .map(|c| {
                let score = if c.score.is_finite() { c.score } else { 0.0 };
                score.max(0.0) + self.floor
            })
            .collect()
    }

    fn name(&self) -> &'static str {
        "score"
    }
}
