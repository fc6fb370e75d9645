//! Survival policy: keep ceil(n × survival_rate), never fewer than one

/// Slack so products like 10 × 0.3 = 3.0000000000000004 do not round up an extra survivor
const ROUNDING_SLACK: f64 = 1e-9;

#[derive(Debug, Clone, Copy)]
pub struct SurvivalPolicy {
    survival_rate: f64,
}

impl SurvivalPolicy {
    pub fn new(survival_rate: f64) -> Self {
        Self {
            survival_rate: survival_rate.clamp(0.0, 1.0),
        }
    }

    pub fn survival_rate(&self) -> f64 {
        self.survival_rate
    }

    /// Number of survivors out of `ranked` evaluated components
    pub fn survivors(&self, ranked: usize) -> usize {
        if ranked == 0 {
            return 0;
        }
        let raw = (ranked as f64 * self.survival_rate - ROUNDING_SLACK).ceil();
        (raw.max(0.0) as usize).clamp(1, ranked)
    }

    /// Number of components culled out of `ranked`
    pub fn culled(&self, ranked: usize) -> usize {
        ranked - self.survivors(ranked)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ten_at_twenty_percent() {
        let policy = SurvivalPolicy::new(0.2);
        assert_eq!(policy.survivors(10), 2);
        assert_eq!(policy.culled(10), 8);
    }

    #[test]
    fn test_rounds_up() {
        let policy = SurvivalPolicy::new(0.2);
        assert_eq!(policy.survivors(6), 2);
        assert_eq!(policy.survivors(11), 3);
    }

    #[test]
    fn test_exact_products_do_not_round_up() {
        assert_eq!(SurvivalPolicy::new(0.3).survivors(10), 3);
        assert_eq!(SurvivalPolicy::new(0.7).survivors(10), 7);
    }

    #[test]
    fn test_zero_rate_keeps_best() {
        let policy = SurvivalPolicy::new(0.0);
        assert_eq!(policy.survivors(5), 1);
    }

    #[test]
    fn test_full_rate_keeps_all() {
        assert_eq!(SurvivalPolicy::new(1.0).survivors(7), 7);
    }

    #[test]
    fn test_empty_population() {
        assert_eq!(SurvivalPolicy::new(0.5).survivors(0), 0);
    }
}
