//! Iterative water-filling
//!
//! Caps every share at `cap` and spreads the surplus over the uncapped shares in proportion to
//! their size. Each pass either caps at least one more share or stops, so N shares converge in
//! at most N passes. Surplus that no uncapped share can absorb stays unallocated.

use ecosys_common::ALLOCATION_EPSILON;

/// Result of a water-filling run
#[derive(Debug, Clone, PartialEq)]
pub struct WaterFill {
    /// Final fractions, same order as the input weights
    pub fractions: Vec<f64>,
    /// Capping passes performed
    pub passes: usize,
}

impl WaterFill {
    pub fn total(&self) -> f64 {
        self.fractions.iter().sum()
    }
}

/// Normalize `weights` to sum to one and water-fill them under `cap`
pub fn water_fill(weights: &[f64], cap: f64) -> WaterFill {
    let n = weights.len();
    if n == 0 {
        return WaterFill {
            fractions: Vec::new(),
            passes: 0,
        };
    }

    let cap = cap.clamp(0.0, 1.0);
    let mut fractions = normalize(weights);
    let mut capped = vec![false; n];
    let mut passes = 0;

    while passes < n {
        let mut surplus = 0.0;
        let mut newly_capped = false;

        for i in 0..n {
            if !capped[i] && fractions[i] > cap + ALLOCATION_EPSILON {
                surplus += fractions[i] - cap;
                fractions[i] = cap;
                capped[i] = true;
                newly_capped = true;
            }
        }

        if !newly_capped {
            break;
        }
        passes += 1;

        let uncapped_total: f64 = (0..n).filter(|&i| !capped[i]).map(|i| fractions[i]).sum();
        if uncapped_total <= 0.0 {
            break;
        }
        for i in 0..n {
            if !capped[i] {
                fractions[i] += surplus * fractions[i] / uncapped_total;
            }
        }
    }

    // Redistribution may leave shares a rounding error above the cap
    for f in fractions.iter_mut() {
        *f = f.min(cap);
    }

    let total: f64 = fractions.iter().sum();
    if total > 1.0 {
        for f in fractions.iter_mut() {
            *f /= total;
        }
    }

    WaterFill { fractions, passes }
}

/// Non-negative weights scaled to sum to one; equal weights when nothing usable is given
fn normalize(weights: &[f64]) -> Vec<f64> {
    let cleaned: Vec<f64> = weights
        .iter()
        .map(|w| if w.is_finite() && *w > 0.0 { *w } else { 0.0 })
        .collect();
    let total: f64 = cleaned.iter().sum();

    if total <= 0.0 {
        let equal = 1.0 / weights.len() as f64;
        return vec![equal; weights.len()];
    }
    cleaned.into_iter().map(|w| w / total).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_uncapped_equal_weights() {
        let fill = water_fill(&[1.0; 4], 0.5);
        assert_eq!(fill.passes, 0);
        for f in &fill.fractions {
            assert!((f - 0.25).abs() < 1e-12);
        }
    }

    #[test]
    fn test_all_capped_leaves_surplus() {
        let fill = water_fill(&[1.0; 5], 0.15);
        assert!(fill.passes <= 5);
        for f in &fill.fractions {
            assert!((f - 0.15).abs() < 1e-12);
        }
        assert!((fill.total() - 0.75).abs() < 1e-12);
    }

    #[test]
    fn test_surplus_flows_to_uncapped() {
        // 0.7 capped to 0.4, surplus 0.3 split 2:1 over 0.2 and 0.1
        let fill = water_fill(&[0.7, 0.2, 0.1], 0.4);
        assert!((fill.fractions[0] - 0.4).abs() < 1e-9);
        assert!((fill.fractions[1] - 0.4).abs() < 1e-9);
        assert!((fill.fractions[2] - 0.2).abs() < 1e-9);
        assert!((fill.total() - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_cascading_caps() {
        let fill = water_fill(&[0.5, 0.3, 0.15, 0.05], 0.3);
        assert!(fill.passes >= 2);
        assert!(fill.passes <= 4);
        for f in &fill.fractions {
            assert!(*f <= 0.3 + ALLOCATION_EPSILON);
        }
        assert!(fill.total() <= 1.0 + ALLOCATION_EPSILON);
    }

    #[test]
    fn test_degenerate_weights_fall_back_to_equal() {
        let fill = water_fill(&[0.0, f64::NAN, -1.0], 1.0);
        for f in &fill.fractions {
            assert!((f - 1.0 / 3.0).abs() < 1e-12);
        }
    }

    #[test]
    fn test_empty() {
        let fill = water_fill(&[], 0.1);
        assert!(fill.fractions.is_empty());
        assert_eq!(fill.passes, 0);
    }
}
