//! Capital Allocator
//!
//! Splits total capital over the active strategy components:
//! 1. Base weights from the [`WeightingPolicy`] (equal by default)
//! 2. Water-filling under `max_position_size`
//! 3. Uniform scale-down while aggregate drawdown exposure exceeds `max_drawdown_limit`
//!
//! The committed record has a single writer at a time; readers take an `Arc` snapshot.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use ecosys_common::{
    AllocationRecord, Allotment, ComponentId, EcosysError, Result, ALLOCATION_EPSILON,
};
use parking_lot::{Mutex, RwLock};
use rust_decimal::prelude::FromPrimitive;
use rust_decimal::Decimal;
use serde::Serialize;
use tracing::{debug, info, instrument, warn};

use super::water_fill::water_fill;
use super::weighting::{EqualWeight, WeightingPolicy};
use crate::DarwinianConfig;

/// One active component as seen by the allocator
#[derive(Debug, Clone, PartialEq)]
pub struct AllocationCandidate {
    pub id: ComponentId,
    /// Current fitness, used by score-based weighting
    pub score: f64,
    /// Largest drawdown the component has ever shown
    pub historical_drawdown: f64,
}

impl AllocationCandidate {
    pub fn new(id: ComponentId) -> Self {
        Self {
            id,
            score: 0.0,
            historical_drawdown: 0.0,
        }
    }
}

/// Aggregate drawdown exposure was over the limit and allotments were scaled down
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RiskBreach {
    /// Exposure before scaling
    pub exposure: f64,
    pub limit: f64,
    /// Factor applied to every allotment
    pub scale: f64,
    /// Components flagged as risk constrained
    pub constrained: Vec<ComponentId>,
}

impl From<&RiskBreach> for EcosysError {
    fn from(breach: &RiskBreach) -> Self {
        EcosysError::RiskLimitBreach {
            exposure: breach.exposure,
            limit: breach.limit,
        }
    }
}

/// Result of a rebalance
#[derive(Debug, Clone)]
pub struct RebalanceOutcome {
    pub record: Arc<AllocationRecord>,
    /// Water-filling passes
    pub passes: usize,
    pub breach: Option<RiskBreach>,
    /// Committed record differs from the previous one
    pub changed: bool,
}

/// Capital allocator with an exclusively written, snapshot-read record
pub struct CapitalAllocator {
    max_position_size: f64,
    max_drawdown_limit: f64,
    weighting: Box<dyn WeightingPolicy>,
    current: RwLock<Arc<AllocationRecord>>,
    /// Serializes rebalances
    writer: Mutex<()>,
    frozen: AtomicBool,
}

impl CapitalAllocator {
    pub fn new(config: &DarwinianConfig, initial_capital: Decimal) -> Self {
        Self {
            max_position_size: config.max_position_size,
            max_drawdown_limit: config.max_drawdown_limit,
            weighting: Box::new(EqualWeight),
            current: RwLock::new(Arc::new(AllocationRecord::empty(initial_capital))),
            writer: Mutex::new(()),
            frozen: AtomicBool::new(false),
        }
    }

    /// Replace the base weighting policy
    pub fn with_weighting(mut self, weighting: Box<dyn WeightingPolicy>) -> Self {
        self.weighting = weighting;
        self
    }

    pub fn weighting_name(&self) -> &'static str {
        self.weighting.name()
    }

    /// Last committed record
    pub fn current(&self) -> Arc<AllocationRecord> {
        self.current.read().clone()
    }

    /// Compute a record without committing it
    pub fn compute(
        &self,
        candidates: &[AllocationCandidate],
        total_capital: Decimal,
    ) -> (AllocationRecord, usize, Option<RiskBreach>) {
        // Deduplicate and order by id so identical inputs give identical records
        let unique: BTreeMap<ComponentId, &AllocationCandidate> =
            candidates.iter().map(|c| (c.id, c)).collect();
        let ordered: Vec<AllocationCandidate> = unique.into_values().cloned().collect();

        if ordered.is_empty() {
            return (AllocationRecord::empty(total_capital), 0, None);
        }

        let weights = self.weighting.weights(&ordered);
        let fill = water_fill(&weights, self.max_position_size);
        let mut fractions = fill.fractions;

        let drawdowns: Vec<f64> = ordered
            .iter()
            .map(|c| sanitize_drawdown(c.historical_drawdown))
            .collect();
        let exposure = weighted_exposure(&fractions, &drawdowns);

        let mut scale = 1.0;
        let mut breach = None;
        if exposure > self.max_drawdown_limit + ALLOCATION_EPSILON {
            scale = self.max_drawdown_limit / exposure;
            for f in fractions.iter_mut() {
                *f *= scale;
            }
            let constrained: Vec<ComponentId> = ordered
                .iter()
                .zip(&fractions)
                .filter(|(_, f)| **f > 0.0)
                .map(|(c, _)| c.id)
                .collect();
            breach = Some(RiskBreach {
                exposure,
                limit: self.max_drawdown_limit,
                scale,
                constrained,
            });
        }

        let constrained = breach.is_some();
        let allotments: BTreeMap<ComponentId, Allotment> = ordered
            .iter()
            .zip(&fractions)
            .map(|(c, f)| {
                (
                    c.id,
                    Allotment {
                        fraction: *f,
                        amount: amount_of(total_capital, *f),
                        risk_constrained: constrained && *f > 0.0,
                    },
                )
            })
            .collect();

        let record = AllocationRecord {
            total_capital,
            allotments,
            drawdown_exposure: weighted_exposure(&fractions, &drawdowns),
            risk_scale: scale,
        };
        (record, fill.passes, breach)
    }

    /// Compute and commit a new record for the given active set and capital
    #[instrument(skip(self, candidates), fields(candidates = candidates.len()))]
    pub fn rebalance(
        &self,
        candidates: &[AllocationCandidate],
        total_capital: Decimal,
    ) -> Result<RebalanceOutcome> {
        let _writer = self.writer.lock();
        if self.is_frozen() {
            return Err(EcosysError::AllocationFrozen);
        }

        let (record, passes, breach) = self.compute(candidates, total_capital);

        if let Some(b) = &breach {
            warn!(
                exposure = b.exposure,
                limit = b.limit,
                scale = b.scale,
                constrained = b.constrained.len(),
                "Drawdown exposure over limit, allotments scaled down"
            );
        }

        let previous = self.current();
        let changed = *previous != record;
        let record = if changed {
            let record = Arc::new(record);
            *self.current.write() = record.clone();
            info!(
                components = record.len(),
                allocated = record.allocated_fraction(),
                total_capital = %record.total_capital,
                passes,
                "Allocation committed"
            );
            record
        } else {
            debug!("Allocation unchanged");
            previous
        };

        Ok(RebalanceOutcome {
            record,
            passes,
            breach,
            changed,
        })
    }

    /// Install a previously persisted record (startup)
    pub fn restore(&self, record: AllocationRecord) {
        let _writer = self.writer.lock();
        *self.current.write() = Arc::new(record);
    }

    /// Stop accepting rebalances; the current record stays committed
    pub fn freeze(&self) {
        let _writer = self.writer.lock();
        self.frozen.store(true, Ordering::SeqCst);
        info!("Allocation frozen");
    }

    pub fn is_frozen(&self) -> bool {
        self.frozen.load(Ordering::SeqCst)
    }
}

fn weighted_exposure(fractions: &[f64], drawdowns: &[f64]) -> f64 {
    fractions.iter().zip(drawdowns).map(|(f, d)| f * d).sum()
}

/// Unknown drawdown counts as total loss
fn sanitize_drawdown(drawdown: f64) -> f64 {
    if drawdown.is_finite() {
        drawdown.clamp(0.0, 1.0)
    } else {
        1.0
    }
}

fn amount_of(total_capital: Decimal, fraction: f64) -> Decimal {
    Decimal::from_f64(fraction)
        .map(|f| (total_capital * f).round_dp(2))
        .unwrap_or(Decimal::ZERO)
}
