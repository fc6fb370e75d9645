//! Evolution Engine
//!
//! Decides when a generation boundary is due and which components survive it. The engine only
//! computes a [`SelectionPlan`]; the meta-controller applies the transitions, registers the
//! replacements and rotates the metric windows.

use std::cmp::Ordering;

use chrono::{DateTime, Duration, Utc};
use ecosys_common::{
    Component, ComponentId, ComponentMetrics, ComponentStatus, EcosysError, Generation, Result,
    MIN_SELECTION_SAMPLE,
};
use serde::Serialize;
use tracing::{debug, info};

use crate::culling::SurvivalPolicy;
use crate::fitness::{FitnessScorer, RiskAdjusted};
use crate::DarwinianConfig;

/// A component with its fitness at the boundary
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RankedComponent {
    pub id: ComponentId,
    pub score: f64,
    pub realized_return: f64,
}

/// Outcome of ranking one generation
#[derive(Debug, Clone, Serialize)]
pub struct SelectionPlan {
    /// Generation being closed
    pub generation: u64,
    /// Ranked candidates, fittest first
    pub ranked: Vec<RankedComponent>,
    /// Kept, fittest first
    pub survivors: Vec<ComponentId>,
    /// To be moved through EVOLVING to TERMINATED and replaced
    pub culled: Vec<ComponentId>,
}

impl SelectionPlan {
    /// Generation the survivors and replacements belong to
    pub fn next_generation(&self) -> u64 {
        self.generation + 1
    }

    pub fn best(&self) -> Option<&RankedComponent> {
        self.ranked.first()
    }
}

/// Generation scheduler and selector
pub struct EvolutionEngine {
    policy: SurvivalPolicy,
    scorer: Box<dyn FitnessScorer>,
    interval: Duration,
    period: Duration,
    generation: Generation,
    last_attempt: DateTime<Utc>,
}

impl EvolutionEngine {
    /// Create an engine whose generation 0 starts at `started_at`
    pub fn new(config: &DarwinianConfig, started_at: DateTime<Utc>) -> Self {
        Self {
            policy: SurvivalPolicy::new(config.survival_rate),
            scorer: Box::new(RiskAdjusted),
            interval: config.generation_interval,
            period: config.evaluation_period,
            generation: Generation::genesis(started_at),
            last_attempt: started_at,
        }
    }

    /// Replace the scoring formula
    pub fn with_scorer(mut self, scorer: Box<dyn FitnessScorer>) -> Self {
        self.scorer = scorer;
        self
    }

    /// Continue from a known generation (bootstrap, restart)
    pub fn resume(&mut self, generation: Generation) {
        self.last_attempt = generation.started_at;
        self.generation = generation;
    }

    pub fn generation(&self) -> Generation {
        self.generation
    }

    pub fn scorer_name(&self) -> &'static str {
        self.scorer.name()
    }

    /// A boundary is due once per interval, or as soon as the evaluation period has elapsed
    /// since the generation started (once per generation)
    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        if now - self.last_attempt >= self.interval {
            return true;
        }
        let period_end = self.generation.started_at + self.period;
        now >= period_end && self.last_attempt < period_end
    }

    /// ACTIVE strategy components that completed the current window
    pub fn eligible(&self, components: &[Component]) -> Vec<ComponentId> {
        components
            .iter()
            .filter(|c| c.status == ComponentStatus::Active)
            .filter(|c| c.kind.is_strategy())
            .filter(|c| self.generation.has_completed_window(c))
            .map(|c| c.id)
            .collect()
    }

    /// Fail with `InsufficientSample` below the minimum selection size
    pub fn check_sample(&self, eligible: usize) -> Result<()> {
        if eligible < MIN_SELECTION_SAMPLE {
            return Err(EcosysError::InsufficientSample {
                eligible,
                required: MIN_SELECTION_SAMPLE,
            });
        }
        Ok(())
    }

    /// Rank candidates and split them into survivors and culled
    pub fn select(&self, candidates: &[ComponentMetrics]) -> Result<SelectionPlan> {
        self.check_sample(candidates.len())?;

        let mut ranked: Vec<RankedComponent> = candidates
            .iter()
            .map(|m| RankedComponent {
                id: m.component_id,
                score: sanitize(self.scorer.score(m)),
                realized_return: sanitize(m.realized_return),
            })
            .collect();
        ranked.sort_by(rank_order);

        let keep = self.policy.survivors(ranked.len());
        let survivors: Vec<ComponentId> = ranked[..keep].iter().map(|r| r.id).collect();
        let culled: Vec<ComponentId> = ranked[keep..].iter().map(|r| r.id).collect();

        debug!(
            generation = self.generation.number,
            candidates = ranked.len(),
            survivors = survivors.len(),
            culled = culled.len(),
            scorer = self.scorer.name(),
            "Selection computed"
        );

        Ok(SelectionPlan {
            generation: self.generation.number,
            ranked,
            survivors,
            culled,
        })
    }

    /// Note a skipped attempt so the next one waits a full interval
    pub fn record_attempt(&mut self, now: DateTime<Utc>) {
        self.last_attempt = now;
    }

    /// Open the next generation at `now`
    pub fn advance(&mut self, now: DateTime<Utc>) -> Generation {
        self.generation = self.generation.next(now);
        self.last_attempt = now;
        info!(generation = self.generation.number, "Generation started");
        self.generation
    }
}

/// Score descending, then realized return descending, then id for a stable order
fn rank_order(a: &RankedComponent, b: &RankedComponent) -> Ordering {
    b.score
        .total_cmp(&a.score)
        .then_with(|| b.realized_return.total_cmp(&a.realized_return))
        .then_with(|| a.id.cmp(&b.id))
}

/// NaN ranks last
fn sanitize(value: f64) -> f64 {
    if value.is_nan() {
        f64::NEG_INFINITY
    } else {
        value
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fitness::ReturnOverDrawdown;
    use ecosys_common::ComponentKind;

    fn config(survival_rate: f64) -> DarwinianConfig {
        DarwinianConfig {
            survival_rate,
            ..DarwinianConfig::default()
        }
    }

    fn metrics(score: f64, realized_return: f64) -> ComponentMetrics {
        ComponentMetrics {
            risk_adjusted_score: score,
            realized_return,
            trade_count: 5,
            ..ComponentMetrics::empty(ComponentId::new(), 0)
        }
    }

    #[test]
    fn test_ten_candidates_keep_two() {
        let engine = EvolutionEngine::new(&config(0.2), Utc::now());
        let candidates: Vec<_> = (0..10).map(|i| metrics(i as f64, 0.0)).collect();

        let plan = engine.select(&candidates).unwrap();
        assert_eq!(plan.survivors.len(), 2);
        assert_eq!(plan.culled.len(), 8);
        assert_eq!(plan.survivors[0], candidates[9].component_id);
        assert_eq!(plan.survivors[1], candidates[8].component_id);
        assert_eq!(plan.next_generation(), 1);
    }

    #[test]
    fn test_return_breaks_score_ties() {
        let engine = EvolutionEngine::new(&config(0.5), Utc::now());
        let low = metrics(1.0, 0.01);
        let high = metrics(1.0, 0.05);

        let plan = engine.select(&[low.clone(), high.clone()]).unwrap();
        assert_eq!(plan.survivors, vec![high.component_id]);
        assert_eq!(plan.culled, vec![low.component_id]);
    }

    #[test]
    fn test_zero_rate_keeps_best() {
        let engine = EvolutionEngine::new(&config(0.0), Utc::now());
        let candidates = vec![metrics(0.5, 0.0), metrics(2.0, 0.0), metrics(1.0, 0.0)];

        let plan = engine.select(&candidates).unwrap();
        assert_eq!(plan.survivors, vec![candidates[1].component_id]);
        assert_eq!(plan.culled.len(), 2);
    }

    #[test]
    fn test_insufficient_sample() {
        let engine = EvolutionEngine::new(&config(0.2), Utc::now());
        let err = engine.select(&[metrics(1.0, 0.0)]).unwrap_err();
        assert!(matches!(
            err,
            EcosysError::InsufficientSample {
                eligible: 1,
                required: 2
            }
        ));
    }

    #[test]
    fn test_nan_scores_rank_last() {
        let engine = EvolutionEngine::new(&config(0.5), Utc::now());
        let broken = metrics(f64::NAN, 0.0);
        let fine = metrics(-3.0, 0.0);

        let plan = engine.select(&[broken.clone(), fine.clone()]).unwrap();
        assert_eq!(plan.survivors, vec![fine.component_id]);
    }

    #[test]
    fn test_pluggable_scorer() {
        let engine =
            EvolutionEngine::new(&config(0.5), Utc::now()).with_scorer(Box::new(ReturnOverDrawdown));
        let mut calm = metrics(0.0, 0.10);
        calm.max_drawdown = 0.02;
        let mut wild = metrics(9.0, 0.20);
        wild.max_drawdown = 0.40;

        let plan = engine.select(&[wild, calm.clone()]).unwrap();
        assert_eq!(plan.survivors, vec![calm.component_id]);
        assert_eq!(engine.scorer_name(), "return_over_drawdown");
    }

    #[test]
    fn test_due_after_interval() {
        let start = Utc::now();
        let engine = EvolutionEngine::new(&config(0.2), start);

        assert!(!engine.is_due(start + Duration::minutes(59)));
        assert!(engine.is_due(start + Duration::minutes(60)));
    }

    #[test]
    fn test_due_when_period_elapsed() {
        let start = Utc::now();
        let cfg = DarwinianConfig {
            generation_interval: Duration::days(365),
            evaluation_period: Duration::days(1),
            ..DarwinianConfig::default()
        };
        let mut engine = EvolutionEngine::new(&cfg, start);

        let after = start + Duration::days(1) + Duration::minutes(1);
        assert!(engine.is_due(after));

        // A skipped attempt after the period does not re-fire every tick
        engine.record_attempt(after);
        assert!(!engine.is_due(after + Duration::seconds(1)));
    }

    #[test]
    fn test_advance_starts_next_generation() {
        let start = Utc::now();
        let mut engine = EvolutionEngine::new(&config(0.2), start);
        let next = engine.advance(start + Duration::hours(1));

        assert_eq!(next.number, 1);
        assert_eq!(engine.generation(), next);
        assert!(!engine.is_due(start + Duration::hours(1) + Duration::minutes(1)));
    }

    #[test]
    fn test_resume_restarts_schedule() {
        let start = Utc::now();
        let mut engine = EvolutionEngine::new(&config(0.2), start);
        let later = start + Duration::hours(5);
        engine.resume(Generation {
            number: 7,
            started_at: later,
        });

        assert_eq!(engine.generation().number, 7);
        assert!(!engine.is_due(later + Duration::minutes(30)));
        assert!(engine.is_due(later + Duration::minutes(60)));
    }

    #[test]
    fn test_eligibility() {
        let start = Utc::now();
        let engine = EvolutionEngine::new(&config(0.2), start);

        let mut veteran = Component::new(ComponentKind::Generator, 0)
            .with_created_at(start - Duration::minutes(1));
        veteran.status = ComponentStatus::Active;

        let mut newcomer = Component::new(ComponentKind::Generator, 0)
            .with_created_at(start + Duration::minutes(1));
        newcomer.status = ComponentStatus::Active;

        let mut infra = Component::new(ComponentKind::RiskManager, 0)
            .with_created_at(start - Duration::minutes(1));
        infra.status = ComponentStatus::Active;

        let mut paused = Component::new(ComponentKind::Deployer, 0)
            .with_created_at(start - Duration::minutes(1));
        paused.status = ComponentStatus::Paused;

        let eligible = engine.eligible(&[veteran.clone(), newcomer, infra, paused]);
        assert_eq!(eligible, vec![veteran.id]);
    }
}
