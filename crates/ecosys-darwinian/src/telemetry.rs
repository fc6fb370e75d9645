//! Prometheus collectors for the evolutionary loop

use prometheus::{Gauge, IntCounter, IntGauge, Registry};

use crate::registry::PopulationCounts;

/// Population, generation and allocation collectors
#[derive(Clone)]
pub struct EvolutionMetrics {
    pub population_active: IntGauge,
    pub population_paused: IntGauge,
    pub population_failed: IntGauge,
    pub population_terminated: IntGauge,
    pub generation_current: IntGauge,
    pub allocated_fraction: Gauge,
    pub generations_total: IntCounter,
    pub generations_skipped: IntCounter,
    pub components_culled: IntCounter,
    pub emergency_replacements: IntCounter,
    pub risk_breaches: IntCounter,
    pub rebalances: IntCounter,
    pub trades_recorded: IntCounter,
}

impl EvolutionMetrics {
    pub fn new() -> prometheus::Result<Self> {
        Ok(Self {
            population_active: IntGauge::new(
                "ecosys_population_active",
                "Components currently ACTIVE",
            )?,
            population_paused: IntGauge::new(
                "ecosys_population_paused",
                "Components currently PAUSED",
            )?,
            population_failed: IntGauge::new(
                "ecosys_population_failed",
                "Components currently FAILED",
            )?,
            population_terminated: IntGauge::new(
                "ecosys_population_terminated",
                "Components TERMINATED since start",
            )?,
            generation_current: IntGauge::new(
                "ecosys_generation_current",
                "Current generation number",
            )?,
            allocated_fraction: Gauge::new(
                "ecosys_allocated_fraction",
                "Fraction of total capital currently allocated",
            )?,
            generations_total: IntCounter::new(
                "ecosys_generations_total",
                "Generation boundaries completed",
            )?,
            generations_skipped: IntCounter::new(
                "ecosys_generations_skipped_total",
                "Generation attempts skipped for insufficient sample",
            )?,
            components_culled: IntCounter::new(
                "ecosys_components_culled_total",
                "Components culled at generation boundaries",
            )?,
            emergency_replacements: IntCounter::new(
                "ecosys_emergency_replacements_total",
                "Replacements registered after component failures",
            )?,
            risk_breaches: IntCounter::new(
                "ecosys_risk_breaches_total",
                "Rebalances constrained by the drawdown limit",
            )?,
            rebalances: IntCounter::new(
                "ecosys_rebalances_total",
                "Allocation records committed",
            )?,
            trades_recorded: IntCounter::new(
                "ecosys_trades_recorded_total",
                "Trade results accepted by the metrics collector",
            )?,
        })
    }

    pub fn register(&self, registry: &Registry) -> prometheus::Result<()> {
        registry.register(Box::new(self.population_active.clone()))?;
        registry.register(Box::new(self.population_paused.clone()))?;
        registry.register(Box::new(self.population_failed.clone()))?;
        registry.register(Box::new(self.population_terminated.clone()))?;
        registry.register(Box::new(self.generation_current.clone()))?;
        registry.register(Box::new(self.allocated_fraction.clone()))?;
        registry.register(Box::new(self.generations_total.clone()))?;
        registry.register(Box::new(self.generations_skipped.clone()))?;
        registry.register(Box::new(self.components_culled.clone()))?;
        registry.register(Box::new(self.emergency_replacements.clone()))?;
        registry.register(Box::new(self.risk_breaches.clone()))?;
        registry.register(Box::new(self.rebalances.clone()))?;
        registry.register(Box::new(self.trades_recorded.clone()))?;
        Ok(())
    }

    pub fn observe_population(&self, counts: &PopulationCounts) {
        self.population_active.set(counts.active as i64);
        self.population_paused.set(counts.paused as i64);
        self.population_failed.set(counts.failed as i64);
        self.population_terminated.set(counts.terminated as i64);
    }
}
