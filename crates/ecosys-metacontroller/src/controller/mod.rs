//! Meta-Controller
//!
//! Single coordinating loop over the registry, metrics collector, evolution engine and capital
//! allocator. Every lifecycle transition goes through here. Each tick:
//! 1. Drain inbound events (trades, failures, capital changes, pause/resume)
//! 2. Poll every ACTIVE component's adapter concurrently, with a per-poll timeout
//! 3. Run a generation when one is due
//! 4. Rebalance when the population or capital changed
//! 5. Queue changed records for persistence
//!
//! Steps run sequentially on one task, so generation membership is final before any allocation
//! is computed.

mod handle;

pub use handle::{ControllerEvent, ControllerHandle};

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use ecosys_common::{
    AllocationRecord, Component, ComponentAdapter, ComponentFault, ComponentId, ComponentKind,
    ComponentMetrics, ComponentStatus, EcosysError, EntityType, Generation, Notification,
    NotificationKind, NotificationSink, PersistentStore, Result, TradeResult, TransitionRecord,
};
use ecosys_darwinian::{
    AllocationCandidate, CapitalAllocator, ComponentFilter, ComponentRegistry, EvolutionEngine,
    EvolutionMetrics, FitnessScorer, MetricsCollector, RebalanceOutcome, SelectionPlan,
    WeightingPolicy,
};
use futures::future::join_all;
use rust_decimal::Decimal;
use serde::Serialize;
use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

use crate::config::ControllerConfig;
use crate::persistence::{PersistStats, Persister, RetryPolicy};

/// Store key of the committed allocation record
pub const ALLOCATION_KEY: &str = "current";

/// What bootstrap found and created
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BootstrapReport {
    /// Persisted components that resumed live
    pub restored: usize,
    /// Persisted EVOLVING or FAILED components terminated on restore
    pub retired: usize,
    pub created: usize,
    pub generation: u64,
}

/// What one tick did
#[derive(Debug, Default)]
pub struct TickReport {
    pub events: usize,
    /// Components moved to FAILED this tick
    pub failed: Vec<ComponentId>,
    /// Applied selection, when a generation ran
    pub generation: Option<SelectionPlan>,
    pub rebalance: Option<RebalanceOutcome>,
}

/// Final state handed back by shutdown
#[derive(Debug, Clone)]
pub struct ShutdownReport {
    /// Components moved to TERMINATED by the shutdown
    pub terminated: usize,
    /// Frozen allocation, as persisted
    pub allocation: Arc<AllocationRecord>,
    pub generation: u64,
    pub persisted: PersistStats,
}

/// Result of polling one component
enum PollOutcome {
    Healthy(Vec<TradeResult>),
    Faulted(ComponentFault),
    Unreachable(String),
}

/// Top-level orchestration loop
pub struct MetaController {
    config: ControllerConfig,
    registry: Arc<ComponentRegistry>,
    collector: Arc<MetricsCollector>,
    engine: EvolutionEngine,
    allocator: Arc<CapitalAllocator>,
    adapters: HashMap<ComponentKind, Arc<dyn ComponentAdapter>>,
    store: Arc<dyn PersistentStore>,
    notifier: Arc<dyn NotificationSink>,
    persister: Option<Persister>,
    metrics: EvolutionMetrics,
    events_tx: mpsc::Sender<ControllerEvent>,
    events_rx: mpsc::Receiver<ControllerEvent>,
    cancel: CancellationToken,
    total_capital: Decimal,
    /// Active set or capital changed since the last rebalance
    dirty: bool,
    /// Components whose record changed since the last flush
    pending: BTreeSet<ComponentId>,
    /// Committed allocation not yet queued for persistence
    pending_allocation: Option<Arc<AllocationRecord>>,
    bootstrapped: bool,
    /// Set once shutdown starts; failures then retire without replacement
    shutting_down: bool,
}

impl MetaController {
    /// Build a controller from a validated configuration
    pub fn new(
        config: ControllerConfig,
        store: Arc<dyn PersistentStore>,
        notifier: Arc<dyn NotificationSink>,
    ) -> Result<Self> {
        config.validate()?;

        let darwinian = config.darwinian();
        let engine = EvolutionEngine::new(&darwinian, Utc::now())
            .with_scorer(config.evolution.scoring.scorer());
        let allocator = CapitalAllocator::new(&darwinian, config.trading.initial_capital)
            .with_weighting(config.evolution.weighting.policy());
        let metrics = EvolutionMetrics::new()
            .map_err(|e| EcosysError::Internal(format!("metrics: {e}")))?;
        let (events_tx, events_rx) = mpsc::channel(config.runtime.event_buffer);

        Ok(Self {
            registry: Arc::new(ComponentRegistry::new(config.runtime.audit_capacity)),
            collector: Arc::new(MetricsCollector::new()),
            engine,
            allocator: Arc::new(allocator),
            adapters: HashMap::new(),
            store,
            notifier,
            persister: None,
            metrics,
            events_tx,
            events_rx,
            cancel: CancellationToken::new(),
            total_capital: config.trading.initial_capital,
            dirty: true,
            pending: BTreeSet::new(),
            pending_allocation: None,
            bootstrapped: false,
            shutting_down: false,
            config,
        })
    }

    /// Poll components of `kind` through `adapter`
    pub fn with_adapter(mut self, kind: ComponentKind, adapter: Arc<dyn ComponentAdapter>) -> Self {
        self.adapters.insert(kind, adapter);
        self
    }

    pub fn with_scorer(mut self, scorer: Box<dyn FitnessScorer>) -> Self {
        self.engine = self.engine.with_scorer(scorer);
        self
    }

    /// Replace the allocator's weighting; only valid before bootstrap
    pub fn with_weighting(mut self, weighting: Box<dyn WeightingPolicy>) -> Self {
        let allocator = CapitalAllocator::new(&self.config.darwinian(), self.total_capital)
            .with_weighting(weighting);
        self.allocator = Arc::new(allocator);
        self
    }

    /// Use an externally owned shutdown token
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn handle(&self) -> ControllerHandle {
        ControllerHandle::new(
            self.events_tx.clone(),
            self.cancel.clone(),
            self.registry.clone(),
            self.allocator.clone(),
        )
    }

    pub fn registry(&self) -> &ComponentRegistry {
        &self.registry
    }

    pub fn collector(&self) -> &MetricsCollector {
        &self.collector
    }

    pub fn metrics(&self) -> &EvolutionMetrics {
        &self.metrics
    }

    pub fn allocation(&self) -> Arc<AllocationRecord> {
        self.allocator.current()
    }

    pub fn generation(&self) -> Generation {
        self.engine.generation()
    }

    pub fn total_capital(&self) -> Decimal {
        self.total_capital
    }

    /// Restore persisted state, bring up the initial population and compute the first allocation
    #[instrument(skip(self))]
    pub async fn bootstrap(&mut self) -> Result<BootstrapReport> {
        if self.bootstrapped {
            return Err(EcosysError::Internal("already bootstrapped".to_string()));
        }

        let policy = RetryPolicy {
            max_attempts: self.config.persistence.max_attempts,
            base_backoff: self.config.base_backoff(),
        };
        self.persister = Some(Persister::spawn(
            self.store.clone(),
            self.notifier.clone(),
            policy,
            self.config.persistence.queue_capacity,
        ));

        let (restored, retired) = self.restore_components().await?;
        let mut report = BootstrapReport {
            restored,
            retired,
            ..BootstrapReport::default()
        };
        self.restore_allocation().await?;

        let generation = self
            .registry
            .list(&ComponentFilter::any())
            .iter()
            .filter(|c| !c.status.is_terminal())
            .map(|c| c.generation)
            .max()
            .unwrap_or(0);

        // One live component of every kind, plus the configured number of generators
        for kind in ComponentKind::ALL {
            let live = self.live_count(kind);
            let wanted = if kind == ComponentKind::Generator {
                self.config.evolution.initial_generators.max(1)
            } else {
                1
            };
            for _ in live..wanted {
                self.register(kind, generation);
                report.created += 1;
            }
        }

        for component in self
            .registry
            .list(&ComponentFilter::any().status(ComponentStatus::Initializing))
        {
            self.transition(component.id, ComponentStatus::Active)?;
        }

        // Generation starts after the initial population exists
        self.engine.resume(Generation {
            number: generation,
            started_at: Utc::now(),
        });
        self.collector.reset_window(generation);
        self.metrics.generation_current.set(generation as i64);
        report.generation = generation;

        self.bootstrapped = true;
        self.dirty = true;
        self.rebalance();
        self.flush();
        self.metrics.observe_population(&self.registry.population());

        info!(
            restored = report.restored,
            retired = report.retired,
            created = report.created,
            generation,
            active = self.registry.population().active,
            "Bootstrap complete"
        );
        Ok(report)
    }

    /// Run until the cancellation token fires, then shut down
    pub async fn run(mut self) -> Result<ShutdownReport> {
        if !self.bootstrapped {
            self.bootstrap().await?;
        }

        let cancel = self.cancel.clone();
        let mut ticker = tokio::time::interval(self.config.tick_interval());
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        info!(
            tick_ms = self.config.runtime.tick_interval_ms,
            adapters = self.adapters.len(),
            "Controller loop started"
        );

        loop {
            tokio::select! {
                () = cancel.cancelled() => {
                    info!("Shutdown requested");
                    break;
                }
                _ = ticker.tick() => {
                    if let Err(e) = self.tick(Utc::now()).await {
                        error!(error = %e, "Tick failed");
                    }
                }
                Some(event) = self.events_rx.recv() => {
                    self.handle_event(event);
                }
            }
        }

        self.shutdown().await
    }

    /// One pass of the control loop at `now`
    #[instrument(skip(self))]
    pub async fn tick(&mut self, now: DateTime<Utc>) -> Result<TickReport> {
        let mut report = TickReport {
            events: self.drain_events(),
            ..TickReport::default()
        };
        for (id, reason) in self.poll_adapters().await {
            if self.handle_failure(id, &reason).is_some() {
                report.failed.push(id);
            }
        }

        if self.engine.is_due(now) {
            report.generation = self.run_generation(now)?;
        }

        if self.dirty {
            report.rebalance = self.rebalance();
        }

        self.flush();
        self.metrics.observe_population(&self.registry.population());

        debug!(
            events = report.events,
            failures = report.failed.len(),
            rebalanced = report.rebalance.is_some(),
            "Tick complete"
        );
        Ok(report)
    }

    /// Apply one selection if enough components completed their window.
    ///
    /// Returns `None` when the sample is too small; the generation is not advanced.
    pub fn run_generation(&mut self, now: DateTime<Utc>) -> Result<Option<SelectionPlan>> {
        let strategies = self.registry.list(&ComponentFilter::any().strategies());
        let eligible = self.engine.eligible(&strategies);

        if let Err(e) = self.engine.check_sample(eligible.len()) {
            info!(error = %e, "Skipping generation");
            self.engine.record_attempt(now);
            self.metrics.generations_skipped.inc();
            return Ok(None);
        }

        let current = self.engine.generation().number;
        let next = current + 1;

        // Seal windows before ranking; reports arriving from here on count for `next`
        let sealed = self.collector.rotate_window(next);
        let candidates: Vec<ComponentMetrics> = eligible
            .iter()
            .map(|id| {
                sealed
                    .get(id)
                    .cloned()
                    .unwrap_or_else(|| ComponentMetrics::empty(*id, current))
            })
            .collect();

        let plan = self.engine.select(&candidates)?;

        for id in &plan.culled {
            if let Err(e) = self.cull(*id) {
                warn!(component_id = %id, error = %e, "Cull failed");
            }
        }

        let mut replacements = Vec::with_capacity(plan.culled.len());
        for _ in &plan.culled {
            let id = self.register(ComponentKind::Generator, next);
            self.transition(id, ComponentStatus::Active)?;
            replacements.push(id);
        }

        for id in &plan.survivors {
            self.registry.mark_evaluated(*id, next)?;
            self.pending.insert(*id);
        }

        // The new window opens after the replacements exist, so they are ranked at its end
        let generation = self.engine.advance(now.max(Utc::now()));
        self.dirty = true;

        self.metrics.generations_total.inc();
        self.metrics.components_culled.inc_by(plan.culled.len() as u64);
        self.metrics.generation_current.set(generation.number as i64);

        let best = plan.best().map(|b| b.score);
        info!(
            closed = plan.generation,
            opened = generation.number,
            ranked = plan.ranked.len(),
            survivors = plan.survivors.len(),
            culled = plan.culled.len(),
            best_score = ?best,
            "Generation complete"
        );
        self.notifier.notify(Notification::new(
            NotificationKind::GenerationSummary,
            serde_json::json!({
                "generation": plan.generation,
                "next_generation": generation.number,
                "ranked": plan.ranked.len(),
                "survivors": plan.survivors,
                "culled": plan.culled,
                "replacements": replacements,
                "best_score": best,
            }),
        ));

        Ok(Some(plan))
    }

    /// Move an ACTIVE component to PAUSED
    pub fn pause(&mut self, id: ComponentId) -> Result<TransitionRecord> {
        let record = self.transition(id, ComponentStatus::Paused)?;
        self.dirty = true;
        Ok(record)
    }

    /// Move a PAUSED component back to ACTIVE
    pub fn resume(&mut self, id: ComponentId) -> Result<TransitionRecord> {
        let record = self.transition(id, ComponentStatus::Active)?;
        self.dirty = true;
        Ok(record)
    }

    /// Change the capital the allocation refers to; applied on the next rebalance
    pub fn set_total_capital(&mut self, total: Decimal) {
        if total <= Decimal::ZERO {
            warn!(%total, "Ignoring non-positive total capital");
            return;
        }
        if total != self.total_capital {
            info!(from = %self.total_capital, to = %total, "Total capital changed");
            self.total_capital = total;
            self.dirty = true;
        }
    }

    /// Mark a component FAILED, replace it and retire the failed record.
    ///
    /// Unknown or already retired components are ignored. During shutdown the failed component
    /// is retired without a replacement.
    pub fn handle_failure(&mut self, id: ComponentId, reason: &str) -> Option<ComponentId> {
        let component = self.registry.get(&id)?;
        if matches!(
            component.status,
            ComponentStatus::Failed | ComponentStatus::Terminated
        ) {
            return None;
        }

        if let Err(e) = self.transition(id, ComponentStatus::Failed) {
            warn!(component_id = %id, error = %e, "Could not mark component failed");
            return None;
        }
        self.collector.forget(&id);
        self.dirty = true;

        if self.shutting_down {
            if let Err(e) = self.transition(id, ComponentStatus::Terminated) {
                warn!(component_id = %id, error = %e, "Could not terminate failed component");
            }
            warn!(
                component_id = %id,
                kind = %component.kind,
                reason,
                "Component failed during shutdown"
            );
            self.notifier.notify(Notification::new(
                NotificationKind::ComponentFailure,
                serde_json::json!({
                    "component_id": id,
                    "kind": component.kind,
                    "reason": reason,
                    "replacement": null,
                }),
            ));
            return None;
        }

        let generation = self.engine.generation().number;
        let kind = component.kind.replacement();
        let replacement = self.register(kind, generation);
        if let Err(e) = self.transition(replacement, ComponentStatus::Active) {
            warn!(component_id = %replacement, error = %e, "Could not activate replacement");
        }
        if let Err(e) = self.transition(id, ComponentStatus::Terminated) {
            warn!(component_id = %id, error = %e, "Could not terminate failed component");
        }

        self.metrics.emergency_replacements.inc();
        let failure = EcosysError::ComponentFailure {
            id,
            reason: reason.to_string(),
        };
        error!(
            component_id = %id,
            kind = %component.kind,
            %replacement,
            "{}", failure
        );
        self.notifier.notify(Notification::new(
            NotificationKind::ComponentFailure,
            serde_json::json!({
                "component_id": id,
                "kind": component.kind,
                "reason": reason,
                "replacement": replacement,
            }),
        ));

        Some(replacement)
    }

    /// Drain events, freeze allocation, terminate every live component and flush persistence
    #[instrument(skip(self))]
    pub async fn shutdown(mut self) -> Result<ShutdownReport> {
        self.shutting_down = true;
        let drained = self.drain_events();
        self.events_rx.close();
        self.cancel.cancel();

        let allocation = self.allocator.current();
        self.allocator.freeze();

        let mut terminated = 0;
        for component in self.registry.list(&ComponentFilter::any()) {
            if component.status.is_terminal() {
                continue;
            }
            match self.transition(component.id, ComponentStatus::Terminated) {
                Ok(_) => terminated += 1,
                Err(e) => warn!(component_id = %component.id, error = %e, "Terminate failed"),
            }
        }

        self.pending_allocation = Some(allocation.clone());
        self.flush();
        self.metrics.observe_population(&self.registry.population());

        let persisted = match self.persister.take() {
            Some(persister) => persister.close(self.config.shutdown_grace()).await,
            None => PersistStats::default(),
        };

        let generation = self.engine.generation().number;
        info!(
            drained,
            terminated,
            generation,
            written = persisted.written,
            failed_writes = persisted.failed,
            "Controller shut down"
        );
        self.notifier.notify(Notification::new(
            NotificationKind::Shutdown,
            serde_json::json!({
                "terminated": terminated,
                "generation": generation,
                "allocated_fraction": allocation.allocated_fraction(),
            }),
        ));

        Ok(ShutdownReport {
            terminated,
            allocation,
            generation,
            persisted,
        })
    }

    fn drain_events(&mut self) -> usize {
        let mut drained = 0;
        while let Ok(event) = self.events_rx.try_recv() {
            self.handle_event(event);
            drained += 1;
        }
        drained
    }

    fn handle_event(&mut self, event: ControllerEvent) {
        match event {
            ControllerEvent::Trade { id, trade } => self.record_trade(id, trade),
            ControllerEvent::Failure { id, fault } => {
                self.handle_failure(id, &fault.reason);
            }
            ControllerEvent::SetCapital(total) => self.set_total_capital(total),
            ControllerEvent::Pause(id) => {
                if let Err(e) = self.pause(id) {
                    warn!(component_id = %id, error = %e, "Pause rejected");
                }
            }
            ControllerEvent::Resume(id) => {
                if let Err(e) = self.resume(id) {
                    warn!(component_id = %id, error = %e, "Resume rejected");
                }
            }
        }
    }

    fn record_trade(&mut self, id: ComponentId, trade: TradeResult) {
        match self.registry.get(&id).map(|c| c.status) {
            Some(ComponentStatus::Active | ComponentStatus::Paused) => {
                self.collector.record(id, trade);
                self.metrics.trades_recorded.inc();
            }
            status => debug!(component_id = %id, ?status, "Dropping trade from non-live component"),
        }
    }

    /// Poll every ACTIVE component with an adapter; returns the faulted ones
    async fn poll_adapters(&mut self) -> Vec<(ComponentId, String)> {
        if self.adapters.is_empty() {
            return Vec::new();
        }

        let timeout = self.config.poll_timeout();
        let active = self
            .registry
            .list(&ComponentFilter::any().status(ComponentStatus::Active));

        let polls = active.iter().filter_map(|component| {
            let adapter = self.adapters.get(&component.kind)?.clone();
            let id = component.id;
            Some(async move {
                let outcome = tokio::time::timeout(timeout, poll_component(adapter, id)).await;
                (id, outcome)
            })
        });
        let results = join_all(polls).await;

        let mut faulted = Vec::new();
        for (id, outcome) in results {
            match outcome {
                Ok(PollOutcome::Healthy(trades)) => {
                    for trade in trades {
                        self.record_trade(id, trade);
                    }
                }
                Ok(PollOutcome::Faulted(fault)) => faulted.push((id, fault.reason)),
                Ok(PollOutcome::Unreachable(reason)) => faulted.push((id, reason)),
                Err(_) => warn!(component_id = %id, "Adapter poll timed out"),
            }
        }
        faulted
    }

    fn cull(&mut self, id: ComponentId) -> Result<()> {
        self.transition(id, ComponentStatus::Evolving)?;
        self.transition(id, ComponentStatus::Terminated)?;
        self.collector.forget(&id);
        Ok(())
    }

    /// Rebalance over the ACTIVE strategy components; breaches are reported, not fatal
    fn rebalance(&mut self) -> Option<RebalanceOutcome> {
        let candidates: Vec<AllocationCandidate> = self
            .registry
            .list(
                &ComponentFilter::any()
                    .strategies()
                    .status(ComponentStatus::Active),
            )
            .into_iter()
            .map(|c| AllocationCandidate {
                id: c.id,
                score: self.collector.snapshot(&c.id).risk_adjusted_score,
                historical_drawdown: self.collector.historical_drawdown(&c.id),
            })
            .collect();

        let outcome = match self.allocator.rebalance(&candidates, self.total_capital) {
            Ok(outcome) => outcome,
            Err(e) => {
                warn!(error = %e, "Rebalance skipped");
                return None;
            }
        };
        self.dirty = false;

        if let Some(breach) = &outcome.breach {
            self.metrics.risk_breaches.inc();
            let err = EcosysError::from(breach);
            self.notifier.notify(Notification::new(
                NotificationKind::RiskLimitBreach,
                serde_json::json!({
                    "message": err.to_string(),
                    "exposure": breach.exposure,
                    "limit": breach.limit,
                    "scale": breach.scale,
                    "constrained": breach.constrained,
                }),
            ));
        }

        if outcome.changed {
            self.metrics.rebalances.inc();
            self.metrics
                .allocated_fraction
                .set(outcome.record.allocated_fraction());
            self.queue_allocation(outcome.record.clone());
        }
        Some(outcome)
    }

    fn register(&mut self, kind: ComponentKind, generation: u64) -> ComponentId {
        let id = self.registry.register(kind, generation);
        self.pending.insert(id);
        id
    }

    fn transition(&mut self, id: ComponentId, to: ComponentStatus) -> Result<TransitionRecord> {
        let record = self.registry.transition(id, to)?;
        self.pending.insert(id);
        Ok(record)
    }

    fn live_count(&self, kind: ComponentKind) -> usize {
        self.registry
            .list(&ComponentFilter::any().kind(kind))
            .iter()
            .filter(|c| {
                matches!(
                    c.status,
                    ComponentStatus::Initializing | ComponentStatus::Active | ComponentStatus::Paused
                )
            })
            .count()
    }

    /// Returns the live and the retired counts
    async fn restore_components(&mut self) -> Result<(usize, usize)> {
        let blobs = self.store.list(EntityType::Component).await?;
        let mut restored = 0;
        let mut retired = 0;

        for (key, blob) in blobs {
            let component: Component = match serde_json::from_slice(&blob) {
                Ok(component) => component,
                Err(e) => {
                    warn!(key = %key, error = %e, "Skipping unreadable component record");
                    continue;
                }
            };
            if component.status.is_terminal() {
                continue;
            }

            let id = component.id;
            let status = component.status;
            self.registry.restore(component);

            // Interrupted culls and unreplaced failures are retired
            match status {
                ComponentStatus::Evolving | ComponentStatus::Failed => {
                    self.transition(id, ComponentStatus::Terminated)?;
                    retired += 1;
                }
                ComponentStatus::Initializing
                | ComponentStatus::Active
                | ComponentStatus::Paused
                | ComponentStatus::Terminated => restored += 1,
            }
        }

        if restored + retired > 0 {
            info!(restored, retired, "Restored components");
        }
        Ok((restored, retired))
    }

    async fn restore_allocation(&mut self) -> Result<()> {
        let Some(blob) = self.store.load(EntityType::Allocation, ALLOCATION_KEY).await? else {
            return Ok(());
        };
        match serde_json::from_slice::<AllocationRecord>(&blob) {
            Ok(record) => {
                if record.total_capital > Decimal::ZERO {
                    self.total_capital = record.total_capital;
                }
                info!(
                    components = record.len(),
                    total_capital = %record.total_capital,
                    "Restored allocation"
                );
                self.allocator.restore(record);
            }
            Err(e) => warn!(error = %e, "Ignoring unreadable allocation record"),
        }
        Ok(())
    }

    fn queue_allocation(&mut self, record: Arc<AllocationRecord>) {
        self.pending_allocation = Some(record);
    }

    /// Hand every changed record to the persistence worker without waiting on the store
    fn flush(&mut self) {
        let Some(persister) = &self.persister else {
            return;
        };

        if let Some(record) = self.pending_allocation.take() {
            if let Err(e) = persister.submit(EntityType::Allocation, ALLOCATION_KEY, &*record) {
                warn!(error = %e, "Could not queue allocation record");
            }
        }

        for id in std::mem::take(&mut self.pending) {
            let Some(component) = self.registry.get(&id) else {
                continue;
            };
            if let Err(e) = persister.submit(EntityType::Component, id.to_string(), &component) {
                warn!(component_id = %id, error = %e, "Could not queue component record");
            }
        }
    }
}

async fn poll_component(adapter: Arc<dyn ComponentAdapter>, id: ComponentId) -> PollOutcome {
    if let Some(fault) = adapter.report_failure(id).await {
        return PollOutcome::Faulted(fault);
    }
    match adapter.report_metrics(id).await {
        Ok(trades) => PollOutcome::Healthy(trades),
        Err(e) => PollOutcome::Unreachable(e.to_string()),
    }
}
